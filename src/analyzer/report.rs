use serde::{Deserialize, Serialize};

/// Issue severity, ordered from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

/// Fine-grained category attached by the async/semantic/auth detectors.
/// Categories decide which report bucket an issue lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueCategory {
    Security,
    Performance,
    Concurrency,
    MemoryLeak,
    Reliability,
    Observability,
    Testability,
    Maintainability,
    Design,
    Style,
}

/// A single finding produced by a detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    pub message: String,
    pub severity: Severity,
    pub rule: String,
    pub suggestion: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<IssueCategory>,
}

impl Issue {
    pub fn new(
        line: u32,
        message: impl Into<String>,
        severity: Severity,
        rule: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            line,
            column: None,
            message: message.into(),
            severity,
            rule: rule.into(),
            suggestion: suggestion.into(),
            category: None,
        }
    }

    pub fn with_category(mut self, category: IssueCategory) -> Self {
        self.category = Some(category);
        self
    }
}

/// Category set accepted from the AI provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiCategory {
    Security,
    Performance,
    Logic,
    Style,
    Reliability,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiSuggestion {
    pub line: u32,
    pub severity: Severity,
    pub category: AiCategory,
    pub issue: String,
    pub explanation: String,
    pub suggested_fix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetrics {
    pub lines_analyzed: u32,
    pub issues_found: u32,
    pub processing_time_ms: u64,
    pub review_time_text: String,
    pub cache_hit: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quality {
    pub score: f64,
    pub grade: String,
}

/// The structured output of one analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub file_name: String,
    pub security: Vec<Issue>,
    pub performance: Vec<Issue>,
    pub style: Vec<Issue>,
    pub ai_suggestions: Vec<AiSuggestion>,
    pub metrics: ReportMetrics,
    pub quality: Quality,
}

impl Report {
    pub fn total_issues(&self) -> u32 {
        (self.security.len() + self.performance.len() + self.style.len() + self.ai_suggestions.len())
            as u32
    }
}

fn security_weight(severity: Severity) -> f64 {
    match severity {
        Severity::Critical => 15.0,
        Severity::High => 10.0,
        Severity::Medium => 5.0,
        Severity::Low => 2.0,
    }
}

fn performance_weight(severity: Severity) -> f64 {
    match severity {
        Severity::Critical => 10.0,
        Severity::High => 7.0,
        Severity::Medium => 4.0,
        Severity::Low => 1.0,
    }
}

fn ai_weight(severity: Severity) -> f64 {
    match severity {
        Severity::Critical => 8.0,
        Severity::High => 5.0,
        Severity::Medium => 3.0,
        Severity::Low => 1.0,
    }
}

/// Deterministic quality score: start at 100, deduct per issue by bucket
/// and severity, clamp to [0, 100].
pub fn quality_score(
    security: &[Issue],
    performance: &[Issue],
    style: &[Issue],
    ai_suggestions: &[AiSuggestion],
) -> f64 {
    let mut score = 100.0;
    for issue in security {
        score -= security_weight(issue.severity);
    }
    for issue in performance {
        score -= performance_weight(issue.severity);
    }
    score -= style.len() as f64 * 0.5;
    for suggestion in ai_suggestions {
        score -= ai_weight(suggestion.severity);
    }
    score.clamp(0.0, 100.0)
}

pub fn quality_grade(score: f64) -> &'static str {
    if score >= 90.0 {
        "A"
    } else if score >= 80.0 {
        "B"
    } else if score >= 70.0 {
        "C"
    } else if score >= 60.0 {
        "D"
    } else {
        "F"
    }
}

pub fn review_time_text(elapsed_ms: u64) -> String {
    if elapsed_ms < 1000 {
        format!("{}ms", elapsed_ms)
    } else {
        format!("{:.2}s", elapsed_ms as f64 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(severity: Severity) -> Issue {
        Issue::new(1, "m", severity, "r", "s")
    }

    #[test]
    fn perfect_file_scores_one_hundred() {
        let score = quality_score(&[], &[], &[], &[]);
        assert_eq!(score, 100.0);
        assert_eq!(quality_grade(score), "A");
    }

    #[test]
    fn deductions_follow_bucket_weights() {
        // One critical security (-15) and one high performance (-7).
        let score = quality_score(&[issue(Severity::Critical)], &[issue(Severity::High)], &[], &[]);
        assert_eq!(score, 78.0);
        assert_eq!(quality_grade(score), "C");
    }

    #[test]
    fn style_issues_deduct_half_point_flat() {
        let style: Vec<Issue> = (0..4).map(|_| issue(Severity::Low)).collect();
        assert_eq!(quality_score(&[], &[], &style, &[]), 98.0);
    }

    #[test]
    fn score_clamps_at_zero() {
        let security: Vec<Issue> = (0..10).map(|_| issue(Severity::Critical)).collect();
        let score = quality_score(&security, &[], &[], &[]);
        assert_eq!(score, 0.0);
        assert_eq!(quality_grade(score), "F");
    }

    #[test]
    fn grade_boundaries() {
        assert_eq!(quality_grade(90.0), "A");
        assert_eq!(quality_grade(89.9), "B");
        assert_eq!(quality_grade(80.0), "B");
        assert_eq!(quality_grade(70.0), "C");
        assert_eq!(quality_grade(60.0), "D");
        assert_eq!(quality_grade(59.9), "F");
    }

    #[test]
    fn review_time_is_humanized() {
        assert_eq!(review_time_text(250), "250ms");
        assert_eq!(review_time_text(1500), "1.50s");
    }

    #[test]
    fn severity_and_category_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&Severity::High).unwrap(), "\"high\"");
        assert_eq!(
            serde_json::to_string(&IssueCategory::MemoryLeak).unwrap(),
            "\"memory-leak\""
        );
    }
}
