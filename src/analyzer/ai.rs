use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::report::{AiCategory, AiSuggestion, Severity};

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub enabled: bool,
    pub provider_url: String,
    pub model: String,
    pub api_key: String,
    pub request_timeout: Duration,
    pub min_file_lines: u32,
    pub max_file_lines: u32,
}

/// Remote AI reviewer. Every failure mode — transport, timeout, malformed
/// payload, schema violations — degrades to an empty suggestion list; this
/// detector can never fail an analysis.
pub struct AiDetector {
    config: AiConfig,
    client: reqwest::Client,
}

impl AiDetector {
    pub fn new(config: AiConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    /// Whether the AI stage runs for a file of this length.
    pub fn in_line_window(&self, line_count: u32) -> bool {
        self.config.enabled
            && line_count >= self.config.min_file_lines
            && line_count <= self.config.max_file_lines
    }

    pub async fn suggest(&self, content: &str, file_name: &str) -> Vec<AiSuggestion> {
        let body = json!({
            "model": self.config.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You are a code reviewer. Respond with JSON: \
                                {\"suggestions\": [{\"line\", \"severity\", \"category\", \
                                \"issue\", \"explanation\", \"suggested_fix\"}]}"
                },
                {
                    "role": "user",
                    "content": format!("Review {file_name}:\n\n{content}")
                }
            ],
            "temperature": 0.2
        });

        let request = self
            .client
            .post(&self.config.provider_url)
            .bearer_auth(&self.config.api_key)
            .json(&body);

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("AI provider request failed: {}", e);
                return Vec::new();
            }
        };

        if !response.status().is_success() {
            warn!("AI provider returned status {}", response.status());
            return Vec::new();
        }

        let payload: Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                warn!("AI provider returned non-JSON payload: {}", e);
                return Vec::new();
            }
        };

        let suggestions = extract_suggestions(&payload);
        debug!(count = suggestions.len(), "AI review finished");
        suggestions
    }
}

/// Pull the `suggestions` array out of the provider payload: either at the
/// top level, or embedded as JSON text in an OpenAI-style chat completion.
pub fn extract_suggestions(payload: &Value) -> Vec<AiSuggestion> {
    if let Some(list) = payload.get("suggestions") {
        return validate_suggestions(list);
    }

    let embedded = payload
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .and_then(|text| serde_json::from_str::<Value>(text).ok());

    match embedded.as_ref().and_then(|v| v.get("suggestions")) {
        Some(list) => validate_suggestions(list),
        None => {
            warn!("AI payload carried no suggestions array");
            Vec::new()
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawSuggestion {
    line: Option<i64>,
    severity: Option<String>,
    category: Option<String>,
    issue: Option<String>,
    explanation: Option<String>,
    suggested_fix: Option<String>,
}

fn parse_severity(raw: &str) -> Option<Severity> {
    match raw {
        "critical" => Some(Severity::Critical),
        "high" => Some(Severity::High),
        "medium" => Some(Severity::Medium),
        "low" => Some(Severity::Low),
        _ => None,
    }
}

fn parse_category(raw: &str) -> Option<AiCategory> {
    match raw {
        "security" => Some(AiCategory::Security),
        "performance" => Some(AiCategory::Performance),
        "logic" => Some(AiCategory::Logic),
        "style" => Some(AiCategory::Style),
        "reliability" => Some(AiCategory::Reliability),
        _ => None,
    }
}

/// Structural validation of each element; invalid ones are dropped with a
/// warning rather than coerced.
pub fn validate_suggestions(list: &Value) -> Vec<AiSuggestion> {
    let Some(items) = list.as_array() else {
        warn!("AI suggestions field is not an array");
        return Vec::new();
    };

    let mut valid = Vec::new();
    for item in items {
        let raw: RawSuggestion = match serde_json::from_value(item.clone()) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("dropping malformed AI suggestion: {}", e);
                continue;
            }
        };

        let parsed = (|| {
            let line = raw.line.filter(|l| *l >= 1)?;
            let severity = parse_severity(raw.severity.as_deref()?)?;
            let category = parse_category(raw.category.as_deref()?)?;
            let issue = raw.issue.filter(|s| !s.trim().is_empty())?;
            let explanation = raw.explanation.filter(|s| !s.trim().is_empty())?;
            let suggested_fix = raw.suggested_fix.filter(|s| !s.trim().is_empty())?;
            Some(AiSuggestion {
                line: line as u32,
                severity,
                category,
                issue,
                explanation,
                suggested_fix,
            })
        })();

        match parsed {
            Some(suggestion) => valid.push(suggestion),
            None => warn!("dropping AI suggestion that failed schema validation"),
        }
    }
    valid
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(enabled: bool) -> AiConfig {
        AiConfig {
            enabled,
            provider_url: "http://localhost:9/v1/chat/completions".to_string(),
            model: "reviewer-1".to_string(),
            api_key: String::new(),
            request_timeout: Duration::from_millis(10),
            min_file_lines: 5,
            max_file_lines: 100,
        }
    }

    #[test]
    fn line_window_gates_inclusively() {
        let detector = AiDetector::new(config(true));
        assert!(!detector.in_line_window(4));
        assert!(detector.in_line_window(5));
        assert!(detector.in_line_window(100));
        assert!(!detector.in_line_window(101));
    }

    #[test]
    fn disabled_detector_never_enters_the_window() {
        let detector = AiDetector::new(config(false));
        assert!(!detector.in_line_window(50));
    }

    #[test]
    fn top_level_suggestions_are_extracted() {
        let payload = json!({
            "suggestions": [{
                "line": 3,
                "severity": "high",
                "category": "logic",
                "issue": "off by one",
                "explanation": "loop bound excludes the last element",
                "suggested_fix": "use <= instead of <"
            }]
        });
        let out = extract_suggestions(&payload);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].line, 3);
        assert_eq!(out[0].severity, Severity::High);
    }

    #[test]
    fn chat_completion_embedded_json_is_extracted() {
        let inner = r#"{"suggestions":[{"line":1,"severity":"low","category":"style","issue":"naming","explanation":"unclear name","suggested_fix":"rename"}]}"#;
        let payload = json!({"choices": [{"message": {"content": inner}}]});
        assert_eq!(extract_suggestions(&payload).len(), 1);
    }

    #[test]
    fn invalid_elements_are_dropped_not_coerced() {
        let payload = json!({
            "suggestions": [
                {"line": 0, "severity": "high", "category": "logic",
                 "issue": "bad line", "explanation": "x", "suggested_fix": "y"},
                {"line": 2, "severity": "catastrophic", "category": "logic",
                 "issue": "bad severity", "explanation": "x", "suggested_fix": "y"},
                {"line": 2, "severity": "high", "category": "logic",
                 "issue": "", "explanation": "x", "suggested_fix": "y"},
                {"line": 2, "severity": "high", "category": "logic",
                 "issue": "valid", "explanation": "x", "suggested_fix": "y"}
            ]
        });
        let out = extract_suggestions(&payload);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].issue, "valid");
    }

    #[test]
    fn structural_failures_return_empty() {
        assert!(extract_suggestions(&json!({"unexpected": true})).is_empty());
        assert!(extract_suggestions(&json!({"suggestions": "nope"})).is_empty());
        assert!(extract_suggestions(&json!({"choices": [{"message": {"content": "not json"}}]}))
            .is_empty());
    }
}
