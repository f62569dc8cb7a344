use std::io::Write;
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use super::report::{Issue, Severity};
use super::{AnalysisError, Bucket};

/// Linter rule ids routed to the security bucket.
const SECURITY_RULES: &[&str] = &[
    "no-eval",
    "no-implied-eval",
    "no-new-func",
    "no-script-url",
    "no-proto",
    "no-caller",
    "no-extend-native",
];

/// Linter rule ids routed to the performance bucket.
const PERFORMANCE_RULES: &[&str] = &[
    "no-await-in-loop",
    "no-async-promise-executor",
    "require-atomic-updates",
    "no-unmodified-loop-condition",
];

#[derive(Debug, Deserialize)]
struct LinterFileResult {
    #[serde(default)]
    messages: Vec<LinterMessage>,
}

#[derive(Debug, Deserialize)]
struct LinterMessage {
    #[serde(rename = "ruleId")]
    rule_id: Option<String>,
    severity: u8,
    message: String,
    #[serde(default)]
    line: u32,
    #[serde(default)]
    column: u32,
}

fn bucket_for_rule(rule_id: &str) -> Bucket {
    if SECURITY_RULES.contains(&rule_id) {
        Bucket::Security
    } else if PERFORMANCE_RULES.contains(&rule_id) {
        Bucket::Performance
    } else {
        Bucket::Style
    }
}

fn map_output(raw: &str) -> Result<Vec<(Bucket, Issue)>, AnalysisError> {
    let files: Vec<LinterFileResult> = serde_json::from_str(raw)
        .map_err(|e| AnalysisError::Linter(format!("unparseable linter output: {e}")))?;

    let mut findings = Vec::new();
    for file in files {
        for message in file.messages {
            let Some(rule_id) = message.rule_id else {
                // Parse-level fatal messages carry no rule id.
                continue;
            };
            let severity = if message.severity >= 2 { Severity::High } else { Severity::Medium };
            let mut issue = Issue::new(
                message.line.max(1),
                message.message,
                severity,
                rule_id.clone(),
                "Fix the reported lint finding",
            );
            issue.column = Some(message.column);
            findings.push((bucket_for_rule(&rule_id), issue));
        }
    }
    Ok(findings)
}

/// Adapter over an external linter binary. The command is configured as a
/// whitespace-separated program line; the file path is appended. Output is
/// expected on stdout in the linter's JSON format.
pub struct LinterAdapter {
    command: Vec<String>,
}

impl LinterAdapter {
    pub fn from_command(command: &str) -> Option<Self> {
        let parts: Vec<String> = command.split_whitespace().map(str::to_string).collect();
        if parts.is_empty() {
            None
        } else {
            Some(Self { command: parts })
        }
    }

    pub async fn run(
        &self,
        content: &str,
        file_name: &str,
    ) -> Result<Vec<(Bucket, Issue)>, AnalysisError> {
        let extension = file_name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("js");
        let mut scratch = tempfile::Builder::new()
            .suffix(&format!(".{extension}"))
            .tempfile()
            .map_err(|e| AnalysisError::Linter(format!("scratch file: {e}")))?;
        scratch
            .write_all(content.as_bytes())
            .map_err(|e| AnalysisError::Linter(format!("scratch file: {e}")))?;

        let output = self
            .spawn(scratch.path())
            .await
            .map_err(|e| AnalysisError::Linter(format!("linter spawn failed: {e}")))?;

        // Most linters exit non-zero when findings exist; only treat the
        // run as failed when stdout is not usable output.
        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(exit = ?output.status.code(), "linter finished");
        map_output(&stdout)
    }

    async fn spawn(&self, path: &std::path::Path) -> std::io::Result<std::process::Output> {
        Command::new(&self.command[0])
            .args(&self.command[1..])
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
    }
}

impl std::fmt::Debug for LinterAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinterAdapter").field("command", &self.command).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_level_findings_map_to_high_severity() {
        let raw = r#"[{"messages":[{"ruleId":"no-eval","severity":2,"message":"eval is evil","line":3,"column":5}]}]"#;
        let findings = map_output(raw).unwrap();
        assert_eq!(findings.len(), 1);
        let (bucket, issue) = &findings[0];
        assert_eq!(*bucket, Bucket::Security);
        assert_eq!(issue.severity, Severity::High);
        assert_eq!(issue.line, 3);
        assert_eq!(issue.column, Some(5));
    }

    #[test]
    fn warning_level_findings_map_to_medium_severity() {
        let raw = r#"[{"messages":[{"ruleId":"semi","severity":1,"message":"missing semicolon","line":1,"column":1}]}]"#;
        let findings = map_output(raw).unwrap();
        assert_eq!(findings[0].1.severity, Severity::Medium);
        assert_eq!(findings[0].0, Bucket::Style);
    }

    #[test]
    fn performance_rules_route_to_performance_bucket() {
        let raw = r#"[{"messages":[{"ruleId":"no-await-in-loop","severity":2,"message":"m","line":2,"column":1}]}]"#;
        assert_eq!(map_output(raw).unwrap()[0].0, Bucket::Performance);
    }

    #[test]
    fn messages_without_rule_id_are_skipped() {
        let raw = r#"[{"messages":[{"ruleId":null,"severity":2,"message":"parse error","line":1,"column":1}]}]"#;
        assert!(map_output(raw).unwrap().is_empty());
    }

    #[test]
    fn garbage_output_is_a_linter_failure() {
        assert!(map_output("not json").is_err());
    }

    #[test]
    fn empty_command_yields_no_adapter() {
        assert!(LinterAdapter::from_command("   ").is_none());
        assert!(LinterAdapter::from_command("eslint --format json").is_some());
    }
}
