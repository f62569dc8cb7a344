use once_cell::sync::Lazy;
use regex::Regex;

use super::report::{Issue, Severity};
use super::scanner::SourceView;
use super::Bucket;

static RUNTIME_EXEC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Runtime\.getRuntime\(\)\s*\.exec\s*\(").expect("valid pattern"));
static STATEMENT_SQL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:createStatement|executeQuery|executeUpdate|execute)\s*\(.*"\s*\+"#)
        .expect("valid pattern")
});
static INSECURE_RANDOM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"new\s+Random\s*\(").expect("valid pattern"));
static SECURITY_CONTEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)token|secret|session|password|nonce|key").expect("valid pattern"));
static PRINT_STACK_TRACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.printStackTrace\s*\(\s*\)").expect("valid pattern"));
static XML_FACTORY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:DocumentBuilderFactory|SAXParserFactory|XMLInputFactory)\s*\.\s*newInstance")
        .expect("valid pattern")
});
static XML_HARDENING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"disallow-doctype-decl|external-general-entities|XMLConstants\.FEATURE_SECURE_PROCESSING|setExpandEntityReferences\s*\(\s*false")
        .expect("valid pattern")
});
static PLAIN_HTTP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""http://[^"]+""#).expect("valid pattern"));

/// Java-specific detectors: per-line predicates plus two whole-file checks
/// (XML parser hardening, plain-HTTP endpoints).
pub fn detect(view: &SourceView) -> Vec<(Bucket, Issue)> {
    let mut findings = Vec::new();

    for line in &view.lines {
        if RUNTIME_EXEC.is_match(&line.text) {
            findings.push((
                Bucket::Security,
                Issue::new(
                    line.number,
                    "Runtime.exec() invoked with a dynamic command",
                    Severity::Critical,
                    "java-runtime-exec",
                    "Use ProcessBuilder with a fixed argument list",
                ),
            ));
        }
        if STATEMENT_SQL.is_match(&line.text) {
            findings.push((
                Bucket::Security,
                Issue::new(
                    line.number,
                    "SQL statement built by string concatenation",
                    Severity::High,
                    "java-sql-concat",
                    "Use PreparedStatement with bind parameters",
                ),
            ));
        }
        if INSECURE_RANDOM.is_match(&line.text) && SECURITY_CONTEXT.is_match(&line.text) {
            findings.push((
                Bucket::Security,
                Issue::new(
                    line.number,
                    "java.util.Random used for a security-sensitive value",
                    Severity::High,
                    "java-insecure-random",
                    "Use SecureRandom for tokens and keys",
                ),
            ));
        }
        if PRINT_STACK_TRACE.is_match(&line.text) {
            findings.push((
                Bucket::Style,
                Issue::new(
                    line.number,
                    "printStackTrace() writes errors to stderr instead of the logger",
                    Severity::Low,
                    "java-print-stack-trace",
                    "Log the exception through the logging framework",
                ),
            ));
        }
    }

    if XML_FACTORY.is_match(&view.content) && !XML_HARDENING.is_match(&view.content) {
        let line = view
            .lines
            .iter()
            .find(|l| XML_FACTORY.is_match(&l.text))
            .map(|l| l.number)
            .unwrap_or(1);
        findings.push((
            Bucket::Security,
            Issue::new(
                line,
                "XML parser is constructed without disabling external entities",
                Severity::High,
                "java-xxe",
                "Disable DOCTYPE declarations and external entity resolution on the factory",
            ),
        ));
    }

    if let Some(line) = view.lines.iter().find(|l| PLAIN_HTTP.is_match(&l.text)) {
        findings.push((
            Bucket::Security,
            Issue::new(
                line.number,
                "Endpoint uses plain HTTP",
                Severity::Medium,
                "java-plain-http",
                "Use HTTPS for remote endpoints",
            ),
        ));
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(content: &str) -> Vec<String> {
        detect(&SourceView::new(content, "Main.java"))
            .into_iter()
            .map(|(_, i)| i.rule)
            .collect()
    }

    #[test]
    fn runtime_exec_is_critical() {
        let findings = detect(&SourceView::new(
            "Runtime.getRuntime().exec(cmd);",
            "Main.java",
        ));
        let hit = findings.iter().find(|(_, i)| i.rule == "java-runtime-exec").expect("finding");
        assert_eq!(hit.1.severity, Severity::Critical);
        assert_eq!(hit.0, Bucket::Security);
    }

    #[test]
    fn statement_concat_is_flagged() {
        let src = r#"stmt.executeQuery("SELECT * FROM users WHERE id = " + id);"#;
        assert!(rules(src).contains(&"java-sql-concat".to_string()));
    }

    #[test]
    fn unhardened_xml_factory_fires_once() {
        let src = "DocumentBuilderFactory f = DocumentBuilderFactory.newInstance();";
        assert!(rules(src).contains(&"java-xxe".to_string()));
    }

    #[test]
    fn hardened_xml_factory_is_clean() {
        let src = "\
DocumentBuilderFactory f = DocumentBuilderFactory.newInstance();
f.setFeature(\"http://apache.org/xml/features/disallow-doctype-decl\", true);";
        assert!(!rules(src).contains(&"java-xxe".to_string()));
    }

    #[test]
    fn plain_http_url_is_flagged() {
        let src = r#"String url = "http://api.example.com/v1";"#;
        assert!(rules(src).contains(&"java-plain-http".to_string()));
    }
}
