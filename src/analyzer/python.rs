use once_cell::sync::Lazy;
use regex::Regex;

use super::report::{Issue, Severity};
use super::scanner::SourceView;
use super::Bucket;

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid detector pattern")
}

static OS_SYSTEM: Lazy<Regex> = Lazy::new(|| re(r"os\.system\s*\(|os\.popen\s*\("));
static SHELL_TRUE: Lazy<Regex> = Lazy::new(|| re(r"subprocess\.\w+\s*\(.*shell\s*=\s*True"));
static EVAL_EXEC: Lazy<Regex> = Lazy::new(|| re(r"(?:^|[^A-Za-z0-9_.])(?:eval|exec)\s*\("));
static PICKLE_LOADS: Lazy<Regex> = Lazy::new(|| re(r"pickle\.loads?\s*\("));
static UNSAFE_YAML: Lazy<Regex> = Lazy::new(|| re(r"yaml\.load\s*\("));
static SAFE_YAML: Lazy<Regex> = Lazy::new(|| re(r"SafeLoader|yaml\.safe_load"));
static BARE_EXCEPT: Lazy<Regex> = Lazy::new(|| re(r"(?m)^\s*except\s*:\s*(?:pass\s*)?$"));
static PERCENT_SQL: Lazy<Regex> =
    Lazy::new(|| re(r#"(?i)["'](?:SELECT|INSERT|UPDATE|DELETE)[^"']*["']\s*%"#));
static MD5_PASSWORD: Lazy<Regex> = Lazy::new(|| re(r"hashlib\.(?:md5|sha1)\s*\("));
static PASSWORD_CONTEXT: Lazy<Regex> = Lazy::new(|| re(r"(?i)pass(?:word|wd)?|pwd"));
static RANDOM_TOKEN: Lazy<Regex> = Lazy::new(|| re(r"random\.(?:random|randint|choice|randrange)\s*\("));
static TOKEN_CONTEXT: Lazy<Regex> = Lazy::new(|| re(r"(?i)token|secret|session|nonce|key"));
static REQUESTS_CALL: Lazy<Regex> = Lazy::new(|| re(r"requests\.(?:get|post|put|delete|patch|head)\s*\("));
static TIMEOUT_KWARG: Lazy<Regex> = Lazy::new(|| re(r"timeout\s*="));
static ASSERT_VALIDATION: Lazy<Regex> = Lazy::new(|| re(r"(?m)^\s*assert\s+"));
static PLAIN_HTTP: Lazy<Regex> = Lazy::new(|| re(r#"["']http://[^"']+["']"#));

struct LineFinding {
    bucket: Bucket,
    issue: Issue,
}

fn finding(
    line: u32,
    message: &str,
    severity: Severity,
    rule: &str,
    suggestion: &str,
    bucket: Bucket,
) -> LineFinding {
    LineFinding { bucket, issue: Issue::new(line, message, severity, rule, suggestion) }
}

/// Python-specific detectors in the same per-line shape as the Java set.
pub fn detect(view: &SourceView) -> Vec<(Bucket, Issue)> {
    let mut findings: Vec<LineFinding> = Vec::new();

    for line in &view.lines {
        let n = line.number;
        let text = &line.text;

        if OS_SYSTEM.is_match(text) {
            findings.push(finding(
                n,
                "Shell command executed through os.system",
                Severity::Critical,
                "py-os-system",
                "Use subprocess.run with an argument list",
                Bucket::Security,
            ));
        }
        if SHELL_TRUE.is_match(text) {
            findings.push(finding(
                n,
                "subprocess invoked with shell=True",
                Severity::High,
                "py-shell-true",
                "Pass an argument list and drop shell=True",
                Bucket::Security,
            ));
        }
        if EVAL_EXEC.is_match(text) {
            findings.push(finding(
                n,
                "eval/exec executes arbitrary code from its argument",
                Severity::Critical,
                "py-eval",
                "Parse the input explicitly instead of evaluating it",
                Bucket::Security,
            ));
        }
        if PICKLE_LOADS.is_match(text) {
            findings.push(finding(
                n,
                "pickle deserialization of untrusted data",
                Severity::High,
                "py-pickle-load",
                "Use a safe format such as JSON for untrusted input",
                Bucket::Security,
            ));
        }
        if UNSAFE_YAML.is_match(text) && !SAFE_YAML.is_match(text) {
            findings.push(finding(
                n,
                "yaml.load without SafeLoader",
                Severity::High,
                "py-unsafe-yaml",
                "Use yaml.safe_load or pass Loader=SafeLoader",
                Bucket::Security,
            ));
        }
        if PERCENT_SQL.is_match(text) {
            findings.push(finding(
                n,
                "SQL statement built with %-formatting",
                Severity::High,
                "py-sql-format",
                "Use driver parameter binding instead of string formatting",
                Bucket::Security,
            ));
        }
        if MD5_PASSWORD.is_match(text) && PASSWORD_CONTEXT.is_match(text) {
            findings.push(finding(
                n,
                "Weak digest algorithm used in a password context",
                Severity::High,
                "py-weak-password-hash",
                "Use a password hashing function such as argon2 or bcrypt",
                Bucket::Security,
            ));
        }
        if RANDOM_TOKEN.is_match(text) && TOKEN_CONTEXT.is_match(text) {
            findings.push(finding(
                n,
                "random module used for a security-sensitive value",
                Severity::High,
                "py-insecure-random",
                "Use the secrets module for tokens and keys",
                Bucket::Security,
            ));
        }
        if REQUESTS_CALL.is_match(text) && !TIMEOUT_KWARG.is_match(text) {
            findings.push(finding(
                n,
                "HTTP request issued without a timeout",
                Severity::Medium,
                "py-request-no-timeout",
                "Pass an explicit timeout to every requests call",
                Bucket::Performance,
            ));
        }
        if ASSERT_VALIDATION.is_match(text) {
            findings.push(finding(
                n,
                "assert used for runtime validation",
                Severity::Low,
                "py-assert-validation",
                "Raise an explicit exception; asserts are stripped under -O",
                Bucket::Style,
            ));
        }
        if BARE_EXCEPT.is_match(text) {
            findings.push(finding(
                n,
                "Bare except swallows every error including KeyboardInterrupt",
                Severity::Medium,
                "py-bare-except",
                "Catch the specific exception types you can handle",
                Bucket::Style,
            ));
        }
    }

    if let Some(line) = view.lines.iter().find(|l| PLAIN_HTTP.is_match(&l.text)) {
        findings.push(finding(
            line.number,
            "Endpoint uses plain HTTP",
            Severity::Medium,
            "py-plain-http",
            "Use HTTPS for remote endpoints",
            Bucket::Security,
        ));
    }

    findings.into_iter().map(|f| (f.bucket, f.issue)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(content: &str) -> Vec<String> {
        detect(&SourceView::new(content, "job.py"))
            .into_iter()
            .map(|(_, i)| i.rule)
            .collect()
    }

    #[test]
    fn os_system_is_critical_security() {
        let findings = detect(&SourceView::new("os.system(cmd)", "job.py"));
        let hit = findings.iter().find(|(_, i)| i.rule == "py-os-system").expect("finding");
        assert_eq!(hit.1.severity, Severity::Critical);
        assert_eq!(hit.0, Bucket::Security);
    }

    #[test]
    fn yaml_load_requires_safe_loader() {
        assert!(rules("data = yaml.load(blob)").contains(&"py-unsafe-yaml".to_string()));
        assert!(!rules("data = yaml.load(blob, Loader=SafeLoader)")
            .contains(&"py-unsafe-yaml".to_string()));
    }

    #[test]
    fn requests_without_timeout_is_flagged() {
        assert!(rules("r = requests.get(url)").contains(&"py-request-no-timeout".to_string()));
        assert!(!rules("r = requests.get(url, timeout=5)")
            .contains(&"py-request-no-timeout".to_string()));
    }

    #[test]
    fn bare_except_is_flagged() {
        assert!(rules("try:\n    work()\nexcept:\n    pass").contains(&"py-bare-except".to_string()));
        assert!(!rules("except ValueError:").contains(&"py-bare-except".to_string()));
    }

    #[test]
    fn percent_formatted_sql_is_flagged() {
        let src = r#"cur.execute("SELECT * FROM users WHERE id = %s" % user_id)"#;
        assert!(rules(src).contains(&"py-sql-format".to_string()));
    }
}
