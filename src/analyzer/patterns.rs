use once_cell::sync::Lazy;
use regex::Regex;

use super::report::{Issue, Severity};
use super::scanner::SourceView;
use super::Bucket;

struct PatternRule {
    rule: &'static str,
    severity: Severity,
    bucket: Bucket,
    /// Rule only fires on lines inside a loop body.
    loop_only: bool,
    message: &'static str,
    suggestion: &'static str,
    pattern: Regex,
    /// Secondary predicate that must also match the same line.
    context: Option<Regex>,
}

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid detector pattern")
}

static RULES: Lazy<Vec<PatternRule>> = Lazy::new(|| {
    vec![
        PatternRule {
            rule: "no-eval",
            severity: Severity::Critical,
            bucket: Bucket::Security,
            loop_only: false,
            message: "eval() executes arbitrary code from its argument",
            suggestion: "Parse the input explicitly instead of evaluating it",
            pattern: re(r"(?:^|[^A-Za-z0-9_.])eval\s*\("),
            context: None,
        },
        PatternRule {
            rule: "command-injection",
            severity: Severity::Critical,
            bucket: Bucket::Security,
            loop_only: false,
            message: "Shell command is built from dynamic content",
            suggestion: "Pass arguments as an array and avoid interpolating user input into commands",
            pattern: re(r"(?:^|[^A-Za-z0-9_])(?:exec|execSync|spawn|spawnSync|popen|system)\s*\("),
            context: Some(re(r#"[+`]|\$\{"#)),
        },
        PatternRule {
            rule: "sql-injection",
            severity: Severity::High,
            bucket: Bucket::Security,
            loop_only: false,
            message: "SQL statement is concatenated from dynamic content",
            suggestion: "Use parameterized queries instead of string building",
            pattern: re(r"(?i)(?:SELECT|INSERT|UPDATE|DELETE|DROP)\s"),
            context: Some(re(r#"\+|\$\{|%s|\.format\("#)),
        },
        PatternRule {
            rule: "dom-injection",
            severity: Severity::High,
            bucket: Bucket::Security,
            loop_only: false,
            message: "HTML sink receives dynamic content",
            suggestion: "Assign textContent or sanitize the markup before writing it",
            pattern: re(r"(?:innerHTML|outerHTML|document\.write)\s*[=(]"),
            context: Some(re(r#"\+|\$\{|`"#)),
        },
        PatternRule {
            rule: "hardcoded-credentials",
            severity: Severity::Critical,
            bucket: Bucket::Security,
            loop_only: false,
            message: "Credential literal is embedded in source",
            suggestion: "Load secrets from the environment or a secret store",
            pattern: re(r#"(?i)(?:password|passwd|secret|api_?key|access_?token|credential)\s*[:=]\s*["'][^"']{8,}["']"#),
            context: None,
        },
        PatternRule {
            rule: "weak-password-hash",
            severity: Severity::High,
            bucket: Bucket::Security,
            loop_only: false,
            message: "Weak digest algorithm used in a password context",
            suggestion: "Use a password hashing function such as argon2 or bcrypt",
            pattern: re(r"(?i)\b(?:md5|sha1)\b"),
            context: Some(re(r"(?i)pass(?:word|wd)?|pwd")),
        },
        PatternRule {
            rule: "open-redirect",
            severity: Severity::High,
            bucket: Bucket::Security,
            loop_only: false,
            message: "Redirect target comes from request data",
            suggestion: "Validate the destination against an allow-list before redirecting",
            pattern: re(r"(?i)redirect\s*\("),
            context: Some(re(r"req\.|request\.|params|query")),
        },
        PatternRule {
            rule: "insecure-random",
            severity: Severity::High,
            bucket: Bucket::Security,
            loop_only: false,
            message: "Non-cryptographic RNG used for a security-sensitive value",
            suggestion: "Use a cryptographically secure random source",
            pattern: re(r"Math\.random\s*\(\)"),
            context: Some(re(r"(?i)token|secret|session|password|auth|nonce|key")),
        },
        PatternRule {
            rule: "path-traversal",
            severity: Severity::High,
            bucket: Bucket::Security,
            loop_only: false,
            message: "File API receives a path built from request data",
            suggestion: "Resolve and validate the path against a fixed base directory",
            pattern: re(r"(?:readFile|writeFile|createReadStream|createWriteStream|unlink|openSync|open)\s*\("),
            context: Some(re(r"req\.|request\.|params|query|\.\./")),
        },
        PatternRule {
            rule: "prototype-pollution",
            severity: Severity::High,
            bucket: Bucket::Security,
            loop_only: false,
            message: "Object graph is merged from untrusted input",
            suggestion: "Reject __proto__ keys and copy known fields explicitly",
            pattern: re(r"__proto__|Object\.assign\s*\(\s*[A-Za-z_$][\w$]*\s*,\s*(?:req\.|JSON\.parse)"),
            context: None,
        },
        PatternRule {
            rule: "n-plus-one-query",
            severity: Severity::Medium,
            bucket: Bucket::Performance,
            loop_only: true,
            message: "Database call issued inside a loop",
            suggestion: "Batch the lookups into a single query outside the loop",
            pattern: re(r"(?i)\.(?:query|findOne|findById|find|save|update)\s*\(|\bSELECT\s"),
            context: None,
        },
        PatternRule {
            rule: "sync-io",
            severity: Severity::Medium,
            bucket: Bucket::Performance,
            loop_only: false,
            message: "Synchronous blocking I/O on the request path",
            suggestion: "Use the asynchronous variant of this call",
            pattern: re(r"(?:readFileSync|writeFileSync|appendFileSync|readdirSync|existsSync|statSync|execSync)\s*\("),
            context: None,
        },
        PatternRule {
            rule: "string-concat-in-loop",
            severity: Severity::Low,
            bucket: Bucket::Performance,
            loop_only: true,
            message: "String built by repeated concatenation inside a loop",
            suggestion: "Collect parts in an array and join once after the loop",
            pattern: re(r#"[\w$]\s*\+=\s*["'`]"#),
            context: None,
        },
        PatternRule {
            rule: "regex-in-loop",
            severity: Severity::Medium,
            bucket: Bucket::Performance,
            loop_only: true,
            message: "Regular expression compiled inside a loop",
            suggestion: "Compile the expression once before the loop",
            pattern: re(r"new\s+RegExp\s*\("),
            context: None,
        },
        PatternRule {
            rule: "loose-equality",
            severity: Severity::Low,
            bucket: Bucket::Style,
            loop_only: false,
            message: "Loose equality comparison",
            suggestion: "Use === / !== to avoid implicit coercion",
            pattern: re(r"(?:^|[^=!<>])(?:==|!=)(?:[^=]|$)"),
            context: None,
        },
        PatternRule {
            rule: "empty-catch",
            severity: Severity::Medium,
            bucket: Bucket::Style,
            loop_only: false,
            message: "Exception handler swallows the error",
            suggestion: "Log or rethrow the error instead of ignoring it",
            pattern: re(r"catch\s*(?:\([^)]*\))?\s*\{\s*\}"),
            context: None,
        },
    ]
});

static REQUEST_INPUT: Lazy<Regex> =
    Lazy::new(|| re(r"req\.(?:body|params|query)|request\.(?:body|params|query)"));
static VALIDATION_MARKER: Lazy<Regex> =
    Lazy::new(|| re(r"(?i)validate|sanitiz|schema|joi|zod|express-validator"));

static INFINITE_LOOP_HEAD: Lazy<Regex> =
    Lazy::new(|| re(r"while\s*\(\s*true\s*\)|for\s*\(\s*;\s*;\s*\)"));
static LOOP_ESCAPE: Lazy<Regex> =
    Lazy::new(|| re(r"(?:^|[^A-Za-z0-9_])(?:break|return|throw)(?:[^A-Za-z0-9_]|$)"));

/// Stage-one detectors: one pass over the scanned lines with the
/// pre-compiled rule table, plus the two whole-file heuristics.
pub fn detect(view: &SourceView) -> Vec<(Bucket, Issue)> {
    let mut findings = Vec::new();

    for line in &view.lines {
        for rule in RULES.iter() {
            if rule.loop_only && !line.in_loop() {
                continue;
            }
            if !rule.pattern.is_match(&line.text) {
                continue;
            }
            if let Some(context) = &rule.context {
                if !context.is_match(&line.text) {
                    continue;
                }
            }
            findings.push((
                rule.bucket,
                Issue::new(line.number, rule.message, rule.severity, rule.rule, rule.suggestion),
            ));
        }
    }

    findings.extend(missing_input_validation(view));
    findings.extend(infinite_loops(view));
    findings
}

/// Heuristic: request input is consumed but nothing in the file looks like
/// validation. One finding at the first use site.
fn missing_input_validation(view: &SourceView) -> Vec<(Bucket, Issue)> {
    if VALIDATION_MARKER.is_match(&view.content) {
        return Vec::new();
    }
    let Some(line) = view.lines.iter().find(|l| REQUEST_INPUT.is_match(&l.text)) else {
        return Vec::new();
    };
    vec![(
        Bucket::Security,
        Issue::new(
            line.number,
            "Request input is used without any visible validation",
            Severity::Medium,
            "missing-input-validation",
            "Validate request payloads against a schema before use",
        ),
    )]
}

/// A `while(true)`/`for(;;)` body with no break, return, or throw between
/// its braces never terminates.
fn infinite_loops(view: &SourceView) -> Vec<(Bucket, Issue)> {
    let mut findings = Vec::new();

    for (idx, line) in view.lines.iter().enumerate() {
        if !INFINITE_LOOP_HEAD.is_match(&line.text) {
            continue;
        }

        let mut depth: i32 = 0;
        let mut opened = false;
        let mut escapes = false;
        for body_line in &view.lines[idx..] {
            for ch in body_line.text.chars() {
                match ch {
                    '{' => {
                        depth += 1;
                        opened = true;
                    }
                    '}' => depth -= 1,
                    _ => {}
                }
            }
            if opened && LOOP_ESCAPE.is_match(&body_line.text) {
                escapes = true;
                break;
            }
            if opened && depth <= 0 {
                break;
            }
        }

        if opened && !escapes {
            findings.push((
                Bucket::Performance,
                Issue::new(
                    line.number,
                    "Loop condition is always true and the body never exits",
                    Severity::Critical,
                    "infinite-loop",
                    "Add a termination condition or an explicit break",
                ),
            ));
        }
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(content: &str) -> Vec<(Bucket, Issue)> {
        detect(&SourceView::new(content, "test.js"))
    }

    fn rules(content: &str) -> Vec<String> {
        run(content).into_iter().map(|(_, i)| i.rule).collect()
    }

    #[test]
    fn eval_fires_on_line_one_as_critical_security() {
        let findings = run("eval(input)\n");
        let (bucket, issue) = findings
            .iter()
            .find(|(_, i)| i.rule == "no-eval")
            .expect("no-eval finding");
        assert_eq!(*bucket, Bucket::Security);
        assert_eq!(issue.line, 1);
        assert!(matches!(issue.severity, Severity::Critical | Severity::High));
    }

    #[test]
    fn evaluate_identifier_does_not_fire_no_eval() {
        assert!(!rules("evaluateScore(x);").contains(&"no-eval".to_string()));
    }

    #[test]
    fn sql_concatenation_is_flagged() {
        let src = r#"db.run("SELECT * FROM users WHERE id = " + req.params.id);"#;
        assert!(rules(src).contains(&"sql-injection".to_string()));
    }

    #[test]
    fn parameterized_sql_is_clean() {
        let src = r#"db.run("SELECT * FROM users WHERE id = $1", [id]);"#;
        assert!(!rules(src).contains(&"sql-injection".to_string()));
    }

    #[test]
    fn hardcoded_credentials_require_min_length() {
        assert!(rules(r#"const password = "hunter2hunter2";"#)
            .contains(&"hardcoded-credentials".to_string()));
        assert!(!rules(r#"const password = "x";"#).contains(&"hardcoded-credentials".to_string()));
    }

    #[test]
    fn weak_hash_needs_password_context() {
        assert!(rules(r#"const passwordHash = md5(password);"#)
            .contains(&"weak-password-hash".to_string()));
        assert!(!rules(r#"const etag = md5(body);"#).contains(&"weak-password-hash".to_string()));
    }

    #[test]
    fn loose_equality_ignores_strict_operators() {
        assert!(rules("if (a == b) {}").contains(&"loose-equality".to_string()));
        assert!(!rules("if (a === b) {}").contains(&"loose-equality".to_string()));
        assert!(!rules("if (a !== b) {}").contains(&"loose-equality".to_string()));
    }

    #[test]
    fn regex_in_loop_fires_only_inside_loops() {
        assert!(!rules("const re = new RegExp(input);").contains(&"regex-in-loop".to_string()));
        let src = "for (const s of items) {\n  const re = new RegExp(s);\n}";
        assert!(rules(src).contains(&"regex-in-loop".to_string()));
    }

    #[test]
    fn nested_loops_fire_regex_rule_exactly_once_at_regex_line() {
        let src = "\
for (let i = 0; i < n; i++) {
  while (pending) {
    const re = new RegExp(input);
  }
}";
        let findings = run(src);
        let hits: Vec<_> = findings.iter().filter(|(_, i)| i.rule == "regex-in-loop").collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].1.line, 3);
    }

    #[test]
    fn infinite_while_true_without_break_is_critical() {
        let src = "while (true) {\n  poll();\n}";
        let findings = run(src);
        let hit = findings.iter().find(|(_, i)| i.rule == "infinite-loop").expect("finding");
        assert_eq!(hit.1.severity as u8, Severity::Critical as u8);
    }

    #[test]
    fn while_true_with_break_is_clean() {
        let src = "while (true) {\n  if (done) break;\n  poll();\n}";
        assert!(!rules(src).contains(&"infinite-loop".to_string()));
    }

    #[test]
    fn sync_io_lands_in_performance_bucket() {
        let findings = run("const data = readFileSync(path);");
        let hit = findings.iter().find(|(_, i)| i.rule == "sync-io").expect("finding");
        assert_eq!(hit.0, Bucket::Performance);
    }

    #[test]
    fn unvalidated_request_input_fires_once_at_first_use() {
        let src = "const a = req.body.name;\nconst b = req.body.age;";
        let findings = run(src);
        let hits: Vec<_> = findings
            .iter()
            .filter(|(_, i)| i.rule == "missing-input-validation")
            .collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].1.line, 1);
    }

    #[test]
    fn validated_request_input_is_clean() {
        let src = "schema.validate(req.body);\nconst a = req.body.name;";
        assert!(!rules(src).contains(&"missing-input-validation".to_string()));
    }

    #[test]
    fn empty_catch_is_flagged() {
        assert!(rules("try { work(); } catch (e) {}").contains(&"empty-catch".to_string()));
    }
}
