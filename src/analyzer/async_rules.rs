use once_cell::sync::Lazy;
use regex::Regex;

use super::report::{Issue, IssueCategory, Severity};
use super::scanner::SourceView;

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid detector pattern")
}

static ASYNC_MARKER: Lazy<Regex> =
    Lazy::new(|| re(r"async\s|await\s|\.then\s*\(|new\s+Promise|Promise\."));
static FLOATING_PROMISE: Lazy<Regex> =
    Lazy::new(|| re(r"^\s*[\w$.\[\]]+\.(?:then|catch)\s*\(|^\s*[\w$]+\s*\([^)]*\)\s*;\s*//\s*async"));
static AWAIT_IN_LOOP: Lazy<Regex> = Lazy::new(|| re(r"(?:^|[^A-Za-z0-9_])await\s"));
static PROMISE_ALL_MAP: Lazy<Regex> = Lazy::new(|| re(r"Promise\.all\s*\(\s*[\w$]+\.map\s*\("));
static UNPROTECTED_AWAIT: Lazy<Regex> = Lazy::new(|| re(r"(?:^|[^A-Za-z0-9_])await\s"));
static TRY_MARKER: Lazy<Regex> = Lazy::new(|| re(r"(?:^|[^A-Za-z0-9_])try\s*\{|\.catch\s*\("));
static MODULE_STATE: Lazy<Regex> =
    Lazy::new(|| re(r"(?m)^(?:let|var)\s+[\w$]+\s*=\s*(?:\{|\[|0|new\s+Map|new\s+Set)"));
static ASYNC_HANDLER: Lazy<Regex> = Lazy::new(|| re(r"async\s+(?:function\s+)?[\w$]*\s*\("));

/// Whether the file exhibits any async control flow at all. The async
/// detector stage is skipped entirely when it does not.
pub fn has_async_markers(view: &SourceView) -> bool {
    ASYNC_MARKER.is_match(&view.content)
}

/// Async/concurrency detectors for the JavaScript family. Every issue
/// carries a category; the analyzer routes categories to report buckets.
pub fn detect(view: &SourceView) -> Vec<Issue> {
    if !has_async_markers(view) {
        return Vec::new();
    }

    let mut issues = Vec::new();
    let file_has_error_protection = TRY_MARKER.is_match(&view.content);

    for line in &view.lines {
        if FLOATING_PROMISE.is_match(&line.text)
            && !line.text.contains("await")
            && !line.text.contains("return")
            && !line.text.contains(".catch")
        {
            issues.push(
                Issue::new(
                    line.number,
                    "Promise chain is neither awaited nor returned",
                    Severity::Medium,
                    "floating-promise",
                    "Await the promise or attach a rejection handler",
                )
                .with_category(IssueCategory::Reliability),
            );
        }

        if line.in_loop() && AWAIT_IN_LOOP.is_match(&line.text) {
            issues.push(
                Issue::new(
                    line.number,
                    "Sequential await inside a loop serializes independent work",
                    Severity::Medium,
                    "await-in-loop",
                    "Collect the promises and await them together",
                )
                .with_category(IssueCategory::Performance),
            );
        }

        if PROMISE_ALL_MAP.is_match(&line.text) {
            issues.push(
                Issue::new(
                    line.number,
                    "Promise.all over a mapped collection fans out without a concurrency bound",
                    Severity::Medium,
                    "unbounded-promise-all",
                    "Chunk the work or use a limited-concurrency pool",
                )
                .with_category(IssueCategory::Concurrency),
            );
        }
    }

    if !file_has_error_protection {
        if let Some(line) = view.lines.iter().find(|l| UNPROTECTED_AWAIT.is_match(&l.text)) {
            issues.push(
                Issue::new(
                    line.number,
                    "Awaited calls have no error protection anywhere in the file",
                    Severity::Medium,
                    "unhandled-rejection",
                    "Wrap awaited work in try/catch or attach a catch handler",
                )
                .with_category(IssueCategory::Reliability),
            );
        }
    }

    // Module-level mutable bindings touched from async handlers race
    // across interleaved executions.
    if MODULE_STATE.is_match(&view.content) && ASYNC_HANDLER.is_match(&view.content) {
        let line = view
            .lines
            .iter()
            .find(|l| MODULE_STATE.is_match(&l.text))
            .map(|l| l.number)
            .unwrap_or(1);
        issues.push(
            Issue::new(
                line,
                "Module-level mutable state is shared across async executions",
                Severity::High,
                "shared-mutable-state",
                "Scope the state per request or guard it behind a single owner",
            )
            .with_category(IssueCategory::Concurrency),
        );
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(content: &str) -> Vec<String> {
        detect(&SourceView::new(content, "svc.js"))
            .into_iter()
            .map(|i| i.rule)
            .collect()
    }

    #[test]
    fn stage_is_skipped_without_async_markers() {
        let src = "function add(a, b) { return a + b; }";
        assert!(detect(&SourceView::new(src, "svc.js")).is_empty());
    }

    #[test]
    fn await_in_loop_is_flagged_with_performance_category() {
        let src = "\
async function run(items) {
  try {
    for (const item of items) {
      await handle(item);
    }
  } catch (e) { log(e); }
}";
        let issues = detect(&SourceView::new(src, "svc.js"));
        let hit = issues.iter().find(|i| i.rule == "await-in-loop").expect("finding");
        assert_eq!(hit.category, Some(IssueCategory::Performance));
        assert_eq!(hit.line, 4);
    }

    #[test]
    fn unbounded_promise_all_carries_concurrency_category() {
        let src = "async function go() { try { await Promise.all(items.map(send)); } catch (e) {} }";
        let issues = detect(&SourceView::new(src, "svc.js"));
        let hit = issues.iter().find(|i| i.rule == "unbounded-promise-all");
        assert!(hit.is_some());
        assert_eq!(hit.unwrap().category, Some(IssueCategory::Concurrency));
    }

    #[test]
    fn awaits_without_any_try_or_catch_are_flagged() {
        let src = "async function go() {\n  const r = await fetchData();\n  return r;\n}";
        assert!(rules(src).contains(&"unhandled-rejection".to_string()));
    }

    #[test]
    fn protected_awaits_are_clean() {
        let src = "async function go() {\n  try {\n    return await fetchData();\n  } catch (e) { log(e); }\n}";
        assert!(!rules(src).contains(&"unhandled-rejection".to_string()));
    }
}
