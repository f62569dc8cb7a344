use once_cell::sync::Lazy;
use regex::Regex;

use super::report::{Issue, IssueCategory, Severity};
use super::scanner::SourceView;

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid detector pattern")
}

static AUTH_MARKER: Lazy<Regex> = Lazy::new(|| re(r"(?i)refresh"));
static TOKEN_MARKER: Lazy<Regex> = Lazy::new(|| re(r"(?i)token|auth"));
static WAITER_PUSH: Lazy<Regex> =
    Lazy::new(|| re(r"[\w$.]*(?:queue|pending|waiters|subscribers)[\w$.]*\.push\s*\("));
static WAITER_DRAIN: Lazy<Regex> = Lazy::new(|| {
    re(r"[\w$.]*(?:queue|pending|waiters|subscribers)[\w$.]*\.(?:forEach|map|shift|splice|length\s*=\s*0)")
});
static CATCH_HEAD: Lazy<Regex> = Lazy::new(|| re(r"catch\s*(?:\([^)]*\))?\s*\{|\.catch\s*\("));
static FINALLY_HEAD: Lazy<Regex> = Lazy::new(|| re(r"finally\s*\{|\.finally\s*\("));
static FLAG_SET_TRUE: Lazy<Regex> =
    Lazy::new(|| re(r"[\w$.]*(?i:refreshing|refreshinprogress)[\w$.]*\s*=\s*true"));
static FLAG_SET_FALSE: Lazy<Regex> =
    Lazy::new(|| re(r"[\w$.]*(?i:refreshing|refreshinprogress)[\w$.]*\s*=\s*false"));
static PARALLEL_FLUSH: Lazy<Regex> = Lazy::new(|| {
    re(r"[\w$.]*(?:queue|pending|waiters|subscribers)[\w$.]*\.(?:forEach|map)\s*\(")
});
static STAGGER_MARKER: Lazy<Regex> = Lazy::new(|| re(r"(?i)setTimeout|jitter|stagger|delay|chunk"));

/// Line ranges (inclusive, 1-based) of blocks opened by `head` and closed
/// when the brace balance returns to the entry depth.
fn block_ranges(view: &SourceView, head: &Regex) -> Vec<(u32, u32)> {
    let mut ranges = Vec::new();
    let mut brace_depth: i32 = 0;
    // (entry depth, start line) for blocks still open.
    let mut open: Vec<(i32, u32)> = Vec::new();

    for line in &view.lines {
        let is_head = head.is_match(&line.text);
        let opens = line.text.matches('{').count() as i32;
        let closes = line.text.matches('}').count() as i32;
        brace_depth += opens - closes;
        // Entry depth is taken after the head line's own braces, which
        // handles the common `} catch (e) {` shape where a close and an
        // open share the line.
        if is_head {
            open.push((brace_depth, line.number));
        }
        while let Some((entry, start)) = open.last().copied() {
            if brace_depth < entry {
                open.pop();
                ranges.push((start, line.number));
            } else {
                break;
            }
        }
    }
    for (_, start) in open {
        ranges.push((start, view.line_count()));
    }
    ranges
}

fn any_line_in_ranges(view: &SourceView, pattern: &Regex, ranges: &[(u32, u32)]) -> bool {
    view.lines.iter().any(|line| {
        pattern.is_match(&line.text)
            && ranges.iter().any(|(start, end)| line.number >= *start && line.number <= *end)
    })
}

/// Token-refresh flow hazards. Gated on refresh/token markers so ordinary
/// files never pay for these scans.
pub fn detect(view: &SourceView) -> Vec<Issue> {
    let content = &view.content;
    if !AUTH_MARKER.is_match(content) || !TOKEN_MARKER.is_match(content) {
        return Vec::new();
    }

    let mut issues = Vec::new();
    let has_waiter_queue = WAITER_PUSH.is_match(content);
    let catch_ranges = block_ranges(view, &CATCH_HEAD);
    let finally_ranges = block_ranges(view, &FINALLY_HEAD);

    if has_waiter_queue {
        let drains_at_all = WAITER_DRAIN.is_match(content);
        let drains_on_error = any_line_in_ranges(view, &WAITER_DRAIN, &catch_ranges)
            || any_line_in_ranges(view, &WAITER_DRAIN, &finally_ranges);

        if drains_at_all && !drains_on_error {
            let line = view
                .lines
                .iter()
                .find(|l| WAITER_PUSH.is_match(&l.text))
                .map(|l| l.number)
                .unwrap_or(1);
            issues.push(
                Issue::new(
                    line,
                    "Waiter queue is drained on success only; a refresh failure strands every queued request",
                    Severity::High,
                    "lost-requests-on-error",
                    "Reject or flush queued waiters on the error path as well",
                )
                .with_category(IssueCategory::Reliability),
            );
        }

        // Flushing every waiter at once stampedes the freshly refreshed
        // endpoint.
        if let Some(line) = view.lines.iter().find(|l| PARALLEL_FLUSH.is_match(&l.text)) {
            if !STAGGER_MARKER.is_match(content) {
                issues.push(
                    Issue::new(
                        line.number,
                        "All queued waiters are released at once with no staggering",
                        Severity::Medium,
                        "thundering-herd",
                        "Release waiters in bounded batches or add jitter",
                    )
                    .with_category(IssueCategory::Concurrency),
                );
            }
        }
    }

    let set_true = view.lines.iter().filter(|l| FLAG_SET_TRUE.is_match(&l.text)).count();
    let set_false = view.lines.iter().filter(|l| FLAG_SET_FALSE.is_match(&l.text)).count();
    if set_true > 0 {
        let reset_in_finally = any_line_in_ranges(view, &FLAG_SET_FALSE, &finally_ranges);
        if set_false < set_true || !reset_in_finally {
            let line = view
                .lines
                .iter()
                .find(|l| FLAG_SET_TRUE.is_match(&l.text))
                .map(|l| l.number)
                .unwrap_or(1);
            issues.push(
                Issue::new(
                    line,
                    "Refresh flag is set without a guaranteed symmetric reset",
                    Severity::High,
                    "refresh-flag-stuck",
                    "Reset the flag in a finally block so every path clears it",
                )
                .with_category(IssueCategory::Reliability),
            );
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(content: &str) -> Vec<String> {
        detect(&SourceView::new(content, "auth.js"))
            .into_iter()
            .map(|i| i.rule)
            .collect()
    }

    #[test]
    fn files_without_refresh_markers_are_skipped() {
        let src = "const queue = [];\nqueue.push(cb);\nqueue.forEach(f => f());";
        assert!(detect(&SourceView::new(src, "auth.js")).is_empty());
    }

    #[test]
    fn success_only_drain_loses_queued_requests() {
        let src = "\
let pendingRequests = [];
async function refreshToken() {
  pendingRequests.push(cb);
  try {
    const token = await refresh();
    pendingRequests.forEach(f => f(token));
    pendingRequests = [];
  } catch (err) {
    log(err);
  }
}";
        assert!(rules(src).contains(&"lost-requests-on-error".to_string()));
    }

    #[test]
    fn drain_in_catch_block_keeps_waiters_alive() {
        let src = "\
let pendingRequests = [];
async function refreshToken() {
  pendingRequests.push(cb);
  try {
    const token = await refresh();
    pendingRequests.forEach(f => f(token));
  } catch (err) {
    pendingRequests.forEach(f => f.reject(err));
    pendingRequests = [];
  }
}";
        assert!(!rules(src).contains(&"lost-requests-on-error".to_string()));
    }

    #[test]
    fn unstaggered_flush_is_a_thundering_herd() {
        let src = "\
let waitersQueue = [];
async function refreshToken() {
  waitersQueue.push(cb);
  try {
    const token = await refresh();
    waitersQueue.forEach(f => f(token));
  } catch (err) {
    waitersQueue.forEach(f => f.reject(err));
  }
}";
        assert!(rules(src).contains(&"thundering-herd".to_string()));
    }

    #[test]
    fn refresh_flag_without_finally_reset_is_flagged() {
        let src = "\
let isRefreshing = false;
async function refreshToken() {
  isRefreshing = true;
  const token = await refresh();
  isRefreshing = false;
  return token;
}";
        assert!(rules(src).contains(&"refresh-flag-stuck".to_string()));
    }

    #[test]
    fn refresh_flag_reset_in_finally_is_clean() {
        let src = "\
let isRefreshing = false;
async function refreshToken() {
  isRefreshing = true;
  try {
    return await refresh();
  } finally {
    isRefreshing = false;
  }
}";
        assert!(!rules(src).contains(&"refresh-flag-stuck".to_string()));
    }
}
