use once_cell::sync::Lazy;
use regex::Regex;

use super::report::{Issue, IssueCategory, Severity};
use super::scanner::SourceView;

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid detector pattern")
}

static EVENT_HANDLER: Lazy<Regex> = Lazy::new(|| re(r#"\.on\s*\(\s*["'][\w:.-]+["']\s*,"#));
static ERROR_PROTECTION: Lazy<Regex> = Lazy::new(|| re(r"try\s*\{|\.catch\s*\("));
static QUEUE_DRAIN_LOOP: Lazy<Regex> =
    Lazy::new(|| re(r"while\s*\(\s*[\w$.]*(?:queue|pending|backlog)[\w$.]*\.length"));
static RETRY_MARKER: Lazy<Regex> = Lazy::new(|| re(r"(?i)retr(?:y|ies)"));
static DELAY_MARKER: Lazy<Regex> =
    Lazy::new(|| re(r"(?i)setTimeout|sleep|delay|backoff|jitter"));
static QUEUE_PUSH: Lazy<Regex> =
    Lazy::new(|| re(r"[\w$.]*(?:queue|buffer|backlog)[\w$.]*\.push\s*\("));
static QUEUE_CONSUME: Lazy<Regex> =
    Lazy::new(|| re(r"[\w$.]*(?:queue|buffer|backlog)[\w$.]*\.(?:shift|pop|splice|length\s*=|slice)"));
static SERVER_MARKER: Lazy<Regex> = Lazy::new(|| re(r"\.listen\s*\(|createServer\s*\("));
static SHUTDOWN_SIGNAL: Lazy<Regex> = Lazy::new(|| re(r#"process\.on\s*\(\s*["']SIG(?:TERM|INT)"#));
static RNG_CALL: Lazy<Regex> = Lazy::new(|| re(r"Math\.random\s*\(\)"));
static RATE_LIMIT_MARKER: Lazy<Regex> = Lazy::new(|| re(r"(?i)rate.?limit"));
static WINDOW_RESET: Lazy<Regex> = Lazy::new(|| re(r"(?i)(?:window|count(?:er)?)\s*=\s*0"));
static WALL_CLOCK_MATH: Lazy<Regex> =
    Lazy::new(|| re(r"Date\.now\s*\(\)\s*-|new\s+Date\s*\(\)\s*-|-\s*Date\.now\s*\(\)"));
static CACHE_MAP: Lazy<Regex> =
    Lazy::new(|| re(r"(?i)(?:cache|memo)[\w$]*\s*=\s*(?:new\s+Map\s*\(|\{\})"));
static CACHE_EVICTION: Lazy<Regex> =
    Lazy::new(|| re(r"(?i)\.delete\s*\(|\.clear\s*\(|lru|ttl|evict|maxSize|max_size"));
static COUNTER_MUTATION: Lazy<Regex> =
    Lazy::new(|| re(r"[\w$.]*(?:count|counter|total|inflight)[\w$.]*\s*(?:\+\+|--|[+-]=)"));
static ASYNC_CONTEXT: Lazy<Regex> = Lazy::new(|| re(r"async\s|await\s"));
static GLOBAL_ASSIGN_IN_HANDLER: Lazy<Regex> =
    Lazy::new(|| re(r"(?:req|res)\s*[,)]|app\.(?:get|post|put|delete)\s*\("));
static GLOBAL_STATE_DECL: Lazy<Regex> =
    Lazy::new(|| re(r"(?m)^(?:let|var)\s+[\w$]+\s*=\s*(?:\[\]|\{\}|0|new\s+Map|new\s+Set)"));
static PRODUCER_MARKER: Lazy<Regex> = Lazy::new(|| re(r"\.push\s*\(|enqueue|emit\s*\("));
static BACKPRESSURE_MARKER: Lazy<Regex> =
    Lazy::new(|| re(r"(?i)backpressure|highWaterMark|pause\s*\(|drain|semaphore|maxQueue|max_queue|limit"));
static CALLBACK_HEAD: Lazy<Regex> = Lazy::new(|| re(r"function\s*\([^)]*\)\s*\{|=>\s*\{"));

fn tagged(
    line: u32,
    message: &str,
    severity: Severity,
    rule: &str,
    suggestion: &str,
    category: IssueCategory,
) -> Issue {
    Issue::new(line, message, severity, rule, suggestion).with_category(category)
}

/// Higher-order heuristics over the whole file. Each rule names the shape
/// it recognizes; all issues carry a category for bucket routing.
pub fn detect(view: &SourceView) -> Vec<Issue> {
    let mut issues = Vec::new();
    let content = &view.content;
    let has_error_protection = ERROR_PROTECTION.is_match(content);

    for line in &view.lines {
        let n = line.number;
        let text = &line.text;

        if EVENT_HANDLER.is_match(text) && !has_error_protection {
            issues.push(tagged(
                n,
                "Event handler runs without any surrounding error protection",
                Severity::Medium,
                "unprotected-event-handler",
                "Wrap handler bodies in try/catch so one event cannot kill the listener",
                IssueCategory::Reliability,
            ));
        }

        if QUEUE_DRAIN_LOOP.is_match(text) && ASYNC_CONTEXT.is_match(content) {
            issues.push(tagged(
                n,
                "Queue-draining loop can be re-entered while an await is in flight",
                Severity::High,
                "async-reentrancy",
                "Guard the drain loop with an in-progress flag or a single consumer",
                IssueCategory::Concurrency,
            ));
        }

        if line.in_loop() && RNG_CALL.is_match(text) && RETRY_MARKER.is_match(content) {
            issues.push(tagged(
                n,
                "Non-deterministic RNG inside retry logic makes behavior unreproducible",
                Severity::Low,
                "nondeterministic-retry",
                "Inject the random source so tests can pin it",
                IssueCategory::Testability,
            ));
        }

        if WALL_CLOCK_MATH.is_match(text) {
            issues.push(tagged(
                n,
                "Interval math on the wall clock breaks when the clock steps",
                Severity::Low,
                "wall-clock-interval",
                "Use a monotonic clock for durations",
                IssueCategory::Reliability,
            ));
        }

        if COUNTER_MUTATION.is_match(text) && ASYNC_CONTEXT.is_match(content) && !line.in_loop() {
            issues.push(tagged(
                n,
                "Counter mutated from async code without atomicity",
                Severity::Medium,
                "non-atomic-counter",
                "Serialize the update or use an atomic abstraction",
                IssueCategory::Concurrency,
            ));
        }
    }

    if RETRY_MARKER.is_match(content)
        && view.lines.iter().any(|l| l.in_loop())
        && !DELAY_MARKER.is_match(content)
    {
        let line = view
            .lines
            .iter()
            .find(|l| RETRY_MARKER.is_match(&l.text))
            .map(|l| l.number)
            .unwrap_or(1);
        issues.push(tagged(
            line,
            "Retry loop has no delay or backoff between attempts",
            Severity::High,
            "retry-without-backoff",
            "Sleep with exponential backoff and jitter between retries",
            IssueCategory::Reliability,
        ));
    }

    if QUEUE_PUSH.is_match(content) && !QUEUE_CONSUME.is_match(content) {
        let line = view
            .lines
            .iter()
            .find(|l| QUEUE_PUSH.is_match(&l.text))
            .map(|l| l.number)
            .unwrap_or(1);
        issues.push(tagged(
            line,
            "Queue only ever grows; nothing consumes or bounds it",
            Severity::High,
            "unbounded-queue-growth",
            "Consume entries or cap the queue length",
            IssueCategory::MemoryLeak,
        ));
    }

    if SERVER_MARKER.is_match(content) && !SHUTDOWN_SIGNAL.is_match(content) {
        let line = view
            .lines
            .iter()
            .find(|l| SERVER_MARKER.is_match(&l.text))
            .map(|l| l.number)
            .unwrap_or(1);
        issues.push(tagged(
            line,
            "Server never installs a shutdown signal handler",
            Severity::Medium,
            "missing-graceful-shutdown",
            "Handle SIGTERM/SIGINT and drain in-flight work before exit",
            IssueCategory::Observability,
        ));
    }

    if RATE_LIMIT_MARKER.is_match(content) && WINDOW_RESET.is_match(content) {
        let line = view
            .lines
            .iter()
            .find(|l| WINDOW_RESET.is_match(&l.text))
            .map(|l| l.number)
            .unwrap_or(1);
        issues.push(tagged(
            line,
            "Fixed-window rate limiter admits bursts at the window boundary",
            Severity::Medium,
            "fixed-window-rate-limit",
            "Use a sliding window or token bucket",
            IssueCategory::Design,
        ));
    }

    if let Some(line) = view.lines.iter().find(|l| CACHE_MAP.is_match(&l.text)) {
        if !CACHE_EVICTION.is_match(content) {
            issues.push(tagged(
                line.number,
                "Cache map has no eviction; it grows for the life of the process",
                Severity::Medium,
                "cache-without-eviction",
                "Add TTL or LRU eviction to the cache",
                IssueCategory::MemoryLeak,
            ));
        }
    }

    if GLOBAL_STATE_DECL.is_match(content) && GLOBAL_ASSIGN_IN_HANDLER.is_match(content) {
        let line = view
            .lines
            .iter()
            .find(|l| GLOBAL_STATE_DECL.is_match(&l.text))
            .map(|l| l.number)
            .unwrap_or(1);
        issues.push(tagged(
            line,
            "Global mutable state is reachable from request handlers",
            Severity::Medium,
            "global-state-in-handlers",
            "Move the state into a request-scoped or explicitly shared structure",
            IssueCategory::Design,
        ));
    }

    if PRODUCER_MARKER.is_match(content)
        && ASYNC_CONTEXT.is_match(content)
        && QUEUE_PUSH.is_match(content)
        && !BACKPRESSURE_MARKER.is_match(content)
    {
        issues.push(tagged(
            view.lines
                .iter()
                .find(|l| QUEUE_PUSH.is_match(&l.text))
                .map(|l| l.number)
                .unwrap_or(1),
            "Producer enqueues without any backpressure signal to slow it down",
            Severity::Medium,
            "missing-backpressure",
            "Expose queue depth to producers or block when the queue is full",
            IssueCategory::Reliability,
        ));
    }

    issues.extend(callback_nesting(view));
    issues
}

/// Callback pyramids deeper than three levels. Tracks callback scopes the
/// same way the scanner tracks loops: each inline callback head opens a
/// frame that closes when the brace balance returns to its entry depth.
fn callback_nesting(view: &SourceView) -> Vec<Issue> {
    let mut brace_depth: i32 = 0;
    let mut callback_stack: Vec<i32> = Vec::new();
    let mut issues = Vec::new();

    for line in &view.lines {
        for _ in CALLBACK_HEAD.find_iter(&line.text) {
            callback_stack.push(brace_depth);
        }

        let opens = line.text.matches('{').count() as i32;
        let closes = line.text.matches('}').count() as i32;
        brace_depth += opens - closes;

        while let Some(entry) = callback_stack.last() {
            if brace_depth <= *entry {
                callback_stack.pop();
            } else {
                break;
            }
        }

        if callback_stack.len() > 3 && issues.is_empty() {
            issues.push(tagged(
                line.number,
                "Callback nesting exceeds three levels",
                Severity::Low,
                "callback-nesting",
                "Flatten the chain with async/await or named functions",
                IssueCategory::Design,
            ));
        }
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
    fn retry_loop_without_delay_is_flagged() {
        let src = "\
let retries = 0;
while (retries < 3) {
  const ok = send();
  if (ok) break;
  retries++;
}";
        assert!(rules(src).contains(&"retry-without-backoff".to_string()));
    }

    #[test]
    fn retry_loop_with_backoff_is_clean() {
        let src = "\
let retries = 0;
while (retries < 3) {
  const ok = send();
  if (ok) break;
  await sleep(100 * 2 ** retries);
  retries++;
}";
        assert!(!rules(src).contains(&"retry-without-backoff".to_string()));
    }

    #[test]
    fn push_only_queue_is_a_leak() {
        let src = "const queue = [];\nfunction add(job) { queue.push(job); }";
        let issues = detect(&SourceView::new(src, "svc.js"));
        let hit = issues.iter().find(|i| i.rule == "unbounded-queue-growth").expect("finding");
        assert_eq!(hit.category, Some(IssueCategory::MemoryLeak));
    }

    #[test]
    fn consumed_queue_is_clean() {
        let src = "const queue = [];\nqueue.push(job);\nconst next = queue.shift();";
        assert!(!rules(src).contains(&"unbounded-queue-growth".to_string()));
    }

    #[test]
    fn server_without_signal_handler_is_flagged() {
        let src = "app.listen(3000);";
        assert!(rules(src).contains(&"missing-graceful-shutdown".to_string()));
        let src = "app.listen(3000);\nprocess.on('SIGTERM', shutdown);";
        assert!(!rules(src).contains(&"missing-graceful-shutdown".to_string()));
    }

    #[test]
    fn cache_map_without_eviction_is_flagged() {
        let src = "const cache = new Map();\ncache.set(key, value);";
        assert!(rules(src).contains(&"cache-without-eviction".to_string()));
        let src = "const cache = new Map();\ncache.set(key, value);\ncache.delete(oldest);";
        assert!(!rules(src).contains(&"cache-without-eviction".to_string()));
    }

    #[test]
    fn callback_pyramid_deeper_than_three_is_flagged() {
        let src = "\
a(function () {
  b(function () {
    c(function () {
      d(function () {
        done();
      });
    });
  });
});";
        assert!(rules(src).contains(&"callback-nesting".to_string()));
    }

    #[test]
    fn three_levels_of_callbacks_are_tolerated() {
        let src = "\
a(function () {
  b(function () {
    c(function () {
      done();
    });
  });
});";
        assert!(!rules(src).contains(&"callback-nesting".to_string()));
    }

    #[test]
    fn queue_drain_loop_in_async_file_is_reentrant() {
        let src = "async function drain() {\n  while (queue.length > 0) {\n    await handle(queue.shift());\n  }\n}";
        let issues = detect(&SourceView::new(src, "svc.js"));
        let hit = issues.iter().find(|i| i.rule == "async-reentrancy").expect("finding");
        assert_eq!(hit.category, Some(IssueCategory::Concurrency));
    }
}
