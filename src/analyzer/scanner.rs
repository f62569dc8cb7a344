use once_cell::sync::Lazy;
use regex::Regex;

static LOOP_HEAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^A-Za-z0-9_])(?:for|while)\s*\(|\.(?:forEach|map|filter|reduce)\s*\(")
        .expect("valid loop head pattern")
});

/// One source line together with the loop-depth the scanner observed at it.
#[derive(Debug, Clone)]
pub struct ScannedLine {
    /// 1-based line number.
    pub number: u32,
    pub text: String,
    /// Number of enclosing loops, counting a loop-head line as inside its
    /// own loop.
    pub loop_depth: usize,
}

impl ScannedLine {
    pub fn in_loop(&self) -> bool {
        self.loop_depth > 0
    }
}

/// Shared per-file view handed to every detector so they all observe the
/// same loop-depth computation.
#[derive(Debug)]
pub struct SourceView {
    pub file_name: String,
    pub content: String,
    pub lines: Vec<ScannedLine>,
}

impl SourceView {
    pub fn new(content: &str, file_name: &str) -> Self {
        Self {
            file_name: file_name.to_string(),
            content: content.to_string(),
            lines: scan(content),
        }
    }

    pub fn line_count(&self) -> u32 {
        self.lines.len() as u32
    }
}

fn brace_delta(line: &str) -> (i32, i32) {
    let opens = line.matches('{').count() as i32;
    let closes = line.matches('}').count() as i32;
    (opens, closes)
}

/// Scan content line by line, tracking loop nesting. A loop starts at a
/// recognized loop head (`for`, `while`, or a chained `.forEach/.map/
/// .filter/.reduce`) and ends when the net brace balance drops back to the
/// depth recorded at entry. Nested loops stack.
pub fn scan(content: &str) -> Vec<ScannedLine> {
    let mut brace_depth: i32 = 0;
    // Brace depth recorded at each open loop's entry.
    let mut loop_stack: Vec<i32> = Vec::new();
    let mut lines = Vec::new();

    for (idx, raw) in content.split('\n').enumerate() {
        let is_loop_head = LOOP_HEAD.is_match(raw);
        if is_loop_head {
            loop_stack.push(brace_depth);
        }

        let depth_at_line = loop_stack.len();

        let (opens, closes) = brace_delta(raw);
        brace_depth += opens - closes;

        // Pop every loop whose body the brace balance has closed.
        while let Some(entry_depth) = loop_stack.last() {
            if brace_depth <= *entry_depth {
                loop_stack.pop();
            } else {
                break;
            }
        }

        lines.push(ScannedLine {
            number: (idx + 1) as u32,
            text: raw.to_string(),
            loop_depth: depth_at_line,
        });
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depths(content: &str) -> Vec<usize> {
        scan(content).iter().map(|l| l.loop_depth).collect()
    }

    #[test]
    fn flat_code_has_zero_depth() {
        assert_eq!(depths("const a = 1;\nconst b = 2;"), vec![0, 0]);
    }

    #[test]
    fn single_loop_body_is_depth_one() {
        let src = "for (let i = 0; i < n; i++) {\n  work(i);\n}\nafter();";
        assert_eq!(depths(src), vec![1, 1, 1, 0]);
    }

    #[test]
    fn nested_for_while_stacks_depth() {
        let src = "\
for (let i = 0; i < n; i++) {
  while (pending) {
    const re = new RegExp(input);
  }
}
done();";
        assert_eq!(depths(src), vec![1, 2, 2, 2, 1, 0]);
    }

    #[test]
    fn method_chain_counts_as_loop() {
        let src = "items.forEach(item => {\n  handle(item);\n});\nnext();";
        assert_eq!(depths(src), vec![1, 1, 1, 0]);
    }

    #[test]
    fn sibling_loops_do_not_bleed_depth() {
        let src = "\
for (const x of xs) {
  use(x);
}
between();
while (busy) {
  spin();
}";
        assert_eq!(depths(src), vec![1, 1, 1, 0, 1, 1, 1]);
    }

    #[test]
    fn identifier_containing_for_is_not_a_loop() {
        assert_eq!(depths("transform(value);\nawaitFormat(x);"), vec![0, 0]);
    }

    #[test]
    fn line_numbers_are_one_based() {
        let lines = scan("a\nb");
        assert_eq!(lines[0].number, 1);
        assert_eq!(lines[1].number, 2);
    }
}
