//! Line-level helpers for splitting a program body.

/// Text that marks a line as a visual-output call.
pub const VISUAL_PREFIX: &str = "GUI.";

/// Infinite-loop headers recognised at the start of a line.
const LOOP_HEADERS: [&str; 2] = ["while True:", "while(True):"];

/// Width of one indentation level in spaces.
const INDENT_WIDTH: usize = 4;

/// Remove every line that calls the visual-output capability.
///
/// Works at line granularity: any other code on the same line is dropped
/// too. The trailing newline of a removed line goes with it.
pub fn filter_visual_lines(text: &str) -> String {
    text.split_inclusive('\n')
        .filter(|line| !line.contains(VISUAL_PREFIX))
        .collect()
}

/// A program body cut at its first loop header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopSplit {
    /// Everything before the header line.
    pub setup: String,
    /// Loop body, dedented by one level.
    pub body: String,
    /// The body starts on the header line (`while True: step()`).
    pub body_on_header: bool,
}

/// Split `text` at the first infinite-loop header starting in column 0.
///
/// Returns `None` when no such header exists. The header line is dropped
/// and the rest is dedented by one level. A body written on the header line
/// itself becomes the first loop line.
pub fn split_setup_loop(text: &str) -> Option<LoopSplit> {
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        if let Some(inline) = loop_header_remainder(line) {
            let setup = text[..offset].to_string();
            let rest = dedent_once(&text[offset + line.len()..]);

            let inline = inline.trim();
            let body_on_header = !inline.is_empty() && !inline.starts_with('#');
            let body = if body_on_header {
                format!("{inline}\n{rest}")
            } else {
                rest
            };
            return Some(LoopSplit {
                setup,
                body,
                body_on_header,
            });
        }
        offset += line.len();
    }

    None
}

/// Remove exactly one indentation level (four spaces or a tab) per line.
///
/// Lines with less indentation are left untouched.
pub fn dedent_once(text: &str) -> String {
    let indent = " ".repeat(INDENT_WIDTH);
    text.split_inclusive('\n')
        .map(|line| {
            line.strip_prefix(indent.as_str())
                .or_else(|| line.strip_prefix('\t'))
                .unwrap_or(line)
        })
        .collect()
}

/// Text following a loop header on `line`, if `line` starts with one.
fn loop_header_remainder(line: &str) -> Option<&str> {
    LOOP_HEADERS
        .iter()
        .find_map(|header| line.strip_prefix(header))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_visual_lines_drops_whole_line() {
        let text = "a = 1; GUI.showImage(a)\nb = 2\nGUI.showImage(b)";
        assert_eq!(filter_visual_lines(text), "b = 2\n");
    }

    #[test]
    fn test_filter_keeps_imports() {
        let text = "from GUI import GUI\nx = 1\n";
        assert_eq!(filter_visual_lines(text), text);
    }

    #[test]
    fn test_split_prefix_and_body() {
        let text = "x = 0\nwhile True:\n    x += 1\n    if x > 3:\n        x = 0\n";
        let split = split_setup_loop(text).unwrap();
        assert_eq!(split.setup, "x = 0\n");
        assert_eq!(split.body, "x += 1\nif x > 3:\n    x = 0\n");
        assert!(!split.body_on_header);
    }

    #[test]
    fn test_split_parenthesised_header() {
        let split = split_setup_loop("while(True):\n    step()\n").unwrap();
        assert_eq!(split.setup, "");
        assert_eq!(split.body, "step()\n");
    }

    #[test]
    fn test_indented_loop_is_not_a_header() {
        let text = "def spin():\n    while True:\n        pass\n";
        assert!(split_setup_loop(text).is_none());
    }

    #[test]
    fn test_loop_not_at_statement_start() {
        assert!(split_setup_loop("x = 1 # while True:\n").is_none());
        assert!(split_setup_loop("awhile True:\n    x\n").is_none());
    }

    #[test]
    fn test_first_loop_wins() {
        let text = "while True:\n    a()\nwhile True:\n    b()\n";
        let split = split_setup_loop(text).unwrap();
        assert_eq!(split.setup, "");
        assert_eq!(split.body, "a()\nwhile True:\nb()\n");
    }

    #[test]
    fn test_inline_loop_body() {
        let split = split_setup_loop("while True: step()\n").unwrap();
        assert_eq!(split.body, "step()\n");
        assert!(split.body_on_header);

        let split = split_setup_loop("while True:  # forever\n    step()\n").unwrap();
        assert_eq!(split.body, "step()\n");
        assert!(!split.body_on_header);
    }

    #[test]
    fn test_dedent_once_removes_one_level() {
        assert_eq!(dedent_once("        a\n    b\n  c\n\td\n"), "    a\nb\n  c\nd\n");
        assert_eq!(dedent_once(""), "");
    }

    #[test]
    fn test_body_line_order_preserved() {
        let body: Vec<String> = (0..20).map(|i| format!("    step({i})\n")).collect();
        let text = format!("while True:\n{}", body.concat());
        let loop_code = split_setup_loop(&text).unwrap().body;
        let lines: Vec<&str> = loop_code.lines().collect();
        assert_eq!(lines.len(), 20);
        for (i, line) in lines.iter().enumerate() {
            assert_eq!(*line, format!("step({i})"));
        }
    }
}
