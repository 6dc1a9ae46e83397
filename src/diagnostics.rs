//! Source documents and code-frame rendering for diagnostics.

use crate::error::Location;

/// Number of context lines shown above and below the offending line.
const CONTEXT_LINES: usize = 2;
/// Spans longer than this are rendered with a middle ellipsis.
const BLOCK_THRESHOLD: usize = 7;
/// Characters that bound an unsized caret span.
const DELIMITERS: &[char] = &[
    '.', '-', ' ', '\t', '(', ')', '*', '/', '+', '{', '}', '[', ']', '?', '\'', '"', '`', '<',
    '>',
];

/// Immutable source text plus optional name, split into lines for
/// error reporting.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub name: Option<String>,
    pub text: String,
    line_starts: Vec<usize>,
}

impl SourceDocument {
    pub fn new(text: impl Into<String>, name: Option<&str>) -> Self {
        let text = text.into();
        let mut line_starts = vec![0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self {
            name: name.map(str::to_owned),
            text,
            line_starts,
        }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Returns the 1-based line `n` without its trailing newline, or ""
    /// when `n` is out of range.
    pub fn line(&self, n: usize) -> &str {
        if n == 0 || n > self.line_starts.len() {
            return "";
        }
        let start = self.line_starts[n - 1];
        let end = self
            .line_starts
            .get(n)
            .map_or(self.text.len(), |next| next - 1);
        &self.text[start..end.max(start)]
    }

    /// Maps a byte offset to a 1-based line and column.
    pub fn location(&self, offset: usize) -> Location {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i + 1,
            Err(i) => i,
        };
        Location::new(line, offset - self.line_starts[line - 1] + 1)
    }
}

fn line_number(n: Option<usize>) -> String {
    match n {
        Some(n) => format!("{:>4}\u{2502} ", n),
        None => format!("{:>4}\u{2502} ", ""),
    }
}

/// Caret span length: explicit `len` when given, otherwise up to the next
/// delimiter-class character, otherwise the rest of the line.
fn caret_len(line: &str, col: usize, len: Option<usize>) -> usize {
    if let Some(len) = len {
        return len.max(1);
    }
    let start = col.saturating_sub(1);
    let rest: &str = line.get(start..).unwrap_or("");
    match rest.char_indices().skip(1).find(|(_, c)| DELIMITERS.contains(c)) {
        Some((i, _)) => i,
        None => rest.len().max(1),
    }
}

/// Renders a window of [`CONTEXT_LINES`] lines around `line` with a caret
/// span under the fault. `column` is 1-based; `None` underlines the whole
/// line.
pub fn caret_frame(
    doc: &SourceDocument,
    line: usize,
    column: Option<usize>,
    len: Option<usize>,
) -> String {
    let mut out = String::new();
    let first = line.saturating_sub(CONTEXT_LINES).max(1);
    let last = (line + CONTEXT_LINES).min(doc.line_count());
    for n in first..=last {
        out.push_str(&line_number(Some(n)));
        out.push_str(doc.line(n));
        out.push('\n');
        if n == line {
            let text = doc.line(n);
            let col = column.unwrap_or(1);
            let width = match column {
                Some(c) => caret_len(text, c, len),
                None => text.len().max(1),
            };
            out.push_str(&line_number(None));
            out.push_str(&" ".repeat(col.saturating_sub(1)));
            out.push_str(&"^".repeat(width));
            out.push('\n');
        }
    }
    out
}

/// Renders a multi-line span; long spans show the first and last few
/// lines with a middle ellipsis instead of the whole range.
pub fn block_frame(doc: &SourceDocument, from: usize, to: usize) -> String {
    let from = from.max(1);
    let to = to.min(doc.line_count()).max(from);
    let mut out = String::new();
    fn push(out: &mut String, doc: &SourceDocument, n: usize) {
        out.push_str(&line_number(Some(n)));
        out.push_str(doc.line(n));
        out.push('\n');
    }
    if to - from + 1 <= BLOCK_THRESHOLD {
        for n in from..=to {
            push(&mut out, doc, n);
        }
    } else {
        for n in from..from + 3 {
            push(&mut out, doc, n);
        }
        out.push_str(&line_number(None));
        out.push_str("\u{22ef}\n");
        for n in to - 2..=to {
            push(&mut out, doc, n);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn doc(text: &str) -> SourceDocument {
        SourceDocument::new(text, None)
    }

    #[test]
    fn test_line_access() {
        let d = doc("one\ntwo\nthree");
        assert_eq!(d.line_count(), 3);
        assert_eq!(d.line(1), "one");
        assert_eq!(d.line(2), "two");
        assert_eq!(d.line(3), "three");
        assert_eq!(d.line(4), "");
    }

    #[test]
    fn test_location_mapping() {
        let d = doc("ab\ncd");
        assert_eq!(d.location(0), Location::new(1, 1));
        assert_eq!(d.location(1), Location::new(1, 2));
        assert_eq!(d.location(3), Location::new(2, 1));
        assert_eq!(d.location(4), Location::new(2, 2));
    }

    #[test]
    fn test_caret_frame_window() {
        let d = doc("l1\nl2\nl3\nl4\nl5\nl6");
        let frame = caret_frame(&d, 4, Some(1), Some(2));
        assert_eq!(
            frame,
            "   2\u{2502} l2\n   3\u{2502} l3\n   4\u{2502} l4\n    \u{2502} ^^\n   5\u{2502} l5\n   6\u{2502} l6\n"
        );
    }

    #[test]
    fn test_caret_bounded_by_delimiter() {
        // span runs from the fault up to the next delimiter-class char
        assert_eq!(caret_len("abcdef(x)", 1, None), 6);
        assert_eq!(caret_len("abc", 1, None), 3);
        assert_eq!(caret_len("a", 1, None), 1);
    }

    #[test]
    fn test_block_frame_short_span() {
        let d = doc("a\nb\nc");
        let frame = block_frame(&d, 1, 3);
        assert_eq!(frame.lines().count(), 3);
        assert!(frame.contains("   1\u{2502} a"));
        assert!(frame.contains("   3\u{2502} c"));
    }

    #[test]
    fn test_block_frame_ellipsis() {
        let text = (1..=20).map(|i| format!("line{i}")).collect::<Vec<_>>();
        let d = doc(&text.join("\n"));
        let frame = block_frame(&d, 1, 20);
        assert!(frame.contains("line1"));
        assert!(frame.contains("line3"));
        assert!(frame.contains('\u{22ef}'));
        assert!(frame.contains("line18"));
        assert!(frame.contains("line20"));
        assert!(!frame.contains("line10"));
    }
}
