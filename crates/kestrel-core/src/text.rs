//! Small text helpers shared by code generators.
//!
//! All offsets are UTF-8 byte offsets into the source snapshot.

use crate::Span;

/// Shrink `range` so that it does not start or end with ASCII whitespace.
pub fn trim_range(source: &str, mut range: Span) -> Span {
    let bytes = source.as_bytes();
    range.end = range.end.min(bytes.len());
    while range.start < range.end && bytes[range.start].is_ascii_whitespace() {
        range.start += 1;
    }
    while range.start < range.end && bytes[range.end - 1].is_ascii_whitespace() {
        range.end -= 1;
    }
    range
}

pub fn line_start_offset(source: &str, offset: usize) -> usize {
    let offset = offset.min(source.len());
    source[..offset].rfind('\n').map(|p| p + 1).unwrap_or(0)
}

/// Offset just past the `\n` ending the line that contains `offset` (or the end of the text).
pub fn line_end_offset(source: &str, offset: usize) -> usize {
    let offset = offset.min(source.len());
    source[offset..]
        .find('\n')
        .map(|p| offset + p + 1)
        .unwrap_or(source.len())
}

/// The leading whitespace of the line containing `offset`.
pub fn indentation_at(source: &str, offset: usize) -> String {
    let offset = offset.min(source.len());
    let start = line_start_offset(source, offset);
    source[start..]
        .chars()
        .take_while(|c| c.is_whitespace() && *c != '\n' && *c != '\r')
        .collect()
}

/// Re-indent every non-blank line of `block`, stripping `old_indent` and prefixing `new_indent`.
pub fn reindent(block: &str, old_indent: &str, new_indent: &str) -> String {
    let mut out = String::new();
    for line in block.split_inclusive('\n') {
        let has_newline = line.ends_with('\n');
        let line = line.strip_suffix('\n').unwrap_or(line);
        let line = line.strip_prefix(old_indent).unwrap_or(line);
        if !line.trim().is_empty() {
            out.push_str(new_indent);
            out.push_str(line);
        }
        if has_newline {
            out.push('\n');
        }
    }
    out
}

/// `true` when only whitespace separates `offset` from the start of its line.
pub fn is_at_line_start(source: &str, offset: usize) -> bool {
    let start = line_start_offset(source, offset);
    source[start..offset.min(source.len())]
        .chars()
        .all(|c| c == ' ' || c == '\t')
}

/// Collapse all whitespace runs so that two expressions can be compared textually.
pub fn normalize_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reindent_strips_and_prefixes() {
        let block = "    a()\n\n    if (x) {\n        b()\n    }";
        assert_eq!(
            reindent(block, "    ", "        "),
            "        a()\n\n        if (x) {\n            b()\n        }"
        );
    }

    #[test]
    fn trim_and_lines() {
        let src = "fun f() {\n    val x = 1\n}\n";
        let x = src.find("val").unwrap();
        assert_eq!(indentation_at(src, x), "    ");
        assert_eq!(line_start_offset(src, x), x - 4);
        assert_eq!(&src[line_end_offset(src, x)..], "}\n");
        assert_eq!(trim_range(src, Span::new(x - 4, x + 10)), Span::new(x, x + 9));
        assert!(is_at_line_start(src, x));
    }
}
