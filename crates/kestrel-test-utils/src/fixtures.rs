use kestrel_core::Span;

const START_MARKER: &str = "/*start*/";
const END_MARKER: &str = "/*end*/";
const CURSOR_MARKER: &str = "$0";

/// Extracts a byte range selection from a fixture containing `/*start*/` and
/// `/*end*/` markers.
///
/// Returns the fixture with markers removed and the selection span in the
/// marker-stripped text.
#[track_caller]
pub fn extract_range(fixture: &str) -> (String, Span) {
    let start = fixture
        .find(START_MARKER)
        .expect("fixture missing /*start*/ marker");
    let after_start = start + START_MARKER.len();
    let end = fixture
        .find(END_MARKER)
        .expect("fixture missing /*end*/ marker");
    assert!(end >= after_start, "/*end*/ must come after /*start*/");

    let mut text = String::with_capacity(fixture.len());
    text.push_str(&fixture[..start]);
    text.push_str(&fixture[after_start..end]);
    text.push_str(&fixture[end + END_MARKER.len()..]);

    // The end shrinks by the length of the start marker.
    let range = Span::new(start, end - START_MARKER.len());
    tracing::trace!(target: "kestrel.test_utils", ?range, "extracted fixture selection");
    (text, range)
}

/// Extracts a single `$0` cursor offset.
#[track_caller]
pub fn extract_offset(fixture: &str) -> (String, usize) {
    let offset = fixture
        .find(CURSOR_MARKER)
        .expect("fixture missing $0 marker");
    let mut text = String::with_capacity(fixture.len());
    text.push_str(&fixture[..offset]);
    text.push_str(&fixture[offset + CURSOR_MARKER.len()..]);
    (text, offset)
}

/// Span of the `nth` (0-based) occurrence of `needle` in `text`.
#[track_caller]
pub fn find_span(text: &str, needle: &str, nth: usize) -> Span {
    let start = text
        .match_indices(needle)
        .nth(nth)
        .map(|(start, _)| start)
        .unwrap_or_else(|| panic!("`{needle}` occurs fewer than {} times", nth + 1));
    Span::new(start, start + needle.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_selection_markers() {
        let (text, range) = extract_range("fun f() { /*start*/g()/*end*/ }");
        assert_eq!(text, "fun f() { g() }");
        assert_eq!(&text[range.start..range.end], "g()");
    }

    #[test]
    fn finds_nth_occurrence() {
        assert_eq!(find_span("a + a", "a", 1), Span::new(4, 5));
        assert_eq!(extract_offset("x$0y"), ("xy".to_string(), 1));
    }
}
