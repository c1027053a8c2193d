//! Core shared types for Kestrel.
//!
//! This crate is intentionally small: names, byte spans, diagnostics and a few
//! text helpers that every analysis crate needs.

mod diagnostic;
mod name;
pub mod text;

pub use diagnostic::{Diagnostic, Severity};
pub use name::{is_identifier, FqName, Name};

use std::fmt;

use serde::{Deserialize, Serialize};

/// A half-open byte span `[start, end)` into a source string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    #[inline]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    #[inline]
    pub const fn empty(offset: usize) -> Self {
        Self {
            start: offset,
            end: offset,
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// `true` when `other` lies entirely inside `self`.
    pub fn contains_span(&self, other: Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }

    pub fn intersects(&self, other: Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// The smallest span covering both `self` and `other`.
    #[must_use]
    pub fn cover(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }

    /// Shift the span left by `base`, e.g. to make it relative to a slice
    /// starting at `base`.
    #[must_use]
    pub fn relative_to(self, base: usize) -> Span {
        Span::new(
            self.start.saturating_sub(base),
            self.end.saturating_sub(base),
        )
    }

    pub fn slice<'a>(&self, text: &'a str) -> Option<&'a str> {
        text.get(self.start..self.end)
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Span({}..{})", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_containment_is_inclusive_of_bounds() {
        let outer = Span::new(4, 10);
        assert!(outer.contains_span(Span::new(4, 10)));
        assert!(outer.contains_span(Span::new(5, 6)));
        assert!(!outer.contains_span(Span::new(3, 6)));
        assert!(!outer.contains(10));
    }

    #[test]
    fn cover_and_relative() {
        let span = Span::new(8, 12).cover(Span::new(2, 9));
        assert_eq!(span, Span::new(2, 12));
        assert_eq!(span.relative_to(2), Span::new(0, 10));
        assert_eq!(Span::new(1, 4).slice("abcdef"), Some("bcd"));
    }
}
