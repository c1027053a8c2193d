use std::collections::BTreeMap;
use std::fmt;

use kestrel_core::Span;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier for a source file, as understood by the editing host.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileId(pub String);

impl FileId {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({})", self.0)
    }
}

/// A single replacement of `range` (byte offsets) in `file`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEdit {
    pub file: FileId,
    pub range: Span,
    pub replacement: String,
}

impl TextEdit {
    pub fn insert(file: FileId, offset: usize, text: impl Into<String>) -> Self {
        Self {
            file,
            range: Span::empty(offset),
            replacement: text.into(),
        }
    }

    pub fn replace(file: FileId, range: Span, text: impl Into<String>) -> Self {
        Self {
            file,
            range,
            replacement: text.into(),
        }
    }

    pub fn delete(file: FileId, range: Span) -> Self {
        Self::replace(file, range, String::new())
    }

    fn sort_key(&self) -> (&FileId, usize, usize, &str) {
        (
            &self.file,
            self.range.start,
            self.range.end,
            self.replacement.as_str(),
        )
    }
}

/// The edits produced by one refactoring, handed to the host in one piece.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceEdit {
    pub edits: Vec<TextEdit>,
}

impl WorkspaceEdit {
    pub fn new(edits: Vec<TextEdit>) -> Self {
        Self { edits }
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Edits grouped by file, each group sorted by position.
    pub fn edits_by_file(&self) -> BTreeMap<&FileId, Vec<&TextEdit>> {
        let mut map: BTreeMap<&FileId, Vec<&TextEdit>> = BTreeMap::new();
        for edit in &self.edits {
            map.entry(&edit.file).or_default().push(edit);
        }
        for edits in map.values_mut() {
            edits.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        }
        map
    }

    /// Sorts and deduplicates the edits, merges inserts at the same offset and
    /// rejects overlapping replacements.
    pub fn normalize(&mut self) -> Result<(), EditError> {
        for edit in &self.edits {
            if edit.range.start > edit.range.end {
                return Err(EditError::InvalidRange {
                    file: edit.file.clone(),
                    range: edit.range,
                });
            }
        }

        self.edits.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        self.edits.dedup();

        let mut merged: Vec<TextEdit> = Vec::with_capacity(self.edits.len());
        for edit in self.edits.drain(..) {
            let Some(last) = merged.last_mut() else {
                merged.push(edit);
                continue;
            };
            if last.file != edit.file {
                merged.push(edit);
                continue;
            }
            if last.range == edit.range && edit.range.is_empty() {
                last.replacement.push_str(&edit.replacement);
                continue;
            }
            // An insert at the start of a replacement is applied before it.
            let touches = last.range.is_empty() && last.range.start == edit.range.start;
            if edit.range.start < last.range.end || (last.range == edit.range && !touches) {
                return Err(EditError::OverlappingEdits {
                    file: edit.file,
                    first: last.range,
                    second: edit.range,
                });
            }
            merged.push(edit);
        }
        self.edits = merged;
        Ok(())
    }

    /// Applies the edits for `file` to `original`.
    pub fn apply_to(&self, file: &FileId, original: &str) -> Result<String, EditError> {
        let edits: Vec<TextEdit> = self
            .edits
            .iter()
            .filter(|edit| &edit.file == file)
            .cloned()
            .collect();
        apply_text_edits(original, &edits)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditError {
    #[error("invalid text range {range:?} in {file:?}")]
    InvalidRange { file: FileId, range: Span },
    #[error("overlapping edits in {file:?}: {first:?} overlaps {second:?}")]
    OverlappingEdits {
        file: FileId,
        first: Span,
        second: Span,
    },
    #[error("text edit range {range:?} is outside the file bounds (len={len}) in {file:?}")]
    OutOfBounds {
        file: FileId,
        range: Span,
        len: usize,
    },
}

/// Applies non-overlapping `edits` to `original`, back to front.
pub fn apply_text_edits(original: &str, edits: &[TextEdit]) -> Result<String, EditError> {
    let mut sorted: Vec<&TextEdit> = edits.iter().collect();
    sorted.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));

    let mut out = original.to_string();
    for edit in sorted {
        let len = out.len();
        let in_bounds = edit.range.start <= edit.range.end
            && edit.range.end <= len
            && out.is_char_boundary(edit.range.start)
            && out.is_char_boundary(edit.range.end);
        if !in_bounds {
            return Err(EditError::OutOfBounds {
                file: edit.file.clone(),
                range: edit.range,
                len,
            });
        }
        out.replace_range(edit.range.start..edit.range.end, &edit.replacement);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file() -> FileId {
        FileId::new("Main.kt")
    }

    #[test]
    fn normalize_merges_inserts_and_sorts() {
        let mut edit = WorkspaceEdit::new(vec![
            TextEdit::replace(file(), Span::new(4, 7), "bar"),
            TextEdit::insert(file(), 0, "a"),
            TextEdit::insert(file(), 0, "b"),
        ]);
        edit.normalize().unwrap();
        assert_eq!(edit.edits.len(), 2);
        assert_eq!(edit.edits[0].replacement, "ab");
        assert_eq!(edit.apply_to(&file(), "val foo = 1").unwrap(), "abval bar = 1");
    }

    #[test]
    fn normalize_rejects_overlaps() {
        let mut edit = WorkspaceEdit::new(vec![
            TextEdit::replace(file(), Span::new(0, 5), "x"),
            TextEdit::replace(file(), Span::new(3, 8), "y"),
        ]);
        assert!(matches!(
            edit.normalize(),
            Err(EditError::OverlappingEdits { .. })
        ));
    }

    #[test]
    fn apply_reports_out_of_bounds() {
        let err = apply_text_edits("abc", &[TextEdit::delete(file(), Span::new(1, 9))]).unwrap_err();
        assert!(matches!(err, EditError::OutOfBounds { len: 3, .. }));
    }
}
