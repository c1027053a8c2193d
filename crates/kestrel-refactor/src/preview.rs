use std::collections::BTreeMap;

use similar::TextDiff;

use crate::edit::{EditError, FileId, WorkspaceEdit};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilePreview {
    pub file: FileId,
    pub original: String,
    pub modified: String,
    pub unified_diff: String,
    pub edit_count: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefactoringPreview {
    pub total_files: usize,
    pub total_edits: usize,
    pub files: Vec<FilePreview>,
}

/// Renders `edit` against `sources` as per-file unified diffs.
///
/// Files the edit touches but `sources` lacks are treated as empty.
pub fn generate_preview(
    sources: &BTreeMap<FileId, String>,
    edit: &WorkspaceEdit,
) -> Result<RefactoringPreview, EditError> {
    let mut normalized = edit.clone();
    normalized.normalize()?;

    let mut files = Vec::new();
    for (file, edits) in normalized.edits_by_file() {
        let original = sources.get(file).map(String::as_str).unwrap_or("");
        let modified = normalized.apply_to(file, original)?;
        if original == modified {
            continue;
        }

        let diff = TextDiff::from_lines(original, modified.as_str());
        let unified_diff = diff
            .unified_diff()
            .context_radius(3)
            .header(&format!("a/{}", file.0), &format!("b/{}", file.0))
            .to_string();

        files.push(FilePreview {
            file: file.clone(),
            original: original.to_string(),
            modified,
            unified_diff,
            edit_count: edits.len(),
        });
    }

    Ok(RefactoringPreview {
        total_files: files.len(),
        total_edits: normalized.edits.len(),
        files,
    })
}

#[cfg(test)]
mod tests {
    use kestrel_core::Span;

    use super::*;
    use crate::edit::TextEdit;

    #[test]
    fn preview_renders_unified_diff() {
        let file = FileId::new("Main.kt");
        let mut sources = BTreeMap::new();
        sources.insert(file.clone(), "fun f() {\n    g()\n}\n".to_string());
        let edit = WorkspaceEdit::new(vec![TextEdit::replace(
            file.clone(),
            Span::new(14, 17),
            "h()",
        )]);

        let preview = generate_preview(&sources, &edit).unwrap();
        assert_eq!(preview.total_files, 1);
        assert_eq!(preview.total_edits, 1);
        let diff = &preview.files[0].unified_diff;
        assert!(diff.contains("--- a/Main.kt"));
        assert!(diff.contains("+++ b/Main.kt"));
        assert!(diff.contains("-    g()"));
        assert!(diff.contains("+    h()"));
    }
}
