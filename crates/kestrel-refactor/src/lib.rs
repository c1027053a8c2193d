//! Refactoring entrypoints for Kestrel.
//!
//! Today this crate exposes:
//! - Extract Function / Variable / Property / Parameter (`extract`)
//! - Rewriting `java.lang.Class` annotation arguments into class literals
//!   (`class_literal`)
//! - Unified-diff previews of the produced edits (`preview`)
//!
//! Every entry point works on an immutable snapshot and returns either a
//! complete [`WorkspaceEdit`] or the conflicts that prevent one.

pub mod capture;
pub mod class_literal;
mod conflict;
mod edit;
pub mod extract;
pub mod naming;
mod preview;
mod region;
pub mod signature;

pub use capture::{
    analyze_captures, CaptureAnalysis, CaptureUsage, CapturedSymbol, RelocatedDeclaration,
    WriteCandidate,
};
pub use class_literal::{
    collect_file_tasks, create_replacement_tasks, process_tasks, ClassLiteralRewrite,
    ReplacementTask,
};
pub use conflict::{Conflict, ConflictReport};
pub use edit::{apply_text_edits, EditError, FileId, TextEdit, WorkspaceEdit};
pub use extract::{
    analyze, extract, generate, ExtractionData, ExtractionGeneratorOptions, ExtractionOptions,
    GeneratedExtraction, OccurrencesToReplace, OwnerInfo,
};
pub use naming::{is_identifier, suggest_names, unique_name, NameKind};
pub use preview::{generate_preview, FilePreview, RefactoringPreview};
pub use region::ExtractionRegion;
pub use signature::{
    synthesize, CarrierSpec, CarrierVariant, ExtractableCodeDescriptor, LocalDeclaration,
    Parameter, ReturnStrategy, ValueSource,
};

pub use kestrel_config::{ExtractionConfig, ExtractionTarget, Visibility};
