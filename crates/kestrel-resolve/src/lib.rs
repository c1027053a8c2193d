//! Resolution services consumed by Kestrel's analyses.
//!
//! The type checker and symbol resolver live outside this workspace. Analyses
//! talk to them through [`ResolutionContext`], an explicit value passed into
//! every entry point. [`DeclTree`] implements the declaration half of the
//! contract and is enough for hosts that only need annotation resolution.

mod context;
pub mod deprecation;
mod sink;

pub use context::{ResolutionContext, ResolvedCall, JAVA_LANG_CLASS_ARGUMENT_IN_ANNOTATION};
pub use deprecation::{
    check_deprecated_call, check_deprecated_declaration, declared_deprecation,
    deprecation_diagnostic, deprecation_message, effective_deprecation, overridden_deprecations,
    DeprecationDiagnostic, DeprecationDiagnosticKind, JAVA_DEPRECATED, KOTLIN_DEPRECATED,
};
pub use kestrel_hir::DeclTree;
pub use sink::DiagnosticSink;
