use kestrel_core::{Name, Span};

use crate::body::Body;
use crate::ids::{DeclId, ExprId};

/// One argument of an annotation use site, e.g. `arg = String::class` in
/// `@Ann(arg = String::class)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationArgument {
    pub name: Option<Name>,
    pub value: ExprId,
}

/// An annotation use site whose argument expressions are lowered into their own
/// small [`Body`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationEntry {
    /// The annotation class as written (`Ann` or `pkg.Ann`).
    pub name: Name,
    pub span: Span,
    pub arguments: Vec<AnnotationArgument>,
    pub body: Body,
    pub annotated: Option<DeclId>,
}

impl AnnotationEntry {
    pub fn argument_exprs(&self) -> impl Iterator<Item = ExprId> + '_ {
        self.arguments.iter().map(|arg| arg.value)
    }
}
