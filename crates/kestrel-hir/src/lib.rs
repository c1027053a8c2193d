//! High-level intermediate representation consumed by Kestrel's analyses.
//!
//! The parser/lowering that produces these structures lives outside this
//! workspace; everything here is an immutable snapshot once built:
//!
//! - [`body`]: arena-allocated statements, expressions, locals and scopes of one
//!   declaration body.
//! - [`decl`]: declarations with their annotations, containers and override sets.
//! - [`annotation`]: annotation use sites whose arguments are expressions.
//! - [`types`]: the small type representation the type-inference oracle answers with.

pub mod annotation;
pub mod body;
pub mod decl;
mod ids;
pub mod types;

pub use annotation::{AnnotationArgument, AnnotationEntry};
pub use body::{
    AssignTarget, BinaryOp, Body, BodyBuilder, Callee, Expr, ExprKind, Local, LocalKind,
    ScopeData, Stmt, StmtKind, TypeRef, UnaryOp,
};
pub use decl::{AccessorKind, Annotation, ConstValue, DeclKind, DeclTree, Declaration};
pub use ids::{DeclId, ExprId, LocalId, ScopeId, StmtId};
pub use types::Type;
