use kestrel_core::{Diagnostic, Span};
use kestrel_hir::{
    Body, Callee, DeclId, DeclTree, Declaration, ExprId, ExprKind, LocalId, Type,
};

/// Type-checker diagnostic for a `java.lang.Class` value passed as an
/// annotation argument, where only class literals are allowed.
pub const JAVA_LANG_CLASS_ARGUMENT_IN_ANNOTATION: &str = "JAVA_LANG_CLASS_ARGUMENT_IN_ANNOTATION";

/// A call whose target has been resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedCall {
    pub call: ExprId,
    pub target: DeclId,
    /// Span of the callee name, if the call has one in source.
    pub callee: Option<Span>,
}

/// The resolution oracle: answers "what does this reference resolve to" and
/// "what is the type of this expression" for one immutable snapshot.
///
/// Implementations must be side-effect free; every analysis request may query
/// them any number of times.
pub trait ResolutionContext {
    fn declaration(&self, id: DeclId) -> Option<&Declaration>;

    /// Resolves a non-local reference (`ExprKind::Name`, a call or a field access).
    fn resolve_reference(&self, body: &Body, expr: ExprId) -> Option<DeclId>;

    fn resolve_call(&self, body: &Body, expr: ExprId) -> Option<ResolvedCall> {
        let ExprKind::Call { callee_span, .. } = &body.expr(expr).kind else {
            return None;
        };
        let target = self.resolve_reference(body, expr)?;
        Some(ResolvedCall {
            call: expr,
            target,
            callee: Some(*callee_span),
        })
    }

    fn type_of(&self, body: &Body, expr: ExprId) -> Option<Type>;

    fn type_of_local(&self, body: &Body, local: LocalId) -> Option<Type>;

    fn overrides_of(&self, decl: DeclId) -> Vec<DeclId> {
        self.declaration(decl)
            .map(|decl| decl.overrides.clone())
            .unwrap_or_default()
    }

    /// Nearest common supertype of `types`. The default only knows that a type
    /// is its own supertype.
    fn common_supertype(&self, types: &[Type]) -> Option<Type> {
        let (first, rest) = types.split_first()?;
        rest.iter().all(|ty| ty == first).then(|| first.clone())
    }

    /// `true` when `name` is already declared next to `owner` (or at top level
    /// when `owner` is `None`).
    fn is_name_taken(&self, owner: Option<DeclId>, name: &str) -> bool {
        let _ = (owner, name);
        false
    }

    /// Diagnostics the type checker reported for the snapshot.
    fn diagnostics(&self) -> &[Diagnostic] {
        &[]
    }
}

/// Name-based resolution against the tree. Members of the body owner's
/// container are searched before top-level declarations.
impl ResolutionContext for DeclTree {
    fn declaration(&self, id: DeclId) -> Option<&Declaration> {
        self.get(id)
    }

    fn resolve_reference(&self, body: &Body, expr: ExprId) -> Option<DeclId> {
        let name = match &body.expr(expr).kind {
            ExprKind::Name(name) => name,
            ExprKind::Call {
                callee: Callee::Name(name),
                ..
            } => name,
            ExprKind::FieldAccess { name, .. } => name,
            _ => return None,
        };
        let container = body
            .owner()
            .and_then(|owner| self.get(owner))
            .and_then(|owner| owner.container);
        container
            .and_then(|container| self.find_by_name(Some(container), name.as_str()))
            .or_else(|| self.find_by_name(None, name.as_str()))
    }

    fn type_of(&self, body: &Body, expr: ExprId) -> Option<Type> {
        match &body.expr(expr).kind {
            ExprKind::Bool(_) => Some(Type::boolean()),
            ExprKind::Int(_) => Some(Type::int()),
            ExprKind::String(_) => Some(Type::string()),
            ExprKind::Local(local) => self.type_of_local(body, *local),
            _ => self
                .resolve_reference(body, expr)
                .and_then(|decl| self.get(decl))
                .and_then(|decl| decl.ty.clone()),
        }
    }

    fn type_of_local(&self, body: &Body, local: LocalId) -> Option<Type> {
        body.local(local)
            .ty
            .as_ref()
            .map(|ty| Type::named(ty.text.trim()))
    }

    fn is_name_taken(&self, owner: Option<DeclId>, name: &str) -> bool {
        let container = owner.and_then(|owner| self.get(owner)).and_then(|d| d.container);
        self.find_by_name(container, name).is_some()
    }
}
