//! Arena representation of a single declaration body.
//!
//! Every statement and expression carries the byte span it was lowered from so
//! that refactorings can slice the original source text. Locals (parameters,
//! variables, local functions and local classes) are resolved during lowering;
//! anything else is kept as an unresolved [`ExprKind::Name`] and answered by the
//! resolution oracle.

use kestrel_core::{Name, Span};

use crate::ids::{DeclId, ExprId, LocalId, ScopeId, StmtId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalKind {
    Param,
    Local,
    LocalFunction,
    LocalClass,
}

/// A type annotation as written in source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeRef {
    pub text: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Local {
    pub name: Name,
    pub kind: LocalKind,
    /// Span of the name token.
    pub span: Span,
    /// Span of the whole declaring construct (`val x = 1`, `fun f() { .. }`).
    pub decl_span: Span,
    /// Home scope.
    pub scope: ScopeId,
    pub ty: Option<TypeRef>,
    pub mutable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeData {
    pub parent: Option<ScopeId>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    And,
    Or,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Less
                | BinaryOp::LessEq
                | BinaryOp::Greater
                | BinaryOp::GreaterEq
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callee {
    Local(LocalId),
    Name(Name),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprKind {
    Local(LocalId),
    /// A reference that is not a local: members, top-level declarations, imports.
    Name(Name),
    This,
    Null,
    Bool(bool),
    Int(i64),
    String(String),
    Unary {
        op: UnaryOp,
        expr: ExprId,
    },
    Binary {
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
    },
    Call {
        receiver: Option<ExprId>,
        callee: Callee,
        callee_span: Span,
        type_args: Vec<TypeRef>,
        args: Vec<ExprId>,
    },
    FieldAccess {
        receiver: ExprId,
        name: Name,
    },
    /// `T::class`
    ClassLiteral {
        ty: TypeRef,
    },
    Invalid {
        children: Vec<ExprId>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    pub scope: ScopeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignTarget {
    Local(LocalId),
    Name(Name),
    Field { receiver: ExprId, name: Name },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StmtKind {
    Block(Vec<StmtId>),
    Let {
        local: LocalId,
        initializer: Option<ExprId>,
    },
    Assign {
        target: AssignTarget,
        target_span: Span,
        /// `Some` for compound assignments (`x += 1`), which also read the target.
        op: Option<BinaryOp>,
        value: ExprId,
    },
    Expr(ExprId),
    If {
        condition: ExprId,
        then_branch: StmtId,
        else_branch: Option<StmtId>,
    },
    While {
        label: Option<Name>,
        condition: ExprId,
        body: StmtId,
    },
    DoWhile {
        label: Option<Name>,
        body: StmtId,
        condition: ExprId,
    },
    For {
        label: Option<Name>,
        local: LocalId,
        iterable: ExprId,
        body: StmtId,
    },
    Return {
        label: Option<Name>,
        value: Option<ExprId>,
    },
    Break {
        label: Option<Name>,
    },
    Continue {
        label: Option<Name>,
    },
    Throw(ExprId),
    LocalFunction {
        local: LocalId,
        params: Vec<LocalId>,
        body: StmtId,
    },
    LocalClass {
        local: LocalId,
    },
    Nop,
}

impl StmtKind {
    pub fn is_loop(&self) -> bool {
        matches!(
            self,
            StmtKind::While { .. } | StmtKind::DoWhile { .. } | StmtKind::For { .. }
        )
    }

    pub fn loop_label(&self) -> Option<&Name> {
        match self {
            StmtKind::While { label, .. }
            | StmtKind::DoWhile { label, .. }
            | StmtKind::For { label, .. } => label.as_ref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
    pub scope: ScopeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body {
    stmts: Vec<Stmt>,
    exprs: Vec<Expr>,
    locals: Vec<Local>,
    scopes: Vec<ScopeData>,
    root: StmtId,
    span: Span,
    owner: Option<DeclId>,
    owner_name: Option<Name>,
    stmt_parents: Vec<Option<StmtId>>,
    expr_stmts: Vec<Option<StmtId>>,
}

impl Body {
    #[must_use]
    pub fn root(&self) -> StmtId {
        self.root
    }

    /// Span of the whole owning declaration (parameters included).
    #[must_use]
    pub fn span(&self) -> Span {
        self.span
    }

    #[must_use]
    pub fn owner(&self) -> Option<DeclId> {
        self.owner
    }

    /// Name of the owning function, used to resolve labelled returns (`return@f`).
    #[must_use]
    pub fn owner_name(&self) -> Option<&Name> {
        self.owner_name.as_ref()
    }

    #[must_use]
    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.idx()]
    }

    #[must_use]
    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.idx()]
    }

    #[must_use]
    pub fn local(&self, id: LocalId) -> &Local {
        &self.locals[id.idx()]
    }

    #[must_use]
    pub fn locals(&self) -> &[Local] {
        &self.locals
    }

    #[must_use]
    pub fn scope(&self, id: ScopeId) -> &ScopeData {
        &self.scopes[id.idx()]
    }

    pub fn stmt_ids(&self) -> impl Iterator<Item = StmtId> + '_ {
        (0..self.stmts.len()).map(StmtId::from_raw)
    }

    pub fn expr_ids(&self) -> impl Iterator<Item = ExprId> + '_ {
        (0..self.exprs.len()).map(ExprId::from_raw)
    }

    pub fn local_ids(&self) -> impl Iterator<Item = LocalId> + '_ {
        (0..self.locals.len()).map(LocalId::from_raw)
    }

    /// Parameters of the owning declaration (not of nested local functions).
    pub fn params(&self) -> impl Iterator<Item = LocalId> + '_ {
        let root_scope = ScopeId::from_raw(0);
        self.local_ids().filter(move |local| {
            let data = self.local(*local);
            data.kind == LocalKind::Param && data.scope == root_scope
        })
    }

    #[must_use]
    pub fn parent(&self, stmt: StmtId) -> Option<StmtId> {
        self.stmt_parents[stmt.idx()]
    }

    /// Strict ancestors of `stmt`, innermost first.
    pub fn ancestors(&self, stmt: StmtId) -> impl Iterator<Item = StmtId> + '_ {
        std::iter::successors(self.parent(stmt), move |s| self.parent(*s))
    }

    /// The statement an expression belongs to.
    #[must_use]
    pub fn expr_stmt(&self, expr: ExprId) -> Option<StmtId> {
        self.expr_stmts[expr.idx()]
    }

    /// The scope chain starting at `scope`, innermost first.
    pub fn scope_chain(&self, scope: ScopeId) -> impl Iterator<Item = ScopeId> + '_ {
        std::iter::successors(Some(scope), move |s| self.scope(*s).parent)
    }

    /// `true` when `inner` is `outer` or nested inside it.
    #[must_use]
    pub fn scope_is_within(&self, inner: ScopeId, outer: ScopeId) -> bool {
        self.scope_chain(inner).any(|s| s == outer)
    }

    /// Locals that are visible by simple name at `offset` inside `scope`.
    ///
    /// Shadowed locals are omitted; the innermost declaration wins.
    pub fn locals_visible_at(&self, scope: ScopeId, offset: usize) -> Vec<LocalId> {
        let chain: Vec<ScopeId> = self.scope_chain(scope).collect();
        let mut out: Vec<LocalId> = Vec::new();
        for s in chain {
            for local in self.local_ids() {
                let data = self.local(local);
                if data.scope != s {
                    continue;
                }
                if data.kind != LocalKind::Param && data.span.start >= offset {
                    continue;
                }
                if out.iter().any(|seen| self.local(*seen).name == data.name) {
                    continue;
                }
                out.push(local);
            }
        }
        out
    }

    /// Direct child statements of `stmt`.
    pub fn child_stmts(&self, stmt: StmtId) -> Vec<StmtId> {
        match &self.stmt(stmt).kind {
            StmtKind::Block(stmts) => stmts.clone(),
            StmtKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                let mut out = vec![*then_branch];
                out.extend(*else_branch);
                out
            }
            StmtKind::While { body, .. }
            | StmtKind::DoWhile { body, .. }
            | StmtKind::For { body, .. }
            | StmtKind::LocalFunction { body, .. } => vec![*body],
            StmtKind::Let { .. }
            | StmtKind::Assign { .. }
            | StmtKind::Expr(_)
            | StmtKind::Return { .. }
            | StmtKind::Break { .. }
            | StmtKind::Continue { .. }
            | StmtKind::Throw(_)
            | StmtKind::LocalClass { .. }
            | StmtKind::Nop => Vec::new(),
        }
    }

    /// Expressions owned directly by `stmt` (not by its child statements).
    pub fn stmt_exprs(&self, stmt: StmtId) -> Vec<ExprId> {
        match &self.stmt(stmt).kind {
            StmtKind::Let { initializer, .. } => initializer.iter().copied().collect(),
            StmtKind::Assign { target, value, .. } => {
                let mut out = Vec::new();
                if let AssignTarget::Field { receiver, .. } = target {
                    out.push(*receiver);
                }
                out.push(*value);
                out
            }
            StmtKind::Expr(expr) | StmtKind::Throw(expr) => vec![*expr],
            StmtKind::If { condition, .. }
            | StmtKind::While { condition, .. }
            | StmtKind::DoWhile { condition, .. } => vec![*condition],
            StmtKind::For { iterable, .. } => vec![*iterable],
            StmtKind::Return { value, .. } => value.iter().copied().collect(),
            StmtKind::Block(_)
            | StmtKind::Break { .. }
            | StmtKind::Continue { .. }
            | StmtKind::LocalFunction { .. }
            | StmtKind::LocalClass { .. }
            | StmtKind::Nop => Vec::new(),
        }
    }

    pub fn expr_children(&self, expr: ExprId) -> Vec<ExprId> {
        match &self.expr(expr).kind {
            ExprKind::Unary { expr, .. } => vec![*expr],
            ExprKind::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
            ExprKind::Call { receiver, args, .. } => {
                let mut out: Vec<ExprId> = receiver.iter().copied().collect();
                out.extend(args.iter().copied());
                out
            }
            ExprKind::FieldAccess { receiver, .. } => vec![*receiver],
            ExprKind::Invalid { children } => children.clone(),
            ExprKind::Local(_)
            | ExprKind::Name(_)
            | ExprKind::This
            | ExprKind::Null
            | ExprKind::Bool(_)
            | ExprKind::Int(_)
            | ExprKind::String(_)
            | ExprKind::ClassLiteral { .. } => Vec::new(),
        }
    }

    /// Pre-order walk over `expr` and all of its sub-expressions.
    pub fn walk_expr(&self, expr: ExprId, f: &mut dyn FnMut(ExprId)) {
        f(expr);
        for child in self.expr_children(expr) {
            self.walk_expr(child, f);
        }
    }

    /// Pre-order walk over `stmt` and all nested statements.
    pub fn walk_stmt(&self, stmt: StmtId, f: &mut dyn FnMut(StmtId)) {
        f(stmt);
        for child in self.child_stmts(stmt) {
            self.walk_stmt(child, f);
        }
    }
}

/// Incrementally builds a [`Body`].
///
/// Lowering code allocates children before parents, then calls [`BodyBuilder::finish`]
/// with the root statement.
#[derive(Debug)]
pub struct BodyBuilder {
    stmts: Vec<Stmt>,
    exprs: Vec<Expr>,
    locals: Vec<Local>,
    scopes: Vec<ScopeData>,
    span: Span,
    owner: Option<DeclId>,
    owner_name: Option<Name>,
}

impl BodyBuilder {
    pub fn new(span: Span) -> Self {
        Self {
            stmts: Vec::new(),
            exprs: Vec::new(),
            locals: Vec::new(),
            scopes: vec![ScopeData { parent: None, span }],
            span,
            owner: None,
            owner_name: None,
        }
    }

    #[must_use]
    pub fn with_owner(mut self, owner: DeclId, name: impl Into<Name>) -> Self {
        self.owner = Some(owner);
        self.owner_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_owner_name(mut self, name: impl Into<Name>) -> Self {
        self.owner_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn root_scope(&self) -> ScopeId {
        ScopeId::from_raw(0)
    }

    /// Update the owning declaration's span once its end is known.
    pub fn set_span(&mut self, span: Span) {
        self.span = span;
        self.scopes[0].span = span;
    }

    pub fn set_scope_span(&mut self, scope: ScopeId, span: Span) {
        self.scopes[scope.idx()].span = span;
    }

    #[must_use]
    pub fn scope_span(&self, scope: ScopeId) -> Span {
        self.scopes[scope.idx()].span
    }

    /// An expression allocated so far.
    #[must_use]
    pub fn expr_data(&self, expr: ExprId) -> &Expr {
        &self.exprs[expr.idx()]
    }

    pub fn alloc_scope(&mut self, parent: ScopeId, span: Span) -> ScopeId {
        let id = ScopeId::from_raw(self.scopes.len());
        self.scopes.push(ScopeData {
            parent: Some(parent),
            span,
        });
        id
    }

    pub fn alloc_local(&mut self, local: Local) -> LocalId {
        let id = LocalId::from_raw(self.locals.len());
        self.locals.push(local);
        id
    }

    /// Patch the declaring span once the whole construct has been lowered.
    pub fn set_local_decl_span(&mut self, local: LocalId, decl_span: Span) {
        self.locals[local.idx()].decl_span = decl_span;
    }

    pub fn set_local_type(&mut self, local: LocalId, ty: TypeRef) {
        self.locals[local.idx()].ty = Some(ty);
    }

    pub fn alloc_expr(&mut self, kind: ExprKind, span: Span, scope: ScopeId) -> ExprId {
        let id = ExprId::from_raw(self.exprs.len());
        self.exprs.push(Expr { kind, span, scope });
        id
    }

    pub fn alloc_stmt(&mut self, kind: StmtKind, span: Span, scope: ScopeId) -> StmtId {
        let id = StmtId::from_raw(self.stmts.len());
        self.stmts.push(Stmt { kind, span, scope });
        id
    }

    pub fn finish(self, root: StmtId) -> Body {
        let mut body = Body {
            stmt_parents: vec![None; self.stmts.len()],
            expr_stmts: vec![None; self.exprs.len()],
            stmts: self.stmts,
            exprs: self.exprs,
            locals: self.locals,
            scopes: self.scopes,
            root,
            span: self.span,
            owner: self.owner,
            owner_name: self.owner_name,
        };

        let mut stmt_parents = vec![None; body.stmts.len()];
        let mut expr_stmts = vec![None; body.exprs.len()];
        let mut stack = vec![root];
        while let Some(stmt) = stack.pop() {
            for child in body.child_stmts(stmt) {
                stmt_parents[child.idx()] = Some(stmt);
                stack.push(child);
            }
            for expr in body.stmt_exprs(stmt) {
                body.walk_expr(expr, &mut |e| expr_stmts[e.idx()] = Some(stmt));
            }
        }
        body.stmt_parents = stmt_parents;
        body.expr_stmts = expr_stmts;
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(name: &str, kind: LocalKind, start: usize, scope: ScopeId) -> Local {
        Local {
            name: Name::new(name),
            kind,
            span: Span::new(start, start + name.len()),
            decl_span: Span::new(start, start + name.len()),
            scope,
            ty: None,
            mutable: false,
        }
    }

    #[test]
    fn parents_and_visibility() {
        let mut b = BodyBuilder::new(Span::new(0, 100));
        let root_scope = b.root_scope();
        let a = b.alloc_local(local("a", LocalKind::Param, 6, root_scope));
        let inner = b.alloc_scope(root_scope, Span::new(20, 90));
        let x = b.alloc_local(local("x", LocalKind::Local, 30, inner));
        let shadow = b.alloc_local(local("a", LocalKind::Local, 50, inner));

        let init = b.alloc_expr(ExprKind::Local(a), Span::new(34, 35), inner);
        let let_x = b.alloc_stmt(
            StmtKind::Let {
                local: x,
                initializer: Some(init),
            },
            Span::new(26, 35),
            inner,
        );
        let block = b.alloc_stmt(StmtKind::Block(vec![let_x]), Span::new(20, 90), inner);
        let body = b.finish(block);

        assert_eq!(body.parent(let_x), Some(block));
        assert_eq!(body.expr_stmt(init), Some(let_x));
        assert_eq!(body.ancestors(let_x).collect::<Vec<_>>(), vec![block]);
        assert!(body.scope_is_within(inner, root_scope));

        assert_eq!(body.locals_visible_at(inner, 40), vec![x, a]);
        assert_eq!(body.locals_visible_at(inner, 60), vec![x, shadow]);
        assert_eq!(body.params().collect::<Vec<_>>(), vec![a]);
    }
}
