//! Free-variable analysis of an extraction region.
//!
//! A local declared outside the region and referenced inside it is captured
//! and becomes a parameter of the extracted declaration. Members and
//! top-level declarations are reached through normal lookup and are never
//! captured. Local functions and classes declared outside the region and used
//! only inside it are relocated into the extracted declaration instead.

use std::collections::HashSet;

use kestrel_core::{Name, Span};
use kestrel_flow::{build_region_cfg, live_locals_after};
use kestrel_hir::{AssignTarget, Body, Callee, DeclId, ExprId, ExprKind, LocalId, LocalKind, StmtId, StmtKind};
use kestrel_resolve::ResolutionContext;

use crate::conflict::Conflict;
use crate::region::ExtractionRegion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureUsage {
    Read,
    Write,
    ReadWrite,
}

impl CaptureUsage {
    fn with_read(self) -> Self {
        match self {
            CaptureUsage::Read => CaptureUsage::Read,
            CaptureUsage::Write | CaptureUsage::ReadWrite => CaptureUsage::ReadWrite,
        }
    }

    fn with_write(self) -> Self {
        match self {
            CaptureUsage::Write => CaptureUsage::Write,
            CaptureUsage::Read | CaptureUsage::ReadWrite => CaptureUsage::ReadWrite,
        }
    }

    pub fn is_written(self) -> bool {
        !matches!(self, CaptureUsage::Read)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedSymbol {
    pub local: LocalId,
    pub name: Name,
    pub usage: CaptureUsage,
    /// Offset of the first reference, used for parameter order.
    pub first_use: usize,
    /// Every reference to rename when the parameter gets a new name, including
    /// references inside relocated declarations.
    pub reference_spans: Vec<Span>,
    /// Reading expressions, used to observe the types at the capture sites.
    pub reference_exprs: Vec<ExprId>,
}

/// A local assigned in the region whose value is needed after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCandidate {
    pub local: LocalId,
    pub name: Name,
    pub declared_in_region: bool,
}

/// A local function or class moved into the extracted declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocatedDeclaration {
    pub local: LocalId,
    pub name: Name,
    pub stmt: StmtId,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CaptureAnalysis {
    /// Ordered by first use.
    pub captures: Vec<CapturedSymbol>,
    pub write_candidates: Vec<WriteCandidate>,
    pub relocated: Vec<RelocatedDeclaration>,
    /// Explicit `this` expressions in the region.
    pub this_references: Vec<Span>,
    /// Members of the owner's class referenced without a receiver.
    pub implicit_member_references: Vec<(Span, DeclId)>,
    /// Members of the owner's class assigned without a receiver.
    pub implicit_member_writes: Vec<Span>,
    /// Locals declared in the region, in declaration order.
    pub declared: Vec<LocalId>,
    pub conflicts: Vec<Conflict>,
}

impl CaptureAnalysis {
    pub fn capture(&self, local: LocalId) -> Option<&CapturedSymbol> {
        self.captures.iter().find(|capture| capture.local == local)
    }

    pub fn uses_receiver(&self) -> bool {
        !self.this_references.is_empty()
            || !self.implicit_member_references.is_empty()
            || !self.implicit_member_writes.is_empty()
    }
}

/// Collects captures, write candidates and relocations for `region`.
pub fn analyze_captures<C>(ctx: &C, body: &Body, region: &ExtractionRegion) -> CaptureAnalysis
where
    C: ResolutionContext + ?Sized,
{
    let span = region.span();
    let mut collector = ReferenceCollector::new(body, span);
    match region {
        ExtractionRegion::Statements { stmts, .. } => {
            for stmt in stmts {
                body.walk_stmt(*stmt, &mut |inner| collector.visit_stmt(inner));
            }
        }
        ExtractionRegion::Expression { expr, .. } => collector.visit_expr(*expr),
    }

    let mut analysis = CaptureAnalysis {
        this_references: collector.this_references.clone(),
        declared: collector.declared.clone(),
        ..CaptureAnalysis::default()
    };

    let owner_container = body
        .owner()
        .and_then(|owner| ctx.declaration(owner))
        .and_then(|owner| owner.container);

    for reference in &collector.references {
        match reference.target {
            Target::Local(local) => {
                let data = body.local(local);
                if span.contains_span(data.span) {
                    continue;
                }
                match data.kind {
                    LocalKind::LocalFunction | LocalKind::LocalClass => {
                        relocate(body, local, span, &mut analysis);
                    }
                    LocalKind::Param | LocalKind::Local => {
                        record_capture(&mut analysis, body, local, reference);
                    }
                }
            }
            Target::Name(expr) => match ctx.resolve_reference(body, expr) {
                Some(decl) => {
                    let is_member = ctx
                        .declaration(decl)
                        .and_then(|decl| decl.container)
                        .is_some_and(|container| Some(container) == owner_container);
                    if is_member {
                        analysis
                            .implicit_member_references
                            .push((reference.span, decl));
                    }
                }
                None => {
                    tracing::debug!(
                        target: "kestrel.refactor",
                        span = ?reference.span,
                        "skipping unresolved reference in extraction region"
                    );
                }
            },
            Target::AssignedName(ref name) => {
                let is_member =
                    owner_container.is_some() && ctx.is_name_taken(body.owner(), name.as_str());
                if is_member {
                    analysis.implicit_member_writes.push(reference.span);
                } else if !ctx.is_name_taken(None, name.as_str()) {
                    analysis.conflicts.push(Conflict::UnresolvedWrite {
                        name: name.to_string(),
                    });
                }
            }
        }
    }

    // Captures of relocated declarations become captures of the extraction.
    for relocated in analysis.relocated.clone() {
        let mut inner = ReferenceCollector::new(body, relocated.span);
        body.walk_stmt(relocated.stmt, &mut |stmt| inner.visit_stmt(stmt));
        for reference in &inner.references {
            let Target::Local(local) = reference.target else {
                continue;
            };
            let data = body.local(local);
            if relocated.span.contains_span(data.span) || span.contains_span(data.span) {
                continue;
            }
            if matches!(data.kind, LocalKind::Param | LocalKind::Local) {
                record_capture(&mut analysis, body, local, reference);
            }
        }
    }
    analysis.captures.sort_by_key(|capture| capture.first_use);

    check_declarations_used_after(body, span, &collector.declared, &mut analysis);
    if let ExtractionRegion::Statements { stmts, .. } = region {
        analysis.write_candidates = write_candidates(body, stmts, span, &collector);
    }

    tracing::debug!(
        target: "kestrel.refactor",
        captures = analysis.captures.len(),
        write_candidates = analysis.write_candidates.len(),
        relocated = analysis.relocated.len(),
        "analyzed captures"
    );
    analysis
}

fn record_capture(
    analysis: &mut CaptureAnalysis,
    body: &Body,
    local: LocalId,
    reference: &Reference,
) {
    let index = match analysis
        .captures
        .iter()
        .position(|capture| capture.local == local)
    {
        Some(index) => index,
        None => {
            analysis.captures.push(CapturedSymbol {
                local,
                name: body.local(local).name.clone(),
                usage: if reference.write {
                    CaptureUsage::Write
                } else {
                    CaptureUsage::Read
                },
                first_use: reference.span.start,
                reference_spans: Vec::new(),
                reference_exprs: Vec::new(),
            });
            analysis.captures.len() - 1
        }
    };
    let capture = &mut analysis.captures[index];
    if reference.read {
        capture.usage = capture.usage.with_read();
    }
    if reference.write {
        capture.usage = capture.usage.with_write();
    }
    capture.first_use = capture.first_use.min(reference.span.start);
    if !capture.reference_spans.contains(&reference.span) {
        capture.reference_spans.push(reference.span);
    }
    if let Some(expr) = reference.expr {
        capture.reference_exprs.push(expr);
    }
}

fn relocate(body: &Body, local: LocalId, region: Span, analysis: &mut CaptureAnalysis) {
    if analysis.relocated.iter().any(|r| r.local == local) {
        return;
    }
    let data = body.local(local);
    let Some(stmt) = body.stmt_ids().find(|stmt| match &body.stmt(*stmt).kind {
        StmtKind::LocalFunction { local: declared, .. } | StmtKind::LocalClass { local: declared } => {
            *declared == local
        }
        _ => false,
    }) else {
        return;
    };
    let decl_span = body.stmt(stmt).span;

    let used_outside = references_to(body, local).into_iter().any(|span| {
        !region.contains_span(span) && !decl_span.contains_span(span)
    });
    if used_outside {
        analysis.conflicts.push(Conflict::LocalDeclarationUsedOutside {
            name: data.name.to_string(),
        });
        return;
    }
    analysis.relocated.push(RelocatedDeclaration {
        local,
        name: data.name.clone(),
        stmt,
        span: decl_span,
    });
}

/// Spans of every expression that refers to `local`.
fn references_to(body: &Body, local: LocalId) -> Vec<Span> {
    let mut out = Vec::new();
    for expr in body.expr_ids() {
        let refers = match &body.expr(expr).kind {
            ExprKind::Local(target) => *target == local,
            ExprKind::Call {
                callee: Callee::Local(target),
                ..
            } => *target == local,
            _ => false,
        };
        if refers && body.expr_stmt(expr).is_some() {
            out.push(body.expr(expr).span);
        }
    }
    for stmt in body.stmt_ids() {
        if let StmtKind::Assign {
            target: AssignTarget::Local(target),
            target_span,
            ..
        } = &body.stmt(stmt).kind
        {
            if *target == local {
                out.push(*target_span);
            }
        }
    }
    out
}

fn check_declarations_used_after(
    body: &Body,
    region: Span,
    declared: &[LocalId],
    analysis: &mut CaptureAnalysis,
) {
    for local in declared {
        let data = body.local(*local);
        if !matches!(data.kind, LocalKind::LocalFunction | LocalKind::LocalClass) {
            continue;
        }
        let used_after = references_to(body, *local)
            .into_iter()
            .any(|span| span.start >= region.end);
        if used_after {
            analysis.conflicts.push(Conflict::DeclarationUsedAfter {
                name: data.name.to_string(),
            });
        }
    }
}

fn write_candidates(
    body: &Body,
    stmts: &[StmtId],
    region: Span,
    collector: &ReferenceCollector<'_>,
) -> Vec<WriteCandidate> {
    let (cfg, blocks) = build_region_cfg(body, stmts);
    let live_after = live_locals_after(body, &cfg, blocks);

    let mut out: Vec<WriteCandidate> = Vec::new();
    for local in &collector.written {
        let data = body.local(*local);
        if !matches!(data.kind, LocalKind::Param | LocalKind::Local) {
            continue;
        }
        let declared_in_region = region.contains_span(data.span);
        let needed = if declared_in_region {
            // A declaration moves into the extracted body; any later use needs it.
            live_after.contains(local)
                || references_to(body, *local)
                    .into_iter()
                    .any(|span| span.start >= region.end)
        } else {
            live_after.contains(local)
        };
        if needed && !out.iter().any(|candidate| candidate.local == *local) {
            out.push(WriteCandidate {
                local: *local,
                name: data.name.clone(),
                declared_in_region,
            });
        }
    }
    out
}

#[derive(Debug, Clone)]
enum Target {
    Local(LocalId),
    /// A non-local name, resolved through the oracle.
    Name(ExprId),
    /// A non-local name assigned without a receiver.
    AssignedName(Name),
}

#[derive(Debug, Clone)]
struct Reference {
    target: Target,
    span: Span,
    expr: Option<ExprId>,
    read: bool,
    write: bool,
}

struct ReferenceCollector<'a> {
    body: &'a Body,
    region: Span,
    references: Vec<Reference>,
    this_references: Vec<Span>,
    /// Locals declared in the region.
    declared: Vec<LocalId>,
    /// Locals assigned or declared with a value in the region, in order.
    written: Vec<LocalId>,
    seen_exprs: HashSet<ExprId>,
}

impl<'a> ReferenceCollector<'a> {
    fn new(body: &'a Body, region: Span) -> Self {
        Self {
            body,
            region,
            references: Vec::new(),
            this_references: Vec::new(),
            declared: Vec::new(),
            written: Vec::new(),
            seen_exprs: HashSet::new(),
        }
    }

    fn visit_stmt(&mut self, stmt: StmtId) {
        let body = self.body;
        match &body.stmt(stmt).kind {
            StmtKind::Let { local, .. } => {
                self.declare(*local);
                self.written.push(*local);
            }
            StmtKind::For { local, .. } => self.declare(*local),
            StmtKind::LocalFunction { local, params, .. } => {
                self.declare(*local);
                for param in params {
                    self.declare(*param);
                }
            }
            StmtKind::LocalClass { local } => self.declare(*local),
            StmtKind::Assign {
                target,
                target_span,
                op,
                ..
            } => match target {
                AssignTarget::Local(local) => {
                    self.references.push(Reference {
                        target: Target::Local(*local),
                        span: *target_span,
                        expr: None,
                        read: op.is_some(),
                        write: true,
                    });
                    self.written.push(*local);
                }
                AssignTarget::Name(name) => self.references.push(Reference {
                    target: Target::AssignedName(name.clone()),
                    span: *target_span,
                    expr: None,
                    read: false,
                    write: true,
                }),
                AssignTarget::Field { .. } => {}
            },
            _ => {}
        }
        for expr in body.stmt_exprs(stmt) {
            self.visit_expr(expr);
        }
    }

    fn declare(&mut self, local: LocalId) {
        if self.region.contains_span(self.body.local(local).span) && !self.declared.contains(&local) {
            self.declared.push(local);
        }
    }

    fn visit_expr(&mut self, root: ExprId) {
        let body = self.body;
        let mut found = Vec::new();
        body.walk_expr(root, &mut |expr| found.push(expr));
        for expr in found {
            if !self.seen_exprs.insert(expr) {
                continue;
            }
            let data = body.expr(expr);
            match &data.kind {
                ExprKind::Local(local) => self.references.push(Reference {
                    target: Target::Local(*local),
                    span: data.span,
                    expr: Some(expr),
                    read: true,
                    write: false,
                }),
                ExprKind::Call {
                    callee: Callee::Local(local),
                    callee_span,
                    ..
                } => self.references.push(Reference {
                    target: Target::Local(*local),
                    span: *callee_span,
                    expr: None,
                    read: true,
                    write: false,
                }),
                ExprKind::Call {
                    receiver: None,
                    callee: Callee::Name(_),
                    callee_span,
                    ..
                } => self.references.push(Reference {
                    target: Target::Name(expr),
                    span: *callee_span,
                    expr: Some(expr),
                    read: true,
                    write: false,
                }),
                ExprKind::Name(_) => self.references.push(Reference {
                    target: Target::Name(expr),
                    span: data.span,
                    expr: Some(expr),
                    read: true,
                    write: false,
                }),
                ExprKind::This => self.this_references.push(data.span),
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use kestrel_core::Span;
    use kestrel_hir::{BodyBuilder, DeclTree, Local};

    use super::*;

    fn local(name: &str, kind: LocalKind, start: usize, scope: kestrel_hir::ScopeId) -> Local {
        Local {
            name: Name::new(name),
            kind,
            span: Span::new(start, start + name.len()),
            decl_span: Span::new(start, start + name.len()),
            scope,
            ty: None,
            mutable: true,
        }
    }

    // fun f(a) { var b = a; b = b + 1; use(b) }
    //  offsets:   a@6, b@16, assign@23, use@34
    #[test]
    fn outer_local_written_and_live_is_a_write_candidate() {
        let mut b = BodyBuilder::new(Span::new(0, 50));
        let scope = b.root_scope();
        let a = b.alloc_local(local("a", LocalKind::Param, 6, scope));
        let bl = b.alloc_local(local("b", LocalKind::Local, 16, scope));

        let read_a = b.alloc_expr(ExprKind::Local(a), Span::new(20, 21), scope);
        let let_b = b.alloc_stmt(
            StmtKind::Let {
                local: bl,
                initializer: Some(read_a),
            },
            Span::new(12, 21),
            scope,
        );
        let read_b = b.alloc_expr(ExprKind::Local(bl), Span::new(27, 28), scope);
        let one = b.alloc_expr(ExprKind::Int(1), Span::new(31, 32), scope);
        let sum = b.alloc_expr(
            ExprKind::Binary {
                op: kestrel_hir::BinaryOp::Add,
                lhs: read_b,
                rhs: one,
            },
            Span::new(27, 32),
            scope,
        );
        let assign = b.alloc_stmt(
            StmtKind::Assign {
                target: AssignTarget::Local(bl),
                target_span: Span::new(23, 24),
                op: None,
                value: sum,
            },
            Span::new(23, 32),
            scope,
        );
        let read_b2 = b.alloc_expr(ExprKind::Local(bl), Span::new(38, 39), scope);
        let use_b = b.alloc_stmt(StmtKind::Expr(read_b2), Span::new(34, 40), scope);
        let root = b.alloc_stmt(StmtKind::Block(vec![let_b, assign, use_b]), Span::new(10, 42), scope);
        let body = b.finish(root);

        let region = ExtractionRegion::Statements {
            stmts: vec![assign],
            span: Span::new(23, 32),
        };
        let analysis = analyze_captures(&DeclTree::new(), &body, &region);
        assert_eq!(analysis.captures.len(), 1);
        assert_eq!(analysis.captures[0].local, bl);
        assert_eq!(analysis.captures[0].usage, CaptureUsage::ReadWrite);
        assert_eq!(
            analysis.write_candidates,
            vec![WriteCandidate {
                local: bl,
                name: Name::new("b"),
                declared_in_region: false,
            }]
        );
        assert!(analysis.conflicts.is_empty());
    }
}
