use std::collections::{HashMap, HashSet};

use kestrel_hir::{AssignTarget, Body, Callee, ExprId, ExprKind, LocalId, StmtId, StmtKind};

use crate::build::RegionBlocks;
use crate::cfg::{BlockId, ControlFlowGraph, Terminator};

/// Backwards liveness over a [`ControlFlowGraph`].
#[derive(Debug, Clone)]
pub struct Liveness {
    pub live_in: Vec<HashSet<LocalId>>,
    pub live_out: Vec<HashSet<LocalId>>,
}

impl Liveness {
    #[must_use]
    pub fn compute(body: &Body, cfg: &ControlFlowGraph) -> Self {
        let uses = LocalFunctionUses::collect(body);
        let n = cfg.blocks.len();
        let mut live_in: Vec<HashSet<LocalId>> = vec![HashSet::new(); n];
        let mut live_out: Vec<HashSet<LocalId>> = vec![HashSet::new(); n];

        loop {
            let mut changed = false;

            for idx in (0..n).rev() {
                let bb_id = BlockId(idx);

                let mut out = HashSet::new();
                for succ in cfg.successors(bb_id) {
                    out.extend(live_in[succ.index()].iter().copied());
                }

                let mut live = out.clone();
                add_terminator_uses(body, &uses, &cfg.block(bb_id).terminator, &mut live);
                for stmt in cfg.block(bb_id).stmts.iter().rev() {
                    transfer_stmt(body, &uses, *stmt, &mut live);
                }

                if live != live_in[idx] {
                    live_in[idx] = live;
                    changed = true;
                }
                if out != live_out[idx] {
                    live_out[idx] = out;
                    changed = true;
                }
            }

            if !changed {
                break;
            }
        }

        Self { live_in, live_out }
    }
}

/// Locals that may be read after control leaves `region`, through normal
/// completion or through a jump.
#[must_use]
pub fn live_locals_after(
    body: &Body,
    cfg: &ControlFlowGraph,
    region: RegionBlocks,
) -> HashSet<LocalId> {
    if region.is_empty() {
        return HashSet::new();
    }
    let liveness = Liveness::compute(body, cfg);

    let mut out = HashSet::new();
    for idx in region.start..region.end {
        for succ in cfg.successors(BlockId(idx)) {
            if region.contains(succ) {
                continue;
            }
            out.extend(liveness.live_in[succ.index()].iter().copied());
        }
    }
    tracing::trace!(target: "kestrel.flow", live = out.len(), "computed liveness after region");
    out
}

/// Outer locals read by each local function; a call to the function reads them.
struct LocalFunctionUses {
    by_function: HashMap<LocalId, Vec<LocalId>>,
}

impl LocalFunctionUses {
    fn collect(body: &Body) -> Self {
        let mut by_function = HashMap::new();
        for stmt in body.stmt_ids() {
            let StmtKind::LocalFunction {
                local,
                body: fn_body,
                ..
            } = &body.stmt(stmt).kind
            else {
                continue;
            };
            let fn_span = body.stmt(stmt).span;
            let mut reads = Vec::new();
            body.walk_stmt(*fn_body, &mut |inner| {
                for expr in body.stmt_exprs(inner) {
                    body.walk_expr(expr, &mut |e| {
                        if let ExprKind::Local(read) = body.expr(e).kind {
                            let declared_inside =
                                fn_span.contains_span(body.local(read).decl_span);
                            if !declared_inside && !reads.contains(&read) {
                                reads.push(read);
                            }
                        }
                    });
                }
            });
            by_function.insert(*local, reads);
        }
        Self { by_function }
    }

    fn reads_of(&self, function: LocalId) -> &[LocalId] {
        self.by_function
            .get(&function)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

fn transfer_stmt(body: &Body, uses: &LocalFunctionUses, stmt: StmtId, live: &mut HashSet<LocalId>) {
    match &body.stmt(stmt).kind {
        StmtKind::Let { local, initializer } => {
            live.remove(local);
            if let Some(init) = initializer {
                add_expr_uses(body, uses, *init, live);
            }
        }
        StmtKind::Assign {
            target, op, value, ..
        } => {
            match target {
                AssignTarget::Local(local) => {
                    if op.is_some() {
                        live.insert(*local);
                    } else {
                        live.remove(local);
                    }
                }
                AssignTarget::Field { receiver, .. } => add_expr_uses(body, uses, *receiver, live),
                AssignTarget::Name(_) => {}
            }
            add_expr_uses(body, uses, *value, live);
        }
        StmtKind::Expr(expr) => add_expr_uses(body, uses, *expr, live),
        StmtKind::LocalFunction { .. } | StmtKind::LocalClass { .. } | StmtKind::Nop => {}
        // Control-flow statements do not appear in `BasicBlock.stmts`.
        other => {
            debug_assert!(
                matches!(
                    other,
                    StmtKind::Block(_)
                        | StmtKind::If { .. }
                        | StmtKind::While { .. }
                        | StmtKind::DoWhile { .. }
                        | StmtKind::For { .. }
                        | StmtKind::Return { .. }
                        | StmtKind::Break { .. }
                        | StmtKind::Continue { .. }
                        | StmtKind::Throw(_)
                ),
                "unexpected statement in basic block: {other:?}"
            );
        }
    }
}

fn add_terminator_uses(
    body: &Body,
    uses: &LocalFunctionUses,
    term: &Terminator,
    live: &mut HashSet<LocalId>,
) {
    match term {
        Terminator::If { condition, .. } => add_expr_uses(body, uses, *condition, live),
        Terminator::Return { value, .. } => {
            if let Some(value) = value {
                add_expr_uses(body, uses, *value, live);
            }
        }
        Terminator::Throw { exception, .. } => add_expr_uses(body, uses, *exception, live),
        Terminator::Goto { .. } | Terminator::Exit => {}
    }
}

fn add_expr_uses(body: &Body, uses: &LocalFunctionUses, expr: ExprId, live: &mut HashSet<LocalId>) {
    body.walk_expr(expr, &mut |e| match &body.expr(e).kind {
        ExprKind::Local(local) => {
            live.insert(*local);
        }
        ExprKind::Call {
            callee: Callee::Local(function),
            ..
        } => {
            live.extend(uses.reads_of(*function).iter().copied());
        }
        _ => {}
    });
}
