//! Classification of the ways control can leave an extraction region.

use kestrel_core::{Name, Span};
use kestrel_hir::{AssignTarget, Body, ExprId, LocalId, StmtId, StmtKind};

use crate::build::is_literal_true;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitKind {
    /// Control reaches the textual end of the region.
    FallThrough,
    /// A `return` carrying a value.
    ValueExit,
    /// A jump without a payload: `break`, `continue` or a bare `return`.
    Jump,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JumpKind {
    Break,
    Continue,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExitTarget {
    RegionEnd,
    /// The enclosing function (`return` or `return@owner`).
    Function { label: Option<Name> },
    /// A loop enclosing the region.
    Loop {
        stmt: StmtId,
        label: Option<Name>,
        jump: JumpKind,
    },
    /// A labelled jump whose label matches nothing around the region.
    Unresolved { label: Name },
}

impl ExitTarget {
    /// `true` for exits that leave the region somewhere other than its end.
    pub fn is_forced(&self) -> bool {
        !matches!(self, ExitTarget::RegionEnd)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitPath {
    pub kind: ExitKind,
    /// The jump statement; `None` for fall-through.
    pub stmt: Option<StmtId>,
    pub value: Option<ExprId>,
    pub target: ExitTarget,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegionExits {
    /// Exits in textual order; a fall-through exit, when present, comes last.
    pub exits: Vec<ExitPath>,
    pub falls_through: bool,
}

impl RegionExits {
    pub fn forced(&self) -> impl Iterator<Item = &ExitPath> {
        self.exits.iter().filter(|exit| exit.target.is_forced())
    }

    pub fn has_forced_exits(&self) -> bool {
        self.forced().next().is_some()
    }
}

/// Finds every exit of the statements `stmts` (consecutive siblings covering
/// `region`).
///
/// `return`s inside local functions and jumps to loops declared in the region
/// are internal. `throw` propagates on its own and is never an exit.
pub fn classify_region(body: &Body, stmts: &[StmtId], region: Span) -> RegionExits {
    let mut classifier = ExitClassifier {
        body,
        region,
        inner_loops: Vec::new(),
        exits: Vec::new(),
    };
    for stmt in stmts {
        classifier.visit(*stmt);
    }

    let falls_through = seq_completes_normally(body, stmts);
    let mut exits = classifier.exits;
    if falls_through {
        exits.push(ExitPath {
            kind: ExitKind::FallThrough,
            stmt: None,
            value: None,
            target: ExitTarget::RegionEnd,
        });
    }
    tracing::trace!(
        target: "kestrel.flow",
        exits = exits.len(),
        falls_through,
        "classified region exits"
    );
    RegionExits {
        exits,
        falls_through,
    }
}

struct ExitClassifier<'a> {
    body: &'a Body,
    region: Span,
    inner_loops: Vec<(StmtId, Option<Name>)>,
    exits: Vec<ExitPath>,
}

impl ExitClassifier<'_> {
    fn visit(&mut self, stmt: StmtId) {
        let body = self.body;
        match &body.stmt(stmt).kind {
            StmtKind::Block(stmts) => {
                for child in stmts {
                    self.visit(*child);
                }
            }
            StmtKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                self.visit(*then_branch);
                if let Some(else_branch) = else_branch {
                    self.visit(*else_branch);
                }
            }
            StmtKind::While { label, body: inner, .. }
            | StmtKind::DoWhile { label, body: inner, .. }
            | StmtKind::For { label, body: inner, .. } => {
                self.inner_loops.push((stmt, label.clone()));
                self.visit(*inner);
                self.inner_loops.pop();
            }
            StmtKind::Return { label, value } => {
                let target = match label {
                    None => ExitTarget::Function { label: None },
                    Some(label) if body.owner_name() == Some(label) => ExitTarget::Function {
                        label: Some(label.clone()),
                    },
                    Some(label) => ExitTarget::Unresolved {
                        label: label.clone(),
                    },
                };
                let kind = if value.is_some() {
                    ExitKind::ValueExit
                } else {
                    ExitKind::Jump
                };
                self.exits.push(ExitPath {
                    kind,
                    stmt: Some(stmt),
                    value: *value,
                    target,
                });
            }
            StmtKind::Break { label } => self.jump(stmt, label.as_ref(), JumpKind::Break),
            StmtKind::Continue { label } => self.jump(stmt, label.as_ref(), JumpKind::Continue),
            // Returns inside a local function leave that function only.
            StmtKind::LocalFunction { .. } => {}
            StmtKind::Let { .. }
            | StmtKind::Assign { .. }
            | StmtKind::Expr(_)
            | StmtKind::Throw(_)
            | StmtKind::LocalClass { .. }
            | StmtKind::Nop => {}
        }
    }

    fn jump(&mut self, stmt: StmtId, label: Option<&Name>, jump: JumpKind) {
        let internal = match label {
            Some(label) => self
                .inner_loops
                .iter()
                .any(|(_, inner)| inner.as_ref() == Some(label)),
            None => !self.inner_loops.is_empty(),
        };
        if internal {
            return;
        }

        let target = match self.enclosing_loop(stmt, label) {
            Some(loop_stmt) => ExitTarget::Loop {
                stmt: loop_stmt,
                label: self.body.stmt(loop_stmt).kind.loop_label().cloned(),
                jump,
            },
            None => match label {
                Some(label) => ExitTarget::Unresolved {
                    label: label.clone(),
                },
                None => {
                    tracing::debug!(
                        target: "kestrel.flow",
                        ?stmt,
                        "jump outside of any loop"
                    );
                    return;
                }
            },
        };
        self.exits.push(ExitPath {
            kind: ExitKind::Jump,
            stmt: Some(stmt),
            value: None,
            target,
        });
    }

    /// The loop outside the region that `stmt` jumps to.
    fn enclosing_loop(&self, stmt: StmtId, label: Option<&Name>) -> Option<StmtId> {
        self.body.ancestors(stmt).find(|ancestor| {
            let data = self.body.stmt(*ancestor);
            if !data.kind.is_loop() || self.region.contains_span(data.span) {
                return false;
            }
            match label {
                Some(label) => data.kind.loop_label() == Some(label),
                None => true,
            }
        })
    }
}

/// `true` when control can reach the end of the statement sequence.
pub fn seq_completes_normally(body: &Body, stmts: &[StmtId]) -> bool {
    stmts.iter().all(|stmt| completes_normally(body, *stmt))
}

pub fn completes_normally(body: &Body, stmt: StmtId) -> bool {
    match &body.stmt(stmt).kind {
        StmtKind::Block(stmts) => seq_completes_normally(body, stmts),
        StmtKind::If {
            then_branch,
            else_branch,
            ..
        } => match else_branch {
            Some(else_branch) => {
                completes_normally(body, *then_branch) || completes_normally(body, *else_branch)
            }
            None => true,
        },
        StmtKind::While {
            condition,
            body: inner,
            ..
        } => !is_literal_true(body, *condition) || breaks_out_of(body, stmt, *inner),
        StmtKind::DoWhile {
            condition,
            body: inner,
            ..
        } => {
            let reaches_condition =
                completes_normally(body, *inner) || continues_in(body, stmt, *inner);
            (reaches_condition && !is_literal_true(body, *condition))
                || breaks_out_of(body, stmt, *inner)
        }
        StmtKind::For { .. } => true,
        StmtKind::Return { .. }
        | StmtKind::Break { .. }
        | StmtKind::Continue { .. }
        | StmtKind::Throw(_) => false,
        StmtKind::Let { .. }
        | StmtKind::Assign { .. }
        | StmtKind::Expr(_)
        | StmtKind::LocalFunction { .. }
        | StmtKind::LocalClass { .. }
        | StmtKind::Nop => true,
    }
}

fn breaks_out_of(body: &Body, loop_stmt: StmtId, loop_body: StmtId) -> bool {
    targets_loop(body, loop_stmt, loop_body, JumpKind::Break)
}

fn continues_in(body: &Body, loop_stmt: StmtId, loop_body: StmtId) -> bool {
    targets_loop(body, loop_stmt, loop_body, JumpKind::Continue)
}

fn targets_loop(body: &Body, loop_stmt: StmtId, loop_body: StmtId, wanted: JumpKind) -> bool {
    let label = body.stmt(loop_stmt).kind.loop_label().cloned();
    let mut found = false;
    visit_jumps(body, loop_body, 0, &mut |kind, jump_label, depth| {
        let hits = match jump_label {
            Some(jump_label) => label.as_ref() == Some(jump_label),
            None => depth == 0,
        };
        if kind == wanted && hits {
            found = true;
        }
    });
    found
}

/// Visits `break`/`continue` statements, passing the number of loops nested
/// between the start statement and the jump.
fn visit_jumps(
    body: &Body,
    stmt: StmtId,
    depth: usize,
    f: &mut dyn FnMut(JumpKind, Option<&Name>, usize),
) {
    match &body.stmt(stmt).kind {
        StmtKind::Break { label } => f(JumpKind::Break, label.as_ref(), depth),
        StmtKind::Continue { label } => f(JumpKind::Continue, label.as_ref(), depth),
        StmtKind::LocalFunction { .. } => {}
        kind => {
            let depth = if kind.is_loop() { depth + 1 } else { depth };
            for child in body.child_stmts(stmt) {
                visit_jumps(body, child, depth, f);
            }
        }
    }
}

/// `true` when every path that completes the sequence normally assigns
/// `local` first. Paths that leave through a jump hold vacuously.
pub fn seq_definitely_assigns(body: &Body, stmts: &[StmtId], local: LocalId) -> bool {
    for stmt in stmts {
        if definitely_assigns(body, *stmt, local) || !completes_normally(body, *stmt) {
            return true;
        }
    }
    false
}

pub fn definitely_assigns(body: &Body, stmt: StmtId, local: LocalId) -> bool {
    match &body.stmt(stmt).kind {
        StmtKind::Block(stmts) => seq_definitely_assigns(body, stmts, local),
        StmtKind::Assign {
            target: AssignTarget::Local(target),
            op: None,
            ..
        } => *target == local,
        StmtKind::If {
            then_branch,
            else_branch: Some(else_branch),
            ..
        } => {
            definitely_assigns(body, *then_branch, local)
                && definitely_assigns(body, *else_branch, local)
        }
        StmtKind::DoWhile { body: inner, .. } => {
            definitely_assigns(body, *inner, local) && !breaks_out_of(body, stmt, *inner)
        }
        StmtKind::Return { .. }
        | StmtKind::Break { .. }
        | StmtKind::Continue { .. }
        | StmtKind::Throw(_) => true,
        // The body of a `while`/`for` may never run.
        _ => false,
    }
}
