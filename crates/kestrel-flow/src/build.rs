use kestrel_core::Name;
use kestrel_hir::{Body, ExprKind, StmtId, StmtKind};

use crate::cfg::{BlockId, CfgBuilder, ControlFlowGraph, Terminator};

/// Blocks allocated while lowering an extraction region.
///
/// The builder splits blocks at the region boundary so every block in
/// `start..end` holds only region statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegionBlocks {
    pub start: usize,
    pub end: usize,
}

impl RegionBlocks {
    #[must_use]
    pub fn contains(&self, block: BlockId) -> bool {
        (self.start..self.end).contains(&block.index())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

#[derive(Debug, Clone)]
struct LoopContext {
    label: Option<Name>,
    break_target: BlockId,
    continue_target: BlockId,
}

#[must_use]
pub fn build_cfg(body: &Body) -> ControlFlowGraph {
    build_region_cfg(body, &[]).0
}

/// Builds the CFG of `body`, isolating the (consecutive, sibling) statements of
/// `region` into their own blocks.
#[must_use]
pub fn build_region_cfg(body: &Body, region: &[StmtId]) -> (ControlFlowGraph, RegionBlocks) {
    let mut builder = HirCfgBuilder::new(body, region);
    let entry = builder.cfg.new_block();
    let _ = builder.build_stmt(body.root(), entry);
    let region_blocks = builder.region_blocks.unwrap_or_default();
    (builder.cfg.build(entry), region_blocks)
}

pub(crate) fn is_literal_true(body: &Body, expr: kestrel_hir::ExprId) -> bool {
    matches!(body.expr(expr).kind, ExprKind::Bool(true))
}

struct HirCfgBuilder<'a> {
    body: &'a Body,
    cfg: CfgBuilder,
    loop_stack: Vec<LoopContext>,
    region_first: Option<StmtId>,
    region_last: Option<StmtId>,
    region_start: Option<usize>,
    region_blocks: Option<RegionBlocks>,
}

impl<'a> HirCfgBuilder<'a> {
    fn new(body: &'a Body, region: &[StmtId]) -> Self {
        Self {
            body,
            cfg: CfgBuilder::new(),
            loop_stack: Vec::new(),
            region_first: region.first().copied(),
            region_last: region.last().copied(),
            region_start: None,
            region_blocks: None,
        }
    }

    fn build_seq(&mut self, stmts: &[StmtId], entry: BlockId) -> Option<BlockId> {
        let mut reachable_current: Option<BlockId> = Some(entry);
        let mut unreachable_current: Option<BlockId> = None;

        for &stmt in stmts {
            if let Some(cur) = reachable_current {
                reachable_current = self.build_stmt(stmt, cur);
                continue;
            }

            let cur = match unreachable_current {
                Some(bb) => bb,
                None => self.cfg.new_block(),
            };
            unreachable_current = self.build_stmt(stmt, cur);
        }

        reachable_current
    }

    fn build_stmt(&mut self, stmt: StmtId, entry: BlockId) -> Option<BlockId> {
        let mut entry = entry;
        if Some(stmt) == self.region_first {
            let region_entry = self.cfg.new_block();
            self.cfg.goto(entry, region_entry);
            self.region_start = Some(region_entry.index());
            entry = region_entry;
        }

        let fallthrough = self.build_stmt_kind(stmt, entry);

        if Some(stmt) == self.region_last {
            let after = self.cfg.new_block();
            let start = self.region_start.unwrap_or(after.index());
            self.region_blocks = Some(RegionBlocks {
                start,
                end: after.index(),
            });
            return fallthrough.map(|bb| {
                self.cfg.goto(bb, after);
                after
            });
        }

        fallthrough
    }

    fn build_stmt_kind(&mut self, stmt: StmtId, entry: BlockId) -> Option<BlockId> {
        let stmt_data = self.body.stmt(stmt);
        match &stmt_data.kind {
            StmtKind::Block(stmts) => self.build_seq(stmts, entry),

            StmtKind::Let { .. }
            | StmtKind::Assign { .. }
            | StmtKind::Expr(_)
            | StmtKind::LocalFunction { .. }
            | StmtKind::LocalClass { .. }
            | StmtKind::Nop => {
                self.cfg.push_stmt(entry, stmt);
                Some(entry)
            }

            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let then_entry = self.cfg.new_block();
                let else_entry = self.cfg.new_block();
                self.cfg.set_terminator(
                    entry,
                    Terminator::If {
                        condition: *condition,
                        then_target: then_entry,
                        else_target: else_entry,
                        from: stmt,
                    },
                );

                let then_fallthrough = self.build_stmt(*then_branch, then_entry);
                let else_fallthrough = match else_branch {
                    Some(else_branch) => self.build_stmt(*else_branch, else_entry),
                    None => Some(else_entry),
                };

                if then_fallthrough.is_none() && else_fallthrough.is_none() {
                    return None;
                }
                let join = self.cfg.new_block();
                for bb in [then_fallthrough, else_fallthrough].into_iter().flatten() {
                    self.cfg.goto(bb, join);
                }
                Some(join)
            }

            StmtKind::While {
                label,
                condition,
                body,
            } => {
                let cond_bb = self.cfg.new_block();
                let body_bb = self.cfg.new_block();
                let after_bb = self.cfg.new_block();
                self.cfg.goto(entry, cond_bb);

                if is_literal_true(self.body, *condition) {
                    self.cfg.set_terminator(
                        cond_bb,
                        Terminator::Goto {
                            target: body_bb,
                            from: Some(stmt),
                        },
                    );
                } else {
                    self.cfg.set_terminator(
                        cond_bb,
                        Terminator::If {
                            condition: *condition,
                            then_target: body_bb,
                            else_target: after_bb,
                            from: stmt,
                        },
                    );
                }

                self.build_loop_body(label.clone(), *body, body_bb, after_bb, cond_bb);
                Some(after_bb)
            }

            StmtKind::DoWhile {
                label,
                body,
                condition,
            } => {
                let body_bb = self.cfg.new_block();
                let cond_bb = self.cfg.new_block();
                let after_bb = self.cfg.new_block();
                self.cfg.goto(entry, body_bb);

                if is_literal_true(self.body, *condition) {
                    self.cfg.set_terminator(
                        cond_bb,
                        Terminator::Goto {
                            target: body_bb,
                            from: Some(stmt),
                        },
                    );
                } else {
                    self.cfg.set_terminator(
                        cond_bb,
                        Terminator::If {
                            condition: *condition,
                            then_target: body_bb,
                            else_target: after_bb,
                            from: stmt,
                        },
                    );
                }

                self.build_loop_body(label.clone(), *body, body_bb, after_bb, cond_bb);
                Some(after_bb)
            }

            StmtKind::For {
                label,
                iterable,
                body,
                ..
            } => {
                let cond_bb = self.cfg.new_block();
                let body_bb = self.cfg.new_block();
                let after_bb = self.cfg.new_block();
                self.cfg.goto(entry, cond_bb);
                self.cfg.set_terminator(
                    cond_bb,
                    Terminator::If {
                        condition: *iterable,
                        then_target: body_bb,
                        else_target: after_bb,
                        from: stmt,
                    },
                );

                self.build_loop_body(label.clone(), *body, body_bb, after_bb, cond_bb);
                Some(after_bb)
            }

            StmtKind::Return { value, .. } => {
                self.cfg.set_terminator(
                    entry,
                    Terminator::Return {
                        value: *value,
                        from: stmt,
                    },
                );
                None
            }

            StmtKind::Throw(exception) => {
                self.cfg.set_terminator(
                    entry,
                    Terminator::Throw {
                        exception: *exception,
                        from: stmt,
                    },
                );
                None
            }

            StmtKind::Break { label } => {
                if let Some(ctx) = self.find_loop(label.as_ref()) {
                    self.cfg.set_terminator(
                        entry,
                        Terminator::Goto {
                            target: ctx.break_target,
                            from: Some(stmt),
                        },
                    );
                }
                None
            }

            StmtKind::Continue { label } => {
                if let Some(ctx) = self.find_loop(label.as_ref()) {
                    self.cfg.set_terminator(
                        entry,
                        Terminator::Goto {
                            target: ctx.continue_target,
                            from: Some(stmt),
                        },
                    );
                }
                None
            }
        }
    }

    fn build_loop_body(
        &mut self,
        label: Option<Name>,
        body: StmtId,
        body_bb: BlockId,
        break_target: BlockId,
        continue_target: BlockId,
    ) {
        self.loop_stack.push(LoopContext {
            label,
            break_target,
            continue_target,
        });
        let body_fallthrough = self.build_stmt(body, body_bb);
        self.loop_stack.pop();

        if let Some(bb) = body_fallthrough {
            self.cfg.goto(bb, continue_target);
        }
    }

    fn find_loop(&self, label: Option<&Name>) -> Option<LoopContext> {
        match label {
            Some(label) => self
                .loop_stack
                .iter()
                .rev()
                .find(|ctx| ctx.label.as_ref() == Some(label))
                .cloned(),
            None => self.loop_stack.last().cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_core::Span;
    use kestrel_hir::{BodyBuilder, Local, LocalKind};

    #[test]
    fn infinite_loop_exits_only_through_break() {
        // while (true) { break }
        let mut b = BodyBuilder::new(Span::new(0, 30));
        let scope = b.root_scope();
        let cond = b.alloc_expr(ExprKind::Bool(true), Span::new(7, 11), scope);
        let brk = b.alloc_stmt(StmtKind::Break { label: None }, Span::new(15, 20), scope);
        let loop_body = b.alloc_stmt(StmtKind::Block(vec![brk]), Span::new(13, 22), scope);
        let while_stmt = b.alloc_stmt(
            StmtKind::While {
                label: None,
                condition: cond,
                body: loop_body,
            },
            Span::new(0, 22),
            scope,
        );
        let root = b.alloc_stmt(StmtKind::Block(vec![while_stmt]), Span::new(0, 30), scope);
        let body = b.finish(root);

        let cfg = build_cfg(&body);
        let reachable = cfg.reachable_blocks();
        assert!(reachable.iter().all(|r| *r));
    }

    #[test]
    fn region_blocks_cover_only_region_statements() {
        // val a = 1; val b = a; val c = b
        let mut b = BodyBuilder::new(Span::new(0, 40));
        let scope = b.root_scope();
        let mut lets = Vec::new();
        for (idx, name) in ["a", "b", "c"].into_iter().enumerate() {
            let start = idx * 10;
            let local = b.alloc_local(Local {
                name: Name::new(name),
                kind: LocalKind::Local,
                span: Span::new(start + 4, start + 5),
                decl_span: Span::new(start, start + 9),
                scope,
                ty: None,
                mutable: false,
            });
            let init = b.alloc_expr(ExprKind::Int(1), Span::new(start + 8, start + 9), scope);
            lets.push(b.alloc_stmt(
                StmtKind::Let {
                    local,
                    initializer: Some(init),
                },
                Span::new(start, start + 9),
                scope,
            ));
        }
        let root = b.alloc_stmt(StmtKind::Block(lets.clone()), Span::new(0, 40), scope);
        let body = b.finish(root);

        let (cfg, region) = build_region_cfg(&body, &lets[1..2]);
        assert!(!region.is_empty());
        let region_stmts: Vec<StmtId> = (region.start..region.end)
            .flat_map(|idx| cfg.blocks[idx].stmts.clone())
            .collect();
        assert_eq!(region_stmts, vec![lets[1]]);
    }
}
