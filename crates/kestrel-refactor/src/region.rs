use kestrel_core::text::trim_range;
use kestrel_core::Span;
use kestrel_hir::{Body, ExprId, StmtId, StmtKind};

/// The code selected for extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionRegion {
    /// Consecutive sibling statements of one block.
    Statements { stmts: Vec<StmtId>, span: Span },
    /// A single expression.
    Expression { expr: ExprId, span: Span },
}

impl ExtractionRegion {
    /// Resolves a text selection to a region.
    ///
    /// Whitespace around the selection is ignored. A selection matching the
    /// bounds of consecutive statements of one block (the innermost such block
    /// wins) is a statement region; otherwise it must match one expression
    /// exactly.
    pub fn from_selection(body: &Body, source: &str, selection: Span) -> Option<Self> {
        if selection.end > source.len() {
            return None;
        }
        let selection = trim_range(source, selection);
        if selection.is_empty() {
            return None;
        }

        let mut best: Option<(usize, Vec<StmtId>)> = None;
        for block in body.stmt_ids() {
            let StmtKind::Block(stmts) = &body.stmt(block).kind else {
                continue;
            };
            let Some(first) = stmts
                .iter()
                .position(|stmt| body.stmt(*stmt).span.start == selection.start)
            else {
                continue;
            };
            let Some(last) = stmts[first..]
                .iter()
                .position(|stmt| body.stmt(*stmt).span.end == selection.end)
                .map(|offset| first + offset)
            else {
                continue;
            };
            let size = body.stmt(block).span.len();
            if best.as_ref().map_or(true, |(best_size, _)| size < *best_size) {
                best = Some((size, stmts[first..=last].to_vec()));
            }
        }
        if let Some((_, stmts)) = best {
            return Some(ExtractionRegion::Statements {
                stmts,
                span: selection,
            });
        }

        body.expr_ids()
            .find(|expr| body.expr(*expr).span == selection && body.expr_stmt(*expr).is_some())
            .map(|expr| ExtractionRegion::Expression {
                expr,
                span: selection,
            })
    }

    /// Every statement of the body's root block.
    pub fn whole_body(body: &Body) -> Option<Self> {
        let StmtKind::Block(stmts) = &body.stmt(body.root()).kind else {
            return None;
        };
        let first = body.stmt(*stmts.first()?).span;
        let last = body.stmt(*stmts.last()?).span;
        Some(ExtractionRegion::Statements {
            stmts: stmts.clone(),
            span: first.cover(last),
        })
    }

    pub fn span(&self) -> Span {
        match self {
            ExtractionRegion::Statements { span, .. } | ExtractionRegion::Expression { span, .. } => {
                *span
            }
        }
    }

    pub fn stmts(&self) -> &[StmtId] {
        match self {
            ExtractionRegion::Statements { stmts, .. } => stmts,
            ExtractionRegion::Expression { .. } => &[],
        }
    }

    pub fn expr(&self) -> Option<ExprId> {
        match self {
            ExtractionRegion::Expression { expr, .. } => Some(*expr),
            ExtractionRegion::Statements { .. } => None,
        }
    }

    pub fn is_expression(&self) -> bool {
        matches!(self, ExtractionRegion::Expression { .. })
    }

    /// The statement of the enclosing block the region belongs to: the first
    /// selected statement, or the block-level statement containing the
    /// selected expression.
    pub fn anchor(&self, body: &Body) -> Option<StmtId> {
        match self {
            ExtractionRegion::Statements { stmts, .. } => stmts.first().copied(),
            ExtractionRegion::Expression { expr, .. } => {
                let stmt = body.expr_stmt(*expr)?;
                std::iter::once(stmt)
                    .chain(body.ancestors(stmt))
                    .find(|candidate| {
                        body.parent(*candidate)
                            .is_some_and(|parent| matches!(body.stmt(parent).kind, StmtKind::Block(_)))
                    })
            }
        }
    }
}
