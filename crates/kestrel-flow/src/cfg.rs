use kestrel_hir::{ExprId, StmtId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub usize);

impl BlockId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    /// Straight-line statements. Branches, loops and jumps are encoded in the
    /// `terminator`.
    pub stmts: Vec<StmtId>,
    pub terminator: Terminator,
}

impl BasicBlock {
    pub fn successors(&self) -> Successors {
        self.terminator.successors()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminator {
    Goto {
        target: BlockId,
        from: Option<StmtId>,
    },
    /// Two-way branch; also used for `for` loops where `condition` is the
    /// iterable expression.
    If {
        condition: ExprId,
        then_target: BlockId,
        else_target: BlockId,
        from: StmtId,
    },
    Return {
        value: Option<ExprId>,
        from: StmtId,
    },
    Throw {
        exception: ExprId,
        from: StmtId,
    },
    Exit,
}

impl Terminator {
    #[must_use]
    pub fn successors(&self) -> Successors {
        match self {
            Terminator::Goto { target, .. } => Successors::One(*target),
            Terminator::If {
                then_target,
                else_target,
                ..
            } => Successors::Two(*then_target, *else_target),
            Terminator::Return { .. } | Terminator::Throw { .. } | Terminator::Exit => {
                Successors::None
            }
        }
    }

    #[must_use]
    pub fn from_stmt(&self) -> Option<StmtId> {
        match *self {
            Terminator::Goto { from, .. } => from,
            Terminator::If { from, .. }
            | Terminator::Return { from, .. }
            | Terminator::Throw { from, .. } => Some(from),
            Terminator::Exit => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Successors {
    None,
    One(BlockId),
    Two(BlockId, BlockId),
}

impl Iterator for Successors {
    type Item = BlockId;

    fn next(&mut self) -> Option<Self::Item> {
        match *self {
            Successors::None => None,
            Successors::One(bb) => {
                *self = Successors::None;
                Some(bb)
            }
            Successors::Two(first, second) => {
                *self = Successors::One(second);
                Some(first)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFlowGraph {
    pub entry: BlockId,
    pub blocks: Vec<BasicBlock>,
    preds: Vec<Vec<BlockId>>,
}

impl ControlFlowGraph {
    #[must_use]
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    #[must_use]
    pub fn predecessors(&self, id: BlockId) -> &[BlockId] {
        &self.preds[id.index()]
    }

    pub fn successors(&self, id: BlockId) -> Successors {
        self.blocks[id.index()].successors()
    }

    #[must_use]
    pub fn reachable_blocks(&self) -> Vec<bool> {
        let mut reachable = vec![false; self.blocks.len()];
        let mut stack = vec![self.entry];
        while let Some(bb) = stack.pop() {
            if reachable[bb.index()] {
                continue;
            }
            reachable[bb.index()] = true;
            stack.extend(self.successors(bb));
        }
        reachable
    }
}

pub(crate) struct CfgBuilder {
    blocks: Vec<BasicBlock>,
}

impl CfgBuilder {
    pub(crate) fn new() -> Self {
        Self { blocks: Vec::new() }
    }

    pub(crate) fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(BasicBlock {
            stmts: Vec::new(),
            terminator: Terminator::Exit,
        });
        id
    }

    pub(crate) fn push_stmt(&mut self, bb: BlockId, stmt: StmtId) {
        self.blocks[bb.index()].stmts.push(stmt);
    }

    pub(crate) fn set_terminator(&mut self, bb: BlockId, term: Terminator) {
        self.blocks[bb.index()].terminator = term;
    }

    pub(crate) fn goto(&mut self, from: BlockId, target: BlockId) {
        self.set_terminator(from, Terminator::Goto { target, from: None });
    }

    pub(crate) fn build(self, entry: BlockId) -> ControlFlowGraph {
        let mut preds = vec![Vec::new(); self.blocks.len()];
        for (idx, bb) in self.blocks.iter().enumerate() {
            for to in bb.successors() {
                preds[to.index()].push(BlockId(idx));
            }
        }

        ControlFlowGraph {
            entry,
            blocks: self.blocks,
            preds,
        }
    }
}
