//! Flow analysis over [`kestrel_hir::Body`]: CFG construction, liveness and
//! classification of the exits of a statement region.

mod build;
mod cfg;
mod exits;
mod liveness;

pub use crate::build::{build_cfg, build_region_cfg, RegionBlocks};
pub use crate::cfg::{BasicBlock, BlockId, ControlFlowGraph, Successors, Terminator};
pub use crate::exits::{
    classify_region, completes_normally, definitely_assigns, seq_completes_normally,
    seq_definitely_assigns, ExitKind, ExitPath, ExitTarget, JumpKind, RegionExits,
};
pub use crate::liveness::{live_locals_after, Liveness};
