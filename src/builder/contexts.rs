//! Context stacks threaded explicitly through the recursive build.
//! No ambient global state: every context is a plain value
//! pushed/popped around a recursive call, preferring context-passed
//! structs over a visitor-pattern hierarchy.

use crate::ast::LoopKind;
use crate::cfg::BlockId;

#[derive(Debug, Clone, Copy)]
pub struct LoopContext {
    pub header_block: BlockId,
    pub exit_block: BlockId,
    pub kind: LoopKind,
}

#[derive(Debug, Clone, Copy)]
pub struct SelectContext {
    pub exit_block: BlockId,
}

#[derive(Debug, Clone, Copy)]
pub struct TryContext {
    pub dispatch_block: BlockId,
    pub finally_block: Option<BlockId>,
    pub exit_block: BlockId,
    pub has_finally: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct SubroutineContext {
    pub entry_block: BlockId,
    pub exit_block: BlockId,
}

/// The four stacks threaded through `CfgBuilder::build_stmts`. Grouped in
/// one struct only so call sites don't take four separate `&mut Vec<_>`
/// parameters; each stack is still pushed/popped independently.
#[derive(Debug, Default)]
pub struct ContextStacks {
    pub loops: Vec<LoopContext>,
    pub selects: Vec<SelectContext>,
    pub tries: Vec<TryContext>,
    pub subs: Vec<SubroutineContext>,
}

impl ContextStacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Innermost loop's exit block, for `EXIT <loop>`: a `LoopContext`
    /// is pushed before descending into the body so that `EXIT <loop>`
    /// resolves to the innermost exit block.
    pub fn innermost_loop_exit(&self) -> Option<BlockId> {
        self.loops.last().map(|l| l.exit_block)
    }

    pub fn innermost_try(&self) -> Option<TryContext> {
        self.tries.last().copied()
    }
}
