//! The control-flow graph data model: `BasicBlock`, `Edge`, `EdgeKind`
//! and `ControlFlowGraph` itself. Predecessor/successor bookkeeping is
//! keyed by dense entity ids; a TRY's dispatch chain is recorded as its
//! own structural block list rather than re-derived from raw edges.

use crate::ast::{CaseLabel, Expr, JumpTarget, LineNumber, Stmt};
use crate::entity_key;
use crate::entity::{EntityRef, PrimaryMap};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

entity_key! {
    /// An index into a `ControlFlowGraph`'s statement pool: a reference
    /// to one AST statement, not a copy of it.
    pub struct StmtRef;
}

entity_key! {
    /// A basic block id: monotone, insertion-ordered, stable across the
    /// build.
    pub struct BlockId;
}

entity_key! {
    /// An edge id, dense within one graph's edge vector.
    pub struct EdgeId;
}

/// How a block ends: a block is *terminated* when its terminator is set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Terminator {
    #[default]
    /// Not yet terminated; the builder is still appending statements.
    Open,
    /// Falls to whatever out-edges exist (the common case: terminator is
    /// synthesized from out-edges at emission time).
    FromEdges,
    Return(Option<StmtRef>),
    End,
    Throw(StmtRef),
    Unreachable,
}

impl Terminator {
    pub fn is_terminating(&self) -> bool {
        !matches!(self, Terminator::Open | Terminator::FromEdges)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    Fallthrough,
    Unconditional,
    ConditionalTrue,
    ConditionalFalse,
    LoopBack,
    LoopExit,
    Call,
    Return,
    ExceptionDispatch,
    Finally,
    ComputedCase(u32),
    /// Carries an unresolved forward reference; rewritten during
    /// deferred-edge resolution.
    Deferred(JumpTarget),
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub from: BlockId,
    pub to: BlockId,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, Default)]
pub struct BasicBlock {
    pub label: String,
    pub statements: Vec<StmtRef>,
    pub terminator: Terminator,
    pub out_edges: SmallVec<[EdgeId; 2]>,
}

impl BasicBlock {
    pub fn is_terminated(&self) -> bool {
        self.terminator.is_terminating() || !self.out_edges.is_empty()
    }
}

/// Per-loop metadata retained after the build, for `EXIT <loop>`
/// resolution during building and for CFG Reporting afterward.
#[derive(Debug, Clone)]
pub struct LoopInfo {
    pub header: BlockId,
    pub body: BlockId,
    pub exit: BlockId,
}

/// One `SELECT CASE` test block's guard: which chain it belongs to (so
/// the emitter evaluates the shared selector exactly once and never
/// re-evaluates it per clause), the selector expression itself, and
/// this particular test's predicate.
#[derive(Debug, Clone)]
pub struct SelectTest {
    pub chain_head: BlockId,
    pub selector: Expr,
    pub label: CaseLabel,
}

/// What a decision block's terminator tests, recorded at build time and
/// consumed by the emitter to produce the `w`-class guard temporary that
/// feeds the block's `jnz`.
#[derive(Debug, Clone)]
pub enum BlockCondition {
    Bool(Expr),
    ForTest {
        var: String,
        limit: Expr,
        /// `None` only when STEP is a non-literal expression whose sign
        /// must be tested at runtime.
        step_is_negative: Option<bool>,
        step: Expr,
    },
    Select(SelectTest),
    ComputedCase {
        selector: Expr,
        target_count: u32,
    },
}

/// One GOSUB call site's bookkeeping.
#[derive(Debug, Clone, Copy)]
pub struct GosubSite {
    pub call_block: BlockId,
    pub return_site: BlockId,
    pub return_id: u32,
}

/// One `TRY`'s structural blocks, recorded at build time so the emitter
/// can special-case their lowering without re-deriving the shape from
/// edge patterns. `dispatch_tests[i]` holds the dedicated test
/// block for clause `i+1` (clause 0's test lives in `dispatch` itself);
/// `rethrow` is the terminal "propagate to the enclosing handler" block,
/// reached directly from the dispatch chain when there is no FINALLY, or
/// from `finally`'s own pending-rethrow branch when there is one.
#[derive(Debug, Clone)]
pub struct TryShapeInfo {
    pub index: u32,
    pub setup: BlockId,
    pub dispatch: BlockId,
    pub dispatch_tests: Vec<BlockId>,
    /// One entry per CATCH clause, in source order: its entry block and
    /// error codes (empty means catch-all).
    pub catch_entries: Vec<(BlockId, Vec<i64>)>,
    pub finally: Option<BlockId>,
    pub exit: BlockId,
    pub rethrow: BlockId,
}

/// One procedure's (or the top-level program's) control-flow graph.
#[derive(Debug, Default)]
pub struct ControlFlowGraph {
    pub blocks: PrimaryMap<BlockId, BasicBlock>,
    pub edges: PrimaryMap<EdgeId, Edge>,
    /// Owning pool of statement references; `StmtRef` indexes into this.
    pub stmt_pool: PrimaryMap<StmtRef, Stmt>,
    pub entry: Option<BlockId>,
    pub exit: Option<BlockId>,
    /// Edges still carrying a `Deferred` target; drained by deferred-edge
    /// resolution.
    pub deferred: Vec<EdgeId>,
    pub line_to_block: FxHashMap<LineNumber, BlockId>,
    pub label_to_block: FxHashMap<String, BlockId>,
    pub gosub_sites: Vec<GosubSite>,
    /// Sparse set of blocks that are the dynamic target of some RETURN;
    /// populated at build time, iterated in sorted order
    /// at emission time for deterministic dispatch-chain output.
    pub return_targets: Vec<BlockId>,
    pub loops: Vec<LoopInfo>,
    /// Decision-block guards, keyed by the block whose terminator they
    /// drive. Absent for blocks with 0 or 1 unconditional out-edge.
    pub conditions: FxHashMap<BlockId, BlockCondition>,
    /// One entry per `TRY` built in this procedure, in source order.
    pub try_shapes: Vec<TryShapeInfo>,
}

impl ControlFlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_block(&mut self, label: impl Into<String>) -> BlockId {
        let id = self.blocks.push(BasicBlock {
            label: label.into(),
            ..Default::default()
        });
        log::trace!("cfg: new block {id:?}");
        id
    }

    /// Append a statement to the pool and return a reference to it.
    pub fn push_stmt(&mut self, stmt: Stmt) -> StmtRef {
        self.stmt_pool.push(stmt)
    }

    /// Append a statement reference to `block`'s statement list.
    pub fn push_stmt_to_block(&mut self, block: BlockId, stmt: Stmt) -> StmtRef {
        let r = self.push_stmt(stmt);
        self.blocks[block].statements.push(r);
        r
    }

    pub fn stmt(&self, r: StmtRef) -> &Stmt {
        &self.stmt_pool[r]
    }

    pub fn add_edge(&mut self, from: BlockId, to: BlockId, kind: EdgeKind) -> EdgeId {
        log::trace!("cfg: edge {from:?} -> {to:?} ({kind:?})");
        let id = self.edges.push(Edge { from, to, kind });
        self.blocks[from].out_edges.push(id);
        id
    }

    /// Add an edge whose destination is a forward reference not yet
    /// resolved to a `BlockId`. Recorded in `self.deferred` for the
    /// post-walk resolution pass.
    pub fn add_deferred_edge(&mut self, from: BlockId, target: JumpTarget) -> EdgeId {
        // `to` is a placeholder until resolved; entry is always valid so
        // this never dangles in the interim.
        let placeholder = self.entry.expect("entry block must exist before deferring");
        let id = self.edges.push(Edge {
            from,
            to: placeholder,
            kind: EdgeKind::Deferred(target),
        });
        self.blocks[from].out_edges.push(id);
        self.deferred.push(id);
        id
    }

    pub fn out_edges(&self, block: BlockId) -> impl Iterator<Item = &Edge> + '_ {
        self.blocks[block]
            .out_edges
            .iter()
            .map(move |eid| &self.edges[*eid])
    }

    pub fn mark_return_target(&mut self, block: BlockId) {
        if !self.return_targets.contains(&block) {
            self.return_targets.push(block);
        }
    }

    /// Resolve every deferred edge against the line/label maps (populated
    /// incrementally as the builder opens blocks at line/label
    /// boundaries, and finalized by the jump-target pre-scan's
    /// `StmtIndex -> BlockId` mapping the builder maintains separately).
    /// Returns the list of targets that could not be resolved.
    pub fn resolve_deferred(&mut self) -> Vec<JumpTarget> {
        let mut unresolved = Vec::new();
        let pending = std::mem::take(&mut self.deferred);
        for eid in pending {
            let target = match &self.edges[eid].kind {
                EdgeKind::Deferred(t) => t.clone(),
                _ => continue,
            };
            let resolved = match &target {
                JumpTarget::Line(n) => self.line_to_block.get(n).copied(),
                JumpTarget::Label(l) => self.label_to_block.get(l).copied(),
            };
            match resolved {
                Some(dst) => {
                    self.edges[eid].to = dst;
                    self.edges[eid].kind = EdgeKind::Unconditional;
                }
                None => unresolved.push(target),
            }
        }
        unresolved
    }

    pub fn has_deferred_edges(&self) -> bool {
        self.edges
            .values()
            .any(|e| matches!(e.kind, EdgeKind::Deferred(_)))
    }

    /// For every `ConditionalTrue` out-edge there exists exactly one
    /// matching `ConditionalFalse` out-edge from the same block — except
    /// a post-test loop's condition block, which carries only one of the
    /// two (per the UNTIL/WHILE polarity of its exit test) paired with a
    /// `LoopBack` edge standing in for the other branch
    /// (`build_post_test_loop`); the emitter's `emit_multi_edge` treats
    /// that shape as an ordinary two-way branch too.
    pub fn check_conditional_pairing(&self) -> bool {
        self.blocks.keys().all(|b| {
            let t = self
                .out_edges(b)
                .filter(|e| e.kind == EdgeKind::ConditionalTrue)
                .count();
            let f = self
                .out_edges(b)
                .filter(|e| e.kind == EdgeKind::ConditionalFalse)
                .count();
            let lb = self
                .out_edges(b)
                .filter(|e| e.kind == EdgeKind::LoopBack)
                .count();
            (t == 0 && f == 0) || (t == 1 && f == 1) || (t == 1 && f == 0 && lb == 1) || (t == 0 && f == 1 && lb == 1)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_get_dense_monotone_ids() {
        let mut g = ControlFlowGraph::new();
        let b0 = g.new_block("entry");
        let b1 = g.new_block("exit");
        assert_eq!(b0.index(), 0);
        assert_eq!(b1.index(), 1);
    }

    #[test]
    fn deferred_edges_resolve_by_line_number() {
        let mut g = ControlFlowGraph::new();
        let entry = g.new_block("entry");
        g.entry = Some(entry);
        let target = g.new_block("target");
        g.line_to_block.insert(100, target);
        let from = g.new_block("goto_site");
        g.add_deferred_edge(from, JumpTarget::Line(100));
        assert!(g.has_deferred_edges());
        let unresolved = g.resolve_deferred();
        assert!(unresolved.is_empty());
        assert!(!g.has_deferred_edges());
        let e = g.out_edges(from).next().unwrap();
        assert_eq!(e.to, target);
    }

    #[test]
    fn unresolved_targets_are_reported() {
        let mut g = ControlFlowGraph::new();
        let entry = g.new_block("entry");
        g.entry = Some(entry);
        let from = g.new_block("goto_site");
        g.add_deferred_edge(from, JumpTarget::Label("nope".into()));
        let unresolved = g.resolve_deferred();
        assert_eq!(unresolved, vec![JumpTarget::Label("nope".into())]);
    }

    #[test]
    fn conditional_pairing_invariant_holds_for_if() {
        let mut g = ControlFlowGraph::new();
        let decision = g.new_block("decision");
        let then_blk = g.new_block("then");
        let else_blk = g.new_block("else");
        g.add_edge(decision, then_blk, EdgeKind::ConditionalTrue);
        g.add_edge(decision, else_blk, EdgeKind::ConditionalFalse);
        assert!(g.check_conditional_pairing());
    }
}
