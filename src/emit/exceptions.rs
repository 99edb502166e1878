//! Exception Lowering, emission half: the setjmp/
//! longjmp call sequences and error-code dispatch chain for the
//! structural blocks `builder::exceptions` already wired into the CFG.
//! The builder recorded *which* block plays *which* role in a
//! `TryShapeInfo`; this module turns that role into the IL a generic
//! out-edge walk can't derive on its own (the setjmp guard, the
//! err-code comparison chain, and the finally/rethrow bookkeeping).

use crate::cfg::{BlockId, ControlFlowGraph, TryShapeInfo};
use rustc_hash::FxHashMap;

/// What role a block plays in some enclosing `TRY`, found by
/// cross-referencing `ControlFlowGraph::try_shapes` once per procedure
/// instead of re-deriving it from edge shapes during the block walk.
#[derive(Debug, Clone, Copy)]
pub enum TryRole {
    Setup { try_index: usize },
    /// Clause `clause_index`'s test lives in the `dispatch` block itself
    /// when `clause_index == 0`; later clauses get their own
    /// `DispatchTest` block.
    Dispatch { try_index: usize, clause_index: usize },
    DispatchTest { try_index: usize, clause_index: usize },
    Finally { try_index: usize },
    Rethrow { try_index: usize },
}

pub fn build_try_roles(graph: &ControlFlowGraph) -> FxHashMap<BlockId, TryRole> {
    let mut roles = FxHashMap::default();
    for (try_index, shape) in graph.try_shapes.iter().enumerate() {
        roles.insert(shape.setup, TryRole::Setup { try_index });
        roles.insert(
            shape.dispatch,
            TryRole::Dispatch {
                try_index,
                clause_index: 0,
            },
        );
        for (k, test_block) in shape.dispatch_tests.iter().enumerate() {
            roles.insert(
                *test_block,
                TryRole::DispatchTest {
                    try_index,
                    clause_index: k + 1,
                },
            );
        }
        if let Some(finally) = shape.finally {
            roles.insert(finally, TryRole::Finally { try_index });
        }
        roles.insert(shape.rethrow, TryRole::Rethrow { try_index });
    }
    roles
}

/// The mangled name of the stack slot holding `TRY` #`try_index`'s
/// "a FINALLY is running because of an uncaught error, rethrow after it"
/// flag: FINALLY's own tail distinguishes fell through
/// normally from reached via the dispatch chain's uncaught
/// fallthrough.
pub fn pending_rethrow_slot(try_index: usize) -> String {
    format!("%try_pending_{try_index}")
}

/// Whether clause `clause_index` of `TRY` #`try_index` is the last
/// clause, i.e. whether its ConditionalFalse edge is the one uncaught
/// path that must set the pending-rethrow flag before reaching FINALLY
/// (or the rethrow block directly, with no FINALLY).
pub fn is_last_clause(shape: &TryShapeInfo, clause_index: usize) -> bool {
    clause_index + 1 == shape.catch_entries.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::CatchClause;
    use crate::builder::exceptions::build_try_skeleton;

    #[test]
    fn roles_cover_every_structural_block() {
        let mut g = ControlFlowGraph::new();
        let entry = g.new_block("entry");
        let catches = vec![
            CatchClause {
                codes: vec![11],
                body: vec![],
            },
            CatchClause {
                codes: vec![],
                body: vec![],
            },
        ];
        let shape = build_try_skeleton(&mut g, entry, &catches, true);
        g.try_shapes.push(TryShapeInfo {
            index: 0,
            setup: shape.setup,
            dispatch: shape.dispatch,
            dispatch_tests: shape.dispatch_tests.clone(),
            catch_entries: shape
                .catch_entries
                .iter()
                .copied()
                .zip(catches.iter().map(|c| c.codes.clone()))
                .collect(),
            finally: shape.finally,
            exit: shape.exit,
            rethrow: shape.rethrow,
        });
        let roles = build_try_roles(&g);
        assert!(matches!(roles[&shape.setup], TryRole::Setup { .. }));
        assert!(matches!(roles[&shape.dispatch], TryRole::Dispatch { clause_index: 0, .. }));
        assert!(matches!(
            roles[&shape.dispatch_tests[0]],
            TryRole::DispatchTest { clause_index: 1, .. }
        ));
        assert!(matches!(roles[&shape.finally.unwrap()], TryRole::Finally { .. }));
        assert!(matches!(roles[&shape.rethrow], TryRole::Rethrow { .. }));
    }

    #[test]
    fn last_clause_is_identified() {
        let shape = TryShapeInfo {
            index: 0,
            setup: BlockId::from_u32(0),
            dispatch: BlockId::from_u32(1),
            dispatch_tests: vec![],
            catch_entries: vec![
                (BlockId::from_u32(2), vec![11]),
                (BlockId::from_u32(3), vec![12]),
            ],
            finally: None,
            exit: BlockId::from_u32(4),
            rethrow: BlockId::from_u32(5),
        };
        assert!(!is_last_clause(&shape, 0));
        assert!(is_last_clause(&shape, 1));
    }
}
