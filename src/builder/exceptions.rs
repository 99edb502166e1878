//! Exception Lowering, build-time half: constructs the six structural
//! blocks a `TRY` needs (`try_setup`, `try_body_entry`, `dispatch`, one
//! `catch_entry` per clause, optional `finally`, `try_exit`) and wires
//! their edges. The setjmp/longjmp call sequences themselves are
//! emitted later, at emission time (`crate::emit::exceptions`).

use crate::ast::CatchClause;
use crate::cfg::{BlockId, ControlFlowGraph, EdgeKind};

pub struct TryShape {
    pub setup: BlockId,
    pub body_entry: BlockId,
    pub dispatch: BlockId,
    pub dispatch_tests: Vec<BlockId>,
    pub catch_entries: Vec<BlockId>,
    pub finally: Option<BlockId>,
    pub exit: BlockId,
    pub rethrow: BlockId,
}

/// Build the skeleton for one `TRY` and wire the edges that don't depend
/// on the clause bodies' own control flow:
///
/// ```text
/// try_setup --ConditionalFalse--> try_body_entry
/// try_setup --ConditionalTrue---> dispatch
/// dispatch  --ConditionalTrue  --> catch_entry_i (per clause)
/// dispatch  --ConditionalFalse (final) --> finally-or-rethrow
/// ```
///
/// The caller still must: build `catches[i].body` into each
/// `catch_entries[i]`, build the try body into `body_entry`, and wire
/// each clause/body's fallthrough to `finally` (or `exit` if no
/// finally) once its own control flow is known.
pub fn build_try_skeleton(
    graph: &mut ControlFlowGraph,
    current: BlockId,
    catches: &[CatchClause],
    has_finally: bool,
) -> TryShape {
    let setup = current;
    let body_entry = graph.new_block("try_body");
    let dispatch = graph.new_block("dispatch");
    graph.add_edge(setup, body_entry, EdgeKind::ConditionalFalse);
    graph.add_edge(setup, dispatch, EdgeKind::ConditionalTrue);

    let mut catch_entries = Vec::with_capacity(catches.len());
    let mut dispatch_tests = Vec::with_capacity(catches.len().saturating_sub(1));
    let mut prev_test = dispatch;
    for (i, _clause) in catches.iter().enumerate() {
        let entry = graph.new_block(format!("catch_{i}"));
        catch_entries.push(entry);
        if i > 0 {
            // Each non-first clause gets its own comparison block so the
            // chain reads as a flat sequence of tests; the first
            // clause's test lives in `dispatch` itself.
            let test = graph.new_block(format!("dispatch_test_{i}"));
            graph.add_edge(prev_test, test, EdgeKind::ConditionalFalse);
            prev_test = test;
            dispatch_tests.push(test);
        }
        graph.add_edge(prev_test, entry, EdgeKind::ConditionalTrue);
    }

    let finally = if has_finally {
        Some(graph.new_block("finally"))
    } else {
        None
    };
    let exit = graph.new_block("try_exit");
    let rethrow = graph.new_block("rethrow");

    // Dispatch falling off the last clause: to FINALLY (which rethrows
    // after running) if present, else straight to the rethrow path.
    // With no clauses at all there is nothing to test, so the edge is
    // unconditional rather than a degenerate one-sided conditional (the
    // conditional-pairing invariant requires a matched True/False pair
    // or neither, never one alone).
    let had_any_test = !catches.is_empty();
    let target = finally.unwrap_or(rethrow);
    if had_any_test {
        graph.add_edge(prev_test, target, EdgeKind::ConditionalFalse);
    } else {
        graph.add_edge(prev_test, target, EdgeKind::Unconditional);
    }

    TryShape {
        setup,
        body_entry,
        dispatch,
        dispatch_tests,
        catch_entries,
        finally,
        exit,
        rethrow,
    }
}
