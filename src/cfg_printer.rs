//! CFG Reporting: a textual report of block/edge/statement
//! counts, cyclomatic complexity, unreachable blocks, and loop/subroutine
//! summaries for one procedure's graph, plus a compact one-line summary
//! for diagnostic prints. A small struct wrapping a
//! `&ControlFlowGraph` with a `Display` impl, built once after the graph
//! is finished rather than threaded through the build itself.

use crate::cfg::{BlockId, ControlFlowGraph};
use std::fmt;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct CfgReport {
    pub block_count: usize,
    pub edge_count: usize,
    pub statement_count: usize,
    /// `edges - nodes + 2 * components`.
    pub cyclomatic_complexity: i64,
    pub unreachable_blocks: Vec<BlockId>,
    pub loop_count: usize,
    pub gosub_site_count: usize,
    pub try_count: usize,
}

impl CfgReport {
    pub fn build(graph: &ControlFlowGraph) -> Self {
        let block_count = graph.blocks.len();
        let edge_count = graph.edges.len();
        let statement_count = graph
            .blocks
            .values()
            .map(|b| b.statements.len())
            .sum();

        let unreachable_blocks = unreachable_blocks(graph);
        let components = connected_components(graph);
        let cyclomatic_complexity =
            edge_count as i64 - block_count as i64 + 2 * components.max(1) as i64;

        CfgReport {
            block_count,
            edge_count,
            statement_count,
            cyclomatic_complexity,
            unreachable_blocks,
            loop_count: graph.loops.len(),
            gosub_site_count: graph.gosub_sites.len(),
            try_count: graph.try_shapes.len(),
        }
    }

    /// One line suitable for a diagnostic print alongside a
    /// `CompileResult`.
    pub fn one_line(&self) -> String {
        format!(
            "{} blocks, {} edges, complexity {}, {} unreachable, {} loops, {} gosub sites, {} try blocks",
            self.block_count,
            self.edge_count,
            self.cyclomatic_complexity,
            self.unreachable_blocks.len(),
            self.loop_count,
            self.gosub_site_count,
            self.try_count,
        )
    }
}

impl fmt::Display for CfgReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "blocks:       {}", self.block_count)?;
        writeln!(f, "edges:        {}", self.edge_count)?;
        writeln!(f, "statements:   {}", self.statement_count)?;
        writeln!(f, "complexity:   {}", self.cyclomatic_complexity)?;
        writeln!(f, "loops:        {}", self.loop_count)?;
        writeln!(f, "gosub sites:  {}", self.gosub_site_count)?;
        writeln!(f, "try blocks:   {}", self.try_count)?;
        if self.unreachable_blocks.is_empty() {
            writeln!(f, "unreachable:  none")
        } else {
            write!(f, "unreachable: ")?;
            for (i, b) in self.unreachable_blocks.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, " {}", b.as_u32())?;
            }
            writeln!(f)
        }
    }
}

/// A block with no in-edge and that isn't the graph's own entry is
/// unreachable; also reported at build time via
/// `DiagnosticKind::UnreachableBlock` for the "unreachable_tail" blocks
/// `CfgBuilder::build_stmts` opens after dead code.
fn unreachable_blocks(graph: &ControlFlowGraph) -> Vec<BlockId> {
    let mut has_incoming: HashSet<BlockId> = HashSet::new();
    for edge in graph.edges.values() {
        has_incoming.insert(edge.to);
    }
    graph
        .blocks
        .keys()
        .filter(|&b| Some(b) != graph.entry && !has_incoming.contains(&b))
        .collect()
}

/// Number of weakly-connected components in the block/edge graph,
/// treating every edge as undirected: the cyclomatic complexity formula
/// needs the component count, not just a single assumed-connected
/// graph.
fn connected_components(graph: &ControlFlowGraph) -> usize {
    let mut adjacency: std::collections::HashMap<BlockId, Vec<BlockId>> =
        std::collections::HashMap::new();
    for b in graph.blocks.keys() {
        adjacency.entry(b).or_default();
    }
    for edge in graph.edges.values() {
        adjacency.entry(edge.from).or_default().push(edge.to);
        adjacency.entry(edge.to).or_default().push(edge.from);
    }

    let mut visited: HashSet<BlockId> = HashSet::new();
    let mut components = 0;
    for start in graph.blocks.keys() {
        if visited.contains(&start) {
            continue;
        }
        components += 1;
        let mut stack = vec![start];
        while let Some(b) = stack.pop() {
            if !visited.insert(b) {
                continue;
            }
            if let Some(neighbors) = adjacency.get(&b) {
                for &n in neighbors {
                    if !visited.contains(&n) {
                        stack.push(n);
                    }
                }
            }
        }
    }
    components
}
