//! Single-pass recursive construction of a `ControlFlowGraph` from a
//! structured AST, threading the explicit context stacks of
//! `contexts.rs` and deferring forward references to
//! `ControlFlowGraph::resolve_deferred`. A cheap, infallible cursor
//! (`self.current`) walked forward by a driver that owns all the
//! mutable state explicitly, with no ambient globals.

pub mod contexts;
pub mod exceptions;

use crate::ast::{CaseLabel, JumpTarget, LoopKind, ProgramLine, Stmt};
use crate::cfg::{BlockCondition, BlockId, ControlFlowGraph, EdgeId, EdgeKind, SelectTest};
use crate::diagnostics::{Diagnostic, DiagnosticKind, SourceLocation};
use crate::prescan::{prescan, PreScanResult};
use contexts::{ContextStacks, LoopContext, TryContext};

pub struct CfgBuilder {
    pub graph: ControlFlowGraph,
    prescan: PreScanResult,
    ctx: ContextStacks,
    current: BlockId,
    diagnostics: Vec<Diagnostic>,
    next_return_id: u32,
    current_line: Option<u32>,
    /// Deferred edges that, once resolved to a real `BlockId`, need a
    /// kind other than the `Unconditional` that `resolve_deferred`
    /// assigns by default (GOSUB's `Call`, ON-GOTO/ON-GOSUB's indexed
    /// `ComputedCase`).
    pending_edge_kind_fixups: Vec<(EdgeId, EdgeKind)>,
    next_try_index: u32,
}

/// Build one procedure (or the top-level program) into its own
/// `ControlFlowGraph`. `lines` is that procedure's flattened statement
/// list; one graph exists per procedure, plus one for the top-level
/// program.
pub fn build_procedure(lines: &[ProgramLine]) -> (ControlFlowGraph, Vec<Diagnostic>) {
    let prescan_result = prescan(lines);
    let mut b = CfgBuilder::new(prescan_result);
    b.run(lines);
    b.finish()
}

impl CfgBuilder {
    fn new(prescan: PreScanResult) -> Self {
        let mut graph = ControlFlowGraph::new();
        let entry = graph.new_block("entry");
        let exit = graph.new_block("exit");
        graph.entry = Some(entry);
        graph.exit = Some(exit);
        Self {
            graph,
            prescan,
            ctx: ContextStacks::new(),
            current: entry,
            diagnostics: Vec::new(),
            next_return_id: 0,
            current_line: None,
            pending_edge_kind_fixups: Vec::new(),
            next_try_index: 0,
        }
    }

    fn run(&mut self, lines: &[ProgramLine]) {
        for (line_idx, line) in lines.iter().enumerate() {
            self.open_line_block_if_needed(line_idx, line);
            self.build_stmts(&line.statements);
        }
        let exit = self.graph.exit.unwrap();
        if !self.terminated() {
            self.graph.add_edge(self.current, exit, EdgeKind::Fallthrough);
        }
    }

    fn finish(mut self) -> (ControlFlowGraph, Vec<Diagnostic>) {
        let unresolved = self.graph.resolve_deferred();
        for (eid, kind) in self.pending_edge_kind_fixups.drain(..) {
            if !matches!(self.graph.edges[eid].kind, EdgeKind::Deferred(_)) {
                self.graph.edges[eid].kind = kind;
            }
        }
        for target in unresolved {
            self.diagnostics.push(Diagnostic::new(
                DiagnosticKind::UnresolvedLabel(target),
                None,
            ));
        }
        if !self.graph.check_conditional_pairing() {
            self.diagnostics.push(Diagnostic::new(
                DiagnosticKind::InternalInvariantViolation(
                    "a decision block lacks matching ConditionalTrue/ConditionalFalse edges"
                        .into(),
                ),
                None,
            ));
        }
        self.diagnostics.extend(self.prescan.diagnostics.clone());
        (self.graph, self.diagnostics)
    }

    /// An AST statement with a line number or label always
    /// starts a fresh block, and the pre-scan's maps are what let the
    /// builder record that block immediately rather than discover the
    /// need for a split later.
    fn open_line_block_if_needed(&mut self, line_idx: usize, line: &ProgramLine) {
        if line.line_number.is_none() && line.label.is_none() {
            return;
        }
        self.current_line = line.line_number;
        let fresh = self.graph.new_block(format!("line_{line_idx}"));
        if !self.terminated() {
            self.graph.add_edge(self.current, fresh, EdgeKind::Fallthrough);
        }
        self.current = fresh;
        if let Some(n) = line.line_number {
            self.graph.line_to_block.insert(n, fresh);
        }
        if let Some(l) = &line.label {
            self.graph.label_to_block.insert(l.clone(), fresh);
        }
    }

    fn loc(&self) -> Option<SourceLocation> {
        self.current_line.map(|line| SourceLocation { line })
    }

    fn terminated(&self) -> bool {
        self.graph.blocks[self.current].is_terminated()
    }

    fn build_stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            if self.terminated() {
                // Dead code after a terminator within the same
                // structured list (e.g. statements after an
                // unconditional GOTO on one line): open a fresh,
                // predecessor-less block so the statement still has
                // somewhere to live; the reporter flags it later.
                self.current = self.graph.new_block("unreachable_tail");
            }
            self.build_stmt(stmt);
        }
    }

    fn build_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::If {
                branches,
                else_branch,
            } => self.build_if(branches, else_branch.as_deref()),
            Stmt::While { cond, body } => self.build_while(cond, body),
            Stmt::For {
                var,
                from,
                to,
                step,
                body,
            } => self.build_for(var, from, to, step.as_ref(), body),
            Stmt::Repeat { body, until } => {
                self.build_post_test_loop(body, until, LoopKind::Repeat, true)
            }
            Stmt::Do { kind, cond, body } => self.build_do(*kind, cond.as_ref(), body),
            Stmt::SelectCase { selector, cases } => self.build_select_case(selector, cases),
            Stmt::Goto { target } => self.build_goto(target),
            Stmt::Gosub { target } => self.build_gosub(target),
            Stmt::Return => self.build_return(),
            Stmt::OnGoto { selector, targets } => self.build_on_goto(selector, targets),
            Stmt::OnGosub { selector, targets } => self.build_on_gosub(selector, targets),
            Stmt::OnCall { selector, targets } => self.build_on_call(selector, targets),
            Stmt::Try {
                body,
                catches,
                finally,
            } => self.build_try(body, catches, finally.as_deref()),
            Stmt::Throw { .. } => {
                let r = self.graph.push_stmt_to_block(self.current, stmt.clone());
                self.graph.blocks[self.current].terminator = crate::cfg::Terminator::Throw(r);
            }
            Stmt::End => {
                self.graph.push_stmt_to_block(self.current, stmt.clone());
                self.graph.blocks[self.current].terminator = crate::cfg::Terminator::End;
            }
            Stmt::ExitLoop => {
                if let Some(exit_block) = self.ctx.innermost_loop_exit() {
                    self.graph.add_edge(self.current, exit_block, EdgeKind::LoopExit);
                } else {
                    self.diagnostics.push(Diagnostic::new(
                        DiagnosticKind::BadLoopNesting("EXIT outside any loop"),
                        self.loc(),
                    ));
                }
            }
            // Straight-line statements: recorded, no control-flow effect.
            _ => {
                self.graph.push_stmt_to_block(self.current, stmt.clone());
            }
        }
    }

    // ---- IF/ELSEIF/ELSE ----

    fn build_if(
        &mut self,
        branches: &[(crate::ast::Expr, Vec<Stmt>)],
        else_branch: Option<&[Stmt]>,
    ) {
        let join = self.graph.new_block("if_join");
        let mut decision = self.current;

        for (i, (cond, body)) in branches.iter().enumerate() {
            self.graph
                .conditions
                .insert(decision, BlockCondition::Bool(cond.clone()));
            let then_block = self.graph.new_block(format!("if_then_{i}"));
            let is_last = i + 1 == branches.len();
            let next = if !is_last {
                self.graph.new_block(format!("if_test_{}", i + 1))
            } else if else_branch.is_some() {
                self.graph.new_block("if_else")
            } else {
                join
            };
            self.graph.add_edge(decision, then_block, EdgeKind::ConditionalTrue);
            self.graph.add_edge(decision, next, EdgeKind::ConditionalFalse);

            self.current = then_block;
            self.build_stmts(body);
            if !self.terminated() {
                self.graph.add_edge(self.current, join, EdgeKind::Unconditional);
            }
            decision = next;
        }

        if let Some(else_body) = else_branch {
            self.current = decision;
            self.build_stmts(else_body);
            if !self.terminated() {
                self.graph.add_edge(self.current, join, EdgeKind::Unconditional);
            }
        }

        self.current = join;
    }

    // ---- WHILE (pre-test) ----

    fn build_while(&mut self, cond: &crate::ast::Expr, body: &[Stmt]) {
        self.build_pre_test_loop(body, cond, LoopKind::While, false);
    }

    // ---- FOR ----

    fn build_for(
        &mut self,
        var: &str,
        from: &crate::ast::Expr,
        to: &crate::ast::Expr,
        step: Option<&crate::ast::Expr>,
        body: &[Stmt],
    ) {
        let step_expr = step.cloned().unwrap_or(crate::ast::Expr::IntLiteral(1));
        let step_is_negative = match &step_expr {
            crate::ast::Expr::IntLiteral(n) => Some(*n < 0),
            crate::ast::Expr::FloatLiteral(f) => Some(*f < 0.0),
            _ => None,
        };

        // Initialize the loop variable: `LET var = from`.
        self.graph.push_stmt_to_block(
            self.current,
            Stmt::Let {
                target: crate::ast::Expr::Var(var.to_string()),
                value: from.clone(),
            },
        );

        let header = self.graph.new_block("for_header");
        let body_blk = self.graph.new_block("for_body");
        let incr = self.graph.new_block("for_incr");
        let exit = self.graph.new_block("for_exit");

        if !self.terminated() {
            self.graph.add_edge(self.current, header, EdgeKind::Fallthrough);
        }
        self.graph.conditions.insert(
            header,
            BlockCondition::ForTest {
                var: var.to_string(),
                limit: to.clone(),
                step_is_negative,
                step: step_expr.clone(),
            },
        );
        self.graph.add_edge(header, body_blk, EdgeKind::ConditionalTrue);
        self.graph.add_edge(header, exit, EdgeKind::ConditionalFalse);

        self.ctx.loops.push(LoopContext {
            header_block: header,
            exit_block: exit,
            kind: LoopKind::For,
        });
        self.current = body_blk;
        self.build_stmts(body);
        if !self.terminated() {
            self.graph.add_edge(self.current, incr, EdgeKind::Unconditional);
        }
        self.ctx.loops.pop();

        self.current = incr;
        self.graph.push_stmt_to_block(
            incr,
            Stmt::Let {
                target: crate::ast::Expr::Var(var.to_string()),
                value: crate::ast::Expr::Binary(
                    crate::ast::BinOp::Add,
                    Box::new(crate::ast::Expr::Var(var.to_string())),
                    Box::new(step_expr),
                ),
            },
        );
        self.graph.add_edge(incr, header, EdgeKind::LoopBack);

        self.graph.loops.push(crate::cfg::LoopInfo {
            header,
            body: body_blk,
            exit,
        });
        self.current = exit;
    }

    // ---- DO/LOOP, all four variants ----

    fn build_do(&mut self, kind: LoopKind, cond: Option<&crate::ast::Expr>, body: &[Stmt]) {
        match kind {
            LoopKind::DoWhilePre => self.build_pre_test_loop(body, cond.unwrap(), kind, false),
            LoopKind::DoUntilPre => self.build_pre_test_loop(body, cond.unwrap(), kind, true),
            LoopKind::DoWhilePost => self.build_post_test_loop(body, cond.unwrap(), kind, false),
            LoopKind::DoUntilPost => self.build_post_test_loop(body, cond.unwrap(), kind, true),
            LoopKind::Infinite => {
                self.build_pre_test_loop(body, &crate::ast::Expr::IntLiteral(1), kind, false)
            }
            LoopKind::While | LoopKind::For | LoopKind::Repeat => {
                unreachable!("DO never carries these loop kinds")
            }
        }
    }

    /// Pre-test loops share one shape: header tests the condition, body
    /// runs, back-edge to header. `invert` is true for `UNTIL`-flavored
    /// pre-tests, which continue while the condition is *false*.
    fn build_pre_test_loop(
        &mut self,
        body: &[Stmt],
        cond: &crate::ast::Expr,
        kind: LoopKind,
        invert: bool,
    ) {
        let header = self.graph.new_block("loop_header");
        let body_blk = self.graph.new_block("loop_body");
        let exit = self.graph.new_block("loop_exit");

        if !self.terminated() {
            self.graph.add_edge(self.current, header, EdgeKind::Fallthrough);
        }
        self.graph
            .conditions
            .insert(header, BlockCondition::Bool(cond.clone()));
        let (true_edge, false_edge) = if invert {
            (EdgeKind::ConditionalFalse, EdgeKind::ConditionalTrue)
        } else {
            (EdgeKind::ConditionalTrue, EdgeKind::ConditionalFalse)
        };
        self.graph.add_edge(header, body_blk, true_edge);
        self.graph.add_edge(header, exit, false_edge);

        self.ctx.loops.push(LoopContext {
            header_block: header,
            exit_block: exit,
            kind,
        });
        self.current = body_blk;
        self.build_stmts(body);
        if !self.terminated() {
            self.graph.add_edge(self.current, header, EdgeKind::LoopBack);
        }
        self.ctx.loops.pop();
        self.graph.loops.push(crate::cfg::LoopInfo {
            header,
            body: body_blk,
            exit,
        });
        self.current = exit;
    }

    /// Post-test loops (`REPEAT...UNTIL`, `DO...LOOP WHILE/UNTIL`) always
    /// run the body at least once: body -> cond -> (back to body | exit).
    fn build_post_test_loop(
        &mut self,
        body: &[Stmt],
        cond: &crate::ast::Expr,
        kind: LoopKind,
        invert: bool,
    ) {
        let body_blk = self.graph.new_block("loop_body");
        let cond_blk = self.graph.new_block("loop_cond");
        let exit = self.graph.new_block("loop_exit");

        if !self.terminated() {
            self.graph.add_edge(self.current, body_blk, EdgeKind::Fallthrough);
        }
        self.ctx.loops.push(LoopContext {
            header_block: body_blk,
            exit_block: exit,
            kind,
        });
        self.current = body_blk;
        self.build_stmts(body);
        if !self.terminated() {
            self.graph.add_edge(self.current, cond_blk, EdgeKind::Unconditional);
        }
        self.ctx.loops.pop();

        self.graph
            .conditions
            .insert(cond_blk, BlockCondition::Bool(cond.clone()));
        // REPEAT...UNTIL and DO...LOOP UNTIL continue while false
        // (`invert`); DO...LOOP WHILE continues while true. The
        // "continue" edge is always tagged `LoopBack` regardless of
        // polarity so loop-detection (cfg_printer.rs) finds every back edge
        // the same way; only the exit edge carries the condition's
        // literal true/false tag.
        let exit_edge_kind = if invert {
            EdgeKind::ConditionalTrue
        } else {
            EdgeKind::ConditionalFalse
        };
        self.graph.add_edge(cond_blk, body_blk, EdgeKind::LoopBack);
        self.graph.add_edge(cond_blk, exit, exit_edge_kind);

        self.graph.loops.push(crate::cfg::LoopInfo {
            header: body_blk,
            body: body_blk,
            exit,
        });
        self.current = exit;
    }

    // ---- SELECT CASE ----

    fn build_select_case(
        &mut self,
        selector: &crate::ast::Expr,
        cases: &[(CaseLabel, Vec<Stmt>)],
    ) {
        let exit = self.graph.new_block("select_exit");
        let chain_head = self.current;

        let mut test_block = self.current;
        for (i, (label, body)) in cases.iter().enumerate() {
            if matches!(label, CaseLabel::Else) {
                // CASE ELSE always matches: its body runs directly in
                // the current test block rather than behind a boolean
                // guard, since there is nothing left to compare against.
                self.current = test_block;
                self.build_stmts(body);
                if !self.terminated() {
                    self.graph.add_edge(self.current, exit, EdgeKind::Unconditional);
                }
                continue;
            }
            if i > 0 {
                let next_test = self.graph.new_block(format!("case_test_{i}"));
                self.graph.add_edge(test_block, next_test, EdgeKind::ConditionalFalse);
                test_block = next_test;
            }
            self.graph.conditions.insert(
                test_block,
                BlockCondition::Select(SelectTest {
                    chain_head,
                    selector: selector.clone(),
                    label: label.clone(),
                }),
            );
            let case_body = self.graph.new_block(format!("case_body_{i}"));
            self.graph.add_edge(test_block, case_body, EdgeKind::ConditionalTrue);
            self.current = case_body;
            self.build_stmts(body);
            if !self.terminated() {
                self.graph.add_edge(self.current, exit, EdgeKind::Unconditional);
            }
        }

        let has_else = cases.iter().any(|(l, _)| matches!(l, CaseLabel::Else));
        if !has_else && !self.graph.blocks[test_block].is_terminated() {
            self.graph.add_edge(test_block, exit, EdgeKind::ConditionalFalse);
        }

        self.current = exit;
    }

    // ---- GOTO ----

    fn build_goto(&mut self, target: &JumpTarget) {
        self.graph.add_deferred_edge(self.current, target.clone());
    }

    // ---- GOSUB ----

    fn build_gosub(&mut self, target: &JumpTarget) {
        let call_block = self.current;
        let eid = self.graph.add_deferred_edge(call_block, target.clone());
        self.pending_edge_kind_fixups.push((eid, EdgeKind::Call));

        let return_id = self.next_return_id;
        self.next_return_id += 1;
        let return_site = self.graph.new_block(format!("gosub_ret_{return_id}"));
        self.graph.mark_return_target(return_site);
        self.graph.gosub_sites.push(crate::cfg::GosubSite {
            call_block,
            return_site,
            return_id,
        });
        self.current = return_site;
    }

    fn build_return(&mut self) {
        if self.graph.gosub_sites.is_empty() {
            self.diagnostics.push(Diagnostic::new(
                DiagnosticKind::ReturnOutsideGosubRegion,
                self.loc(),
            ));
        }
        self.graph.blocks[self.current].terminator = crate::cfg::Terminator::Return(None);
    }

    // ---- ON <expr> GOTO ----

    fn build_on_goto(&mut self, selector: &crate::ast::Expr, targets: &[JumpTarget]) {
        let on_block = self.current;
        self.graph.conditions.insert(
            on_block,
            BlockCondition::ComputedCase {
                selector: selector.clone(),
                target_count: targets.len() as u32,
            },
        );
        for (i, target) in targets.iter().enumerate() {
            let eid = self.graph.add_deferred_edge(on_block, target.clone());
            self.pending_edge_kind_fixups
                .push((eid, EdgeKind::ComputedCase(i as u32)));
        }
        let fallthrough = self.graph.new_block("on_goto_fallthrough");
        self.graph.add_edge(on_block, fallthrough, EdgeKind::Fallthrough);
        self.current = fallthrough;
    }

    // ---- ON <expr> GOSUB ----

    fn build_on_gosub(&mut self, selector: &crate::ast::Expr, targets: &[JumpTarget]) {
        let on_block = self.current;
        self.graph.conditions.insert(
            on_block,
            BlockCondition::ComputedCase {
                selector: selector.clone(),
                target_count: targets.len() as u32,
            },
        );
        let return_id = self.next_return_id;
        self.next_return_id += 1;
        let return_site = self.graph.new_block(format!("on_gosub_ret_{return_id}"));
        self.graph.mark_return_target(return_site);

        for (i, target) in targets.iter().enumerate() {
            let eid = self.graph.add_deferred_edge(on_block, target.clone());
            self.pending_edge_kind_fixups
                .push((eid, EdgeKind::ComputedCase(i as u32)));
            self.graph.gosub_sites.push(crate::cfg::GosubSite {
                call_block: on_block,
                return_site,
                return_id,
            });
        }
        self.graph.add_edge(on_block, return_site, EdgeKind::Fallthrough);
        self.current = return_site;
    }

    // ---- ON <expr> CALL ----

    fn build_on_call(&mut self, selector: &crate::ast::Expr, targets: &[String]) {
        let on_block = self.current;
        self.graph.conditions.insert(
            on_block,
            BlockCondition::ComputedCase {
                selector: selector.clone(),
                target_count: targets.len() as u32,
            },
        );
        let continuation = self.graph.new_block("on_call_continuation");
        for (i, name) in targets.iter().enumerate() {
            let trampoline = self.graph.new_block(format!("on_call_trampoline_{i}"));
            self.graph
                .add_edge(on_block, trampoline, EdgeKind::ComputedCase(i as u32));
            self.graph.push_stmt_to_block(
                trampoline,
                Stmt::SubCall {
                    name: name.clone(),
                    args: vec![],
                },
            );
            self.graph.add_edge(trampoline, continuation, EdgeKind::Unconditional);
        }
        self.graph.add_edge(on_block, continuation, EdgeKind::Fallthrough);
        self.current = continuation;
    }

    // ---- TRY/CATCH/FINALLY/THROW ----

    fn build_try(
        &mut self,
        body: &[Stmt],
        catches: &[crate::ast::CatchClause],
        finally: Option<&[Stmt]>,
    ) {
        if catches.is_empty() && finally.is_none() {
            self.diagnostics.push(Diagnostic::new(
                DiagnosticKind::BadTryShape("TRY has neither CATCH nor FINALLY"),
                self.loc(),
            ));
        }
        let catch_all_idx = catches.iter().position(|c| c.codes.is_empty());
        if let Some(idx) = catch_all_idx {
            if idx + 1 < catches.len() {
                self.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::UnreachableCatchClause,
                    self.loc(),
                ));
            }
        }

        let shape = exceptions::build_try_skeleton(
            &mut self.graph,
            self.current,
            catches,
            finally.is_some(),
        );
        let finally_or_exit = shape.finally.unwrap_or(shape.exit);

        self.ctx.tries.push(TryContext {
            dispatch_block: shape.dispatch,
            finally_block: shape.finally,
            exit_block: shape.exit,
            has_finally: finally.is_some(),
        });
        self.current = shape.body_entry;
        self.build_stmts(body);
        if !self.terminated() {
            self.graph.add_edge(self.current, finally_or_exit, EdgeKind::Unconditional);
        }
        self.ctx.tries.pop();

        for (entry, clause) in shape.catch_entries.iter().zip(catches.iter()) {
            self.current = *entry;
            self.build_stmts(&clause.body);
            if !self.terminated() {
                self.graph.add_edge(self.current, finally_or_exit, EdgeKind::Unconditional);
            }
        }

        // With a FINALLY, its own tail must distinguish "fell through
        // normally" (continue to try_exit) from "reached via the
        // dispatch chain's uncaught fallthrough" (run the block, then
        // rethrow) — the emitter reads the pending-rethrow flag this
        // pair of edges implies.
        if let (Some(finally_block), Some(finally_body)) = (shape.finally, finally) {
            self.current = finally_block;
            self.build_stmts(finally_body);
            if !self.terminated() {
                self.graph.add_edge(self.current, shape.rethrow, EdgeKind::ConditionalTrue);
                self.graph.add_edge(self.current, shape.exit, EdgeKind::ConditionalFalse);
            }
        }

        let index = self.next_try_index;
        self.next_try_index += 1;
        self.graph.try_shapes.push(crate::cfg::TryShapeInfo {
            index,
            setup: shape.setup,
            dispatch: shape.dispatch,
            dispatch_tests: shape.dispatch_tests,
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

        self.current = shape.exit;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinOp, Expr, ProgramLine, Stmt};

    fn pline(n: u32, stmts: Vec<Stmt>) -> ProgramLine {
        ProgramLine {
            line_number: Some(n),
            label: None,
            statements: stmts,
        }
    }

    #[test]
    fn straight_line_program_falls_through_to_exit() {
        let lines = vec![pline(
            10,
            vec![Stmt::Let {
                target: Expr::Var("x".into()),
                value: Expr::IntLiteral(1),
            }],
        )];
        let (graph, diags) = build_procedure(&lines);
        assert!(diags.is_empty());
        assert!(graph.exit.is_some());
    }

    #[test]
    fn if_then_else_produces_complementary_conditional_edges() {
        let lines = vec![pline(
            10,
            vec![Stmt::If {
                branches: vec![(
                    Expr::Binary(
                        BinOp::Gt,
                        Box::new(Expr::Var("x".into())),
                        Box::new(Expr::IntLiteral(0)),
                    ),
                    vec![Stmt::End],
                )],
                else_branch: Some(vec![Stmt::End]),
            }],
        )];
        let (graph, _diags) = build_procedure(&lines);
        assert!(graph.check_conditional_pairing());
    }

    #[test]
    fn for_loop_has_one_back_edge_and_one_exit() {
        let lines = vec![pline(
            10,
            vec![Stmt::For {
                var: "i".into(),
                from: Expr::IntLiteral(1),
                to: Expr::IntLiteral(10),
                step: None,
                body: vec![],
            }],
        )];
        let (graph, _diags) = build_procedure(&lines);
        assert_eq!(graph.loops.len(), 1);
        let back_edges = graph
            .edges
            .values()
            .filter(|e| e.kind == EdgeKind::LoopBack)
            .count();
        let exit_edges = graph
            .edges
            .values()
            .filter(|e| e.kind == EdgeKind::ConditionalFalse && e.to == graph.loops[0].exit)
            .count();
        assert_eq!(back_edges, 1);
        assert!(exit_edges >= 1);
    }

    #[test]
    fn goto_forward_reference_resolves() {
        let lines = vec![
            pline(
                10,
                vec![Stmt::Goto {
                    target: JumpTarget::Line(30),
                }],
            ),
            pline(20, vec![Stmt::End]),
            pline(30, vec![Stmt::End]),
        ];
        let (graph, diags) = build_procedure(&lines);
        assert!(diags
            .iter()
            .all(|d| !matches!(d.kind, DiagnosticKind::UnresolvedLabel(_))));
        assert!(!graph.has_deferred_edges());
    }

    #[test]
    fn gosub_registers_a_sparse_return_target_and_call_edge() {
        let lines = vec![
            pline(
                10,
                vec![Stmt::Gosub {
                    target: JumpTarget::Line(100),
                }],
            ),
            pline(100, vec![Stmt::Return]),
        ];
        let (graph, _diags) = build_procedure(&lines);
        assert_eq!(graph.gosub_sites.len(), 1);
        assert_eq!(graph.return_targets.len(), 1);
        let call_edges: Vec<_> = graph
            .edges
            .values()
            .filter(|e| e.kind == EdgeKind::Call)
            .collect();
        assert_eq!(call_edges.len(), 1);
    }

    #[test]
    fn return_outside_gosub_is_diagnosed() {
        let lines = vec![pline(10, vec![Stmt::Return])];
        let (_graph, diags) = build_procedure(&lines);
        assert!(diags
            .iter()
            .any(|d| d.kind == DiagnosticKind::ReturnOutsideGosubRegion));
    }

    #[test]
    fn unreachable_catch_after_catch_all_is_diagnosed() {
        let lines = vec![pline(
            10,
            vec![Stmt::Try {
                body: vec![],
                catches: vec![
                    crate::ast::CatchClause {
                        codes: vec![],
                        body: vec![],
                    },
                    crate::ast::CatchClause {
                        codes: vec![11],
                        body: vec![],
                    },
                ],
                finally: None,
            }],
        )];
        let (_graph, diags) = build_procedure(&lines);
        assert!(diags
            .iter()
            .any(|d| d.kind == DiagnosticKind::UnreachableCatchClause));
    }

    #[test]
    fn on_goto_wires_a_computed_case_edge_per_target() {
        let lines = vec![
            pline(
                10,
                vec![Stmt::OnGoto {
                    selector: Expr::Var("x".into()),
                    targets: vec![JumpTarget::Line(20), JumpTarget::Line(30)],
                }],
            ),
            pline(20, vec![Stmt::End]),
            pline(30, vec![Stmt::End]),
        ];
        let (graph, _diags) = build_procedure(&lines);
        let computed: Vec<_> = graph
            .edges
            .values()
            .filter(|e| matches!(e.kind, EdgeKind::ComputedCase(_)))
            .collect();
        assert_eq!(computed.len(), 2);
    }

    #[test]
    fn for_loop_with_crossed_bounds_still_builds_structurally() {
        // `FOR i = 10 TO 1 STEP 1` executes zero times at runtime, but
        // structurally the CFG is identical to any other FOR: the
        // runtime behavior comes from the comparison direction chosen at
        // emission time, not from the builder special-casing the
        // literal bounds.
        let lines = vec![pline(
            10,
            vec![Stmt::For {
                var: "i".into(),
                from: Expr::IntLiteral(10),
                to: Expr::IntLiteral(1),
                step: Some(Expr::IntLiteral(1)),
                body: vec![],
            }],
        )];
        let (graph, _diags) = build_procedure(&lines);
        assert_eq!(graph.loops.len(), 1);
    }
}
