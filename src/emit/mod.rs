//! The QBE Emitter: walks one procedure's already-built
//! `ControlFlowGraph` block by block and turns it into QBE IL text.
//! Every terminator is synthesized from the block's out-edges rather
//! than re-derived from the source AST's own control-flow shape — the
//! builder already threw that shape away in favor of `BlockCondition`s
//! and typed `EdgeKind`s, and the emitter's job is only to read those
//! back. `expr`/`stmt` lower the statements a block
//! carries; this module owns the walk, the per-block terminator, GOSUB's
//! sparse RETURN dispatch, and hands TRY/CATCH/FINALLY off to
//! `exceptions`.

mod exceptions;
mod expr;
mod stmt;

use crate::ast::{Expr, Stmt};
use crate::cfg::{BlockCondition, BlockId, ControlFlowGraph, Edge, EdgeKind, Terminator};
use crate::context::{CompileOptions, StringTable};
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::il::{IlBuilder, Label, Temp};
use crate::runtime;
use crate::symbol::ProcedureSymbols;
use crate::types::IlClass;
use exceptions::{build_try_roles, is_last_clause, pending_rethrow_slot, TryRole};
use rustc_hash::{FxHashMap, FxHashSet};

/// Key under which the active GOSUB call's return id is tracked in
/// `Emitter::locals` — same value-tracking mechanism as an ordinary
/// BASIC variable: a plain stack-slot-less "last write wins" cell is
/// enough, since a procedure only ever has one GOSUB call in flight at
/// a time.
const GOSUB_RID_KEY: &str = "$$gosub_rid";

/// One procedure's emission state: the buffered IL text, the Symbol
/// Mapper's output for this procedure, and everything computed once up
/// front from the graph (TRY roles, GOSUB call-site/return-site tables)
/// so the per-block walk doesn't re-derive them.
pub struct Emitter<'a> {
    b: IlBuilder,
    type_manager: crate::types::TypeManager,
    symbols: ProcedureSymbols,
    locals: FxHashMap<String, Temp>,
    strings: &'a mut StringTable,
    opts: CompileOptions,
    diagnostics: Vec<Diagnostic>,
    roles: FxHashMap<BlockId, TryRole>,
    call_block_rid: FxHashMap<BlockId, u32>,
    dispatch_pairs: Vec<(u32, BlockId)>,
    return_class: Option<IlClass>,
    return_var: String,
}

pub struct EmittedFunction {
    pub text: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// Emit one procedure's (or the top-level program's) `export function`
/// block. `params` pairs each parameter's source identifier with its IL
/// class, in declaration order; `return_class`/`return_var` are `Some`
/// only for a `FUNCTION`, whose return value is modeled as an ordinary
/// local bound to the procedure's own name (the BASIC idiom, e.g.
/// `F# = c# + a# * b#`), loaded and `ret`'d at the graph's exit
/// block rather than through any dedicated return-value machinery.
pub fn emit_function(
    graph: &ControlFlowGraph,
    qbe_name: &str,
    params: &[(String, IlClass)],
    return_class: Option<IlClass>,
    return_var: &str,
    symbols: ProcedureSymbols,
    strings: &mut StringTable,
    opts: CompileOptions,
) -> EmittedFunction {
    let roles = build_try_roles(graph);

    let mut call_block_rid = FxHashMap::default();
    for site in &graph.gosub_sites {
        call_block_rid.entry(site.call_block).or_insert(site.return_id);
    }
    let mut seen = FxHashSet::default();
    let mut dispatch_pairs: Vec<(u32, BlockId)> = Vec::new();
    for site in &graph.gosub_sites {
        if seen.insert(site.return_id) {
            dispatch_pairs.push((site.return_id, site.return_site));
        }
    }
    if opts.sort_sparse_dispatch {
        dispatch_pairs.sort_by_key(|(rid, _)| *rid);
    }

    let mut e = Emitter {
        b: IlBuilder::new(),
        type_manager: crate::types::TypeManager::new(),
        symbols,
        locals: FxHashMap::default(),
        strings,
        opts,
        diagnostics: Vec::new(),
        roles,
        call_block_rid,
        dispatch_pairs,
        return_class,
        return_var: return_var.to_string(),
    };

    let mut param_text = Vec::with_capacity(params.len());
    for (name, cls) in params {
        let t = e.b.alloc_temp(*cls);
        param_text.push(format!("{cls} {}", t.text()));
        e.locals.insert(name.clone(), t);
    }

    for block in graph.blocks.keys() {
        e.b.emit_label(&block_label(e.opts, graph, block));
        for stmt_ref in graph.blocks[block].statements.iter() {
            let stmt = graph.stmt(*stmt_ref);
            // `End`'s runtime effect is the block's terminator (a plain
            // `hlt`), already accounted for there; lowering it again
            // here would hit stmt.rs's control-flow catch-all.
            if matches!(stmt, Stmt::End) {
                continue;
            }
            e.lower_stmt(stmt);
        }
        e.emit_terminator(graph, block);
    }

    let sig = match return_class {
        Some(cls) => format!("export function {cls} ${qbe_name}({})", param_text.join(", ")),
        None => format!("export function ${qbe_name}({})", param_text.join(", ")),
    };
    let text = format!("{sig} {{\n{}}}\n", e.b.text());
    EmittedFunction {
        text,
        diagnostics: e.diagnostics,
    }
}

/// This procedure's QBE label for `block`, unique across the function
/// regardless of how many of the builder's human-readable names
/// collide (two `IF`s both name a join block `if_join`, for instance).
/// `CompileOptions::structured_labels` picks whether the builder's own
/// name rides along for readability or is dropped for a bare `@block_N`.
fn block_label(opts: CompileOptions, graph: &ControlFlowGraph, block: BlockId) -> Label {
    if opts.structured_labels {
        Label::from_text(format!("{}_{}", graph.blocks[block].label, block.as_u32()))
    } else {
        Label::from_text(format!("block_{}", block.as_u32()))
    }
}

impl Emitter<'_> {
    pub(super) fn intern_string(&mut self, s: &str) -> String {
        self.strings.intern(s)
    }

    fn set_pseudo(&mut self, key: &str, t: Temp) {
        self.locals.insert(key.to_string(), t);
    }

    /// Read a pseudo-variable (the GOSUB return-id cell, a TRY's
    /// pending-rethrow flag) that may not have been written on every
    /// path reaching here — e.g. a `RETURN` with no matching `GOSUB` in
    /// this procedure, already flagged as `ReturnOutsideGosubRegion` at
    /// build time; zero-initializing here just keeps emission total.
    fn get_pseudo(&mut self, key: &str, cls: IlClass) -> Temp {
        if let Some(&t) = self.locals.get(key) {
            return t;
        }
        let t = self.b.alloc_temp(cls);
        self.b.emit_instr(Some(t), cls, "copy", &["0"]);
        self.locals.insert(key.to_string(), t);
        t
    }

    fn emit_terminator(&mut self, graph: &ControlFlowGraph, block: BlockId) {
        match graph.blocks[block].terminator.clone() {
            Terminator::End | Terminator::Throw(_) | Terminator::Unreachable => {
                self.b.emit_instr(None, IlClass::Word, "hlt", &[]);
                return;
            }
            Terminator::Return(_) => {
                self.emit_return_dispatch(graph);
                return;
            }
            Terminator::Open | Terminator::FromEdges => {}
        }

        // GOSUB call sites (plain or ON...GOSUB) stash their return id
        // before jumping, regardless of whether the jump itself ends up
        // a single `Call` edge or a computed-case chain.
        if let Some(&rid) = self.call_block_rid.get(&block) {
            let t = self.b.alloc_temp(IlClass::Word);
            self.b.emit_instr(Some(t), IlClass::Word, "copy", &[&rid.to_string()]);
            self.set_pseudo(GOSUB_RID_KEY, t);
        }

        if let Some(role) = self.roles.get(&block).copied() {
            if self.emit_try_role_terminator(graph, role, block) {
                return;
            }
        }

        let out: Vec<&Edge> = graph.out_edges(block).collect();
        match out.len() {
            0 => {
                if Some(block) == graph.exit {
                    self.emit_function_epilogue();
                } else {
                    // No predecessor ever reaches this point at runtime
                    // (flagged separately by CFG Reporting's unreachable-
                    // block count); still needs a valid terminator.
                    self.b.emit_instr(None, IlClass::Word, "hlt", &[]);
                }
            }
            1 => {
                let label = block_label(self.opts, graph, out[0].to);
                self.b.emit_jump(&label);
            }
            _ => self.emit_multi_edge(graph, block, &out),
        }
    }

    fn emit_multi_edge(&mut self, graph: &ControlFlowGraph, block: BlockId, out: &[&Edge]) {
        let true_edge = out.iter().find(|e| e.kind == EdgeKind::ConditionalTrue);
        let false_edge = out.iter().find(|e| e.kind == EdgeKind::ConditionalFalse);
        let loopback_edge = out.iter().find(|e| e.kind == EdgeKind::LoopBack);
        // A post-test loop's condition block has exactly one conditional
        // edge (true for an UNTIL-flavored exit test, false for a
        // WHILE-flavored one) and a LoopBack edge standing in for the
        // other branch — the header never carries both Conditional*
        // kinds at once in that shape (see `build_post_test_loop`).
        match (true_edge, false_edge, loopback_edge) {
            (Some(t), Some(f), _) => {
                let cond = self.eval_block_condition(graph, block);
                let tl = block_label(self.opts, graph, t.to);
                let fl = block_label(self.opts, graph, f.to);
                self.b.emit_cond_jump(cond, &tl, &fl);
            }
            (Some(t), None, Some(lb)) => {
                let cond = self.eval_block_condition(graph, block);
                let tl = block_label(self.opts, graph, t.to);
                let bl = block_label(self.opts, graph, lb.to);
                self.b.emit_cond_jump(cond, &tl, &bl);
            }
            (None, Some(f), Some(lb)) => {
                let cond = self.eval_block_condition(graph, block);
                let fl = block_label(self.opts, graph, f.to);
                let bl = block_label(self.opts, graph, lb.to);
                self.b.emit_cond_jump(cond, &bl, &fl);
            }
            _ => self.emit_computed_case_chain(graph, block, out),
        }
    }

    fn eval_block_condition(&mut self, graph: &ControlFlowGraph, block: BlockId) -> Temp {
        match graph.conditions.get(&block).cloned() {
            Some(BlockCondition::Bool(expr)) => {
                let (v, c) = self.lower_expr(&expr);
                self.convert(v, c, IlClass::Word)
            }
            Some(BlockCondition::ForTest {
                var,
                limit,
                step_is_negative,
                step,
            }) => self.eval_for_test(&var, &limit, step_is_negative, &step),
            Some(BlockCondition::Select(sel)) => self.eval_select_test(&sel),
            Some(BlockCondition::ComputedCase { .. }) | None => {
                self.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::InternalInvariantViolation(format!(
                        "block {block:?} has a conditional edge pair but no usable condition"
                    )),
                    None,
                ));
                let z = self.b.alloc_temp(IlClass::Word);
                self.b.emit_instr(Some(z), IlClass::Word, "copy", &["0"]);
                z
            }
        }
    }

    /// `FOR`'s continuation test: `var >= limit`
    /// when STEP is negative, `var <= limit` otherwise, blended
    /// branchlessly by the (possibly runtime-computed) step sign rather
    /// than picking a mnemonic at codegen time, so a non-literal STEP
    /// whose sign isn't known until runtime still gets a single
    /// straight-line test.
    fn eval_for_test(
        &mut self,
        var: &str,
        limit: &Expr,
        step_is_negative: Option<bool>,
        step: &Expr,
    ) -> Temp {
        let (var_val, var_cls) = self.lower_expr(&Expr::Var(var.to_string()));
        let (limit_val, limit_cls) = self.lower_expr(limit);
        let cls = expr::wider(var_cls, limit_cls);
        let v = self.convert(var_val, var_cls, cls);
        let l = self.convert(limit_val, limit_cls, cls);

        let ge_mn = expr::comparison_mnemonic(crate::ast::BinOp::Ge, cls);
        let le_mn = expr::comparison_mnemonic(crate::ast::BinOp::Le, cls);
        let ge = self.b.alloc_temp(IlClass::Word);
        self.b.emit_instr(Some(ge), IlClass::Word, &ge_mn, &[&v.text(), &l.text()]);
        let le = self.b.alloc_temp(IlClass::Word);
        self.b.emit_instr(Some(le), IlClass::Word, &le_mn, &[&v.text(), &l.text()]);

        let negative = match step_is_negative {
            Some(is_neg) => {
                let t = self.b.alloc_temp(IlClass::Word);
                self.b
                    .emit_instr(Some(t), IlClass::Word, "copy", &[if is_neg { "1" } else { "0" }]);
                t
            }
            None => {
                let (step_val, step_cls) = self.lower_expr(step);
                let step_val = self.convert(step_val, step_cls, cls);
                let zero_lit = if cls.is_float() { "d_0" } else { "0" };
                let lt_mn = expr::comparison_mnemonic(crate::ast::BinOp::Lt, cls);
                let t = self.b.alloc_temp(IlClass::Word);
                self.b
                    .emit_instr(Some(t), IlClass::Word, &lt_mn, &[&step_val.text(), zero_lit]);
                t
            }
        };
        let not_negative = self.b.alloc_temp(IlClass::Word);
        self.b
            .emit_instr(Some(not_negative), IlClass::Word, "xor", &[&negative.text(), "1"]);
        let ge_and_neg = self.b.alloc_temp(IlClass::Word);
        self.b
            .emit_instr(Some(ge_and_neg), IlClass::Word, "and", &[&ge.text(), &negative.text()]);
        let le_and_pos = self.b.alloc_temp(IlClass::Word);
        self.b.emit_instr(
            Some(le_and_pos),
            IlClass::Word,
            "and",
            &[&le.text(), &not_negative.text()],
        );
        let result = self.b.alloc_temp(IlClass::Word);
        self.b.emit_instr(
            Some(result),
            IlClass::Word,
            "or",
            &[&ge_and_neg.text(), &le_and_pos.text()],
        );
        result
    }

    /// `SELECT CASE`'s per-clause guard: the
    /// selector is lowered once per test (cheap — it's usually a bare
    /// variable) rather than cached across blocks, matching the same
    /// simplification `Emitter::locals` already makes for ordinary
    /// variable reads.
    fn eval_select_test(&mut self, sel: &crate::cfg::SelectTest) -> Temp {
        use crate::ast::{BinOp, CaseLabel};
        let (sv, sc) = self.lower_expr(&sel.selector);
        match &sel.label {
            CaseLabel::Single(e) => {
                let (v, c) = self.lower_expr(e);
                let cls = expr::wider(sc, c);
                let sv = self.convert(sv, sc, cls);
                let v = self.convert(v, c, cls);
                let t = self.b.alloc_temp(IlClass::Word);
                let mn = expr::comparison_mnemonic(BinOp::Eq, cls);
                self.b.emit_instr(Some(t), IlClass::Word, &mn, &[&sv.text(), &v.text()]);
                t
            }
            CaseLabel::List(items) => {
                let mut acc: Option<Temp> = None;
                for e in items {
                    let (v, c) = self.lower_expr(e);
                    let cls = expr::wider(sc, c);
                    let svx = self.convert(sv, sc, cls);
                    let v = self.convert(v, c, cls);
                    let mn = expr::comparison_mnemonic(BinOp::Eq, cls);
                    let eq = self.b.alloc_temp(IlClass::Word);
                    self.b.emit_instr(Some(eq), IlClass::Word, &mn, &[&svx.text(), &v.text()]);
                    acc = Some(match acc {
                        None => eq,
                        Some(prev) => {
                            let t = self.b.alloc_temp(IlClass::Word);
                            self.b.emit_instr(Some(t), IlClass::Word, "or", &[&prev.text(), &eq.text()]);
                            t
                        }
                    });
                }
                acc.expect("CASE list must carry at least one value")
            }
            CaseLabel::Range(lo, hi) => {
                let (lo_v, lo_c) = self.lower_expr(lo);
                let (hi_v, hi_c) = self.lower_expr(hi);
                let cls = expr::wider(expr::wider(sc, lo_c), hi_c);
                let svx = self.convert(sv, sc, cls);
                let lo_v = self.convert(lo_v, lo_c, cls);
                let hi_v = self.convert(hi_v, hi_c, cls);
                let ge_mn = expr::comparison_mnemonic(BinOp::Ge, cls);
                let le_mn = expr::comparison_mnemonic(BinOp::Le, cls);
                let ge = self.b.alloc_temp(IlClass::Word);
                self.b.emit_instr(Some(ge), IlClass::Word, &ge_mn, &[&svx.text(), &lo_v.text()]);
                let le = self.b.alloc_temp(IlClass::Word);
                self.b.emit_instr(Some(le), IlClass::Word, &le_mn, &[&svx.text(), &hi_v.text()]);
                let t = self.b.alloc_temp(IlClass::Word);
                self.b.emit_instr(Some(t), IlClass::Word, "and", &[&ge.text(), &le.text()]);
                t
            }
            CaseLabel::Relational(op, e) => {
                let (v, c) = self.lower_expr(e);
                let cls = expr::wider(sc, c);
                let svx = self.convert(sv, sc, cls);
                let v = self.convert(v, c, cls);
                let mn = expr::comparison_mnemonic(*op, cls);
                let t = self.b.alloc_temp(IlClass::Word);
                self.b.emit_instr(Some(t), IlClass::Word, &mn, &[&svx.text(), &v.text()]);
                t
            }
            CaseLabel::Else => unreachable!("CASE ELSE never produces a SelectTest"),
        }
    }

    /// `ON <expr> GOTO/GOSUB/CALL`: a block
    /// with `target_count` `ComputedCase` out-edges plus exactly one
    /// default edge. QBE has no switch instruction, so this synthesizes
    /// the same kind of auxiliary-label chain `lower_short_circuit`
    /// uses for `AND`/`OR` — one equality test per target, falling
    /// through to the next test's label until the default is reached.
    fn emit_computed_case_chain(&mut self, graph: &ControlFlowGraph, block: BlockId, out: &[&Edge]) {
        let (selector, target_count) = match graph.conditions.get(&block) {
            Some(BlockCondition::ComputedCase {
                selector,
                target_count,
            }) => (selector.clone(), *target_count),
            _ => {
                self.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::InternalInvariantViolation(format!(
                        "block {block:?} carries ComputedCase edges but no ComputedCase condition"
                    )),
                    None,
                ));
                self.b.emit_instr(None, IlClass::Word, "hlt", &[]);
                return;
            }
        };
        let (sel_val, sel_cls) = self.lower_expr(&selector);
        let sel_val = self.convert(sel_val, sel_cls, IlClass::Long);

        let default_edge = out
            .iter()
            .find(|e| !matches!(e.kind, EdgeKind::ComputedCase(_)))
            .expect("a computed-case dispatch block always carries exactly one default edge");
        let default_label = block_label(self.opts, graph, default_edge.to);

        let mut pending_label: Option<Label> = None;
        for i in 0..target_count {
            if let Some(l) = pending_label.take() {
                self.b.emit_label(&l);
            }
            let target_edge = out
                .iter()
                .find(|e| e.kind == EdgeKind::ComputedCase(i))
                .expect("missing ComputedCase edge for a declared target index");
            let target_label = block_label(self.opts, graph, target_edge.to);
            let is_last = i + 1 == target_count;
            let else_label = if is_last {
                default_label.clone()
            } else {
                self.b.make_reserved_label("case_test")
            };
            // BASIC's ON...GOTO/GOSUB/CALL selector is 1-based.
            let eq = self.b.alloc_temp(IlClass::Word);
            self.b
                .emit_instr(Some(eq), IlClass::Word, "ceql", &[&sel_val.text(), &(i + 1).to_string()]);
            self.b.emit_cond_jump(eq, &target_label, &else_label);
            if !is_last {
                pending_label = Some(else_label);
            }
        }
    }

    /// `RETURN`'s sparse dispatch: one equality test
    /// per distinct call site, not one per block in the procedure. A
    /// `return_id` with no match here is an internal invariant failure —
    /// every `RETURN` that passed `ReturnOutsideGosubRegion`'s build-time
    /// check is reachable only from a `GOSUB` that stored one of these
    /// ids, so the final fallback is a `hlt`, never reached in practice.
    fn emit_return_dispatch(&mut self, graph: &ControlFlowGraph) {
        if self.dispatch_pairs.is_empty() {
            self.b.emit_instr(None, IlClass::Word, "hlt", &[]);
            return;
        }
        let rid = self.get_pseudo(GOSUB_RID_KEY, IlClass::Word);
        let fallback = self.b.make_reserved_label("return_fallback");
        let pairs = self.dispatch_pairs.clone();
        let mut pending_label: Option<Label> = None;
        for (i, (return_id, return_site)) in pairs.iter().enumerate() {
            if let Some(l) = pending_label.take() {
                self.b.emit_label(&l);
            }
            let is_last = i + 1 == pairs.len();
            let target_label = block_label(self.opts, graph, *return_site);
            let else_label = if is_last {
                fallback.clone()
            } else {
                self.b.make_reserved_label("return_test")
            };
            let eq = self.b.alloc_temp(IlClass::Word);
            self.b
                .emit_instr(Some(eq), IlClass::Word, "ceqw", &[&rid.text(), &return_id.to_string()]);
            self.b.emit_cond_jump(eq, &target_label, &else_label);
            if !is_last {
                pending_label = Some(else_label);
            }
        }
        self.b.emit_label(&fallback);
        self.b.emit_instr(None, IlClass::Word, "hlt", &[]);
    }

    fn emit_function_epilogue(&mut self) {
        match self.return_class {
            Some(cls) => {
                let name = self.return_var.clone();
                let (v, vc) = self.lower_expr(&Expr::Var(name));
                let v = self.convert(v, vc, cls);
                self.b.emit_ret(Some(v));
            }
            None => self.b.emit_ret(None),
        }
    }

    /// Dispatches a structural `TRY` block to its bespoke lowering and
    /// reports whether it fully handled the terminator. `TryShapeInfo`
    /// doesn't populate `ControlFlowGraph::conditions` for these blocks
    /// (`builder::exceptions::build_try_skeleton` wires their edges
    /// directly), so the generic edge-count dispatch above can't reach
    /// them; a degenerate single-edge shape (no `CATCH` clauses at all)
    /// still falls back to a plain jump.
    fn emit_try_role_terminator(&mut self, graph: &ControlFlowGraph, role: TryRole, block: BlockId) -> bool {
        let out: Vec<&Edge> = graph.out_edges(block).collect();
        match role {
            TryRole::Setup { try_index } => {
                let zero = self.b.alloc_temp(IlClass::Word);
                self.b.emit_instr(Some(zero), IlClass::Word, "copy", &["0"]);
                self.set_pseudo(&pending_rethrow_slot(try_index), zero);

                // `basic_exception_push(<has_finally as w>)` — the
                // argument is whether this TRY has a FINALLY, not the
                // TRY's own index.
                let has_finally = graph.try_shapes[try_index].finally.is_some();
                let flag = self.b.alloc_temp(IlClass::Word);
                self.b
                    .emit_instr(Some(flag), IlClass::Word, "copy", &[if has_finally { "1" } else { "0" }]);
                runtime::emit_call(&mut self.b, runtime::EXCEPTION_PUSH, &[flag]);
                let rv = runtime::emit_call(&mut self.b, runtime::SETJMP, &[])
                    .expect("basic_setjmp always returns a value");

                let dispatch = out
                    .iter()
                    .find(|e| e.kind == EdgeKind::ConditionalTrue)
                    .expect("try setup always has a dispatch edge")
                    .to;
                let body = out
                    .iter()
                    .find(|e| e.kind == EdgeKind::ConditionalFalse)
                    .expect("try setup always has a body edge")
                    .to;
                self.b.emit_cond_jump(
                    rv,
                    &block_label(self.opts, graph, dispatch),
                    &block_label(self.opts, graph, body),
                );
                true
            }
            TryRole::Dispatch { try_index, clause_index } | TryRole::DispatchTest { try_index, clause_index } => {
                if out.len() == 1 {
                    // No CATCH clauses at all: straight through to
                    // FINALLY or the rethrow path.
                    self.b.emit_jump(&block_label(self.opts, graph, out[0].to));
                    return true;
                }
                let true_edge = out
                    .iter()
                    .find(|e| e.kind == EdgeKind::ConditionalTrue)
                    .expect("a dispatch test always has a match edge")
                    .to;
                let false_edge = out
                    .iter()
                    .find(|e| e.kind == EdgeKind::ConditionalFalse)
                    .expect("a dispatch test always has a fallthrough edge")
                    .to;

                let codes = graph.try_shapes[try_index].catch_entries[clause_index].1.clone();
                let matched = if codes.is_empty() {
                    let one = self.b.alloc_temp(IlClass::Word);
                    self.b.emit_instr(Some(one), IlClass::Word, "copy", &["1"]);
                    one
                } else {
                    let err = runtime::emit_call(&mut self.b, runtime::ERR, &[])
                        .expect("basic_err always returns a value");
                    let mut acc: Option<Temp> = None;
                    for code in &codes {
                        let eq = self.b.alloc_temp(IlClass::Word);
                        self.b
                            .emit_instr(Some(eq), IlClass::Word, "ceqw", &[&err.text(), &code.to_string()]);
                        acc = Some(match acc {
                            None => eq,
                            Some(prev) => {
                                let t = self.b.alloc_temp(IlClass::Word);
                                self.b
                                    .emit_instr(Some(t), IlClass::Word, "or", &[&prev.text(), &eq.text()]);
                                t
                            }
                        });
                    }
                    acc.expect("a non-catch-all clause always carries at least one code")
                };

                let shape = &graph.try_shapes[try_index];
                let falls_into_finally_uncaught =
                    is_last_clause(shape, clause_index) && shape.finally == Some(false_edge);
                if falls_into_finally_uncaught {
                    // The dispatch chain's last clause missed: flag this
                    // TRY's FINALLY run as one that must rethrow once it
                    // completes, distinguishing it from the ordinary
                    // fallthrough-into-FINALLY case.
                    let flag_label = self.b.make_reserved_label("try_flag_rethrow");
                    self.b.emit_cond_jump(
                        matched,
                        &block_label(self.opts, graph, true_edge),
                        &flag_label,
                    );
                    self.b.emit_label(&flag_label);
                    let one = self.b.alloc_temp(IlClass::Word);
                    self.b.emit_instr(Some(one), IlClass::Word, "copy", &["1"]);
                    self.set_pseudo(&pending_rethrow_slot(try_index), one);
                    self.b.emit_jump(&block_label(self.opts, graph, false_edge));
                } else {
                    self.b.emit_cond_jump(
                        matched,
                        &block_label(self.opts, graph, true_edge),
                        &block_label(self.opts, graph, false_edge),
                    );
                }
                true
            }
            TryRole::Finally { try_index } => {
                if out.is_empty() {
                    return false;
                }
                // FINALLY's end-label additionally emits
                // `call $basic_exception_pop()` — once, after the
                // FINALLY body's own statements and before whichever
                // exit/rethrow branch this TRY takes.
                runtime::emit_call(&mut self.b, runtime::EXCEPTION_POP, &[]);
                if out.len() == 1 {
                    self.b.emit_jump(&block_label(self.opts, graph, out[0].to));
                    return true;
                }
                let flag = self.get_pseudo(&pending_rethrow_slot(try_index), IlClass::Word);
                let true_edge = out
                    .iter()
                    .find(|e| e.kind == EdgeKind::ConditionalTrue)
                    .expect("finally always re-tests the pending-rethrow flag")
                    .to;
                let false_edge = out
                    .iter()
                    .find(|e| e.kind == EdgeKind::ConditionalFalse)
                    .expect("finally always re-tests the pending-rethrow flag")
                    .to;
                self.b.emit_cond_jump(
                    flag,
                    &block_label(self.opts, graph, true_edge),
                    &block_label(self.opts, graph, false_edge),
                );
                true
            }
            TryRole::Rethrow { .. } => {
                let err = runtime::emit_call(&mut self.b, runtime::ERR, &[])
                    .expect("basic_err always returns a value");
                runtime::emit_call(&mut self.b, runtime::THROW, &[err]);
                self.b.emit_instr(None, IlClass::Word, "hlt", &[]);
                true
            }
        }
    }
}
