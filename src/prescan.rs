//! Jump-Target Pre-Scan: a single walk over a procedure's
//! statement list that collects every line number, label, and jump target
//! before the CFG is built, so the builder can always split a block at a
//! forward-referenced target instead of trapping a labeled statement in
//! an already-sealed block.

use crate::ast::{JumpTarget, LineNumber, ProgramLine, Stmt};
use crate::diagnostics::{Diagnostic, DiagnosticKind, SourceLocation};
use rustc_hash::FxHashMap;

/// Flattened statement index within one procedure's program-line list:
/// `(line index in the Vec<ProgramLine>, statement index within that line)`.
pub type StmtIndex = (usize, usize);

#[derive(Debug, Default)]
pub struct PreScanResult {
    pub line_to_stmt: FxHashMap<LineNumber, StmtIndex>,
    pub label_to_stmt: FxHashMap<String, StmtIndex>,
    /// Every jump target actually referenced, in source order, for
    /// diagnostics and for the builder's "does this exist" checks.
    pub referenced_targets: Vec<JumpTarget>,
    pub diagnostics: Vec<Diagnostic>,
}

impl PreScanResult {
    pub fn resolve(&self, target: &JumpTarget) -> Option<StmtIndex> {
        match target {
            JumpTarget::Line(n) => self.line_to_stmt.get(n).copied(),
            JumpTarget::Label(l) => self.label_to_stmt.get(l).copied(),
        }
    }
}

/// Walk `lines` once, recording every line number/label definition and
/// every GOTO/GOSUB/ON-target reference, recursing into nested statement
/// lists (loop/if/select/try bodies) so that labels inside them are found
/// too.
pub fn prescan(lines: &[ProgramLine]) -> PreScanResult {
    let mut result = PreScanResult::default();

    for (line_idx, line) in lines.iter().enumerate() {
        if let Some(n) = line.line_number {
            if result.line_to_stmt.insert(n, (line_idx, 0)).is_some() {
                result.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::DuplicateLineNumber(n),
                    Some(SourceLocation { line: n }),
                ));
            }
        }
        if let Some(label) = &line.label {
            if result
                .label_to_stmt
                .insert(label.clone(), (line_idx, 0))
                .is_some()
            {
                result.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::DuplicateLabel(label.clone()),
                    line.line_number.map(|n| SourceLocation { line: n }),
                ));
            }
        }
        for (stmt_idx, stmt) in line.statements.iter().enumerate() {
            scan_stmt(stmt, &mut result);
            let _ = stmt_idx;
        }
    }

    result
}

fn scan_stmt(stmt: &Stmt, out: &mut PreScanResult) {
    match stmt {
        Stmt::Goto { target } | Stmt::Gosub { target } => {
            out.referenced_targets.push(target.clone());
        }
        Stmt::OnGoto { targets, .. } | Stmt::OnGosub { targets, .. } => {
            out.referenced_targets.extend(targets.iter().cloned());
        }
        Stmt::If {
            branches,
            else_branch,
        } => {
            for (_, body) in branches {
                scan_block(body, out);
            }
            if let Some(body) = else_branch {
                scan_block(body, out);
            }
        }
        Stmt::SelectCase { cases, .. } => {
            for (_, body) in cases {
                scan_block(body, out);
            }
        }
        Stmt::While { body, .. } | Stmt::Repeat { body, .. } | Stmt::Do { body, .. } => {
            scan_block(body, out);
        }
        Stmt::For { body, .. } => scan_block(body, out),
        Stmt::Try {
            body,
            catches,
            finally,
        } => {
            scan_block(body, out);
            for c in catches {
                scan_block(&c.body, out);
            }
            if let Some(f) = finally {
                scan_block(f, out);
            }
        }
        _ => {}
    }
}

fn scan_block(body: &[Stmt], out: &mut PreScanResult) {
    for s in body {
        scan_stmt(s, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;

    fn line(n: LineNumber, stmts: Vec<Stmt>) -> ProgramLine {
        ProgramLine {
            line_number: Some(n),
            label: None,
            statements: stmts,
        }
    }

    #[test]
    fn collects_line_numbers_and_targets() {
        let lines = vec![
            line(
                10,
                vec![Stmt::Goto {
                    target: JumpTarget::Line(30),
                }],
            ),
            line(20, vec![Stmt::End]),
            line(30, vec![Stmt::End]),
        ];
        let r = prescan(&lines);
        assert_eq!(r.line_to_stmt.len(), 3);
        assert_eq!(r.referenced_targets, vec![JumpTarget::Line(30)]);
        assert_eq!(r.resolve(&JumpTarget::Line(30)), Some((2, 0)));
    }

    #[test]
    fn duplicate_line_number_is_reported() {
        let lines = vec![line(10, vec![Stmt::End]), line(10, vec![Stmt::End])];
        let r = prescan(&lines);
        assert_eq!(r.diagnostics.len(), 1);
        assert!(matches!(
            r.diagnostics[0].kind,
            DiagnosticKind::DuplicateLineNumber(10)
        ));
    }

    #[test]
    fn targets_inside_nested_bodies_are_found() {
        let lines = vec![line(
            10,
            vec![Stmt::If {
                branches: vec![(
                    Expr::IntLiteral(1),
                    vec![Stmt::Goto {
                        target: JumpTarget::Label("done".into()),
                    }],
                )],
                else_branch: None,
            }],
        )];
        let r = prescan(&lines);
        assert_eq!(
            r.referenced_targets,
            vec![JumpTarget::Label("done".into())]
        );
    }
}
