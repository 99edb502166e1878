//! The single owned, non-reentrant object a caller threads through one
//! compile: a persistent struct whose `compile` method runs a fixed
//! pipeline over one input and returns a result, reused across
//! compilations to avoid reallocating the same scratch structures.

use crate::ast::Program;
use crate::builder::build_procedure;
use crate::diagnostics::{CompileResult, Diagnostic, Severity};
use crate::emit::emit_function;
use crate::symbol::{ProcedureSymbols, StorageClass, SymbolRef, SymbolTable};
use crate::types::TypeManager;
use rustc_hash::FxHashMap;

/// Knobs the emitter consults at every call site that has more than one
/// legal lowering: whether to bounds-check
/// array reads/writes, whether block labels keep their human-readable
/// prefix, and whether the sparse RETURN/computed-case dispatch chains
/// sort by id for reproducible diffs across otherwise-equivalent builds.
#[derive(Debug, Clone, Copy)]
pub struct CompileOptions {
    pub bounds_checks: bool,
    pub structured_labels: bool,
    pub sort_sparse_dispatch: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            bounds_checks: true,
            structured_labels: true,
            sort_sparse_dispatch: true,
        }
    }
}

/// Interns string literals and (out-of-scope-analyzer-declared) globals
/// into `data` section entries, deduplicating identical string content
/// across the whole compilation unit so two `PRINT "ok"` sites in
/// different procedures share one data-section entry.
#[derive(Debug, Default)]
pub struct StringTable {
    labels_by_content: FxHashMap<String, String>,
    entries: Vec<(String, String)>,
}

impl StringTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `s`, returning the label (without the leading `$`) a
    /// `Expr::StringLiteral` lowering can reference as `$<label>`.
    pub fn intern(&mut self, s: &str) -> String {
        if let Some(label) = self.labels_by_content.get(s) {
            return label.clone();
        }
        let label = format!("str_{}", self.entries.len());
        self.labels_by_content.insert(s.to_string(), label.clone());
        self.entries.push((label.clone(), s.to_string()));
        label
    }

    /// Render every interned string as a QBE `data` definition,
    /// NUL-terminated so the runtime library's string functions can
    /// treat every string pointer as a C string.
    pub fn render_data(&self) -> String {
        let mut out = String::new();
        for (label, content) in &self.entries {
            out.push_str(&format!(
                "data ${label} = {{ b \"{}\", b 0 }}\n",
                escape(content)
            ));
        }
        out
    }
}

fn escape(s: &str) -> String {
    s.chars()
        .flat_map(|c| match c {
            '"' => vec!['\\', '"'],
            '\\' => vec!['\\', '\\'],
            other => vec![other],
        })
        .collect()
}

/// The top-level program's QBE function name.
const TOP_LEVEL_FN_NAME: &str = "main";

/// Persistent pipeline state; the only mutable state in the whole
/// crate lives here. Stateless across calls other than
/// `opts`; a fresh `StringTable` and diagnostics list are built per
/// `compile` so two compilations sharing one context never leak string
/// labels into each other's output.
#[derive(Debug, Default)]
pub struct CompilationContext {
    pub opts: CompileOptions,
}

impl CompilationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(opts: CompileOptions) -> Self {
        Self { opts }
    }

    /// Run the full pipeline (AST + symbol table -> CFG Builder -> QBE
    /// Emitter) over one compilation unit. Aborts IL emission for a
    /// procedure only when building its CFG reports a fatal diagnostic
    /// (the only invariant violation or fatal structural error serious
    /// enough to abort IL emission); a fatal diagnostic from one
    /// procedure does not stop the others from being attempted, but
    /// flips `success` to false overall.
    pub fn compile(&mut self, program: &Program, symbols: &SymbolTable) -> CompileResult {
        let mut diagnostics: Vec<Diagnostic> = Vec::new();
        let mut strings = StringTable::new();
        let mut function_texts: Vec<String> = Vec::new();

        let (top_graph, top_diags) = build_procedure(&program.top_level);
        diagnostics.extend(top_diags);
        if !has_fatal(&diagnostics) {
            let proc_symbols = procedure_symbols(symbols, "", &[]);
            let emitted = emit_function(
                &top_graph,
                TOP_LEVEL_FN_NAME,
                &[],
                None,
                "",
                proc_symbols,
                &mut strings,
                self.opts,
            );
            diagnostics.extend(emitted.diagnostics);
            function_texts.push(emitted.text);
        }

        for proc in &program.procedures {
            let (graph, proc_diags) = build_procedure(&proc.body);
            diagnostics.extend(proc_diags);
            if has_fatal(&diagnostics) {
                continue;
            }

            let proc_symbols = procedure_symbols(symbols, &proc.name, &proc.params);
            let params: Vec<(String, crate::types::IlClass)> = proc
                .params
                .iter()
                .map(|p| {
                    let cls = proc_symbols
                        .class_of(&p.identifier)
                        .unwrap_or(TypeManager::new().default_integer_literal_class());
                    (p.identifier.clone(), cls)
                })
                .collect();

            let (return_class, return_var, proc_symbols) = match &proc.return_type {
                Some(ty) => {
                    let mut proc_symbols = proc_symbols;
                    let _ = proc_symbols.declare(&SymbolRef {
                        identifier: proc.name.clone(),
                        storage: StorageClass::Local,
                        declared_type: ty.clone(),
                    });
                    let cls = proc_symbols.class_of(&proc.name);
                    (cls, proc.name.clone(), proc_symbols)
                }
                None => (None, String::new(), proc_symbols),
            };

            let qbe_name = crate::symbol::sanitize(&proc.name);
            let emitted = emit_function(
                &graph,
                &qbe_name,
                &params,
                return_class,
                &return_var,
                proc_symbols,
                &mut strings,
                self.opts,
            );
            diagnostics.extend(emitted.diagnostics);
            function_texts.push(emitted.text);
        }

        let success = !has_fatal(&diagnostics)
            && !diagnostics
                .iter()
                .any(|d| d.severity() == Severity::Error);
        let il = if success {
            let mut text = strings.render_data();
            for f in &function_texts {
                text.push('\n');
                text.push_str(f);
            }
            Some(text)
        } else {
            None
        };

        CompileResult {
            success,
            il,
            diagnostics,
        }
    }
}

fn has_fatal(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(|d| d.severity() == Severity::Fatal)
}

/// Build one procedure's `ProcedureSymbols` from the analyzer's
/// `SymbolTable`, declaring every local the analyzer recorded for this
/// procedure plus every formal parameter (the two lists may overlap;
/// `declare` is idempotent under re-declaration of the same identifier).
fn procedure_symbols(symbols: &SymbolTable, procedure: &str, params: &[SymbolRef]) -> ProcedureSymbols {
    let mut proc_symbols = ProcedureSymbols::new();
    for sym in symbols.locals_for(procedure) {
        let _ = proc_symbols.declare(sym);
    }
    for p in params {
        let _ = proc_symbols.declare(p);
    }
    proc_symbols
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ProcKind, Procedure, ProgramLine, Stmt};
    use crate::types::BasicType;

    #[test]
    fn empty_top_level_compiles_to_a_main_function() {
        let program = Program {
            top_level: vec![ProgramLine {
                line_number: Some(10),
                label: None,
                statements: vec![Stmt::End],
            }],
            procedures: vec![],
        };
        let symbols = SymbolTable::new();
        let mut ctx = CompilationContext::new();
        let result = ctx.compile(&program, &symbols);
        assert!(result.success, "{:?}", result.diagnostics);
        let il = result.il.unwrap();
        assert!(il.contains("export function $main("));
    }

    #[test]
    fn function_return_value_binds_to_its_own_name() {
        let program = Program {
            top_level: vec![],
            procedures: vec![Procedure {
                kind: ProcKind::Function,
                name: "double".into(),
                params: vec![SymbolRef {
                    identifier: "x".into(),
                    storage: StorageClass::Parameter,
                    declared_type: BasicType::Int64,
                }],
                return_type: Some(BasicType::Int64),
                body: vec![ProgramLine {
                    line_number: Some(10),
                    label: None,
                    statements: vec![Stmt::Let {
                        target: crate::ast::Expr::Var("double".into()),
                        value: crate::ast::Expr::Binary(
                            crate::ast::BinOp::Add,
                            Box::new(crate::ast::Expr::Var("x".into())),
                            Box::new(crate::ast::Expr::Var("x".into())),
                        ),
                    }],
                }],
            }],
        };
        let mut symbols = SymbolTable::new();
        symbols.declare(
            "double",
            SymbolRef {
                identifier: "x".into(),
                storage: StorageClass::Parameter,
                declared_type: BasicType::Int64,
            },
        );
        let mut ctx = CompilationContext::new();
        let result = ctx.compile(&program, &symbols);
        assert!(result.success, "{:?}", result.diagnostics);
        let il = result.il.unwrap();
        assert!(il.contains("export function l $double(l %t0)"));
        assert!(il.contains("ret"));
    }
}
