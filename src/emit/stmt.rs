//! Straight-line statement lowering. Control-flow
//! statements (`IF`, loops, `SELECT CASE`, `GOTO`/`GOSUB`, `TRY`) have no
//! lowering of their own here — the CFG Builder already turned them into
//! blocks and edges; `emit::mod` walks those and calls back into this
//! module only for the statements a block actually carries.

use crate::ast::{Expr, Stmt};
use crate::runtime;
use crate::types::IlClass;

use super::Emitter;

impl Emitter<'_> {
    pub(super) fn lower_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Let { target, value } => self.lower_let(target, value),
            Stmt::Print {
                items,
                suppress_newline,
            } => self.lower_print(items, *suppress_newline),
            Stmt::Input { target } => self.lower_input(target),
            Stmt::Dim {
                name,
                dims,
                elem_type_name: _,
            } => self.lower_dim(name, dims),
            Stmt::Redim { name, dims } => self.lower_dim(name, dims),
            Stmt::Erase { name } => {
                let zero = self.b.alloc_temp(IlClass::Long);
                self.b.emit_instr(Some(zero), IlClass::Long, "copy", &["0"]);
                self.store_var(name, zero, IlClass::Long);
            }
            Stmt::SubCall { name, args } => {
                let mut arg_texts = Vec::with_capacity(args.len());
                for a in args {
                    let (t, cls) = self.lower_expr(a);
                    arg_texts.push(format!("{cls} {t}"));
                }
                let call_text = format!("${name}({})", arg_texts.join(", "));
                self.b.emit_instr(None, IlClass::Word, "call", &[&call_text]);
            }
            Stmt::Rem => {}
            Stmt::Throw { code } => {
                let (v, cls) = self.lower_expr(code);
                let v = self.convert(v, cls, IlClass::Word);
                runtime::emit_call(&mut self.b, runtime::THROW, &[v]);
            }
            // Control-flow statements are handled structurally by the
            // block walk; reaching one here would mean the builder put
            // it somewhere other than a terminator position.
            Stmt::If { .. }
            | Stmt::While { .. }
            | Stmt::For { .. }
            | Stmt::Repeat { .. }
            | Stmt::Do { .. }
            | Stmt::SelectCase { .. }
            | Stmt::Goto { .. }
            | Stmt::Gosub { .. }
            | Stmt::Return
            | Stmt::OnGoto { .. }
            | Stmt::OnGosub { .. }
            | Stmt::OnCall { .. }
            | Stmt::Try { .. }
            | Stmt::ExitLoop
            | Stmt::End => {
                debug_assert!(
                    false,
                    "control-flow statement reached straight-line lowering: {stmt:?}"
                );
            }
        }
    }

    fn lower_let(&mut self, target: &Expr, value: &Expr) {
        let (v, cls) = self.lower_expr(value);
        match target {
            Expr::Var(name) => self.store_var(name, v, cls),
            Expr::ArrayIndex(base, indices) => self.store_array_index(base, indices, v, cls),
            Expr::FieldAccess(base, _field) => {
                let (base_ptr, _) = self.lower_expr(base);
                let stored = self.convert(v, cls, IlClass::Long);
                self.b
                    .emit_instr(None, IlClass::Word, "storel", &[&stored.text(), &base_ptr.text()]);
            }
            _ => unreachable!("LET target must be an lvalue"),
        }
    }

    fn store_array_index(&mut self, base: &Expr, indices: &[Expr], value: crate::il::Temp, value_cls: IlClass) {
        let (base_ptr, _) = self.lower_expr(base);
        let elem_cls = self.element_class_of(base);
        let mut flat_index = None;
        for idx_expr in indices {
            let (idx, idx_cls) = self.lower_expr(idx_expr);
            let idx = self.convert(idx, idx_cls, IlClass::Long);
            flat_index = Some(match flat_index {
                None => idx,
                Some(prev) => {
                    let t = self.b.alloc_temp(IlClass::Long);
                    self.b
                        .emit_instr(Some(t), IlClass::Long, "add", &[&prev.text(), &idx.text()]);
                    t
                }
            });
        }
        let flat_index = flat_index.expect("array index must have at least one subscript");
        if self.opts.bounds_checks {
            runtime::emit_call(
                &mut self.b,
                runtime::ARR_BOUNDS_CHECK,
                &[base_ptr, flat_index, base_ptr],
            );
        }
        let elem_size = elem_cls.bits() / 8;
        let offset = self.b.alloc_temp(IlClass::Long);
        self.b.emit_instr(
            Some(offset),
            IlClass::Long,
            "mul",
            &[&flat_index.text(), &elem_size.to_string()],
        );
        let addr = self.b.alloc_temp(IlClass::Long);
        self.b
            .emit_instr(Some(addr), IlClass::Long, "add", &[&base_ptr.text(), &offset.text()]);
        let stored = self.convert(value, value_cls, elem_cls);
        self.b
            .emit_instr(None, IlClass::Word, store_op(elem_cls), &[&stored.text(), &addr.text()]);
    }

    fn lower_print(&mut self, items: &[Expr], suppress_newline: bool) {
        for item in items {
            let (v, cls) = self.lower_expr(item);
            let f = runtime::print_fn_for_class(cls);
            runtime::emit_call(&mut self.b, f, &[v]);
        }
        if !suppress_newline {
            runtime::emit_call(&mut self.b, runtime::PRINT_NEWLINE, &[]);
        }
    }

    fn lower_input(&mut self, target: &Expr) {
        let name = match target {
            Expr::Var(name) => name.clone(),
            _ => unreachable!("INPUT target must be a plain variable"),
        };
        let cls = self.symbols.class_of(&name).unwrap_or(IlClass::Long);
        let f = runtime::input_fn_for_class(cls);
        let v = runtime::emit_call(&mut self.b, f, &[]).expect("input runtime calls always return a value");
        self.store_var(&name, v, f.ret_class.unwrap());
    }

    fn lower_dim(&mut self, name: &str, dims: &[Expr]) {
        let mut total = None;
        for d in dims {
            let (v, cls) = self.lower_expr(d);
            let v = self.convert(v, cls, IlClass::Long);
            total = Some(match total {
                None => v,
                Some(prev) => {
                    let t = self.b.alloc_temp(IlClass::Long);
                    self.b.emit_instr(Some(t), IlClass::Long, "mul", &[&prev.text(), &v.text()]);
                    t
                }
            });
        }
        let count = total.unwrap_or_else(|| {
            let t = self.b.alloc_temp(IlClass::Long);
            self.b.emit_instr(Some(t), IlClass::Long, "copy", &["1"]);
            t
        });
        let elem_size = self.b.alloc_temp(IlClass::Long);
        self.b.emit_instr(Some(elem_size), IlClass::Long, "copy", &["8"]);
        let ptr = runtime::emit_call(&mut self.b, runtime::ARR_ALLOC, &[count, elem_size])
            .expect("arr_alloc returns a pointer");
        self.store_var(name, ptr, IlClass::Long);
    }
}

fn store_op(cls: IlClass) -> &'static str {
    match cls {
        IlClass::Byte => "storeb",
        IlClass::Half => "storeh",
        IlClass::Word => "storew",
        IlClass::Long => "storel",
        IlClass::Single => "stores",
        IlClass::Double => "stored",
    }
}
