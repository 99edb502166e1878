//! Runtime Library Shim: the canonical call-sequences for
//! every runtime entry point this crate may emit, plus the inline-lowering
//! forms for `ABS`/`SGN` that are preferred over a runtime call. The
//! runtime library itself (`basic_print_*`, `basic_exception_*`, ...) is
//! out of scope; this module only knows each entry point's
//! QBE call signature.

use crate::il::{IlBuilder, Temp};
use crate::types::IlClass;

/// One runtime entry point's call signature: QBE argument classes and an
/// optional return class.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeFn {
    pub name: &'static str,
    pub arg_classes: &'static [IlClass],
    pub ret_class: Option<IlClass>,
}

macro_rules! rt {
    ($name:literal, [$($arg:expr),*], $ret:expr) => {
        RuntimeFn { name: $name, arg_classes: &[$($arg),*], ret_class: $ret }
    };
}

pub const PRINT_INT: RuntimeFn = rt!("basic_print_int", [IlClass::Long], None);
pub const PRINT_LONG: RuntimeFn = rt!("basic_print_long", [IlClass::Long], None);
pub const PRINT_DOUBLE: RuntimeFn = rt!("basic_print_double", [IlClass::Double], None);
pub const PRINT_STRING: RuntimeFn = rt!("basic_print_string", [IlClass::Long], None);
pub const PRINT_NEWLINE: RuntimeFn = rt!("basic_print_newline", [], None);
pub const INPUT_INT: RuntimeFn = rt!("basic_input_int", [], Some(IlClass::Long));
pub const INPUT_DOUBLE: RuntimeFn = rt!("basic_input_double", [], Some(IlClass::Double));
pub const INPUT_STRING: RuntimeFn = rt!("basic_input_string", [], Some(IlClass::Long));

pub const STR_CONCAT: RuntimeFn =
    rt!("str_concat", [IlClass::Long, IlClass::Long], Some(IlClass::Long));
pub const STR_COMPARE: RuntimeFn =
    rt!("str_compare", [IlClass::Long, IlClass::Long], Some(IlClass::Word));
pub const STR_FROM_INT: RuntimeFn = rt!("str_from_int", [IlClass::Long], Some(IlClass::Long));
pub const STR_FROM_DOUBLE: RuntimeFn =
    rt!("str_from_double", [IlClass::Double], Some(IlClass::Long));

pub const ARR_ALLOC: RuntimeFn =
    rt!("arr_alloc", [IlClass::Long, IlClass::Long], Some(IlClass::Long));
pub const ARR_BOUNDS_CHECK: RuntimeFn = rt!(
    "arr_bounds_check",
    [IlClass::Long, IlClass::Long, IlClass::Long],
    None
);

pub const EXCEPTION_PUSH: RuntimeFn = rt!("basic_exception_push", [IlClass::Word], None);
pub const EXCEPTION_POP: RuntimeFn = rt!("basic_exception_pop", [], None);
pub const THROW: RuntimeFn = rt!("basic_throw", [IlClass::Word], None);
pub const ERR: RuntimeFn = rt!("basic_err", [], Some(IlClass::Word));
pub const ERL: RuntimeFn = rt!("basic_erl", [], Some(IlClass::Word));
pub const SETJMP: RuntimeFn = rt!("basic_setjmp", [], Some(IlClass::Word));

/// Choose the `basic_print_*` entry for a value's IL class. INT and LONG
/// share a class (`l`) in this type system's IL mapping, so the caller
/// threading a BASIC-level type distinction picks `PRINT_INT` vs.
/// `PRINT_LONG` itself; classes alone can't disambiguate them.
pub fn print_fn_for_class(cls: IlClass) -> RuntimeFn {
    match cls {
        IlClass::Double | IlClass::Single => PRINT_DOUBLE,
        IlClass::Long => PRINT_LONG,
        _ => PRINT_INT,
    }
}

pub fn input_fn_for_class(cls: IlClass) -> RuntimeFn {
    match cls {
        IlClass::Double | IlClass::Single => INPUT_DOUBLE,
        _ => INPUT_INT,
    }
}

/// Emit `call $<name>(<cls> <arg>, ...)`, optionally binding a result
/// temp of `f.ret_class`. Mirrors a C-style calling convention: all
/// arguments in class `l` or `d`.
pub fn emit_call(b: &mut IlBuilder, f: RuntimeFn, args: &[Temp]) -> Option<Temp> {
    assert_eq!(args.len(), f.arg_classes.len(), "runtime call arity mismatch");
    let arglist: Vec<String> = args
        .iter()
        .zip(f.arg_classes.iter())
        .map(|(a, c)| format!("{c} {a}"))
        .collect();
    let call_text = format!("${}({})", f.name, arglist.join(", "));
    match f.ret_class {
        Some(cls) => {
            let dst = b.alloc_temp(cls);
            b.emit_instr(Some(dst), cls, "call", &[&call_text]);
            Some(dst)
        }
        None => {
            b.emit_instr(None, IlClass::Word, "call", &[&call_text]);
            None
        }
    }
}

/// `ABS(d)` lowered as a sign-bit mask on the IEEE-754 bit pattern rather
/// than a runtime call: cast to `l`, clear the sign bit
/// with `0x7FFF_FFFF_FFFF_FFFF`, cast back. Preserves NaN payload (sign
/// may be cleared) and leaves +/-infinity and +/-0.0 alone, since all are
/// untouched by clearing bit 63.
pub fn emit_abs_double(b: &mut IlBuilder, src: Temp) -> Temp {
    let bits = b.alloc_temp(IlClass::Long);
    b.emit_instr(Some(bits), IlClass::Long, "cast", &[&src.text()]);
    let masked = b.alloc_temp(IlClass::Long);
    b.emit_instr(
        Some(masked),
        IlClass::Long,
        "and",
        &[&bits.text(), "9223372036854775807"],
    );
    let result = b.alloc_temp(IlClass::Double);
    b.emit_instr(Some(result), IlClass::Double, "cast", &[&masked.text()]);
    result
}

/// `SGN(x) = (x>0) - (x<0)`, branchless: two comparisons, one subtract.
/// For NaN both comparisons are false under IEEE-754 quiet-false
/// semantics, so the result is 0 without any special-case code.
pub fn emit_sgn_double(b: &mut IlBuilder, src: Temp) -> Temp {
    let gt = b.alloc_temp(IlClass::Word);
    b.emit_instr(Some(gt), IlClass::Word, "cgtd", &[&src.text(), "d_0"]);
    let lt = b.alloc_temp(IlClass::Word);
    b.emit_instr(Some(lt), IlClass::Word, "cltd", &[&src.text(), "d_0"]);
    let result = b.alloc_temp(IlClass::Word);
    b.emit_instr(Some(result), IlClass::Word, "sub", &[&gt.text(), &lt.text()]);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_fn_dispatches_on_class() {
        assert_eq!(print_fn_for_class(IlClass::Double).name, "basic_print_double");
        assert_eq!(print_fn_for_class(IlClass::Long).name, "basic_print_long");
        assert_eq!(print_fn_for_class(IlClass::Word).name, "basic_print_int");
    }

    #[test]
    fn emit_call_binds_return_temp_when_present() {
        let mut b = IlBuilder::new();
        let a = b.alloc_temp(IlClass::Long);
        let r = emit_call(&mut b, STR_FROM_INT, &[a]);
        assert!(r.is_some());
        assert!(b.text().contains("call $str_from_int"));
    }

    #[test]
    fn emit_call_without_return_has_no_dst() {
        let mut b = IlBuilder::new();
        let code = b.alloc_temp(IlClass::Word);
        let r = emit_call(&mut b, THROW, &[code]);
        assert!(r.is_none());
        assert!(b.text().contains("call $basic_throw"));
    }

    #[test]
    fn abs_double_masks_sign_bit() {
        let mut b = IlBuilder::new();
        let x = b.alloc_temp(IlClass::Double);
        let _ = emit_abs_double(&mut b, x);
        assert!(b.text().contains("9223372036854775807"));
    }

    #[test]
    fn sgn_double_is_branchless() {
        let mut b = IlBuilder::new();
        let x = b.alloc_temp(IlClass::Double);
        let _ = emit_sgn_double(&mut b, x);
        let text = b.text();
        assert!(text.contains("cgtd"));
        assert!(text.contains("cltd"));
        assert!(!text.contains("jnz"));
    }
}
