//! Buffered textual emission of QBE IL with monotone temporary/label
//! counters: a cheap, infallible cursor object threaded through the
//! building passes, keeping the emitted text append-only.

use std::fmt::Write as _;

/// An IL temporary, `%tN`. Carries the class it was allocated with so a
/// later reuse-with-different-class bug can be caught at the point of
/// misuse rather than silently producing bad IL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Temp {
    id: u32,
}

impl Temp {
    pub fn text(self) -> String {
        format!("%t{}", self.id)
    }
}

impl std::fmt::Display for Temp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "%t{}", self.id)
    }
}

/// A jump target, `@L0`, `@block_3`, `@dispatch_1`, etc.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label(String);

impl Label {
    pub fn text(&self) -> &str {
        &self.0
    }

    /// Wrap an already-computed name (e.g. a block's QBE label) as a
    /// `Label` without going through one of the builder's counters.
    pub fn from_text(text: impl Into<String>) -> Self {
        Label(text.into())
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}", self.0)
    }
}

use crate::types::IlClass;

/// Buffered emitter with per-procedure monotone counters. A single
/// instance is scoped to one procedure; `IlBuilder::reset` is called at
/// procedure entry: locally-declared procedure-scoped variables reset
/// their temporary counters at procedure entry and exit.
#[derive(Debug, Default)]
pub struct IlBuilder {
    next_temp: u32,
    next_label: u32,
    label_counters: std::collections::HashMap<&'static str, u32>,
    buf: String,
}

impl IlBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset all counters and the output buffer for a fresh procedure.
    pub fn reset(&mut self) {
        self.next_temp = 0;
        self.next_label = 0;
        self.label_counters.clear();
        self.buf.clear();
    }

    /// Allocation is cheap and never fails; the caller is responsible
    /// for IL-class correctness of whatever instruction writes into the
    /// returned temp.
    pub fn alloc_temp(&mut self, _cls: IlClass) -> Temp {
        let t = Temp { id: self.next_temp };
        self.next_temp += 1;
        t
    }

    /// A generic monotone label, `@L0, @L1, ...`.
    pub fn make_label(&mut self, prefix: &str) -> Label {
        let n = self.next_label;
        self.next_label += 1;
        Label(format!("{prefix}{n}"))
    }

    /// A reserved-prefix label with its own independent counter, so that
    /// e.g. `@block_N` and `@dispatch_N` numbering don't interleave and
    /// shift around when one kind is used more than the other.
    pub fn make_reserved_label(&mut self, prefix: &'static str) -> Label {
        let counter = self.label_counters.entry(prefix).or_insert(0);
        let n = *counter;
        *counter += 1;
        Label(format!("{prefix}_{n}"))
    }

    pub fn emit_raw(&mut self, text: &str) {
        self.buf.push_str(text);
        self.buf.push('\n');
    }

    /// `%dst =<cls> <op> <args, ...>` — QBE's concrete instruction syntax;
    /// operands are comma-separated, matching `jnz`'s and `call`'s own
    /// argument lists.
    pub fn emit_instr(&mut self, dst: Option<Temp>, cls: IlClass, op: &str, args: &[&str]) {
        match dst {
            Some(d) => {
                let _ = write!(self.buf, "    {} ={} {}", d, cls, op);
            }
            None => {
                let _ = write!(self.buf, "    {}", op);
            }
        }
        if !args.is_empty() {
            let _ = write!(self.buf, " {}", args.join(", "));
        }
        self.buf.push('\n');
    }

    /// Like `emit_instr`, but for a destination spelled from the Symbol
    /// Mapper's mangled name (`%var_x_INT`, `%param_x_INT_slot`) rather
    /// than a monotone `%tN` — used for the one `alloc`/store per
    /// variable slot that must keep a stable name across the whole
    /// procedure instead of a fresh counter value; the mangled name is
    /// itself valid QBE temp syntax.
    pub fn emit_named_instr(&mut self, dst_name: &str, cls: IlClass, op: &str, args: &[&str]) {
        let _ = write!(self.buf, "    {} ={} {}", dst_name, cls, op);
        if !args.is_empty() {
            let _ = write!(self.buf, " {}", args.join(", "));
        }
        self.buf.push('\n');
    }

    pub fn emit_jump(&mut self, label: &Label) {
        let _ = writeln!(self.buf, "    jmp {label}");
    }

    /// `cond_temp` must be of class `w`; the caller guarantees this at
    /// the call site, and the builder itself does not re-check it, since
    /// that would require threading class information back through the
    /// IL text buffer.
    pub fn emit_cond_jump(&mut self, cond_temp: Temp, then_label: &Label, else_label: &Label) {
        let _ = writeln!(self.buf, "    jnz {cond_temp}, {then_label}, {else_label}");
    }

    pub fn emit_ret(&mut self, temp: Option<Temp>) {
        match temp {
            Some(t) => {
                let _ = writeln!(self.buf, "    ret {t}");
            }
            None => self.buf.push_str("    ret\n"),
        }
    }

    pub fn emit_label(&mut self, label: &Label) {
        let _ = writeln!(self.buf, "{label}");
    }

    pub fn finish(self) -> String {
        self.buf
    }

    pub fn text(&self) -> &str {
        &self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_counter_is_monotone_and_resets() {
        let mut b = IlBuilder::new();
        let t0 = b.alloc_temp(IlClass::Word);
        let t1 = b.alloc_temp(IlClass::Word);
        assert_eq!(t0.text(), "%t0");
        assert_eq!(t1.text(), "%t1");
        b.reset();
        let t2 = b.alloc_temp(IlClass::Word);
        assert_eq!(t2.text(), "%t0");
    }

    #[test]
    fn reserved_labels_have_independent_counters() {
        let mut b = IlBuilder::new();
        let blk0 = b.make_reserved_label("block");
        let disp0 = b.make_reserved_label("dispatch");
        let blk1 = b.make_reserved_label("block");
        assert_eq!(blk0.text(), "block_0");
        assert_eq!(disp0.text(), "dispatch_0");
        assert_eq!(blk1.text(), "block_1");
    }

    #[test]
    fn emit_instr_uses_qbe_concrete_syntax() {
        let mut b = IlBuilder::new();
        let d = b.alloc_temp(IlClass::Long);
        b.emit_instr(Some(d), IlClass::Long, "add", &["%t1", "%t2"]);
        assert_eq!(b.text(), "    %t0 =l add %t1, %t2\n");
    }
}
