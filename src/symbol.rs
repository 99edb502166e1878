//! Mangles BASIC identifiers into stable, collision-free IL names and
//! tracks each local's authoritative class for the duration of one
//! procedure.

use crate::types::{BasicType, IlClass, TypeManager};
use rustc_hash::FxHashMap;

/// Where a symbol lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageClass {
    Local,
    Parameter,
    Global,
    Temporary,
    ArrayElement,
    RecordField,
}

/// A resolved reference to a BASIC-level symbol, as produced by the
/// (out-of-scope) semantic analyzer's symbol table.
#[derive(Debug, Clone)]
pub struct SymbolRef {
    pub identifier: String,
    pub storage: StorageClass,
    pub declared_type: BasicType,
}

fn type_suffix(ty: &BasicType) -> &'static str {
    match ty {
        BasicType::Byte => "_BYTE",
        BasicType::Short => "_SHORT",
        BasicType::Int32 => "_INT",
        BasicType::Int64 => "_LONG",
        BasicType::Single => "_SNG",
        BasicType::Double => "_DBL",
        BasicType::String => "_STR",
        BasicType::Array(..) => "_ARR",
        BasicType::Record(..) => "_REC",
        BasicType::Unknown => "_UNK",
    }
}

/// Mangles a `SymbolRef` to a stable IL name. Pure and deterministic: the
/// same `(identifier, storage, declared_type)` always produces the same
/// name, so mangling never depends on insertion order.
pub fn mangle(sym: &SymbolRef) -> String {
    let prefix = match sym.storage {
        StorageClass::Global => "$var_",
        StorageClass::Local => "%var_",
        StorageClass::Parameter => "%param_",
        StorageClass::ArrayElement => "%arr_",
        StorageClass::RecordField => "%fld_",
        StorageClass::Temporary => "%tmp_",
    };
    format!(
        "{}{}{}",
        prefix,
        sanitize(&sym.identifier),
        type_suffix(&sym.declared_type)
    )
}

/// BASIC identifiers may contain characters QBE names can't (`$`, spaces
/// from `AS` clauses folded in by the analyzer, etc.); replace anything
/// that isn't `[A-Za-z0-9_]` with `_` so the mangled name is always valid
/// QBE syntax.
pub(crate) fn sanitize(ident: &str) -> String {
    ident
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Per-procedure symbol table: the authoritative answer to "what class is
/// this local?", overriding generic type inference for the procedure's
/// duration. Reset at procedure entry.
#[derive(Debug, Default)]
pub struct ProcedureSymbols {
    names: FxHashMap<String, (String, IlClass, BasicType)>,
    type_manager: TypeManager,
}

impl ProcedureSymbols {
    pub fn new() -> Self {
        Self {
            names: FxHashMap::default(),
            type_manager: TypeManager::new(),
        }
    }

    /// Register a symbol for this procedure and return its mangled IL
    /// name. Re-declaring the same source identifier with a different
    /// type overwrites the mapping (two BASIC variables with the same
    /// name but different types never collide, since the mangled name
    /// encodes the type suffix and is keyed here by the *source* name).
    pub fn declare(&mut self, sym: &SymbolRef) -> Result<String, ClassSet> {
        let class = self
            .type_manager
            .class_of(&sym.declared_type)
            .ok_or(ClassSet)?;
        let il_name = mangle(sym);
        self.names.insert(
            sym.identifier.clone(),
            (il_name.clone(), class, sym.declared_type.clone()),
        );
        Ok(il_name)
    }

    pub fn il_name(&self, source_ident: &str) -> Option<&str> {
        self.names.get(source_ident).map(|(name, ..)| name.as_str())
    }

    pub fn class_of(&self, source_ident: &str) -> Option<IlClass> {
        self.names.get(source_ident).map(|(_, cls, _)| *cls)
    }

    /// The BASIC-level declared type, used by array-element and record
    /// field lowering to pick the right element class instead of
    /// defaulting to `l`.
    pub fn declared_type(&self, source_ident: &str) -> Option<&BasicType> {
        self.names.get(source_ident).map(|(_, _, ty)| ty)
    }
}

/// The (out-of-scope) semantic analyzer's output, as this crate
/// consumes it: every identifier's declared type, storage class, and
/// record field layout, keyed first by owning procedure name (the
/// empty string names the top-level program).
#[derive(Debug, Default)]
pub struct SymbolTable {
    pub by_procedure: FxHashMap<String, Vec<SymbolRef>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, procedure: &str, sym: SymbolRef) -> &mut Self {
        self.by_procedure
            .entry(procedure.to_string())
            .or_default()
            .push(sym);
        self
    }

    pub fn locals_for(&self, procedure: &str) -> &[SymbolRef] {
        self.by_procedure
            .get(procedure)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

/// Placeholder error for an `Unknown`-typed declaration; the caller turns
/// this into a `DiagnosticKind::TypeMismatch`.
#[derive(Debug, Clone, Copy)]
pub struct ClassSet;
