//! Type Manager: maps BASIC types onto QBE IL classes and
//! picks conversion opcodes between them. Every value
//! carries one immutable class for its lifetime.

use std::fmt;

/// The closed BASIC type tag set this crate exposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BasicType {
    Byte,
    Short,
    Int32,
    Int64,
    Single,
    Double,
    String,
    Array(Box<BasicType>, u8),
    Record(Vec<(String, BasicType)>),
    Unknown,
}

/// QBE's concrete IL classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IlClass {
    Byte,
    Half,
    Word,
    Long,
    Single,
    Double,
}

impl IlClass {
    /// The one-letter mnemonic QBE expects in instruction text.
    pub fn letter(self) -> &'static str {
        match self {
            IlClass::Byte => "b",
            IlClass::Half => "h",
            IlClass::Word => "w",
            IlClass::Long => "l",
            IlClass::Single => "s",
            IlClass::Double => "d",
        }
    }

    pub fn is_integer(self) -> bool {
        !matches!(self, IlClass::Single | IlClass::Double)
    }

    pub fn is_float(self) -> bool {
        !self.is_integer()
    }

    /// Bit width, used to decide widen vs. narrow vs. no-op.
    pub fn bits(self) -> u32 {
        match self {
            IlClass::Byte => 8,
            IlClass::Half => 16,
            IlClass::Word | IlClass::Single => 32,
            IlClass::Long | IlClass::Double => 64,
        }
    }
}

impl fmt::Display for IlClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.letter())
    }
}

/// A single explicit conversion step between two IL classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionOp {
    /// Sign-extend an integer to a wider class.
    ExtS,
    /// Zero-extend an integer to a wider class (unsigned).
    ExtU,
    /// Narrow an integer by truncating on copy into the destination class.
    Trunc,
    /// Signed integer -> float.
    SignedToFloat,
    /// Unsigned integer -> float.
    UnsignedToFloat,
    /// Float -> signed integer (round toward zero, QBE's `stosi`/`dtosi`).
    FloatToSigned,
    /// `single` -> `double`.
    ExtendFloat,
    /// `double` -> `single`.
    TruncateFloat,
}

impl ConversionOp {
    /// The QBE mnemonic this conversion lowers to; `from`/`to` pick the
    /// size-specific variant (e.g. `extsw` vs `extsh`).
    pub fn mnemonic(self, from: IlClass, to: IlClass) -> String {
        match self {
            ConversionOp::ExtS => format!("ext{}{}", "s", from.letter()),
            ConversionOp::ExtU => format!("extu{}", from.letter()),
            ConversionOp::Trunc => String::new(), // no-op: plain `copy` with a narrower class
            ConversionOp::SignedToFloat => format!("s{}tof", from.letter()),
            ConversionOp::UnsignedToFloat => format!("u{}tof", from.letter()),
            ConversionOp::FloatToSigned => format!("{}tosi", to_qbe_int_suffix(from)),
            ConversionOp::ExtendFloat => "exts".to_string(),
            ConversionOp::TruncateFloat => "truncd".to_string(),
        }
    }
}

fn to_qbe_int_suffix(float_cls: IlClass) -> &'static str {
    match float_cls {
        IlClass::Single => "s",
        IlClass::Double => "d",
        _ => unreachable!("float-to-signed conversion source must be single or double"),
    }
}

/// Maps BASIC types to IL classes and decides conversions between classes.
///
/// Pure and stateless: every method is a deterministic function of its
/// arguments, so the same `(from, to)` pair always produces the same
/// conversion regardless of call order.
#[derive(Debug, Default, Clone, Copy)]
pub struct TypeManager;

impl TypeManager {
    pub fn new() -> Self {
        TypeManager
    }

    /// The IL class a BASIC type maps to. `Array`/`Record`/`String` are all
    /// pointers in class `l`; `Unknown` is a build-time error for the
    /// caller to report, not something this function papers over.
    pub fn class_of(&self, ty: &BasicType) -> Option<IlClass> {
        match ty {
            BasicType::Byte => Some(IlClass::Byte),
            BasicType::Short => Some(IlClass::Half),
            BasicType::Int32 => Some(IlClass::Word),
            BasicType::Int64 => Some(IlClass::Long),
            BasicType::Single => Some(IlClass::Single),
            BasicType::Double => Some(IlClass::Double),
            BasicType::String | BasicType::Array(..) | BasicType::Record(..) => {
                Some(IlClass::Long)
            }
            BasicType::Unknown => None,
        }
    }

    /// Whether `from -> to` requires any instruction at all. Two classes
    /// that are identical never need one; a cross-class `copy` is always
    /// illegal (the Type Manager must never emit one).
    pub fn needs_conversion(&self, from: IlClass, to: IlClass) -> bool {
        from != to
    }

    /// Pick the conversion op for `from -> to`. Returns `None` only when
    /// `from == to` (no conversion needed); every other combination of the
    /// six classes has a defined op, because the conversion matrix is
    /// total over the closed class set.
    pub fn conversion(&self, from: IlClass, to: IlClass) -> Option<ConversionOp> {
        use IlClass::*;
        if from == to {
            return None;
        }
        Some(match (from, to) {
            // float <-> float
            (Single, Double) => ConversionOp::ExtendFloat,
            (Double, Single) => ConversionOp::TruncateFloat,
            // int -> float (signed widen path; BASIC integers are signed)
            (a, Single) | (a, Double) if a.is_integer() => ConversionOp::SignedToFloat,
            // float -> int
            (a, b) if a.is_float() && b.is_integer() => ConversionOp::FloatToSigned,
            // int widen
            (a, b) if a.is_integer() && b.is_integer() && a.bits() < b.bits() => {
                ConversionOp::ExtS
            }
            // int narrow
            (a, b) if a.is_integer() && b.is_integer() && a.bits() > b.bits() => {
                ConversionOp::Trunc
            }
            _ => unreachable!("exhaustive over the closed IlClass set"),
        })
    }

    /// Zero-extension variant of widening, used for storage classes the
    /// caller has declared unsigned (array lengths, byte buffers).
    pub fn widen_unsigned(&self, from: IlClass, to: IlClass) -> Option<ConversionOp> {
        if from.is_integer() && to.is_integer() && from.bits() < to.bits() {
            Some(ConversionOp::ExtU)
        } else {
            self.conversion(from, to)
        }
    }

    /// Default class for an untyped integer literal: `l`.
    pub fn default_integer_literal_class(&self) -> IlClass {
        IlClass::Long
    }

    /// Default class for an untyped floating literal: `d`.
    pub fn default_float_literal_class(&self) -> IlClass {
        IlClass::Double
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_of_maps_closed_tag_set() {
        let tm = TypeManager::new();
        assert_eq!(tm.class_of(&BasicType::Byte), Some(IlClass::Byte));
        assert_eq!(tm.class_of(&BasicType::Int64), Some(IlClass::Long));
        assert_eq!(tm.class_of(&BasicType::String), Some(IlClass::Long));
        assert_eq!(tm.class_of(&BasicType::Unknown), None);
    }

    #[test]
    fn widen_never_silently_narrows() {
        let tm = TypeManager::new();
        assert_eq!(
            tm.conversion(IlClass::Word, IlClass::Long),
            Some(ConversionOp::ExtS)
        );
        assert_eq!(
            tm.conversion(IlClass::Long, IlClass::Word),
            Some(ConversionOp::Trunc)
        );
    }

    #[test]
    fn same_class_needs_no_conversion() {
        let tm = TypeManager::new();
        assert!(!tm.needs_conversion(IlClass::Long, IlClass::Long));
        assert_eq!(tm.conversion(IlClass::Double, IlClass::Double), None);
    }

    #[test]
    fn float_int_round_trip_uses_signed_ops() {
        let tm = TypeManager::new();
        assert_eq!(
            tm.conversion(IlClass::Word, IlClass::Double),
            Some(ConversionOp::SignedToFloat)
        );
        assert_eq!(
            tm.conversion(IlClass::Double, IlClass::Word),
            Some(ConversionOp::FloatToSigned)
        );
    }
}
