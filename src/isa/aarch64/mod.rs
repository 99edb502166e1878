//! ARM64 backend concerns this crate owns directly: the
//! MADD/MSUB/FMADD/FMSUB peephole fusion that runs at the emitter stage,
//! after register allocation has replaced every virtual temporary with a
//! physical register. Everything else about code generation for this
//! target (instruction selection, register allocation, scheduling) stays
//! with QBE's own backend.

pub mod peephole;

pub use peephole::{fuse_block, AluOp, Inst, Operand, RawInst};
