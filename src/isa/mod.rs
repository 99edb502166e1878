//! Target-specific backend concerns: a set of ARM64 peephole fusions
//! applied inside the QBE code generator at the emitter stage. QBE's
//! own register allocator and code generator are out of scope; this
//! module implements only the peephole pass this crate owns, laid out
//! per-ISA (`isa/aarch64/` holding one backend's instruction model and
//! emission logic as a sibling of any other target the crate might
//! grow).

pub mod aarch64;
