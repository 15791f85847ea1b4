//! The ECMA-335 metadata substrate: PE/CLI headers, metadata heaps, the
//! compressed metadata tables, and the CIL bytecode reader. This is the
//! "well-defined binary container format" `spec.md` §6 treats as an input
//! and §1 scopes out of the compiler core proper — the core (`model`,
//! `reachability`, `ir`, `codegen`) consumes the structured view `model`
//! builds on top of this module, never these bytes directly.

pub mod heaps;
pub mod il;
pub mod pe;
pub mod signature;
pub mod tables;

pub use crate::utilities::FromByteStream;
