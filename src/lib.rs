//! Script virtual machine library.
//!
//! Provides a deterministic stack-based script engine, its assembler and
//! encoder, and the cryptographic primitives scripts verify with.

pub mod crypto;
pub mod types;
pub mod utils;
pub mod virtual_machine;
