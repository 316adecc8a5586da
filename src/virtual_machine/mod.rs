//! Stack-based bytecode virtual machine for verification scripts.
//!
//! Scripts are short, untrusted byte sequences. The engine runs them
//! deterministically to HALT or FAULT, or pauses them at a breakpoint.
//!
//! # Architecture
//!
//! - **Stacks**: an invocation stack of call frames plus evaluation and alt
//!   stacks of [`value::StackItem`]s shared by every frame
//! - **Values**: integers of arbitrary precision, booleans, byte arrays,
//!   aliased arrays, copied-on-store structs and opaque host objects
//! - **Instruction format**: one opcode byte, optionally followed by a jump
//!   offset, a script hash or length-prefixed data
//! - **Host seams**: crypto, script resolution, the signed container and
//!   `SYSCALL` handlers are all supplied by the embedder
//!
//! # Modules
//!
//! - [`assembler`]: Assembly parsing, diagnostics, bytecode generation and disassembly
//! - [`builder`]: Programmatic script encoder
//! - [`context`]: Call frames and operand decoding
//! - [`errors`]: Decoding, execution and assembly error types
//! - [`host`]: Script resolver, container and host object traits
//! - [`interop`]: `SYSCALL` registry with the engine built-ins
//! - [`isa`]: Instruction set definition and opcode mappings
//! - [`stack`]: Depth-indexed stack used for all three engine stacks
//! - [`state`]: Engine run state
//! - [`value`]: Stack item model, conversions and equality
//! - [`vm`]: Execution engine and step drivers

pub mod assembler;
pub mod builder;
pub mod context;
pub mod errors;
pub mod host;
pub mod interop;
pub mod isa;
#[cfg(test)]
mod isa_static_check;
pub mod stack;
pub mod state;
pub mod value;
pub mod vm;
