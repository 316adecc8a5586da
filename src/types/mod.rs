//! Primitive types shared by the VM and its host capabilities.
//!
//! - [`bytes::Bytes`]: reference-counted immutable byte buffer used for scripts
//!   and byte-array stack items
//! - [`hash::ScriptHash`]: 20-byte script identifier resolved by `APPCALL`

pub mod bytes;
pub mod hash;
