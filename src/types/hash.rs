//! 20-byte script hash.

use std::fmt;
use std::str::FromStr;

/// Script hash length in bytes.
pub const SCRIPT_HASH_LEN: usize = 20;

/// Identifier of a script: `RIPEMD160(SHA256(script))` under the default crypto.
///
/// This is the operand of `APPCALL`/`TAILCALL` and the key a script resolver is
/// queried with. Displayed as lowercase hex in byte order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Hash, Ord, PartialOrd)]
pub struct ScriptHash(pub [u8; SCRIPT_HASH_LEN]);

impl ScriptHash {
    /// Creates a hash from a slice, returning `None` unless it is exactly 20 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; SCRIPT_HASH_LEN]>::try_from(bytes).ok().map(Self)
    }

    /// Returns the hash as a byte slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Copies the hash into a `Vec<u8>`.
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl fmt::Display for ScriptHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl FromStr for ScriptHash {
    type Err = hex::FromHexError;

    /// Parses 40 hex digits, with or without a `0x` prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let mut out = [0u8; SCRIPT_HASH_LEN];
        hex::decode_to_slice(digits, &mut out)?;
        Ok(Self(out))
    }
}

impl From<[u8; SCRIPT_HASH_LEN]> for ScriptHash {
    fn from(bytes: [u8; SCRIPT_HASH_LEN]) -> Self {
        Self(bytes)
    }
}
