//! Reference-counted immutable byte buffer.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Shared, immutable byte buffer.
///
/// Cloning is a reference-count bump, so a script loaded into several call
/// frames, or a byte array duplicated across stack slots, is never copied.
#[derive(Default, Eq, PartialEq, Hash)]
pub struct Bytes(Arc<Vec<u8>>);

impl Bytes {
    /// Creates a new buffer from any type convertible to `Vec<u8>`.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self(Arc::new(data.into()))
    }

    /// Returns an empty buffer.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the number of bytes in the buffer.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the buffer contents as a byte slice.
    pub fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }

    /// Copies the buffer contents into a new `Vec<u8>`.
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }

    /// Returns true if both handles point at the same allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Returns a new buffer holding `self` followed by `other`.
    pub fn concat(&self, other: &[u8]) -> Self {
        let mut out = Vec::with_capacity(self.len() + other.len());
        out.extend_from_slice(self);
        out.extend_from_slice(other);
        Self::new(out)
    }

    /// Copies out at most `count` bytes starting at `start`.
    ///
    /// Out-of-range bounds are clamped, so the result may be shorter than `count`.
    pub fn sub(&self, start: usize, count: usize) -> Self {
        let start = start.min(self.len());
        let end = start.saturating_add(count).min(self.len());
        Self::new(&self[start..end])
    }
}

impl Clone for Bytes {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl Deref for Bytes {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl AsRef<[u8]> for Bytes {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl fmt::Debug for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bytes(0x{})", hex::encode(self.as_slice()))
    }
}

impl fmt::Display for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.as_slice()))
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(v: Vec<u8>) -> Self {
        Self::new(v)
    }
}

impl From<&[u8]> for Bytes {
    fn from(s: &[u8]) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Bytes {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl<const N: usize> From<[u8; N]> for Bytes {
    fn from(arr: [u8; N]) -> Self {
        Self::new(arr)
    }
}

impl<const N: usize> From<&[u8; N]> for Bytes {
    fn from(arr: &[u8; N]) -> Self {
        Self::new(arr.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_shares_allocation() {
        let a = Bytes::from(vec![1, 2, 3]);
        let b = a.clone();
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&Bytes::from(vec![1, 2, 3])));
    }

    #[test]
    fn sub_clamps_to_bounds() {
        let b = Bytes::from(b"abcdef");
        assert_eq!(b.sub(2, 3).as_slice(), b"cde");
        assert_eq!(b.sub(4, 10).as_slice(), b"ef");
        assert!(b.sub(10, 1).is_empty());
        assert!(b.sub(usize::MAX, usize::MAX).is_empty());
    }

    #[test]
    fn concat_appends() {
        let b = Bytes::from(b"ab").concat(b"cd");
        assert_eq!(b.as_slice(), b"abcd");
    }

    #[test]
    fn display_is_prefixed_hex() {
        assert_eq!(Bytes::from([0xde, 0xad]).to_string(), "0xdead");
        assert_eq!(Bytes::empty().to_string(), "0x");
    }
}
