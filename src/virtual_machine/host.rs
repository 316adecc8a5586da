//! Host capabilities the engine consumes.
//!
//! - [`ScriptTable`]: resolves a script hash to script bytes for `APPCALL`/`TAILCALL`
//! - [`ScriptContainer`]: supplies the message `CHECKSIG`/`CHECKMULTISIG` verify
//! - [`InteropInterface`]: any host object a script may hold as an opaque value
//!
//! [`MemoryScriptTable`] and [`CachedScriptTable`] are ready-made resolvers.

use crate::types::bytes::Bytes;
use crate::types::hash::ScriptHash;
use std::any::Any;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

/// Opaque host object exposed to scripts.
///
/// The VM never inspects or mutates these; it only moves them between stack
/// slots and compares them by identity.
pub trait InteropInterface: Any {
    /// Short name used in diagnostics.
    fn interface_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// The object being verified, e.g. a transaction.
pub trait ScriptContainer: InteropInterface {
    /// Bytes that signatures are checked against.
    fn message(&self) -> Bytes;
}

/// Maps script hashes to script bytes.
pub trait ScriptTable {
    fn get_script(&self, hash: &ScriptHash) -> Option<Bytes>;
}

impl<T: ScriptTable + ?Sized> ScriptTable for &T {
    fn get_script(&self, hash: &ScriptHash) -> Option<Bytes> {
        (**self).get_script(hash)
    }
}

/// In-memory script table.
#[derive(Debug, Default, Clone)]
pub struct MemoryScriptTable {
    scripts: HashMap<ScriptHash, Bytes>,
}

impl MemoryScriptTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `script` under `hash`, returning the script it replaced.
    pub fn insert(&mut self, hash: ScriptHash, script: impl Into<Bytes>) -> Option<Bytes> {
        self.scripts.insert(hash, script.into())
    }

    pub fn remove(&mut self, hash: &ScriptHash) -> Option<Bytes> {
        self.scripts.remove(hash)
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}

impl ScriptTable for MemoryScriptTable {
    fn get_script(&self, hash: &ScriptHash) -> Option<Bytes> {
        self.scripts.get(hash).cloned()
    }
}

/// Script table that remembers up to `capacity` lookups from a backing table.
///
/// Eviction is first-in first-out: hits do not refresh an entry's position.
/// Misses are not cached.
pub struct CachedScriptTable<T> {
    inner: T,
    capacity: usize,
    cache: RefCell<FifoCache>,
}

#[derive(Default)]
struct FifoCache {
    entries: HashMap<ScriptHash, Bytes>,
    order: VecDeque<ScriptHash>,
}

impl<T: ScriptTable> CachedScriptTable<T> {
    pub fn new(inner: T, capacity: usize) -> Self {
        Self {
            inner,
            capacity,
            cache: RefCell::new(FifoCache::default()),
        }
    }

    /// Number of cached scripts.
    pub fn cached(&self) -> usize {
        self.cache.borrow().entries.len()
    }

    /// Returns true if `hash` is currently cached.
    pub fn contains(&self, hash: &ScriptHash) -> bool {
        self.cache.borrow().entries.contains_key(hash)
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T: ScriptTable> ScriptTable for CachedScriptTable<T> {
    fn get_script(&self, hash: &ScriptHash) -> Option<Bytes> {
        if let Some(script) = self.cache.borrow().entries.get(hash) {
            return Some(script.clone());
        }
        let script = self.inner.get_script(hash)?;
        if self.capacity == 0 {
            return Some(script);
        }
        let mut cache = self.cache.borrow_mut();
        while cache.order.len() >= self.capacity {
            match cache.order.pop_front() {
                Some(oldest) => {
                    cache.entries.remove(&oldest);
                }
                None => break,
            }
        }
        cache.order.push_back(*hash);
        cache.entries.insert(*hash, script.clone());
        Some(script)
    }
}
