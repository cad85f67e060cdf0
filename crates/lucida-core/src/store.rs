use std::collections::HashMap;
use std::sync::RwLock;

// ─── SessionStore ─────────────────────────────────────────────────────────

/// Keyed, process-lifetime state shared between request handlers.
///
/// Used for the channel address table and the pending-reply table. Writes are
/// last-write-wins: a second `put` for the same key replaces the first value
/// without queuing it.
pub trait SessionStore<V>: Send + Sync {
    /// Return a copy of the value stored under `key`.
    fn get(&self, key: &str) -> Option<V>;

    /// Store `value` under `key`, returning the value it replaced.
    fn put(&self, key: &str, value: V) -> Option<V>;

    /// Remove and return the value under `key` (read-and-clear).
    fn take(&self, key: &str) -> Option<V>;

    /// Drop the value under `key`. Returns `true` if something was removed.
    fn clear(&self, key: &str) -> bool {
        self.take(key).is_some()
    }

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─── MemoryStore ──────────────────────────────────────────────────────────

/// In-memory [`SessionStore`]. Nothing survives a restart.
#[derive(Debug)]
pub struct MemoryStore<V> {
    entries: RwLock<HashMap<String, V>>,
}

impl<V> MemoryStore<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

// Poisoned guards are recovered: no method leaves the map half-written.
impl<V: Clone + Send + Sync> SessionStore<V> for MemoryStore<V> {
    fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    fn put(&self, key: &str, value: V) -> Option<V> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value)
    }

    fn take(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(key)
    }

    fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
