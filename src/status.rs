//! Status dictionary adapter (C7).
//!
//! The real dictionary storage is an external collaborator — in production
//! it is a shared-memory key/value map mapped into every component's
//! address space. This module defines the trait boundary the rest of the
//! crate programs against, plus an in-memory reference implementation for
//! tests and standalone use, guarded by a single coarse mutex the way the
//! teacher guards its stream registry (`STREAM_REGISTRY: RwLock<HashMap<...>>`
//! in `lib.rs`) — except a status dictionary is read/write from every
//! component, not read-mostly, so this uses `Mutex` rather than `RwLock`.

use std::collections::HashMap;

use parking_lot::Mutex;

/// A process-wide key/value map guarded by a single mutex.
///
/// Implementations must ensure writers hold the lock only for the duration
/// of the swap itself; no scatter work should ever run while holding it.
pub trait StatusDictionary: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);

    /// Copy the entire dictionary, e.g. for stamping into a block's header
    /// region on finalize.
    fn snapshot(&self) -> HashMap<String, String>;

    fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|s| s.parse().ok())
    }

    fn get_u32(&self, key: &str) -> Option<u32> {
        self.get(key).and_then(|s| s.parse().ok())
    }

    fn get_i32(&self, key: &str) -> Option<i32> {
        self.get(key).and_then(|s| s.parse().ok())
    }

    fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|s| s.parse().ok())
    }

    fn set_u64(&self, key: &str, value: u64) {
        self.set(key, &value.to_string());
    }

    fn set_u32(&self, key: &str, value: u32) {
        self.set(key, &value.to_string());
    }

    fn set_i32(&self, key: &str, value: i32) {
        self.set(key, &value.to_string());
    }

    fn set_f64(&self, key: &str, value: f64) {
        self.set(key, &value.to_string());
    }
}

/// Reference `StatusDictionary` backed by a mutex-protected `HashMap`.
///
/// This is the implementation used by tests and by any caller that does not
/// plumb in a real shared-memory status buffer.
#[derive(Default)]
pub struct InMemoryStatusDictionary {
    inner: Mutex<HashMap<String, String>>,
}

impl InMemoryStatusDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the dictionary with a batch of initial key/value pairs.
    pub fn seeded<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let dict = Self::new();
        for (k, v) in pairs {
            let key: String = k.into();
            let value: String = v.into();
            dict.set(&key, &value);
        }
        dict
    }
}

impl StatusDictionary for InMemoryStatusDictionary {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.inner.lock().insert(key.to_string(), value.to_string());
    }

    fn snapshot(&self) -> HashMap<String, String> {
        self.inner.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_roundtrip() {
        let dict = InMemoryStatusDictionary::new();
        dict.set_u64("PKTIDX", 42);
        assert_eq!(dict.get_u64("PKTIDX"), Some(42));
        assert_eq!(dict.get("PKTIDX"), Some("42".to_string()));
    }

    #[test]
    fn missing_key_is_none() {
        let dict = InMemoryStatusDictionary::new();
        assert_eq!(dict.get("NOPE"), None);
        assert_eq!(dict.get_u32("NOPE"), None);
    }

    #[test]
    fn snapshot_is_a_copy() {
        let dict = InMemoryStatusDictionary::new();
        dict.set("DAQSTATE", "IDLE");
        let snap = dict.snapshot();
        dict.set("DAQSTATE", "RECORD");
        assert_eq!(snap.get("DAQSTATE"), Some(&"IDLE".to_string()));
        assert_eq!(dict.get("DAQSTATE"), Some("RECORD".to_string()));
    }

    #[test]
    fn seeded_populates_initial_values() {
        let dict = InMemoryStatusDictionary::seeded([("NANTS", "2"), ("NSTRM", "1")]);
        assert_eq!(dict.get_u32("NANTS"), Some(2));
        assert_eq!(dict.get_u32("NSTRM"), Some(1));
    }
}
