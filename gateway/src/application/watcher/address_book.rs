use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// The in-memory watched-address set: address → owning intent.
///
/// Guarded by a single lock held only for map operations, never across
/// I/O. Populated from assigned addresses at watcher start, grown by
/// address assignment, shrunk on confirmation and watcher stop.
#[derive(Debug, Clone, Default)]
pub struct AddressBook {
    inner: Arc<Mutex<HashMap<String, i64>>>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, address: &str, intent_id: i64) {
        self.lock().insert(address.to_string(), intent_id);
    }

    pub fn remove(&self, address: &str) {
        self.lock().remove(address);
    }

    pub fn intent_for(&self, address: &str) -> Option<i64> {
        self.lock().get(address).copied()
    }

    pub fn replace_all(&self, pairs: Vec<(String, i64)>) {
        let mut map = self.lock();
        map.clear();
        map.extend(pairs);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, i64>> {
        self.inner.lock().expect("address book lock poisoned")
    }
}
