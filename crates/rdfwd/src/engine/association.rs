//! Association table: remote-listen-port -> local `Target`.
//!
//! Keyed by the *guest* port advertised to the peer agent via `LISTEN`.
//! Re-registering an already-present port replaces the entry and the
//! caller is expected to emit `SHUTDOWN` for the superseded rule first.

use std::collections::HashMap;
use std::sync::Mutex;

use super::target::Target;

#[derive(Default)]
pub struct AssociationTable {
    entries: Mutex<HashMap<u16, Target>>,
}

impl AssociationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the rule for `port`, returning the previous
    /// target if one existed.
    pub fn insert(&self, port: u16, target: Target) -> Option<Target> {
        self.entries.lock().unwrap().insert(port, target)
    }

    pub fn get(&self, port: u16) -> Option<Target> {
        self.entries.lock().unwrap().get(&port).cloned()
    }

    pub fn remove(&self, port: u16) -> Option<Target> {
        self.entries.lock().unwrap().remove(&port)
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}
