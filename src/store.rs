//! The replica-local version store.
//!
//! Each key has a clean entry (the last value known to be committed at the
//! chain tail) and a set of dirty entries (values forwarded down the chain
//! but not yet known committed). All access to a key's state goes through a
//! per-key mutex, created on first use and held by the handlers for the
//! duration of an operation, including across downstream chain calls.

use crate::error::Result;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// A key version. Versions are assigned by the chain head, starting at 1,
/// and increase by 1 for every successful write to the key.
pub type Version = u64;

/// The versioned state of a single key on this replica.
#[derive(Debug, Default)]
pub struct KeyState {
    /// The last version and value known to be committed at the tail.
    pub clean: Option<(Version, String)>,
    /// Values forwarded down the chain but not yet known committed, by
    /// version. All dirty versions are above the clean version.
    pub dirty: BTreeMap<Version, String>,
}

impl KeyState {
    /// Returns the version the head assigns to the next write: one above the
    /// largest version seen, whether dirty or clean.
    pub fn next_version(&self) -> Version {
        let clean = self.clean.as_ref().map(|(version, _)| *version);
        let dirty = self.dirty.keys().next_back().copied();
        dirty.max(clean).unwrap_or(0) + 1
    }

    /// Records a version as committed at the tail, replacing the clean entry
    /// and removing the dirty entry. Stale dirty versions below the committed
    /// version (left behind by failed forwards) are dropped as well.
    pub fn commit(&mut self, version: Version, value: String) {
        self.clean = Some((version, value));
        self.dirty = self.dirty.split_off(&(version + 1));
    }
}

/// A concurrent store of per-key state. Key states are created lazily on
/// first access and live for the lifetime of the process.
#[derive(Debug, Default)]
pub struct Store {
    keys: Mutex<HashMap<String, Arc<Mutex<KeyState>>>>,
}

impl Store {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches the state of the given key, creating it if it does not exist.
    /// The caller locks the returned state; the table lock is released before
    /// this returns, so key locks never nest inside it.
    pub fn entry(&self, key: &str) -> Result<Arc<Mutex<KeyState>>> {
        let mut keys = self.keys.lock()?;
        Ok(keys.entry(key.to_string()).or_default().clone())
    }
}
