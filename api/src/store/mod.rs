//! The key-value store collaborator interface: the external side-channel
//! database the overlay's `kv` module persists metadata entries in,
//! standing in for the gdbm store `fake.c` calls through `read_meta`/
//! `write_meta`/`delete_meta`.

pub mod filestore;

use crate::error::StoreResult;
use std::os::fd::RawFd;

/// The outcome of a [`MetadataStore::recover`] call: how much was lost and
/// where the damaged file was moved to, the Rust equivalent of gdbm's
/// `gdbm_recovery` stats.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Number of key/value entries that could not be salvaged.
    pub lost_keys: u64,
    /// Number of internal storage buckets dropped outright (0 for a flat
    /// log-structured store; kept for parity with gdbm's reporting shape).
    pub lost_buckets: u64,
    /// Where the pre-recovery file was moved, for forensic inspection.
    pub backup_path: std::path::PathBuf,
}

/// A key-value metadata store. Implementations are not required to be safe
/// for concurrent access from multiple callers on their own — the overlay's
/// own `lock::DbLock` is what serializes access, matching gdbm's "opened
/// with no internal locking" contract (spec §4.6).
pub trait MetadataStore {
    /// Fetch the value for `key`, or `None` if absent. Absence is not an
    /// error (spec invariant I2 tolerates missing entries).
    fn get(&mut self, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    /// Insert or overwrite the value for `key`.
    fn put(&mut self, key: &[u8], value: &[u8]) -> StoreResult<()>;

    /// Remove `key`, if present. Removing an absent key is not an error.
    fn delete(&mut self, key: &[u8]) -> StoreResult<()>;

    /// Iterate every live `(key, value)` pair currently in the store, used
    /// by the overlay's rebuild procedure to re-key entries after the
    /// backing real filesystem's inode numbers have changed (spec §4.6).
    fn iter_entries(&mut self) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>>;

    /// The raw file descriptor of the store's single backing file, so the
    /// overlay can flock it directly (mirrors `gdbm_fdesc`).
    fn raw_fd(&self) -> RawFd;

    /// True if the store detected, at open time, that its tail record was
    /// truncated or malformed and needs [`MetadataStore::recover`] before
    /// any further read/write.
    fn needs_recovery(&self) -> bool;

    /// Move the damaged backing file aside and replay every record that can
    /// still be parsed, returning a summary of what was lost.
    fn recover(&mut self) -> StoreResult<RecoveryReport>;
}
