//! The recovery/abort policy wrapped around a raw [`MetadataStore`],
//! matching `fake.c`'s `check_db_err`: a recoverable error triggers
//! recovery and a retry, anything else is unrecoverable and the process
//! aborts rather than returning a wrong answer to the guest (spec §7).

use std::os::fd::RawFd;

use log::{error, info, warn};
use metafs_api::error::StoreError;
use metafs_api::store::MetadataStore;

/// Wraps a [`MetadataStore`], retrying on recoverable corruption and
/// aborting the process on anything else.
pub struct KvStore<S: MetadataStore> {
    store: S,
}

impl<S: MetadataStore> KvStore<S> {
    /// Wrap an already-open store.
    pub fn new(store: S) -> Self {
        KvStore { store }
    }

    /// The raw fd of the backing store file, for [`crate::lock::DbLock`].
    pub fn raw_fd(&self) -> RawFd {
        self.store.raw_fd()
    }

    fn recover_or_abort(&mut self) {
        warn!("metadata store needs recovery, recovering");
        match self.store.recover() {
            Ok(report) => info!(
                "metadata store recovered: {} lost keys, {} lost buckets, backup at {}",
                report.lost_keys,
                report.lost_buckets,
                report.backup_path.display()
            ),
            Err(e) => {
                error!("metadata store recovery failed: {e}");
                std::process::abort();
            }
        }
    }

    /// Fetch a value, retrying through recovery as needed. Any error that
    /// recovery cannot fix is unrecoverable by spec §7's classification and
    /// aborts the process — it is never returned to the guest.
    pub fn get(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        loop {
            match self.store.get(key) {
                Ok(v) => return v,
                Err(StoreError::NeedsRecovery(_)) => self.recover_or_abort(),
                Err(e) => {
                    error!("unrecoverable metadata store error on get: {e}");
                    std::process::abort();
                }
            }
        }
    }

    /// Store a value, retrying through recovery as needed.
    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        loop {
            match self.store.put(key, value) {
                Ok(()) => return,
                Err(StoreError::NeedsRecovery(_)) => self.recover_or_abort(),
                Err(e) => {
                    error!("unrecoverable metadata store error on put: {e}");
                    std::process::abort();
                }
            }
        }
    }

    /// Delete a key, retrying through recovery as needed. Deleting an
    /// absent key is not an error (mirrors `gdbm_delete`'s tolerance).
    pub fn delete(&mut self, key: &[u8]) {
        loop {
            match self.store.delete(key) {
                Ok(()) => return,
                Err(StoreError::NeedsRecovery(_)) => self.recover_or_abort(),
                Err(e) => {
                    error!("unrecoverable metadata store error on delete: {e}");
                    std::process::abort();
                }
            }
        }
    }

    /// Every live entry, for the rebuild procedure.
    pub fn iter_entries(&mut self) -> Vec<(Vec<u8>, Vec<u8>)> {
        loop {
            match self.store.iter_entries() {
                Ok(v) => return v,
                Err(StoreError::NeedsRecovery(_)) => self.recover_or_abort(),
                Err(e) => {
                    error!("unrecoverable metadata store error on iteration: {e}");
                    std::process::abort();
                }
            }
        }
    }

    /// Run recovery up front if the store was already flagged at open time
    /// (the teacher-equivalent call site to `check_db_err` before the first
    /// operation).
    pub fn recover_if_needed(&mut self) {
        if self.store.needs_recovery() {
            self.recover_or_abort();
        }
    }
}
