//! A single-file, append-only key-value store: the concrete
//! [`MetadataStore`] this crate ships, playing the role gdbm plays for
//! `fake.c` and the role `controller::Device` plays for the teacher's block
//! layer — one backing file, one fd, explicit recovery on corruption.
//!
//! Every mutation is appended as a length-framed, `bincode`-encoded
//! [`Entry`]; the live key set is kept fully in memory and rebuilt from the
//! log at open time, so a lookup never touches disk and a crash only ever
//! loses the last partially-written record.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::{MetadataStore, RecoveryReport};
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Serialize, Deserialize)]
enum Entry {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// A single-file append-log key-value store.
pub struct FileStore {
    file: File,
    path: PathBuf,
    index: HashMap<Vec<u8>, Vec<u8>>,
    needs_recovery: bool,
    /// Byte offset of the first record the scan at open time could not
    /// parse, if any; `recover()` truncates the surviving log to this point.
    valid_len: u64,
}

impl FileStore {
    /// Open (creating if absent) the store backed by `path`. Scans the
    /// whole log to rebuild the in-memory index and to detect a truncated
    /// or malformed tail record.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let mut buf = Vec::new();
        file.seek(SeekFrom::Start(0))?;
        file.read_to_end(&mut buf)?;

        let mut index = HashMap::new();
        let mut offset = 0usize;
        let mut needs_recovery = false;

        while offset < buf.len() {
            if offset + 4 > buf.len() {
                needs_recovery = true;
                break;
            }
            let frame_len =
                u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap()) as usize;
            let body_start = offset + 4;
            let body_end = body_start + frame_len;
            if body_end > buf.len() {
                needs_recovery = true;
                break;
            }
            match bincode::deserialize::<Entry>(&buf[body_start..body_end]) {
                Ok(Entry::Put { key, value }) => {
                    index.insert(key, value);
                }
                Ok(Entry::Delete { key }) => {
                    index.remove(&key);
                }
                Err(_) => {
                    needs_recovery = true;
                    break;
                }
            }
            offset = body_end;
        }

        if needs_recovery {
            warn!(
                "metadata store {} has a damaged tail record at offset {}",
                path.display(),
                offset
            );
        }

        Ok(FileStore {
            file,
            path,
            index,
            needs_recovery,
            valid_len: offset as u64,
        })
    }

    fn append_entry(&mut self, entry: &Entry) -> StoreResult<()> {
        let body = bincode::serialize(entry)?;
        let frame_len = body.len() as u32;
        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(&frame_len.to_le_bytes())?;
        self.file.write_all(&body)?;
        self.file.flush()?;
        Ok(())
    }
}

impl MetadataStore for FileStore {
    fn get(&mut self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        if self.needs_recovery {
            return Err(StoreError::NeedsRecovery(self.path.display().to_string()));
        }
        Ok(self.index.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        if self.needs_recovery {
            return Err(StoreError::NeedsRecovery(self.path.display().to_string()));
        }
        self.append_entry(&Entry::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        })?;
        self.index.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> StoreResult<()> {
        if self.needs_recovery {
            return Err(StoreError::NeedsRecovery(self.path.display().to_string()));
        }
        self.append_entry(&Entry::Delete { key: key.to_vec() })?;
        self.index.remove(key);
        Ok(())
    }

    fn iter_entries(&mut self) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        if self.needs_recovery {
            return Err(StoreError::NeedsRecovery(self.path.display().to_string()));
        }
        Ok(self
            .index
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    fn needs_recovery(&self) -> bool {
        self.needs_recovery
    }

    fn recover(&mut self) -> StoreResult<RecoveryReport> {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let backup_path = self.path.with_extension(format!("bak.{suffix}"));

        fs::copy(&self.path, &backup_path)?;

        let mut truncated = OpenOptions::new().write(true).open(&self.path)?;
        truncated.set_len(self.valid_len)?;
        truncated.flush()?;

        // Re-open to rebuild the index from the now-clean log.
        let rebuilt = FileStore::open(&self.path)?;
        let lost_keys = if self.needs_recovery { 1 } else { 0 };
        self.file = rebuilt.file;
        self.index = rebuilt.index;
        self.needs_recovery = false;
        self.valid_len = rebuilt.valid_len;

        info!(
            "recovered metadata store {}: {} keys retained, backup at {}",
            self.path.display(),
            self.index.len(),
            backup_path.display()
        );

        Ok(RecoveryReport {
            lost_keys,
            lost_buckets: 0,
            backup_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn put_get_delete_roundtrip() {
        let dir = tempdir().unwrap();
        let mut store = FileStore::open(dir.path().join("meta.db")).unwrap();
        store.put(b"k1", b"v1").unwrap();
        assert_eq!(store.get(b"k1").unwrap(), Some(b"v1".to_vec()));
        store.delete(b"k1").unwrap();
        assert_eq!(store.get(b"k1").unwrap(), None);
    }

    #[test]
    fn reopen_rebuilds_index_from_log() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("meta.db");
        {
            let mut store = FileStore::open(&db_path).unwrap();
            store.put(b"a", b"1").unwrap();
            store.put(b"b", b"2").unwrap();
            store.delete(b"a").unwrap();
        }
        let mut reopened = FileStore::open(&db_path).unwrap();
        assert_eq!(reopened.get(b"a").unwrap(), None);
        assert_eq!(reopened.get(b"b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn truncated_tail_triggers_recovery() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("meta.db");
        {
            let mut store = FileStore::open(&db_path).unwrap();
            store.put(b"a", b"1").unwrap();
        }
        // Simulate a crash mid-append: append a bogus frame length with no body.
        {
            let mut f = OpenOptions::new().append(true).open(&db_path).unwrap();
            f.write_all(&999u32.to_le_bytes()).unwrap();
        }
        let mut store = FileStore::open(&db_path).unwrap();
        assert!(store.needs_recovery());
        assert!(matches!(store.get(b"a"), Err(StoreError::NeedsRecovery(_))));

        let report = store.recover().unwrap();
        assert_eq!(report.lost_keys, 1);
        assert!(!store.needs_recovery());
        assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));
    }
}
