//! Rebuilding the path/stat index after the backing real filesystem's inode
//! numbers have changed out from under the database (spec §4.6) — e.g.
//! after the filesystem was compressed, transmitted, and uncompressed
//! elsewhere, as the comment in `fakefs_mount` describes.

use std::collections::HashMap;

use log::{info, warn};
use metafs_api::realfs::RealFs;
use relative_path::RelativePathBuf;

use crate::error::Result;
use crate::keys;
use crate::kv::KvStore;
use metafs_api::store::MetadataStore;

/// Re-key every `inode <path>` / `stat <inode>` entry in the store against
/// the real filesystem's current inode numbers. Entries for paths whose
/// real object no longer resolves are left untouched — spec §4.6 requires
/// leaving them alone ("they will be garbage-collected on next access"),
/// not deleting them here.
pub fn rebuild<R: RealFs, S: MetadataStore>(realfs: &R, kv: &mut KvStore<S>) -> Result<()> {
    let entries = kv.iter_entries();

    let mut path_entries: Vec<(RelativePathBuf, u64)> = Vec::new();
    let mut stat_entries: HashMap<u64, Vec<u8>> = HashMap::new();

    for (key, value) in &entries {
        if let Some(raw_path) = keys::strip_path_prefix(key) {
            if let (Ok(path_str), Some(old_inode)) = (
                std::str::from_utf8(raw_path),
                keys::decode_inode(value),
            ) {
                if let Ok(path) = RelativePathBuf::from_path(path_str) {
                    path_entries.push((path, old_inode));
                }
            }
        } else if let Some(raw_inode) = keys::strip_stat_prefix(key) {
            if let Some(inode) = keys::decode_inode(raw_inode) {
                stat_entries.insert(inode, value.clone());
            }
        }
    }

    let mut rekeyed = 0u64;
    let mut stale = 0u64;
    for (path, old_inode) in &path_entries {
        let host_path = std::path::PathBuf::from(path.as_str());
        let new_inode = match realfs.stat(&host_path, false) {
            Ok(st) if st.ino != 0 => st.ino,
            // Path no longer resolves on the host. Leave the entry alone;
            // it is harmless garbage the next access will overwrite or
            // ignore (spec §4.6), not something rebuild should delete.
            _ => {
                stale += 1;
                continue;
            }
        };

        if new_inode != *old_inode {
            rekeyed += 1;
            kv.put(&keys::path_key(path), &keys::encode_inode(new_inode));
            if let Some(stat_value) = stat_entries.remove(old_inode) {
                kv.delete(&keys::stat_key(*old_inode));
                kv.put(&keys::stat_key(new_inode), &stat_value);
            }
        }
    }

    if stale > 0 {
        warn!("rebuild left {stale} stale index entries with no surviving real object untouched");
    }
    info!("rebuild re-keyed {rekeyed} entries out of {} tracked paths", path_entries.len());
    Ok(())
}
