//! The attribute store: reading and writing the [`StatRecord`] kept per
//! inode, keyed through the path index the way `read_stat`/`write_stat`
//! resolve through `stat_key` in `fake.c`.

use log::error;
use metafs_api::realfs::RealFs;
use metafs_api::store::MetadataStore;
use metafs_api::types::{StatRecord, STAT_RECORD_SIZE};
use relative_path::RelativePath;

use crate::error::{OverlayError, Result};
use crate::keys;
use crate::kv::KvStore;
use crate::pathindex;

/// Resolve `path` to its current `stat <inode>` key, recording the
/// path→inode mapping as a side effect (mirrors `stat_key`'s own comment:
/// "record the path-inode correspondence, in case there was a crash before
/// this could be recorded when the file was created").
pub fn stat_key_for_path<R: RealFs, S: MetadataStore>(
    realfs: &R,
    kv: &mut KvStore<S>,
    path: &RelativePath,
) -> Result<Option<Vec<u8>>> {
    match pathindex::write_path(realfs, kv, path)? {
        Some(inode) => Ok(Some(keys::stat_key(inode))),
        None => Ok(None),
    }
}

/// Read the attribute record for `path`, if one exists.
pub fn read_stat<R: RealFs, S: MetadataStore>(
    realfs: &R,
    kv: &mut KvStore<S>,
    path: &RelativePath,
) -> Result<Option<StatRecord>> {
    let key = match stat_key_for_path(realfs, kv, path)? {
        Some(k) => k,
        None => return Ok(None),
    };
    match kv.get(&key) {
        Some(bytes) => Ok(Some(decode_stat_record_or_abort(path, &bytes))),
        None => Ok(None),
    }
}

/// Decode a stored stat record, aborting the process if its length or
/// encoding doesn't match the fixed 16-byte format (spec §4.4: "readers
/// must verify the stored byte length matches the expected size and abort
/// on mismatch"). The database is not expected to hold foreign records
/// under a `stat <inode>` key, so a mismatch here means the store is
/// corrupt in a way recovery didn't catch, not a guest-visible condition.
fn decode_stat_record_or_abort(path: &RelativePath, bytes: &[u8]) -> StatRecord {
    if bytes.len() != STAT_RECORD_SIZE {
        error!(
            "stat record for {path} has length {}, expected {STAT_RECORD_SIZE}",
            bytes.len()
        );
        std::process::abort();
    }
    match StatRecord::from_bytes(bytes) {
        Ok(record) => record,
        Err(e) => {
            error!("stat record for {path} failed to decode: {e}");
            std::process::abort();
        }
    }
}

/// Write the attribute record for `path`. `path` must currently resolve to
/// a real inode (callers create the real object first, per Rule O1).
pub fn write_stat<R: RealFs, S: MetadataStore>(
    realfs: &R,
    kv: &mut KvStore<S>,
    path: &RelativePath,
    record: &StatRecord,
) -> Result<()> {
    let key = stat_key_for_path(realfs, kv, path)?.ok_or(OverlayError::NotFound)?;
    kv.put(&key, &record.to_bytes());
    Ok(())
}

/// Delete the attribute record keyed by `inode` directly (used once a
/// caller already knows the inode is about to become unreachable, e.g. the
/// last unlink of a file or an rmdir).
pub fn delete_stat_by_inode<S: MetadataStore>(kv: &mut KvStore<S>, inode: u64) {
    kv.delete(&keys::stat_key(inode));
}
