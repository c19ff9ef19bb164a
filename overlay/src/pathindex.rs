//! The path→inode index: `inode <path>` entries recording which host inode
//! a guest path currently resolves to, rebuilt opportunistically on every
//! access so that a crash between a filesystem mutation and the database
//! write (Rule O1) is recovered from on the next lookup, exactly as
//! `write_path`/`inode_for_path` do in `fake.c`.

use metafs_api::realfs::RealFs;
use relative_path::RelativePath;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::keys;
use crate::kv::KvStore;
use metafs_api::store::MetadataStore;

/// Convert a guest-relative path into the form a [`RealFs`] implementation
/// expects. Relative-path's `/`-separated syntax is already what Linux
/// paths use, so this is a plain reinterpretation, not a semantic
/// conversion.
pub fn to_host_path(path: &RelativePath) -> PathBuf {
    PathBuf::from(path.as_str())
}

/// The host inode `path` currently resolves to, or `None` if it doesn't
/// exist on the real filesystem right now. Inode 0 is never returned — both
/// Linux and Darwin reserve it, matching `inode_for_path`'s comment.
pub fn inode_for_path<R: RealFs>(realfs: &R, path: &RelativePath) -> Option<u64> {
    match realfs.stat(&to_host_path(path), false) {
        Ok(st) if st.ino != 0 => Some(st.ino),
        _ => None,
    }
}

/// Record the current path→inode mapping for `path`, returning the inode
/// recorded (or `None` if `path` doesn't currently exist). Called before
/// every stat-record access so a crash between a real mutation and the
/// previous database write self-heals on the next access.
pub fn write_path<R: RealFs, S: MetadataStore>(
    realfs: &R,
    kv: &mut KvStore<S>,
    path: &RelativePath,
) -> Result<Option<u64>> {
    match inode_for_path(realfs, path) {
        Some(inode) => {
            kv.put(&keys::path_key(path), &keys::encode_inode(inode));
            Ok(Some(inode))
        }
        None => Ok(None),
    }
}

/// Remove the `inode <path>` entry for `path` (on unlink/rmdir/rename-away).
pub fn delete_path<S: MetadataStore>(kv: &mut KvStore<S>, path: &RelativePath) {
    kv.delete(&keys::path_key(path));
}

/// Helper for callers that already hold a `&Path` (e.g. rebuild, which reads
/// paths back out of stored key bytes) rather than a `&RelativePath`.
pub fn inode_for_host_path<R: RealFs>(realfs: &R, path: &Path) -> Option<u64> {
    match realfs.stat(path, false) {
        Ok(st) if st.ino != 0 => Some(st.ino),
        _ => None,
    }
}
