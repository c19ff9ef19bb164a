//! Mount and unmount: deriving the database path from the data directory,
//! opening both collaborators, detecting inode renumbering via the stored
//! sentinel, and triggering a rebuild when needed (spec §4.6, `fake.c`'s
//! `fakefs_mount`).

use std::path::{Path, PathBuf};

use log::info;
use metafs_api::realfs::local::LocalRealFs;
use metafs_api::realfs::RealFs;
use metafs_api::store::filestore::FileStore;
use metafs_api::store::MetadataStore;

use crate::error::{OverlayError, Result};
use crate::keys;
use crate::kv::KvStore;
use crate::lock::DbLock;
use crate::rebuild;
use crate::vfs::OverlayFs;

/// A mounted overlay: the assembled [`OverlayFs`] plus whatever bookkeeping
/// belongs to the mount lifecycle rather than to individual operations.
pub struct MountContext {
    /// The assembled filesystem, ready to serve VFS operations.
    pub fs: OverlayFs<LocalRealFs, FileStore>,
}

/// Replace a trailing `data` path component with `meta.db`, the convention
/// `fakefs_mount` hardcodes (and asserts on) when deriving the database
/// path from the mounted data directory's own path.
fn derive_db_path(data_dir: &Path) -> Result<PathBuf> {
    let file_name = data_dir.file_name().and_then(|n| n.to_str());
    if file_name != Some("data") {
        return Err(OverlayError::InvalidPath(format!(
            "expected mount source to end in \"data\", got {}",
            data_dir.display()
        )));
    }
    Ok(data_dir.with_file_name("meta.db"))
}

impl MountContext {
    /// Mount the overlay rooted at `data_dir` (expected to be named
    /// `data`; the database file is derived as its sibling `meta.db`).
    pub fn mount(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        let db_path = derive_db_path(&data_dir)?;

        let realfs = LocalRealFs::open(&data_dir)?;

        let mut store = FileStore::open(&db_path)?;
        if store.needs_recovery() {
            store.recover()?;
        }

        let db_fd = store.raw_fd();
        let db_ino = host_inode_of_fd(db_fd)?;

        let mut kv = KvStore::new(store);

        let stored_ino = kv.get(keys::DB_INODE_SENTINEL_KEY).and_then(|v| keys::decode_inode(&v));
        if let Some(stored_ino) = stored_ino {
            if stored_ino != db_ino {
                info!(
                    "database inode changed ({stored_ino} -> {db_ino}), rebuilding metadata index"
                );
                rebuild::rebuild(&realfs, &mut kv)?;
            }
        }
        kv.put(keys::DB_INODE_SENTINEL_KEY, &keys::encode_inode(db_ino));

        let lock = DbLock::new(db_fd);
        let fs = OverlayFs::new(realfs, kv, lock);
        Ok(MountContext { fs })
    }

    /// Unmount: flush the real filesystem driver (spec §9 Open Question —
    /// decided yes, call through) before the context is dropped and the
    /// root directory handle / store fd close.
    pub fn unmount(self) -> Result<()> {
        self.fs.realfs().sync()?;
        Ok(())
    }
}

fn host_inode_of_fd(fd: std::os::fd::RawFd) -> Result<u64> {
    use nix::sys::stat::fstat;
    let st = fstat(fd).map_err(|e| {
        OverlayError::RealFs(metafs_api::error::RealFsError::Io(std::io::Error::from_raw_os_error(
            e as i32,
        )))
    })?;
    Ok(st.st_ino)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_db_path_requires_data_suffix() {
        assert!(derive_db_path(Path::new("/mnt/data")).is_ok());
        assert_eq!(
            derive_db_path(Path::new("/mnt/data")).unwrap(),
            Path::new("/mnt/meta.db")
        );
        assert!(derive_db_path(Path::new("/mnt/other")).is_err());
    }
}
