//! VFS-level operations: the guest-facing surface that composes a real
//! filesystem mutation with the corresponding database update under the
//! database lock, following Rule O1 (mutate the host before the database)
//! for every operation exactly as `fake.c`'s `fakefs_*` functions do.

use log::warn;
use metafs_api::error::RealFsError;
use metafs_api::realfs::{RealFs, RealFsHandle};
use metafs_api::store::MetadataStore;
use metafs_api::types::{Credentials, GuestStat, StatRecord, S_IFMT, S_IPERM};
use relative_path::{RelativePath, RelativePathBuf};

use crate::attrs;
use crate::error::{OverlayError, Result};
use crate::keys;
use crate::kv::KvStore;
use crate::lock::DbLock;
use crate::pathindex;

/// Guest-visible `O_CREAT` bit. The overlay only ever inspects this one
/// flag bit (spec §4.5 `open`: the host mode passed down is always fixed,
/// regardless of any other guest-requested flags), so a single constant
/// stands in for a full flags type.
pub const O_CREAT: i32 = 0o100;
/// Guest-visible `O_WRONLY` bit, used internally by `symlink`'s
/// regular-file emulation.
const O_WRONLY: i32 = 0o1;
/// Guest-visible `O_EXCL` bit, used internally by `symlink` to require the
/// link path not already exist (`fakefs_symlink`'s `O_EXCL` open).
const O_EXCL: i32 = 0o200;

/// The attribute a `setattr`/`fsetattr` call is changing, mirroring
/// `fake.c`'s `struct attr` tagged union.
#[derive(Debug, Clone, Copy)]
pub enum Attr {
    /// Change the owning uid.
    Uid(u32),
    /// Change the owning gid.
    Gid(u32),
    /// Change the permission bits (type bits are preserved).
    Mode(u32),
    /// Truncate/extend to this size; bypasses the attribute record
    /// entirely and goes straight to the real filesystem.
    Size(u64),
}

/// The overlay filesystem: a real filesystem driver plus a metadata store,
/// composed under a single exclusive lock.
pub struct OverlayFs<R: RealFs, S: MetadataStore> {
    realfs: R,
    kv: KvStore<S>,
    lock: DbLock,
}

impl<R: RealFs, S: MetadataStore> OverlayFs<R, S> {
    /// Assemble an overlay over an already-opened real filesystem and
    /// store. Used by [`crate::mount::MountContext`], which is responsible
    /// for the mount-time sentinel/rebuild check before handing out an
    /// `OverlayFs`.
    pub fn new(realfs: R, kv: KvStore<S>, lock: DbLock) -> Self {
        OverlayFs { realfs, kv, lock }
    }

    /// Borrow the real filesystem driver (used by `mount`/`rebuild`).
    pub fn realfs(&self) -> &R {
        &self.realfs
    }

    /// Borrow the store, mutably (used by `rebuild`).
    pub fn kv_mut(&mut self) -> &mut KvStore<S> {
        &mut self.kv
    }

    fn getpath(&self, handle: &R::Handle) -> Result<RelativePathBuf> {
        let host_path = handle.getpath()?;
        RelativePathBuf::from_path(&host_path)
            .map_err(|e| OverlayError::InvalidPath(format!("{}: {e}", host_path.display())))
    }

    /// Open (optionally creating) `path`. On creation, also record a fresh
    /// attribute record if one doesn't already exist — `fakefs_open`'s
    /// `O_CREAT` branch, including its "don't clobber an existing record"
    /// check (a file can be recreated at the same path after an unlink
    /// raced with a crash, in which case the old record should stick).
    pub fn open(
        &mut self,
        path: &RelativePath,
        flags: i32,
        mode: u32,
        creds: Credentials,
    ) -> Result<R::Handle> {
        let handle = self.realfs.open(&pathindex::to_host_path(path), flags)?;
        if flags & O_CREAT != 0 {
            let _guard = self.lock.lock();
            if attrs::read_stat(&self.realfs, &mut self.kv, path)?.is_none() {
                let record = StatRecord {
                    mode: (mode & S_IPERM) | metafs_api::types::S_IFREG,
                    uid: creds.uid,
                    gid: creds.gid,
                    rdev: 0,
                };
                attrs::write_stat(&self.realfs, &mut self.kv, path, &record)?;
            }
        }
        Ok(handle)
    }

    /// Hardlink `src` to `dst`, recording `dst`'s path→inode mapping.
    pub fn link(&mut self, src: &RelativePath, dst: &RelativePath) -> Result<()> {
        let _guard = self.lock.lock();
        self.realfs
            .link(&pathindex::to_host_path(src), &pathindex::to_host_path(dst))?;
        pathindex::write_path(&self.realfs, &mut self.kv, dst)?;
        Ok(())
    }

    /// Unlink `path`. If this was the last link (checked, racily but
    /// tolerably, before the unlink per spec §4.5), the attribute record
    /// itself is deleted too, not just the path→inode entry (invariant I3).
    pub fn unlink(&mut self, path: &RelativePath) -> Result<()> {
        let host_path = pathindex::to_host_path(path);
        let gone = match self.realfs.stat(&host_path, false) {
            Ok(st) => st.nlink == 1,
            Err(_) => false,
        };

        let _guard = self.lock.lock();
        let inode = pathindex::inode_for_path(&self.realfs, path);
        self.realfs.unlink(&host_path)?;
        pathindex::delete_path(&mut self.kv, path);
        if gone {
            if let Some(inode) = inode {
                attrs::delete_stat_by_inode(&mut self.kv, inode);
            }
        }
        Ok(())
    }

    /// Remove the empty directory at `path`, deleting both the path entry
    /// and its attribute record (a directory has no hardlinks, so this is
    /// unconditional, unlike `unlink`).
    pub fn rmdir(&mut self, path: &RelativePath) -> Result<()> {
        let _guard = self.lock.lock();
        let inode = pathindex::inode_for_path(&self.realfs, path);
        self.realfs.rmdir(&pathindex::to_host_path(path))?;
        pathindex::delete_path(&mut self.kv, path);
        if let Some(inode) = inode {
            attrs::delete_stat_by_inode(&mut self.kv, inode);
        }
        Ok(())
    }

    /// Rename `src` to `dst`. If this rename clobbered an existing file at
    /// `dst`, that file's now-unreachable attribute record is deleted
    /// (`fakefs_rename`'s "old_dst_inode != new dst inode" check).
    pub fn rename(&mut self, src: &RelativePath, dst: &RelativePath) -> Result<()> {
        let _guard = self.lock.lock();
        let old_dst_inode = pathindex::inode_for_path(&self.realfs, dst);

        self.realfs
            .rename(&pathindex::to_host_path(src), &pathindex::to_host_path(dst))?;

        pathindex::write_path(&self.realfs, &mut self.kv, dst)?;
        pathindex::delete_path(&mut self.kv, src);

        let new_dst_inode = pathindex::inode_for_path(&self.realfs, dst);
        if let Some(old_inode) = old_dst_inode {
            if Some(old_inode) != new_dst_inode {
                attrs::delete_stat_by_inode(&mut self.kv, old_inode);
            }
        }
        Ok(())
    }

    /// Create a symlink by writing a regular file holding the link text
    /// (the host never sees a real symlink) and recording `S_IFLNK | 0777`
    /// in the attribute record, per `fakefs_symlink`. On a failed write the
    /// half-created file is unlinked before returning, matching the C
    /// cleanup path.
    pub fn symlink(
        &mut self,
        target: &str,
        link: &RelativePath,
        creds: Credentials,
    ) -> Result<()> {
        let _guard = self.lock.lock();
        let host_link = pathindex::to_host_path(link);
        let handle = self.realfs.open(&host_link, O_WRONLY | O_CREAT | O_EXCL)?;
        if let Err(e) = handle.write_all(target.as_bytes()) {
            warn!("symlink write failed for {link}, removing half-created entry: {e}");
            let _ = self.realfs.unlink(&host_link);
            return Err(OverlayError::RealFs(e));
        }

        let record = StatRecord::new_symlink(creds.uid, creds.gid);
        attrs::write_stat(&self.realfs, &mut self.kv, link, &record)?;
        Ok(())
    }

    /// `stat`/`lstat` `path`: the host-reported fields overlaid with the
    /// recorded mode/uid/gid/rdev (`fakefs_stat`).
    pub fn stat(&mut self, path: &RelativePath, follow_links: bool) -> Result<GuestStat> {
        let _guard = self.lock.lock();
        let record = attrs::read_stat(&self.realfs, &mut self.kv, path)?
            .ok_or(OverlayError::NotFound)?;
        let host = self
            .realfs
            .stat(&pathindex::to_host_path(path), follow_links)?;
        Ok(GuestStat::from_host_and_record(host, record))
    }

    /// `fstat` an open handle: recover its path (the only way, per
    /// `fakefs_fstat`'s own comment) and delegate to `stat`.
    pub fn fstat(&mut self, handle: &R::Handle) -> Result<GuestStat> {
        let path = self.getpath(handle)?;
        self.stat(&path, false)
    }

    /// Apply a `setattr` change to `path`. `Attr::Size` bypasses the
    /// attribute record entirely and truncates the real file directly
    /// (`fakefs_setattr`'s `attr_size` case calls `realfs_truncate`, not
    /// `write_stat`).
    pub fn setattr(&mut self, path: &RelativePath, attr: Attr) -> Result<()> {
        if let Attr::Size(len) = attr {
            let handle = self.realfs.open(&pathindex::to_host_path(path), 0)?;
            handle.set_len(len)?;
            return Ok(());
        }

        let _guard = self.lock.lock();
        let mut record =
            attrs::read_stat(&self.realfs, &mut self.kv, path)?.ok_or(OverlayError::NotFound)?;
        match attr {
            Attr::Uid(uid) => record.uid = uid,
            Attr::Gid(gid) => record.gid = gid,
            Attr::Mode(mode) => record.mode = (record.mode & S_IFMT) | (mode & !S_IFMT),
            Attr::Size(_) => unreachable!("handled above"),
        }
        attrs::write_stat(&self.realfs, &mut self.kv, path, &record)
    }

    /// `fsetattr` on an open handle: resolve its path and delegate.
    pub fn fsetattr(&mut self, handle: &R::Handle, attr: Attr) -> Result<()> {
        let path = self.getpath(handle)?;
        self.setattr(&path, attr)
    }

    /// Create a directory at `path`. The host directory is always created
    /// with mode `0777`; `mode` is recorded only in the attribute record
    /// (`fakefs_mkdir`).
    pub fn mkdir(&mut self, path: &RelativePath, mode: u32, creds: Credentials) -> Result<()> {
        let _guard = self.lock.lock();
        self.realfs.mkdir(&pathindex::to_host_path(path))?;
        let record = StatRecord::new_dir(mode, creds.uid, creds.gid);
        attrs::write_stat(&self.realfs, &mut self.kv, path, &record)?;
        Ok(())
    }

    /// Read a symlink's target. Rejects any path whose recorded type isn't
    /// `S_IFLNK` (spec: readlink on a non-symlink is `EINVAL`). Tries the
    /// real host `readlink(2)` first; only when the host reports `EINVAL`
    /// (it stored the link as a regular file, per our `symlink` emulation)
    /// does this fall back to reading the file's contents as link text,
    /// mirroring `fakefs_readlink`'s fallback to `file_readlink`. Any other
    /// host error is propagated as-is rather than masked by the fallback.
    pub fn readlink(&mut self, path: &RelativePath, bufsize: usize) -> Result<Vec<u8>> {
        let _guard = self.lock.lock();
        let record =
            attrs::read_stat(&self.realfs, &mut self.kv, path)?.ok_or(OverlayError::NotFound)?;
        if !record.is_symlink() {
            return Err(OverlayError::InvalidArgument);
        }
        let host_path = pathindex::to_host_path(path);
        match self.realfs.readlink(&host_path, bufsize) {
            Ok(bytes) => Ok(bytes),
            Err(RealFsError::Io(e)) if e.raw_os_error() == Some(nix::libc::EINVAL) => {
                let handle = self.realfs.open(&host_path, 0)?;
                let mut content = handle.read_to_end()?;
                content.truncate(bufsize);
                Ok(content)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metafs_api::realfs::local::LocalRealFs;
    use metafs_api::store::filestore::FileStore;
    use metafs_api::store::MetadataStore;
    use tempfile::tempdir;

    fn fresh_overlay(data_dir: &std::path::Path, db_path: &std::path::Path) -> OverlayFs<LocalRealFs, FileStore> {
        let realfs = LocalRealFs::open(data_dir).unwrap();
        let store = FileStore::open(db_path).unwrap();
        let fd = store.raw_fd();
        let lock = DbLock::new(fd);
        OverlayFs::new(realfs, KvStore::new(store), lock)
    }

    #[test]
    fn mkdir_then_stat_reports_overlaid_mode() {
        let dir = tempdir().unwrap();
        let data_dir = dir.path().join("data");
        std::fs::create_dir(&data_dir).unwrap();
        let db_path = dir.path().join("meta.db");
        let mut fs = fresh_overlay(&data_dir, &db_path);

        let creds = Credentials { uid: 1000, gid: 1000 };
        let path = RelativePath::new("sub");
        fs.mkdir(path, 0o750, creds).unwrap();

        let st = fs.stat(path, false).unwrap();
        assert_eq!(st.mode & S_IPERM, 0o750);
        assert_eq!(st.uid, 1000);
    }
}
