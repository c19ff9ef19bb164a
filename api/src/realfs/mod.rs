//! The real-filesystem collaborator interface: the host operations the
//! overlay performs underneath every guest call, before or after its own
//! metadata bookkeeping (Rule O1, spec §4.2).
//!
//! `fake.c` calls into an unimplemented `realfs` struct of function
//! pointers; this trait is that struct's Rust counterpart, and
//! [`local::LocalRealFs`] is the concrete implementation shipped against it.

pub mod local;

use crate::error::RealFsResult;
use crate::types::HostStat;
use std::path::Path;

/// A single open host file handle, abstract over how `RealFs` represents
/// one (`LocalRealFs` backs it with a `std::fs::File`).
pub trait RealFsHandle {
    /// Resolve this handle back to the guest-relative path it was opened
    /// under, the "truly sad, but there is no alternative" fallback
    /// `fakefs_fstat` performs through `/proc/self/fd` to learn a path from
    /// an fd alone.
    fn getpath(&self) -> RealFsResult<std::path::PathBuf>;

    /// `fstat` the open handle.
    fn fstat(&self) -> RealFsResult<HostStat>;

    /// Truncate the open handle to `len` bytes (`fakefs_fsetattr`'s
    /// `AT_SIZE` branch).
    fn set_len(&self, len: u64) -> RealFsResult<()>;

    /// Write `data` to the open handle (used by `symlink`'s regular-file
    /// emulation to store the link target as file content).
    fn write_all(&self, data: &[u8]) -> RealFsResult<()>;

    /// Read the whole content of the open handle (used by `readlink`'s
    /// fallback when the host cannot represent the link as a real
    /// symlink).
    fn read_to_end(&self) -> RealFsResult<Vec<u8>>;
}

/// The external real-filesystem driver the overlay layers metadata on top
/// of. Every path here is guest-relative (relative to the mount root); an
/// implementation is responsible for resolving it safely against that root
/// without letting it escape (the role `fix_path` + `mount->root_fd` play in
/// `fake.c`).
pub trait RealFs {
    /// The open-handle type this implementation hands back from `open`.
    type Handle: RealFsHandle;

    /// Open (optionally creating) `path`. The host mode passed to the
    /// underlying `open`/`creat` call is always `0666` regardless of the
    /// guest's requested mode (spec §4.5 `open`) — callers pass `flags`
    /// only for `O_CREAT`/`O_EXCL`/`O_TRUNC`-style semantics, never a mode.
    fn open(&self, path: &Path, flags: i32) -> RealFsResult<Self::Handle>;

    /// Hardlink `src` to `dst`.
    fn link(&self, src: &Path, dst: &Path) -> RealFsResult<()>;

    /// Unlink `path`.
    fn unlink(&self, path: &Path) -> RealFsResult<()>;

    /// Remove the empty directory at `path`.
    fn rmdir(&self, path: &Path) -> RealFsResult<()>;

    /// Rename `src` to `dst`, replacing `dst` if it exists.
    fn rename(&self, src: &Path, dst: &Path) -> RealFsResult<()>;

    /// Create a directory at `path` with host mode `0777` (spec §4.5
    /// `mkdir`: host mode is fixed, the guest's requested mode is recorded
    /// only in the attribute record).
    fn mkdir(&self, path: &Path) -> RealFsResult<()>;

    /// `stat` (or `lstat` when `follow_links` is false) `path`.
    fn stat(&self, path: &Path, follow_links: bool) -> RealFsResult<HostStat>;

    /// Read up to `bufsize` bytes of the real, host-level symlink target,
    /// if `path` is actually a host symlink. The dual-path readlink
    /// fallback (regular-file-holding-link-text) lives in the overlay's
    /// `vfs` module, not here — this is strictly the host `readlink(2)`.
    fn readlink(&self, path: &Path, bufsize: usize) -> RealFsResult<Vec<u8>>;

    /// Flush any real-filesystem-level state before the mount is torn down
    /// (spec §9 Open Question: does `umount` call through). `LocalRealFs`
    /// implements this as an `fsync` of the root directory handle.
    fn sync(&self) -> RealFsResult<()>;
}
