//! A [`RealFs`] backed by a single open directory handle, resolving every
//! guest path against it with dir-relative (`*at`) syscalls so a guest path
//! can never walk outside the mount root — the Rust counterpart of
//! `fix_path` plus `mount->root_fd` in `fake.c`.

use std::fs::File;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use nix::fcntl::{self, OFlag};
use nix::sys::stat::{self, Mode};
use nix::unistd;

use super::{RealFs, RealFsHandle};
use crate::error::{RealFsError, RealFsResult};
use crate::types::HostStat;

fn map_nix(err: nix::Error) -> RealFsError {
    RealFsError::Io(io::Error::from_raw_os_error(err as i32))
}

fn host_stat_from_libc(st: nix::sys::stat::FileStat) -> HostStat {
    HostStat {
        ino: st.st_ino,
        nlink: st.st_nlink as u64,
        size: st.st_size as u64,
        blocks: st.st_blocks as u64,
        atime: st.st_atime,
        mtime: st.st_mtime,
        ctime: st.st_ctime,
    }
}

/// A host directory, opened once at mount time, against which every guest
/// operation resolves its path.
pub struct LocalRealFs {
    root_fd: OwnedFd,
    root_path: PathBuf,
}

impl LocalRealFs {
    /// Open `root_path` as the mount root. Fails if it is not a directory
    /// or cannot be opened.
    pub fn open(root_path: impl Into<PathBuf>) -> RealFsResult<Self> {
        let root_path = root_path.into();
        let fd = fcntl::open(
            &root_path,
            OFlag::O_DIRECTORY | OFlag::O_RDONLY,
            Mode::empty(),
        )
        .map_err(map_nix)?;
        Ok(LocalRealFs {
            root_fd: fd,
            root_path,
        })
    }

    fn root(&self) -> BorrowedFd<'_> {
        self.root_fd.as_fd()
    }
}

impl RealFs for LocalRealFs {
    type Handle = LocalHandle;

    fn open(&self, path: &Path, flags: i32) -> RealFsResult<Self::Handle> {
        let oflag = OFlag::from_bits_truncate(flags);
        let mode = Mode::from_bits_truncate(0o666);
        let fd = fcntl::openat(self.root(), path, oflag, mode).map_err(map_nix)?;
        let file = unsafe { File::from_raw_fd(fd.as_raw_fd()) };
        // fd's ownership has moved into `file`; forget the OwnedFd wrapper
        // without closing the descriptor twice.
        std::mem::forget(fd);
        Ok(LocalHandle {
            file,
            root_path: self.root_path.clone(),
        })
    }

    fn link(&self, src: &Path, dst: &Path) -> RealFsResult<()> {
        unistd::linkat(
            self.root(),
            src,
            self.root(),
            dst,
            unistd::AtFlags::empty(),
        )
        .map_err(map_nix)
    }

    fn unlink(&self, path: &Path) -> RealFsResult<()> {
        unistd::unlinkat(self.root(), path, unistd::UnlinkatFlags::NoRemoveDir).map_err(map_nix)
    }

    fn rmdir(&self, path: &Path) -> RealFsResult<()> {
        unistd::unlinkat(self.root(), path, unistd::UnlinkatFlags::RemoveDir).map_err(map_nix)
    }

    fn rename(&self, src: &Path, dst: &Path) -> RealFsResult<()> {
        unistd::renameat(self.root(), src, self.root(), dst).map_err(map_nix)
    }

    fn mkdir(&self, path: &Path) -> RealFsResult<()> {
        unistd::mkdirat(self.root(), path, Mode::from_bits_truncate(0o777)).map_err(map_nix)
    }

    fn stat(&self, path: &Path, follow_links: bool) -> RealFsResult<HostStat> {
        let flags = if follow_links {
            stat::AtFlags::empty()
        } else {
            stat::AtFlags::AT_SYMLINK_NOFOLLOW
        };
        let st = stat::fstatat(self.root(), path, flags).map_err(map_nix)?;
        Ok(host_stat_from_libc(st))
    }

    fn readlink(&self, path: &Path, bufsize: usize) -> RealFsResult<Vec<u8>> {
        let target = fcntl::readlinkat(self.root(), path).map_err(map_nix)?;
        let mut bytes = target.as_os_str().as_bytes().to_vec();
        bytes.truncate(bufsize);
        Ok(bytes)
    }

    fn sync(&self) -> RealFsResult<()> {
        unistd::fsync(self.root_fd.as_raw_fd()).map_err(map_nix)
    }
}

/// An open host file handle, relative to the [`LocalRealFs`] root it was
/// opened from.
pub struct LocalHandle {
    file: File,
    root_path: PathBuf,
}

impl LocalHandle {
    /// The raw fd, for callers (the overlay's `lock` module) that need to
    /// pass it to a flock.
    pub fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl RealFsHandle for LocalHandle {
    fn getpath(&self) -> RealFsResult<PathBuf> {
        // The only portable way to recover a path from a bare fd on Linux:
        // resolve the magic symlink under /proc/self/fd. Same approach
        // `fakefs_fstat`'s comment calls "truly sad, but there is no
        // alternative".
        let proc_path = format!("/proc/self/fd/{}", self.file.as_raw_fd());
        let resolved = std::fs::read_link(&proc_path).map_err(RealFsError::Io)?;
        resolved
            .strip_prefix(&self.root_path)
            .map(|p| p.to_path_buf())
            .map_err(|_| {
                RealFsError::InvalidPath(format!(
                    "resolved path {} is outside mount root {}",
                    resolved.display(),
                    self.root_path.display()
                ))
            })
    }

    fn fstat(&self) -> RealFsResult<HostStat> {
        let st = stat::fstat(self.file.as_raw_fd()).map_err(map_nix)?;
        Ok(host_stat_from_libc(st))
    }

    fn set_len(&self, len: u64) -> RealFsResult<()> {
        self.file.set_len(len).map_err(RealFsError::Io)
    }

    fn write_all(&self, data: &[u8]) -> RealFsResult<()> {
        use std::io::Write;
        (&self.file).write_all(data).map_err(RealFsError::Io)
    }

    fn read_to_end(&self) -> RealFsResult<Vec<u8>> {
        use std::io::{Read, Seek};
        let mut file = &self.file;
        file.seek(io::SeekFrom::Start(0)).map_err(RealFsError::Io)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).map_err(RealFsError::Io)?;
        Ok(buf)
    }
}
