//! The single advisory exclusive lock serializing all namespace mutations
//! (spec §5), implemented over the store's raw fd with `fs2` instead of a
//! raw `flock(2)` call — the direct counterpart of `lock_db`/`unlock_db` in
//! `fake.c`, retried on `EINTR` and fatal on any other failure.

use std::fs::File;
use std::io;
use std::mem::ManuallyDrop;
use std::os::fd::{FromRawFd, RawFd};

use fs2::FileExt;
use log::error;

/// An exclusive lock over the metadata store's backing file descriptor.
/// Does not own the fd — it borrows it for the lifetime of the mount, the
/// same way `gdbm_fdesc` hands `fake.c` a borrowed fd to flock.
pub struct DbLock {
    file: ManuallyDrop<File>,
}

impl DbLock {
    /// Wrap a borrowed fd. The caller (here, [`crate::mount::MountContext`])
    /// remains responsible for the fd's lifetime; `DbLock` never closes it.
    pub fn new(fd: RawFd) -> Self {
        let file = unsafe { File::from_raw_fd(fd) };
        DbLock {
            file: ManuallyDrop::new(file),
        }
    }

    /// Acquire the lock, retrying on `EINTR` exactly as `lock_db` does. Any
    /// other failure is unexpected and, per spec §5, fatal.
    pub fn lock(&self) -> DbLockGuard<'_> {
        loop {
            match self.file.lock_exclusive() {
                Ok(()) => return DbLockGuard { lock: self },
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("could not lock database: {e}");
                    std::process::abort();
                }
            }
        }
    }
}

/// RAII guard releasing the database lock on drop, replacing `fake.c`'s
/// manually paired `lock_db`/`unlock_db` calls with Rust's scoping.
pub struct DbLockGuard<'a> {
    lock: &'a DbLock,
}

impl Drop for DbLockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.lock.file.unlock() {
            error!("could not unlock database: {e}");
            std::process::abort();
        }
    }
}
