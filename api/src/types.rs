//! Shared data types: the fixed-width stat record, mode-bit constants, and
//! the ambient credential/host-stat types threaded through every
//! collaborator call.
//!
//! `StatRecord`'s four `u32` fields encode under `bincode`'s default
//! (fixed-width, little-endian) integer representation to exactly 16 bytes,
//! the record size the overlay's key-value entries are built around — the
//! same "encode a fixed struct with bincode, know its size at compile time"
//! idiom the teacher's `types::Block` uses, without needing `lazy_static` to
//! compute it since there's no variable-length field here.

use bit_field::BitField;
use serde::{Deserialize, Serialize};

/// File-type bits, matching POSIX `S_IFMT` and friends.
pub const S_IFMT: u32 = 0o170000;
/// Regular file type bit.
pub const S_IFREG: u32 = 0o100000;
/// Directory type bit.
pub const S_IFDIR: u32 = 0o040000;
/// Symbolic link type bit — stored in [`StatRecord::mode`] even though the
/// backing host object is always a regular file (§1, §4.5 `symlink`).
pub const S_IFLNK: u32 = 0o120000;
/// Character device type bit.
pub const S_IFCHR: u32 = 0o020000;
/// Block device type bit.
pub const S_IFBLK: u32 = 0o060000;
/// FIFO type bit.
pub const S_IFIFO: u32 = 0o010000;
/// Socket type bit.
pub const S_IFSOCK: u32 = 0o140000;

/// Permission bits mask (everything below the type bits).
pub const S_IPERM: u32 = 0o007777;

/// Size in bytes of [`StatRecord`]'s on-disk encoding. Four `u32` fields
/// under bincode's fixed-width integer encoding.
pub const STAT_RECORD_SIZE: usize = 16;

/// The attribute record the overlay keeps per inode: the fields a real host
/// stat cannot represent faithfully for a guest (spec §3 "Attribute
/// Record"). Field order is part of the on-disk format — do not reorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatRecord {
    /// Full mode: type bits (`S_IFREG`/`S_IFDIR`/`S_IFLNK`/...) plus
    /// permission bits, authoritative over whatever the host reports.
    pub mode: u32,
    /// Guest-visible owning user id.
    pub uid: u32,
    /// Guest-visible owning group id.
    pub gid: u32,
    /// Device number, meaningful only when `mode`'s type bits are
    /// `S_IFCHR`/`S_IFBLK`.
    pub rdev: u32,
}

impl StatRecord {
    /// A record for a freshly created regular file: `S_IFREG | 0644`, owned
    /// by `uid`/`gid`, no device number. Mirrors the `ishstat` literal built
    /// in `fakefs_open`'s `O_CREAT` branch.
    pub fn new_regular(uid: u32, gid: u32) -> Self {
        StatRecord {
            mode: S_IFREG | 0o644,
            uid,
            gid,
            rdev: 0,
        }
    }

    /// A record for a freshly created directory: `S_IFDIR | mode`, as built
    /// in `fakefs_mkdir`.
    pub fn new_dir(mode: u32, uid: u32, gid: u32) -> Self {
        StatRecord {
            mode: (mode & S_IPERM) | S_IFDIR,
            uid,
            gid,
            rdev: 0,
        }
    }

    /// A record for a freshly created symlink: `S_IFLNK | 0777`, symlinks
    /// always report full permissions (`fakefs_symlink`'s comment).
    pub fn new_symlink(uid: u32, gid: u32) -> Self {
        StatRecord {
            mode: S_IFLNK | 0o777,
            uid,
            gid,
            rdev: 0,
        }
    }

    /// The `S_IFMT` type bits of `mode`.
    pub fn file_type(&self) -> u32 {
        self.mode & S_IFMT
    }

    /// True if the type bits mark this record as a symlink.
    pub fn is_symlink(&self) -> bool {
        self.file_type() == S_IFLNK
    }

    /// True if the type bits mark this record as a directory.
    pub fn is_dir(&self) -> bool {
        self.file_type() == S_IFDIR
    }

    /// Replace the permission bits (low 12 bits) while preserving the type
    /// bits, the "preserve type, replace permissions" rule `fakefs_setattr`
    /// applies when the guest calls `chmod`.
    pub fn with_permissions(mut self, perm_bits: u32) -> Self {
        self.mode = self.file_type() | (perm_bits & S_IPERM);
        self
    }

    /// Encode to the fixed 16-byte on-disk representation.
    pub fn to_bytes(&self) -> [u8; STAT_RECORD_SIZE] {
        let mut buf = [0u8; STAT_RECORD_SIZE];
        let encoded = bincode::serialize(self).expect("StatRecord is always encodable");
        buf.copy_from_slice(&encoded);
        buf
    }

    /// Decode from the fixed 16-byte on-disk representation.
    pub fn from_bytes(bytes: &[u8]) -> bincode::Result<Self> {
        bincode::deserialize(bytes)
    }
}

/// A bit-level view over a raw mode word, used where the overlay needs to
/// test or mask individual bits rather than whole nibbles (e.g. checking a
/// single permission bit during `setattr` bookkeeping).
pub fn mode_bit(mode: u32, bit: usize) -> bool {
    mode.get_bit(bit)
}

/// The calling guest process's credentials, threaded explicitly through
/// every VFS call instead of read from ambient/thread-local state (spec §9
/// design note: "the overlay never reads ambient process state directly").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credentials {
    /// Calling user id.
    pub uid: u32,
    /// Calling group id.
    pub gid: u32,
}

/// The subset of a real host `stat(2)` result the overlay consumes, before
/// its own [`StatRecord`] fields are overlaid on top (`fakefs_stat`/
/// `fakefs_fstat`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostStat {
    /// Host inode number; the overlay's index key.
    pub ino: u64,
    /// Host link count.
    pub nlink: u64,
    /// File size in bytes.
    pub size: u64,
    /// Allocated block count, for `blocks` in a guest-facing stat.
    pub blocks: u64,
    /// Last access time, seconds since epoch.
    pub atime: i64,
    /// Last modification time, seconds since epoch.
    pub mtime: i64,
    /// Last status-change time, seconds since epoch.
    pub ctime: i64,
}

/// What a guest-facing `stat()`/`fstat()` call returns: the host's
/// size/time/link fields with the overlay's mode/uid/gid/rdev overlaid on
/// top, per §4.5 `stat`/`fstat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuestStat {
    /// Host-reported fields (ino, nlink, size, times).
    pub host: HostStat,
    /// Overlay-authoritative mode.
    pub mode: u32,
    /// Overlay-authoritative uid.
    pub uid: u32,
    /// Overlay-authoritative gid.
    pub gid: u32,
    /// Overlay-authoritative device number.
    pub rdev: u32,
}

impl GuestStat {
    /// Build a [`GuestStat`] by overlaying a [`StatRecord`] onto a
    /// [`HostStat`], the exact composition `fakefs_stat` performs.
    pub fn from_host_and_record(host: HostStat, record: StatRecord) -> Self {
        GuestStat {
            host,
            mode: record.mode,
            uid: record.uid,
            gid: record.gid,
            rdev: record.rdev,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stat_record_roundtrips_through_fixed_bytes() {
        let rec = StatRecord::new_regular(1000, 1000);
        let bytes = rec.to_bytes();
        assert_eq!(bytes.len(), STAT_RECORD_SIZE);
        let back = StatRecord::from_bytes(&bytes).unwrap();
        assert_eq!(rec, back);
    }

    #[test]
    fn with_permissions_preserves_type_bits() {
        let rec = StatRecord::new_dir(0o755, 0, 0).with_permissions(0o700);
        assert!(rec.is_dir());
        assert_eq!(rec.mode & S_IPERM, 0o700);
    }

    #[test]
    fn symlink_record_has_full_permissions() {
        let rec = StatRecord::new_symlink(0, 0);
        assert!(rec.is_symlink());
        assert_eq!(rec.mode & S_IPERM, 0o777);
    }
}
