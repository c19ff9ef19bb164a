//! Overlay-level errors, and the mapping back to guest errno values spec
//! §6/§7 requires (`_ENOENT`, `_EINVAL`) — the "externally provided
//! `errno_map`" the spec assumes exists.

use metafs_api::error::{RealFsError, StoreError};
use thiserror::Error;

/// Guest-facing negative errno for "no such file or directory".
pub const ENOENT: i32 = -2;
/// Guest-facing negative errno for "invalid argument".
pub const EINVAL: i32 = -22;
/// Guest-facing negative errno for an opaque I/O failure with no more
/// specific mapping.
pub const EIO: i32 = -5;

/// Errors the overlay protocol can raise. Every variant is either an
/// expected guest-visible condition (no database mutation occurred) or a
/// collaborator error that has already been retried/recovered as far as
/// possible — anything beyond that aborts the process per spec §7 rather
/// than reaching this type.
#[derive(Error, Debug)]
pub enum OverlayError {
    /// No attribute record exists for the requested path (spec invariant
    /// I1 says this should not happen for a live guest path, but a racing
    /// unlink or a lookup before creation both surface it as ENOENT).
    #[error("no such file or directory")]
    NotFound,

    /// The guest asked for an operation that doesn't apply to the object's
    /// recorded type (e.g. `readlink` on a non-symlink).
    #[error("invalid argument")]
    InvalidArgument,

    /// A path could not be represented as a guest-relative path (escaped
    /// the mount root, or wasn't valid UTF-8/relative-path syntax).
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The underlying real filesystem reported an error.
    #[error(transparent)]
    RealFs(#[from] RealFsError),

    /// The underlying metadata store reported an error that survived
    /// retry/recovery (a `NeedsRecovery` bounce after `recover()` itself
    /// failed always aborts rather than reaching this variant).
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl OverlayError {
    /// Map to the negative-errno convention spec §6 describes.
    pub fn to_errno(&self) -> i32 {
        match self {
            OverlayError::NotFound => ENOENT,
            OverlayError::InvalidArgument => EINVAL,
            OverlayError::InvalidPath(_) => EINVAL,
            OverlayError::RealFs(RealFsError::Io(e)) => {
                e.raw_os_error().map(|c| -c).unwrap_or(EIO)
            }
            OverlayError::RealFs(_) => EIO,
            OverlayError::Store(_) => EIO,
        }
    }
}

/// Convenience alias, matching the teacher's `pub type Result<T> = ...`
/// pattern.
pub type Result<T> = std::result::Result<T, OverlayError>;
