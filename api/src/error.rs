//! Error types for the two external collaborators.
//!
//! Mirrors the layering in the teacher's `error_given::APIError`: one
//! `thiserror`-derived enum per collaborator, each transparently wrapping
//! the lower-level errors it can produce.

use std::io;
use thiserror::Error;

/// Errors a [`crate::realfs::RealFs`] implementation can report.
#[derive(Error, Debug)]
pub enum RealFsError {
    /// The underlying host syscall failed; the wrapped [`io::Error`]
    /// carries the `errno` via [`io::Error::raw_os_error`].
    #[error("real filesystem I/O error: {0}")]
    Io(#[from] io::Error),

    /// A guest path escaped the mount root or could not be resolved to a
    /// host path (e.g. a dangling `/proc/self/fd` entry).
    #[error("path resolution failed: {0}")]
    InvalidPath(String),

    /// Catch-all for host-driver-internal conditions that don't map onto
    /// `io::Error`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors a [`crate::store::MetadataStore`] implementation can report.
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O error against the backing file.
    #[error("metadata store I/O error: {0}")]
    Io(#[from] io::Error),

    /// A stored record could not be decoded; the store is corrupt and the
    /// caller should attempt recovery before proceeding.
    #[error("metadata store record corrupt: {0}")]
    Corrupt(#[from] bincode::Error),

    /// The store's on-disk state is damaged badly enough that recovery is
    /// required before any further read or write is permitted.
    #[error("metadata store requires recovery: {0}")]
    NeedsRecovery(String),

    /// Catch-all for conditions specific to a given store implementation.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenience alias, following the teacher's `pub type Result<T> = ...`
/// pattern in `error_given.rs`.
pub type RealFsResult<T> = std::result::Result<T, RealFsError>;

/// Convenience alias for [`StoreError`].
pub type StoreResult<T> = std::result::Result<T, StoreError>;
