// Unified result code shared by every filesystem backend.
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VfsError {
    /// Missing file, missing directory, or an unknown volume prefix.
    #[error("no such file or directory")]
    NotFound,

    #[error("file or directory already exists")]
    AlreadyExists,

    #[error("directory is not empty")]
    NotEmpty,

    #[error("not a directory")]
    NotADirectory,

    #[error("is a directory")]
    IsADirectory,

    #[error("stale or invalid handle")]
    InvalidHandle,

    #[error("no space left on volume")]
    NoSpace,
}

pub type VfsResult<T> = Result<T, VfsError>;
