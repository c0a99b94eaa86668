use std::io;

use thiserror::Error;

/// Failure kinds shared by the tracker, the seeder and the leecher.
///
/// The `Display` output of each variant is exactly the user-facing message
/// that ends up behind an `Error: ` response prefix.
#[derive(Debug, Error)]
pub enum ShareError {
    /// Malformed command, wrong argument count, bad format.
    #[error("{0}")]
    Input(String),

    /// Missing/expired/invalid token, non-owner or non-participant operation.
    #[error("{0}")]
    Auth(String),

    /// Duplicate user or group, already logged in, no such file, and friends.
    #[error("{0}")]
    Conflict(String),

    /// Piece or whole-file hash mismatch, unobtainable pieces.
    #[error("{0}")]
    Integrity(String),

    /// An error reported by the remote side of a connection.
    #[error("{0}")]
    Remote(String),

    #[error("{0}")]
    Io(#[from] io::Error),
}

pub type ShareResult<T> = Result<T, ShareError>;

impl ShareError {
    pub fn input(msg: impl Into<String>) -> Self {
        ShareError::Input(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        ShareError::Auth(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        ShareError::Conflict(msg.into())
    }

    pub fn integrity(msg: impl Into<String>) -> Self {
        ShareError::Integrity(msg.into())
    }
}
