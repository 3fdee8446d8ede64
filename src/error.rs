// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for SmartParse

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for SmartParse operations
pub type Result<T> = std::result::Result<T, SmartParseError>;

/// SmartParse error types
#[derive(Error, Debug)]
pub enum SmartParseError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("API error: {0}")]
    Api(#[from] reqwest::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Watch directory {path:?} is unreadable: {source}")]
    WatchRootUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file kept changing size for the whole stabilization budget
    #[error("never stabilized after {waited:?}")]
    StabilityTimeout { waited: Duration },

    /// The file disappeared before it could be processed
    #[error("file vanished: {0:?}")]
    Vanished(PathBuf),

    #[error("unsupported type: .{0}")]
    UnsupportedType(String),

    #[error("transient I/O error: {0}")]
    TransientIo(std::io::Error),

    #[error("fatal I/O error: {0}")]
    FatalIo(std::io::Error),

    #[error("external service error: {0}")]
    ExternalService(String),

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("Office document error: {0}")]
    Office(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SmartParseError {
    /// Classify a filesystem error hit while relocating a file.
    ///
    /// Permission, space and read-only errors will not go away by retrying,
    /// and neither will a source file that no longer exists.
    pub fn from_move_error(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let fatal_kind = matches!(
            err.kind(),
            ErrorKind::PermissionDenied | ErrorKind::NotFound
        );
        // ENOSPC, EROFS, EDQUOT
        let fatal_os = cfg!(unix) && matches!(err.raw_os_error(), Some(28) | Some(30) | Some(122));

        if fatal_kind || fatal_os {
            Self::FatalIo(err)
        } else {
            Self::TransientIo(err)
        }
    }

    /// Whether a retry of the same operation might succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientIo(_))
    }
}
