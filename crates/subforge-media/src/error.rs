//! Media-processing error type.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from the media toolkit and segmenter.
#[derive(Debug, Error)]
pub enum MediaError {
    /// The toolkit could not determine the duration of a file.
    #[error("no duration could be determined for {path}")]
    NoDuration {
        /// File whose duration was requested.
        path: PathBuf,
    },

    /// A toolkit invocation failed.
    #[error("{tool} failed: {message}")]
    Toolkit {
        /// Binary that failed (`ffmpeg` / `ffprobe`).
        tool: &'static str,
        /// Captured stderr tail or spawn error.
        message: String,
    },

    /// Filesystem error while handling media files.
    #[error("media i/o error: {0}")]
    Io(#[from] std::io::Error),
}
