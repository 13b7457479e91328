//! # subforge-core
//!
//! Foundation types shared by every subforge crate:
//!
//! - **Branded IDs**: [`JobId`] and [`ClientKey`] newtypes
//! - **Subtitles**: the [`Subtitle`] record plus stitching/reindexing helpers
//! - **Timecodes**: formatting and parsing of `HH:MM:SS,mmm` timestamps
//! - **Caption rendering**: pure SRT / WebVTT document builders
//! - **Retry math**: exponential backoff with jitter

#![deny(unsafe_code)]

pub mod caption;
pub mod ids;
pub mod retry;
pub mod subtitle;
pub mod timecode;

pub use caption::CaptionFormat;
pub use ids::{ClientKey, JobId};
pub use subtitle::Subtitle;
