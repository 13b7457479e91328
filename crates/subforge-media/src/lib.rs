//! # subforge-media
//!
//! The media-processing boundary of subforge:
//!
//! - [`MediaToolkit`]: trait over the external audio toolkit (duration
//!   probe, audio extraction, clip extraction), with an ffmpeg-backed
//!   production implementation
//! - [`Segmenter`]: splits an audio extract into time-bounded clips whose
//!   encoded size fits the transcription provider's payload ceiling,
//!   recursively re-splitting oversized clips

#![deny(unsafe_code)]

pub mod error;
pub mod segmenter;
pub mod toolkit;

pub use error::MediaError;
pub use segmenter::{AudioSegment, Segmenter, SegmenterConfig};
pub use toolkit::{FfmpegToolkit, MediaToolkit};
