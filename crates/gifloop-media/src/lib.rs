//! Gifloop Media
//!
//! Probing videos and converting ranges of them to GIFs by driving the
//! `ffmpeg` binary. Both operations block the calling thread and honour a
//! [`gifloop_looper::CancelToken`], so they are meant to run as looper task
//! bodies with [`GifConverter::cancel`] wired up as the cancel hook.

#![warn(missing_docs)]

pub mod converter;
pub mod error;
pub mod info;
pub mod params;
pub mod parse;

pub use converter::{ConvertResult, GifConverter};
pub use error::MediaError;
pub use info::VideoInfo;
pub use params::{
    is_supported_video, ConvertParameters, DEFAULT_MAX_SPAN, MIN_SPAN, SUPPORTED_VIDEO_FORMATS,
};
pub use parse::Timestamp;
