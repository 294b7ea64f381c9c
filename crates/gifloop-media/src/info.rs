//! Probed video facts

use crate::error::MediaError;
use crate::parse;
use std::fmt;
use std::path::{Path, PathBuf};

/// What a probe learned about an input video
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    /// Probed file
    pub path: PathBuf,
    /// Duration in seconds
    pub duration: f64,
    /// Duration as the encoder printed it
    pub duration_text: String,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frames per second, when reported
    pub frame_rate: Option<f64>,
}

impl VideoInfo {
    /// Build from the stderr lines of `ffmpeg -i <path>`
    pub fn from_probe_output<S: AsRef<str>>(path: &Path, lines: &[S]) -> Result<Self, MediaError> {
        let text = || lines.iter().map(|line| line.as_ref());

        let (duration, duration_text) = match (
            parse::parse_duration(text()),
            parse::parse_duration_description(text()),
        ) {
            (Some(duration), Some(description)) => (duration, description),
            _ => return Err(MediaError::Probe(last_line_or(lines, "no duration reported"))),
        };
        let (width, height) = parse::parse_video_size(text())
            .ok_or_else(|| MediaError::Probe(last_line_or(lines, "no video stream reported")))?;

        Ok(Self {
            path: path.to_path_buf(),
            duration,
            duration_text,
            width,
            height,
            frame_rate: parse::parse_frame_rate(text()),
        })
    }
}

fn last_line_or<S: AsRef<str>>(lines: &[S], fallback: &str) -> String {
    lines
        .iter()
        .rev()
        .map(|line| line.as_ref().trim())
        .find(|line| !line.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

impl fmt::Display for VideoInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)?;
        if let Some(rate) = self.frame_rate {
            write!(f, ", {} fps", rate)?;
        }
        write!(f, ", {}", self.duration_text)
    }
}
