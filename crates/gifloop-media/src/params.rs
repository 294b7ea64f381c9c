//! Conversion parameters and the encoder command line built from them

use crate::error::MediaError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Longest range a single conversion may cover, in seconds
pub const DEFAULT_MAX_SPAN: f64 = 30.0;

/// Shortest range worth converting, in seconds
pub const MIN_SPAN: f64 = 1.0;

/// Input extensions offered for conversion
pub const SUPPORTED_VIDEO_FORMATS: &[&str] = &[
    "3gp", "avi", "flv", "m4v", "mkv", "mov", "mp4", "mpeg", "mpg", "ts", "webm", "wmv",
];

/// Whether `path` has an extension listed in [`SUPPORTED_VIDEO_FORMATS`]
pub fn is_supported_video(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_VIDEO_FORMATS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Everything needed to turn one range of a video into a GIF
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertParameters {
    /// Source video
    pub input: PathBuf,
    /// Output frames per second
    pub frame_rate: f64,
    /// Output size relative to the input, in (0, 1]
    pub scale: f64,
    /// Range start in seconds
    pub start: f64,
    /// Range length in seconds
    pub duration: f64,
    /// Play the range backwards
    pub reverse: bool,
    /// Text stamped in the lower left corner
    pub logo: Option<String>,
}

impl ConvertParameters {
    /// Parameters for `input` with the usual defaults
    pub fn new(input: impl Into<PathBuf>, start: f64, duration: f64) -> Self {
        Self {
            input: input.into(),
            frame_rate: 10.0,
            scale: 0.5,
            start,
            duration,
            reverse: false,
            logo: None,
        }
    }

    /// Check the parameters against the filesystem and the allowed span
    pub fn validate(&self, max_span: f64) -> Result<(), MediaError> {
        if !self.input.is_file() {
            return Err(MediaError::NotFound(self.input.clone()));
        }
        if !self.start.is_finite() || self.start < 0.0 {
            return Err(MediaError::InvalidParameters(format!(
                "start must be a non-negative number of seconds, got {}",
                self.start
            )));
        }
        if !self.duration.is_finite() || self.duration < MIN_SPAN {
            return Err(MediaError::SpanTooShort {
                span: self.duration,
            });
        }
        if self.duration > max_span {
            return Err(MediaError::SpanTooLong {
                span: self.duration,
                max: max_span,
            });
        }
        if !self.frame_rate.is_finite() || self.frame_rate <= 0.0 {
            return Err(MediaError::InvalidParameters(format!(
                "frame rate must be positive, got {}",
                self.frame_rate
            )));
        }
        if !(self.scale > 0.0 && self.scale <= 1.0) {
            return Err(MediaError::InvalidParameters(format!(
                "scale must be in (0, 1], got {}",
                self.scale
            )));
        }
        Ok(())
    }

    /// `<dir>/<stem>.gif` next to the input
    pub fn output_path(&self) -> PathBuf {
        self.input.with_extension("gif")
    }

    /// Video filter chain for the encoder
    pub fn filter_graph(&self) -> String {
        let mut filters = vec![
            format!("fps={}", self.frame_rate),
            format!("scale=iw*{}:-1:flags=lanczos", self.scale),
        ];
        if self.reverse {
            filters.push("reverse".to_string());
        }
        if let Some(logo) = &self.logo {
            filters.push(format!(
                "drawtext=text='{}':x=10:y=h-th-10:fontsize=16:fontcolor=white",
                escape_drawtext(logo)
            ));
        }
        filters.join(",")
    }

    /// Arguments for one encoder run writing to `output`
    pub fn ffmpeg_args(&self, output: &Path) -> Vec<OsString> {
        vec![
            "-hide_banner".into(),
            "-ss".into(),
            format!("{:.3}", self.start).into(),
            "-t".into(),
            format!("{:.3}", self.duration).into(),
            "-i".into(),
            self.input.clone().into_os_string(),
            "-vf".into(),
            self.filter_graph().into(),
            "-f".into(),
            "gif".into(),
            "-y".into(),
            output.as_os_str().to_owned(),
        ]
    }
}

fn escape_drawtext(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '\'' | ':' | '%') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
