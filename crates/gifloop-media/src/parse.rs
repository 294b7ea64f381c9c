//! Extraction of media facts from ffmpeg's human-readable output
//!
//! Probe output (`ffmpeg -i file`) is scanned line by line, each line split
//! on commas, and the first matching token wins. Conversion progress lines
//! are split on spaces.

use regex::{Captures, Regex};
use std::sync::LazyLock;

static DURATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)Duration: (?P<clock>(?P<hour>\d{2}):(?P<minute>\d{2}):(?P<second>\d{2})\.(?P<fraction>\d+))",
    )
    .expect("valid duration pattern")
});

static VIDEO_SIZE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?P<width>\d{2,4})x(?P<height>\d{2,4})").expect("valid size pattern")
});

static FRAME_RATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?P<rate>[0-9.]+) fps").expect("valid frame rate pattern")
});

static PROGRESS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^time=(?P<clock>(?P<hour>\d{2}):(?P<minute>\d{2}):(?P<second>\d{2})\.(?P<fraction>\d{2}))$",
    )
    .expect("valid progress pattern")
});

static SPEED_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)speed=\s*(?P<speed>[0-9]+(?:\.[0-9]+)?)x").expect("valid speed pattern")
});

/// A clock position reported by ffmpeg
#[derive(Debug, Clone, PartialEq)]
pub struct Timestamp {
    /// The clock text as printed, e.g. `00:01:02.50`
    pub text: String,
    /// The same position in seconds
    pub seconds: f64,
}

fn first_token_match<'a, I, T, F>(lines: I, mut extract: F) -> Option<T>
where
    I: IntoIterator<Item = &'a str>,
    F: FnMut(&'a str) -> Option<T>,
{
    lines
        .into_iter()
        .flat_map(|line| line.split(','))
        .find_map(|token| extract(token))
}

fn clock(caps: &Captures<'_>) -> Option<Timestamp> {
    let hour: u32 = caps.name("hour")?.as_str().parse().ok()?;
    let minute: u32 = caps.name("minute")?.as_str().parse().ok()?;
    let second: u32 = caps.name("second")?.as_str().parse().ok()?;
    let fraction = caps.name("fraction")?.as_str();
    let fraction = format!("0.{}", fraction).parse::<f64>().ok()?;

    Some(Timestamp {
        text: caps.name("clock")?.as_str().to_string(),
        seconds: f64::from(hour * 3600 + minute * 60 + second) + fraction,
    })
}

/// Frame size (`width`, `height`) from probe output
pub fn parse_video_size<'a>(lines: impl IntoIterator<Item = &'a str>) -> Option<(u32, u32)> {
    first_token_match(lines, |token| {
        let caps = VIDEO_SIZE_PATTERN.captures(token)?;
        let width = caps.name("width")?.as_str().parse().ok()?;
        let height = caps.name("height")?.as_str().parse().ok()?;
        Some((width, height))
    })
}

/// Frame rate from probe output
pub fn parse_frame_rate<'a>(lines: impl IntoIterator<Item = &'a str>) -> Option<f64> {
    first_token_match(lines, |token| {
        FRAME_RATE_PATTERN
            .captures(token)?
            .name("rate")?
            .as_str()
            .parse()
            .ok()
    })
}

/// Container duration in seconds from probe output
pub fn parse_duration<'a>(lines: impl IntoIterator<Item = &'a str>) -> Option<f64> {
    parse_duration_timestamp(lines).map(|stamp| stamp.seconds)
}

/// Container duration as printed (`HH:MM:SS.ff`) from probe output
pub fn parse_duration_description<'a>(lines: impl IntoIterator<Item = &'a str>) -> Option<String> {
    parse_duration_timestamp(lines).map(|stamp| stamp.text)
}

fn parse_duration_timestamp<'a>(lines: impl IntoIterator<Item = &'a str>) -> Option<Timestamp> {
    first_token_match(lines, |token| clock(&DURATION_PATTERN.captures(token)?))
}

/// Encoded position from one conversion progress line
pub fn parse_convert_progress(line: &str) -> Option<Timestamp> {
    line.split(' ')
        .find_map(|token| clock(&PROGRESS_PATTERN.captures(token)?))
}

/// Encoding speed (multiple of real time) from one conversion progress line
pub fn parse_convert_speed(line: &str) -> Option<f64> {
    SPEED_PATTERN
        .captures(line)?
        .name("speed")?
        .as_str()
        .parse()
        .ok()
}
