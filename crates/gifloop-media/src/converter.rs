//! Driving the ffmpeg binary for probes and conversions

use crate::error::MediaError;
use crate::info::VideoInfo;
use crate::params::ConvertParameters;
use crate::parse;
use gifloop_looper::CancelToken;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::ffi::OsString;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

const TAIL_LINES: usize = 6;

/// Outcome of a conversion that ran to completion or was cancelled
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertResult {
    /// Where the GIF was written
    pub output: PathBuf,
    /// The conversion was stopped before it finished
    pub canceled: bool,
    /// Human-readable summary
    pub message: String,
    /// Wall time spent in the encoder
    pub elapsed: Duration,
}

/// Runs the encoder, one child process at a time.
///
/// The running child lives in a shared slot so [`GifConverter::cancel`] can
/// kill it from another thread while the owning thread is blocked reading
/// the child's output.
pub struct GifConverter {
    program: PathBuf,
    leading_args: Vec<OsString>,
    child: Arc<Mutex<Option<RunningChild>>>,
}

/// A spawned encoder and the token of the work that started it
struct RunningChild {
    process: Child,
    token: CancelToken,
}

impl GifConverter {
    /// Converter that launches `ffmpeg` directly
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self::with_launcher(ffmpeg, Vec::new())
    }

    /// Converter that launches `program leading_args... <encoder args>`
    pub fn with_launcher(program: impl Into<PathBuf>, leading_args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            leading_args,
            child: Arc::new(Mutex::new(None)),
        }
    }

    /// Program this converter launches
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Whether a child process is currently running
    pub fn is_running(&self) -> bool {
        self.child.lock().is_some()
    }

    /// Read duration, frame size, and frame rate of `input`
    pub fn probe(&self, input: &Path, token: &CancelToken) -> Result<VideoInfo, MediaError> {
        if !input.is_file() {
            return Err(MediaError::NotFound(input.to_path_buf()));
        }

        let args = [
            OsString::from("-hide_banner"),
            OsString::from("-i"),
            input.as_os_str().to_owned(),
        ];
        let mut lines = Vec::new();
        // ffmpeg exits non-zero without an output file; only the text matters
        let status = self.run(&args, token, |line| lines.push(line.to_string()))?;
        trace!(%status, lines = lines.len(), "probe finished");

        if token.is_cancelled() {
            return Err(MediaError::Cancelled);
        }
        let info = VideoInfo::from_probe_output(input, &lines)?;
        debug!(path = %input.display(), %info, "probed");
        Ok(info)
    }

    /// Encode the range described by `params`, reporting progress in 0..=1.
    ///
    /// A cancelled conversion returns `Ok` with `canceled` set.
    pub fn convert<F>(
        &self,
        params: &ConvertParameters,
        token: &CancelToken,
        mut on_progress: F,
    ) -> Result<ConvertResult, MediaError>
    where
        F: FnMut(f64),
    {
        let started = Instant::now();
        let output = params.output_path();
        let args = params.ffmpeg_args(&output);
        info!(input = %params.input.display(), output = %output.display(), "converting");

        let mut tail: VecDeque<String> = VecDeque::with_capacity(TAIL_LINES);
        let status = self.run(&args, token, |line| {
            if let Some(stamp) = parse::parse_convert_progress(line) {
                on_progress((stamp.seconds / params.duration).clamp(0.0, 1.0));
            }
            if tail.len() == TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line.to_string());
        })?;
        let elapsed = started.elapsed();

        if token.is_cancelled() {
            info!(output = %output.display(), "conversion cancelled");
            return Ok(ConvertResult {
                output,
                canceled: true,
                message: "Conversion cancelled".to_string(),
                elapsed,
            });
        }
        if !status.success() {
            warn!(%status, "encoder failed");
            return Err(MediaError::EncoderFailed {
                status,
                tail: Vec::from(tail).join("\n"),
            });
        }

        on_progress(1.0);
        Ok(ConvertResult {
            message: format!(
                "Saved {} in {:.1}s",
                output.display(),
                elapsed.as_secs_f64()
            ),
            output,
            canceled: false,
            elapsed,
        })
    }

    /// Kill the running child if the work that started it was cancelled.
    ///
    /// A child owned by work whose token is still live is left alone, so a
    /// late hook from an earlier task cannot stop the next one. Safe to call
    /// repeatedly.
    pub fn cancel(&self) {
        let mut slot = self.child.lock();
        let Some(running) = slot.as_mut() else {
            return;
        };
        if !running.token.is_cancelled() {
            trace!(pid = running.process.id(), "encoder not cancelled; left running");
            return;
        }
        match running.process.kill() {
            Ok(()) => debug!(pid = running.process.id(), "encoder killed"),
            Err(e) => trace!(error = %e, "encoder already gone"),
        }
    }

    fn run<F>(&self, args: &[OsString], token: &CancelToken, on_line: F) -> Result<ExitStatus, MediaError>
    where
        F: FnMut(&str),
    {
        let mut child = Command::new(&self.program)
            .args(&self.leading_args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| MediaError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("encoder stderr was not captured"))?;
        *self.child.lock() = Some(RunningChild {
            process: child,
            token: token.clone(),
        });

        // A cancel that landed before the slot was filled had nothing to kill
        if token.is_cancelled() {
            self.cancel();
        }

        let read = for_each_line(stderr, on_line);
        let child = self.child.lock().take();
        let status = match child {
            Some(mut running) => running.process.wait()?,
            None => return Err(io::Error::other("encoder process slot emptied while running").into()),
        };
        read?;
        Ok(status)
    }
}

impl Drop for GifConverter {
    fn drop(&mut self) {
        if let Some(mut running) = self.child.lock().take() {
            let _ = running.process.kill();
            let _ = running.process.wait();
        }
    }
}

/// Feed `reader` to `on_line` split on both `\n` and `\r`.
///
/// ffmpeg redraws its progress line with carriage returns, so a plain
/// line reader would only see progress once the encoder exits.
fn for_each_line<R: Read>(reader: R, mut on_line: impl FnMut(&str)) -> io::Result<()> {
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        let chunk = reader.fill_buf()?;
        if chunk.is_empty() {
            break;
        }
        let consumed = chunk.len();
        for &byte in chunk {
            if byte == b'\n' || byte == b'\r' {
                if !line.is_empty() {
                    on_line(&String::from_utf8_lossy(&line));
                    line.clear();
                }
            } else {
                line.push(byte);
            }
        }
        reader.consume(consumed);
    }
    if !line.is_empty() {
        on_line(&String::from_utf8_lossy(&line));
    }
    Ok(())
}
