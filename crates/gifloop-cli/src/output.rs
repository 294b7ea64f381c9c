//! What the front thread shows the user.
//!
//! Commands describe changes as [`Event`]s; a [`Console`] renders them.
//! The terminal console uses `termcolor` and respects `NO_COLOR`.

use gifloop_media::VideoInfo;
use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Something the user should see
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A probe finished
    Info(VideoInfo),
    /// A conversion started
    Converting,
    /// Conversion progress in 0..=1
    Progress(f64),
    /// A message that stays until hidden
    Notice(String),
    /// The current notice went away
    NoticeHidden,
    /// Plain status text
    Status(String),
    /// Something went wrong
    Error(String),
}

/// Renders events; called on the front thread only
pub trait Console: Send + Sync {
    fn show(&self, event: Event);
}

/// Resolve `ColorChoice` from the environment
pub fn resolve_color_choice() -> ColorChoice {
    if std::env::var_os("NO_COLOR").is_some() {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    }
}

/// Console writing to stdout/stderr
pub struct TerminalConsole {
    choice: ColorChoice,
}

impl TerminalConsole {
    pub fn new(choice: ColorChoice) -> Self {
        Self { choice }
    }

    fn styled(&self, stream: &mut StandardStream, color: Color, bold: bool, text: &str) {
        let mut style = ColorSpec::new();
        style.set_fg(Some(color)).set_bold(bold);
        let _ = stream.set_color(&style);
        let _ = write!(stream, "{}", text);
        let _ = stream.reset();
    }
}

impl Console for TerminalConsole {
    fn show(&self, event: Event) {
        let mut stdout = StandardStream::stdout(self.choice);
        match event {
            Event::Info(info) => {
                self.styled(&mut stdout, Color::Cyan, true, "Video: ");
                let _ = writeln!(stdout, "{} ({})", info, info.path.display());
            }
            Event::Converting => {
                self.styled(&mut stdout, Color::Blue, false, "Converting...");
                let _ = writeln!(stdout);
            }
            Event::Progress(fraction) => {
                let _ = write!(stdout, "\r{}", progress_bar(fraction, 30));
                if fraction >= 1.0 {
                    let _ = writeln!(stdout);
                }
                let _ = stdout.flush();
            }
            Event::Notice(message) => {
                self.styled(&mut stdout, Color::Green, true, ">> ");
                let _ = writeln!(stdout, "{}", message);
            }
            Event::NoticeHidden => {}
            Event::Status(text) => {
                let _ = writeln!(stdout, "{}", text);
            }
            Event::Error(message) => {
                let mut stderr = StandardStream::stderr(self.choice);
                self.styled(&mut stderr, Color::Red, true, "error: ");
                let _ = writeln!(stderr, "{}", message);
            }
        }
    }
}

/// `[#####.....]  50%`
pub fn progress_bar(fraction: f64, width: usize) -> String {
    let fraction = if fraction.is_finite() {
        fraction.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let filled = (fraction * width as f64).round() as usize;
    format!(
        "[{}{}] {:>3}%",
        "#".repeat(filled),
        ".".repeat(width - filled),
        (fraction * 100.0).round() as u32
    )
}
