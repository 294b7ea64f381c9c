//! `gifloop session`: interactive range selection with live re-encoding.
//!
//! Commands arrive on stdin. Each parameter change replaces the pending
//! conversion: `remove(CONVERT)` followed by a delayed `submit`, so a burst
//! of edits encodes once after the input goes quiet. Toggles encode
//! immediately. Results show a notice that a delayed task hides again.

use super::{convert_task, probe_task};
use crate::config::Config;
use crate::output::{Console, Event};
use gifloop_looper::{
    AsyncTask, FrontContext, FrontHandle, FrontLoop, Looper, LooperResult, TaskId,
};
use gifloop_media::{ConvertParameters, ConvertResult, GifConverter, MediaError, VideoInfo, MIN_SPAN};
use parking_lot::Mutex;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Probe of the current input
pub const RELOAD_INFO: TaskId = TaskId::from_u64(1);

/// The single pending or running conversion
pub const CONVERT: TaskId = TaskId::from_u64(2);

/// Hides the current notice once it has been visible long enough
pub const HIDE_NOTIFICATION: TaskId = TaskId::from_u64(3);

const HELP: &str = "\
commands:
  start <time>   set range start (seconds or [hh:]mm:ss)
  end <time>     set range end
  fps <n>        output frame rate
  scale <x>      output scale in (0, 1]
  reverse        toggle reversed playback
  logo           toggle the logo stamp
  info           show the current selection
  help           show this help
  quit           leave the session";

/// One line of session input
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start(f64),
    End(f64),
    Fps(f64),
    Scale(f64),
    Reverse,
    Logo,
    Info,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let name = words.next().ok_or_else(|| "empty command".to_string())?;
        let arg = words.next();
        if words.next().is_some() {
            return Err(format!("too many arguments for '{}'", name));
        }

        let number = |parse: fn(&str) -> Option<f64>| {
            let text = arg.ok_or_else(|| format!("'{}' needs a value", name))?;
            parse(text).ok_or_else(|| format!("invalid value for '{}': {}", name, text))
        };
        let flag = |command: Command| match arg {
            Some(_) => Err(format!("'{}' takes no value", name)),
            None => Ok(command),
        };

        match name {
            "start" | "s" => number(parse_time).map(Command::Start),
            "end" | "e" => number(parse_time).map(Command::End),
            "fps" => number(|text| text.parse().ok()).map(Command::Fps),
            "scale" => number(|text| text.parse().ok()).map(Command::Scale),
            "reverse" | "r" => flag(Command::Reverse),
            "logo" | "l" => flag(Command::Logo),
            "info" | "i" => flag(Command::Info),
            "help" | "?" => flag(Command::Help),
            "quit" | "exit" | "q" => flag(Command::Quit),
            other => Err(format!("unknown command '{}' (try 'help')", other)),
        }
    }
}

/// Seconds from `90`, `1:30`, `1:30.5` or `0:01:30`
pub fn parse_time(text: &str) -> Option<f64> {
    let mut seconds = 0.0;
    let mut parts = 0;
    for part in text.split(':') {
        parts += 1;
        if parts > 3 {
            return None;
        }
        let value: f64 = part.parse().ok()?;
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        seconds = seconds * 60.0 + value;
    }
    Some(seconds)
}

fn format_time(seconds: f64) -> String {
    let minutes = (seconds / 60.0).floor();
    format!("{:02}:{:05.2}", minutes as u64, seconds - minutes * 60.0)
}

#[derive(Debug, Clone)]
struct Selection {
    input: PathBuf,
    info: Option<VideoInfo>,
    start: f64,
    end: f64,
    frame_rate: f64,
    scale: f64,
    reverse: bool,
    logo: bool,
}

impl Selection {
    fn span(&self) -> f64 {
        self.end - self.start
    }

    fn parameters(&self, config: &Config) -> ConvertParameters {
        let mut params = ConvertParameters::new(self.input.clone(), self.start, self.span());
        params.frame_rate = self.frame_rate;
        params.scale = self.scale;
        params.reverse = self.reverse;
        params.logo = self.logo.then(|| config.logo_text.clone());
        params
    }

    fn describe(&self) -> String {
        let on_off = |value: bool| if value { "on" } else { "off" };
        format!(
            "{}: {} - {} ({:.1}s), {} fps, scale {}, reverse {}, logo {}",
            self.input.display(),
            format_time(self.start),
            format_time(self.end),
            self.span(),
            self.frame_rate,
            self.scale,
            on_off(self.reverse),
            on_off(self.logo)
        )
    }
}

struct Inner {
    config: Config,
    looper: Looper,
    converter: Arc<GifConverter>,
    front: FrontHandle,
    console: Arc<dyn Console>,
    selection: Mutex<Selection>,
    notice: Mutex<Option<String>>,
}

/// Session controller. Every method runs on the front thread.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    pub fn new(
        config: Config,
        converter: Arc<GifConverter>,
        front: FrontHandle,
        console: Arc<dyn Console>,
        input: PathBuf,
    ) -> LooperResult<Self> {
        let looper = Looper::with_config(front.clone(), config.looper_config())?;
        let selection = Selection {
            input,
            info: None,
            start: 0.0,
            end: 0.0,
            frame_rate: config.frame_rate,
            scale: config.scale,
            reverse: false,
            logo: false,
        };
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                looper,
                converter,
                front,
                console,
                selection: Mutex::new(selection),
                notice: Mutex::new(None),
            }),
        })
    }

    #[cfg(test)]
    fn looper(&self) -> &Looper {
        &self.inner.looper
    }

    /// The notice currently on screen
    #[cfg(test)]
    fn notice(&self) -> Option<String> {
        self.inner.notice.lock().clone()
    }

    /// Probe the input; the selection is initialised when the probe lands
    pub fn open(&self) -> LooperResult<()> {
        let inner = &self.inner;
        inner.looper.remove(RELOAD_INFO)?;
        let input = inner.selection.lock().input.clone();
        let session = self.clone();
        inner.looper.post(
            probe_task(RELOAD_INFO, &inner.converter, input)
                .after(move |result| session.on_probed(result)),
        )
    }

    /// Apply one command. Returns `false` when the session should end.
    pub fn handle(&self, command: Command) -> LooperResult<bool> {
        let inner = &self.inner;
        let debounce = inner.config.debounce();
        debug!(?command, "session command");

        match command {
            Command::Start(seconds) => {
                self.update(|s| s.start = seconds);
                self.reload_convert(debounce)?;
            }
            Command::End(seconds) => {
                self.update(|s| s.end = seconds);
                self.reload_convert(debounce)?;
            }
            Command::Fps(rate) if rate > 0.0 && rate.is_finite() => {
                self.update(|s| s.frame_rate = rate);
                self.reload_convert(debounce)?;
            }
            Command::Scale(scale) if scale > 0.0 && scale <= 1.0 => {
                self.update(|s| s.scale = scale);
                self.reload_convert(debounce)?;
            }
            Command::Fps(_) => inner
                .console
                .show(Event::Error("fps must be positive".to_string())),
            Command::Scale(_) => inner
                .console
                .show(Event::Error("scale must be in (0, 1]".to_string())),
            Command::Reverse => {
                self.update(|s| s.reverse = !s.reverse);
                self.reload_convert(Duration::ZERO)?;
            }
            Command::Logo => {
                self.update(|s| s.logo = !s.logo);
                self.reload_convert(Duration::ZERO)?;
            }
            Command::Info => {
                let text = inner.selection.lock().describe();
                inner.console.show(Event::Status(text));
            }
            Command::Help => inner.console.show(Event::Status(HELP.to_string())),
            Command::Quit => return Ok(false),
        }
        Ok(true)
    }

    /// Stop the worker, cancelling whatever it is doing
    pub fn shutdown(&self) {
        let looper = &self.inner.looper;
        if let Err(e) = looper.remove_all() {
            debug!(error = %e, "looper already stopped");
        }
        looper.quit();
        looper.join();
    }

    fn update(&self, change: impl FnOnce(&mut Selection)) {
        let mut selection = self.inner.selection.lock();
        change(&mut selection);
        if let Some(info) = &selection.info {
            let duration = info.duration;
            selection.start = selection.start.clamp(0.0, duration);
            selection.end = selection.end.clamp(0.0, duration);
        }
    }

    fn reload_convert(&self, delay: Duration) -> LooperResult<()> {
        let inner = &self.inner;
        inner.looper.remove(CONVERT)?;
        self.hide_notification();

        let selection = inner.selection.lock().clone();
        if selection.info.is_none() {
            return Ok(());
        }
        if !selection.input.is_file() {
            self.show_notification("The selected file has been removed; choose another file");
            return Ok(());
        }
        if selection.span() > inner.config.max_span_secs {
            self.show_notification("Selected range is too long");
            return Ok(());
        }
        if selection.span() < MIN_SPAN {
            return Ok(());
        }

        let session = self.clone();
        let task = convert_task(
            CONVERT,
            &inner.converter,
            selection.parameters(&inner.config),
            inner.front.clone(),
            Arc::clone(&inner.console),
        )
        .after(move |result| session.on_converted(result));
        inner.looper.submit(task, delay)
    }

    fn on_probed(&self, result: Result<VideoInfo, MediaError>) {
        let inner = &self.inner;
        match result {
            Ok(info) => {
                let described = {
                    let mut selection = inner.selection.lock();
                    selection.start = selection.start.clamp(0.0, info.duration);
                    if selection.end <= selection.start || selection.end > info.duration {
                        selection.end =
                            (selection.start + inner.config.max_span_secs).min(info.duration);
                    }
                    selection.info = Some(info.clone());
                    selection.describe()
                };
                inner.console.show(Event::Info(info));
                inner.console.show(Event::Status(described));
                self.log_failure(self.reload_convert(inner.config.debounce()));
            }
            Err(MediaError::Cancelled) => {}
            Err(e) => {
                inner.console.show(Event::Error(e.to_string()));
                self.show_notification_for_a_while(e.to_string());
            }
        }
    }

    fn on_converted(&self, result: Result<ConvertResult, MediaError>) {
        match result {
            Ok(result) if result.canceled => {}
            Ok(result) => self.show_notification_for_a_while(result.message),
            Err(MediaError::Cancelled) => {}
            Err(e) => self.show_notification_for_a_while(e.to_string()),
        }
    }

    fn show_notification(&self, message: &str) {
        *self.inner.notice.lock() = Some(message.to_string());
        self.inner.console.show(Event::Notice(message.to_string()));
    }

    fn show_notification_for_a_while(&self, message: String) {
        self.show_notification(&message);

        let inner = &self.inner;
        let session = self.clone();
        let hide = AsyncTask::new(HIDE_NOTIFICATION, |_| ()).before(move || session.hide_notification());
        let scheduled = inner
            .looper
            .remove(HIDE_NOTIFICATION)
            .and_then(|_| inner.looper.submit(hide, inner.config.notification()));
        self.log_failure(scheduled);
    }

    fn hide_notification(&self) {
        if self.inner.notice.lock().take().is_some() {
            self.inner.console.show(Event::NoticeHidden);
        }
    }

    fn log_failure(&self, result: LooperResult<()>) {
        if let Err(e) = result {
            warn!(error = %e, "session task not scheduled");
        }
    }
}

/// Read commands on a background thread and post them to the front loop
fn spawn_reader<R>(input: R, session: Session, front: FrontHandle) -> std::io::Result<()>
where
    R: BufRead + Send + 'static,
{
    thread::Builder::new()
        .name("gifloop-stdin".to_string())
        .spawn(move || {
            for line in input.lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(error = %e, "failed to read command");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                let command = line.parse::<Command>();
                let quit = command == Ok(Command::Quit);
                let session = session.clone();
                let exit = front.clone();
                front.post(Box::new(move || match command {
                    Ok(command) => match session.handle(command) {
                        Ok(true) => {}
                        Ok(false) => exit.exit(),
                        Err(e) => {
                            session.inner.console.show(Event::Error(e.to_string()));
                            exit.exit();
                        }
                    },
                    Err(message) => session.inner.console.show(Event::Error(message)),
                }));
                if quit {
                    return;
                }
            }
            front.exit();
        })?;
    Ok(())
}

pub fn execute(config: &Config, console: Arc<dyn Console>, input: PathBuf) -> anyhow::Result<()> {
    let (handle, front) = FrontLoop::new();
    let converter = Arc::new(GifConverter::new(&config.ffmpeg));
    let session = Session::new(
        config.clone(),
        converter,
        handle.clone(),
        Arc::clone(&console),
        input,
    )?;

    console.show(Event::Status("type 'help' for commands".to_string()));
    session.open()?;
    spawn_reader(BufReader::new(std::io::stdin()), session.clone(), handle)?;
    front.run();
    session.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!("start 1.5".parse::<Command>(), Ok(Command::Start(1.5)));
        assert_eq!("e 1:02".parse::<Command>(), Ok(Command::End(62.0)));
        assert_eq!("fps 12".parse::<Command>(), Ok(Command::Fps(12.0)));
        assert_eq!("scale 0.3".parse::<Command>(), Ok(Command::Scale(0.3)));
        assert_eq!("  reverse ".parse::<Command>(), Ok(Command::Reverse));
        assert_eq!("quit".parse::<Command>(), Ok(Command::Quit));
        assert_eq!("exit".parse::<Command>(), Ok(Command::Quit));
    }

    #[test]
    fn test_parse_errors() {
        assert!("".parse::<Command>().is_err());
        assert!("start".parse::<Command>().is_err());
        assert!("start soon".parse::<Command>().is_err());
        assert!("reverse now".parse::<Command>().is_err());
        assert!("fps 1 2".parse::<Command>().is_err());
        assert!("rewind".parse::<Command>().is_err());
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("90"), Some(90.0));
        assert_eq!(parse_time("1:30.5"), Some(90.5));
        assert_eq!(parse_time("1:00:00"), Some(3600.0));
        assert_eq!(parse_time("1:2:3:4"), None);
        assert_eq!(parse_time("-3"), None);
        assert_eq!(parse_time("1::2"), None);
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0.0), "00:00.00");
        assert_eq!(format_time(75.5), "01:15.50");
    }

    #[test]
    fn test_task_ids_are_distinct() {
        assert_ne!(RELOAD_INFO, CONVERT);
        assert_ne!(CONVERT, HIDE_NOTIFICATION);
        assert_ne!(RELOAD_INFO, HIDE_NOTIFICATION);
    }

    #[cfg(unix)]
    mod live {
        use super::*;
        use std::ffi::OsString;
        use std::fs;
        use std::time::Instant;
        use tempfile::TempDir;

        const FAKE_FFMPEG: &str = r#"
case " $* " in
  *" -f gif "*)
    printf 'frame=  10 fps=0.0 time=00:00:01.00 speed=1.0x\r' >&2
    for last; do :; done
    : > "$last"
    exit 0
    ;;
  *)
    cat >&2 <<'OUT'
Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'clip.mp4':
  Duration: 00:00:12.50, start: 0.000000, bitrate: 900 kb/s
    Stream #0:0(und): Video: h264 (High), yuv420p, 854x480, 800 kb/s, 24 fps, 24 tbr
OUT
    exit 1
    ;;
esac
"#;

        #[derive(Default)]
        struct Recorder {
            events: Mutex<Vec<Event>>,
        }

        impl Recorder {
            fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
                self.events.lock().iter().filter(|e| pred(e)).count()
            }

            fn saw_saved(&self) -> bool {
                self.count(|e| matches!(e, Event::Notice(m) if m.starts_with("Saved"))) > 0
            }

            fn saw_info(&self) -> bool {
                self.count(|e| matches!(e, Event::Info(_))) > 0
            }
        }

        impl Console for Recorder {
            fn show(&self, event: Event) {
                self.events.lock().push(event);
            }
        }

        struct Harness {
            _dir: TempDir,
            front: FrontLoop,
            session: Session,
            console: Arc<Recorder>,
        }

        impl Harness {
            fn new(tune: impl FnOnce(&mut Config)) -> Self {
                let dir = TempDir::new().unwrap();
                let script = dir.path().join("fake-ffmpeg.sh");
                fs::write(&script, FAKE_FFMPEG).unwrap();
                let video = dir.path().join("clip.mp4");
                fs::write(&video, b"not a video").unwrap();

                let mut config = Config::default();
                tune(&mut config);
                let converter = Arc::new(GifConverter::with_launcher(
                    "sh",
                    vec![OsString::from(script)],
                ));
                let (handle, front) = FrontLoop::new();
                let console = Arc::new(Recorder::default());
                let session = Session::new(
                    config,
                    converter,
                    handle,
                    Arc::clone(&console) as Arc<dyn Console>,
                    video,
                )
                .unwrap();
                Self {
                    _dir: dir,
                    front,
                    session,
                    console,
                }
            }

            fn opened(tune: impl FnOnce(&mut Config)) -> Self {
                let harness = Self::new(tune);
                harness.session.open().unwrap();
                let console = Arc::clone(&harness.console);
                harness
                    .front
                    .run_until(|| console.saw_info(), Duration::from_secs(5))
                    .unwrap();
                harness
            }

            fn pump_for(&self, duration: Duration) {
                let _ = self.front.run_until(|| false, duration);
            }
        }

        impl Drop for Harness {
            fn drop(&mut self) {
                self.session.shutdown();
            }
        }

        #[test]
        fn test_probe_initialises_selection() {
            let h = Harness::opened(|c| {
                c.max_span_secs = 5.0;
                c.debounce_ms = 10_000;
            });
            let selection = h.session.inner.selection.lock().clone();
            assert_eq!(selection.start, 0.0);
            assert_eq!(selection.end, 5.0);
            assert_eq!(h.session.looper().pending_count(), 1);
        }

        #[test]
        fn test_too_long_range_shows_notice_and_schedules_nothing() {
            let h = Harness::opened(|c| {
                c.max_span_secs = 5.0;
                c.debounce_ms = 10_000;
            });

            assert!(h.session.handle(Command::End(12.0)).unwrap());
            assert_eq!(h.session.looper().pending_count(), 0);
            assert_eq!(h.session.notice().as_deref(), Some("Selected range is too long"));
        }

        #[test]
        fn test_short_range_is_skipped_silently() {
            let h = Harness::opened(|c| c.debounce_ms = 10_000);

            assert!(h.session.handle(Command::End(0.5)).unwrap());
            assert_eq!(h.session.looper().pending_count(), 0);
            assert_eq!(h.session.notice(), None);
        }

        #[test]
        fn test_burst_of_edits_converts_once() {
            let h = Harness::opened(|c| c.debounce_ms = 150);

            for start in [1.0, 2.0, 3.0] {
                h.session.handle(Command::Start(start)).unwrap();
            }
            let console = Arc::clone(&h.console);
            h.front
                .run_until(|| console.saw_saved(), Duration::from_secs(5))
                .unwrap();
            h.pump_for(Duration::from_millis(400));

            assert_eq!(h.console.count(|e| *e == Event::Converting), 1);
            assert_eq!(h.session.inner.selection.lock().start, 3.0);
        }

        #[test]
        fn test_toggle_converts_without_debounce() {
            let h = Harness::opened(|c| c.debounce_ms = 10_000);

            let started = Instant::now();
            h.session.handle(Command::Reverse).unwrap();
            let console = Arc::clone(&h.console);
            h.front
                .run_until(|| console.saw_saved(), Duration::from_secs(5))
                .unwrap();
            assert!(started.elapsed() < Duration::from_secs(5));
            assert!(h.session.inner.selection.lock().reverse);
        }

        #[test]
        fn test_notice_hides_after_a_while() {
            let h = Harness::opened(|c| {
                c.debounce_ms = 10_000;
                c.notification_ms = 100;
            });

            h.session.handle(Command::Logo).unwrap();
            let console = Arc::clone(&h.console);
            h.front
                .run_until(|| console.saw_saved(), Duration::from_secs(5))
                .unwrap();
            assert!(h.session.notice().is_some());

            let session = h.session.clone();
            h.front
                .run_until(|| session.notice().is_none(), Duration::from_secs(5))
                .unwrap();
            assert!(h.console.count(|e| *e == Event::NoticeHidden) >= 1);
        }

        #[test]
        fn test_missing_input_reports_probe_error() {
            let h = Harness::new(|_| {});
            fs::remove_file(&h.session.inner.selection.lock().input).unwrap();
            h.session.open().unwrap();

            let console = Arc::clone(&h.console);
            h.front
                .run_until(
                    || console.count(|e| matches!(e, Event::Error(_))) > 0,
                    Duration::from_secs(5),
                )
                .unwrap();
            assert!(h.session.notice().unwrap().contains("not found"));
        }
    }
}
