//! Subcommands and the runtime they share.
//!
//! Every subcommand runs encoder work as looper tasks and pumps a
//! [`FrontLoop`] on the main thread, so hooks and output stay on one thread.

pub mod convert;
pub mod probe;
pub mod session;

use crate::config::Config;
use crate::output::{Console, Event};
use anyhow::{bail, Context};
use crossbeam::channel::Receiver;
use gifloop_looper::{AsyncTask, FrontContext, FrontHandle, FrontLoop, Looper, TaskId};
use gifloop_media::{ConvertParameters, ConvertResult, GifConverter, MediaError, VideoInfo};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const POLL: Duration = Duration::from_millis(100);

/// Probe `input` on the worker
pub(crate) fn probe_task(
    id: TaskId,
    converter: &Arc<GifConverter>,
    input: PathBuf,
) -> AsyncTask<Result<VideoInfo, MediaError>> {
    let worker = Arc::clone(converter);
    let canceller = Arc::clone(converter);
    AsyncTask::new(id, move |token| worker.probe(&input, token))
        .on_cancel(move || canceller.cancel())
}

/// Convert on the worker, posting progress back to the front
pub(crate) fn convert_task(
    id: TaskId,
    converter: &Arc<GifConverter>,
    params: ConvertParameters,
    front: FrontHandle,
    console: Arc<dyn Console>,
) -> AsyncTask<Result<ConvertResult, MediaError>> {
    let worker = Arc::clone(converter);
    let canceller = Arc::clone(converter);
    let progress = Arc::clone(&console);
    AsyncTask::new(id, move |token| {
        worker.convert(&params, token, |fraction| {
            let console = Arc::clone(&progress);
            front.post(Box::new(move || console.show(Event::Progress(fraction))));
        })
    })
    .before(move || console.show(Event::Converting))
    .on_cancel(move || canceller.cancel())
}

/// Looper plus front loop for one-shot commands
pub(crate) struct Runtime {
    front: FrontLoop,
    handle: FrontHandle,
    looper: Looper,
    converter: Arc<GifConverter>,
}

impl Runtime {
    pub(crate) fn start(config: &Config) -> anyhow::Result<Self> {
        let (handle, front) = FrontLoop::new();
        let looper = Looper::with_config(handle.clone(), config.looper_config())
            .context("failed to start worker thread")?;
        Ok(Self {
            front,
            handle,
            looper,
            converter: Arc::new(GifConverter::new(&config.ffmpeg)),
        })
    }

    pub(crate) fn probe(&self, input: PathBuf) -> anyhow::Result<VideoInfo> {
        let (tx, rx) = crossbeam::channel::bounded(1);
        let display = input.display().to_string();
        self.looper.post(
            probe_task(TaskId::new(), &self.converter, input).after(move |result| {
                let _ = tx.send(result);
            }),
        )?;
        let info = self
            .wait_for(&rx)?
            .with_context(|| format!("failed to probe {}", display))?;
        Ok(info)
    }

    pub(crate) fn convert(
        &self,
        params: ConvertParameters,
        console: Arc<dyn Console>,
    ) -> anyhow::Result<ConvertResult> {
        let (tx, rx) = crossbeam::channel::bounded(1);
        let task = convert_task(
            TaskId::new(),
            &self.converter,
            params,
            self.handle.clone(),
            console,
        )
        .after(move |result| {
            let _ = tx.send(result);
        });
        self.looper.post(task)?;
        Ok(self.wait_for(&rx)?.context("conversion failed")?)
    }

    /// Pump the front loop until the task's after hook delivers a value
    fn wait_for<T>(&self, rx: &Receiver<T>) -> anyhow::Result<T> {
        loop {
            if let Ok(value) = rx.try_recv() {
                return Ok(value);
            }
            let ran = self.front.run_once(POLL)?;
            // after hooks are posted before the worker goes idle
            if !ran && self.looper.is_idle() && self.front.run_pending() == 0 {
                if let Ok(value) = rx.try_recv() {
                    return Ok(value);
                }
                bail!("worker finished without producing a result");
            }
        }
    }
}
