//! The looper: one worker thread running deadline-ordered tasks
//!
//! Producers on any thread submit tasks with a delay. The worker waits on a
//! condvar for the earliest deadline (re-evaluated on every wake, so an
//! earlier submission or a removal is seen immediately), pops the due task,
//! marks it current and runs it with the lock released. Removing an id drops
//! matching pending tasks and cancels the current task if it shares the id.

use crate::error::{LooperError, LooperResult};
use crate::front::FrontContext;
use crate::queue::PendingQueue;
use crate::task::{Canceller, Task, TaskId};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Worker thread settings
#[derive(Debug, Clone)]
pub struct LooperConfig {
    /// Name given to the worker thread
    pub thread_name: String,

    /// Worker stack size in bytes (None = platform default)
    pub stack_size: Option<usize>,
}

impl Default for LooperConfig {
    fn default() -> Self {
        Self {
            thread_name: "gifloop-looper".to_string(),
            stack_size: None,
        }
    }
}

/// Counters describing what a looper has done so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LooperStats {
    /// Tasks accepted by `submit`
    pub submitted: u64,

    /// Tasks whose run returned normally
    pub executed: u64,

    /// Tasks whose run panicked
    pub panicked: u64,

    /// Pending tasks dropped by removal, clearing or quitting
    pub removed: u64,

    /// Running tasks that received a cancellation
    pub cancelled: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    executed: AtomicU64,
    panicked: AtomicU64,
    removed: AtomicU64,
    cancelled: AtomicU64,
}

impl Counters {
    fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    fn snapshot(&self) -> LooperStats {
        LooperStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

/// The task currently executing on the worker
struct Running {
    id: TaskId,
    canceller: Arc<Canceller>,
}

struct State {
    pending: PendingQueue<Task>,
    current: Option<Running>,
    stopping: bool,
    /// Set by the worker on its way out
    stopped: bool,
}

impl State {
    fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.current.is_none()
    }
}

struct Shared {
    state: Mutex<State>,
    /// Wakes the worker on submit, removal and quit
    wake: Condvar,
    /// Wakes `wait_idle` callers when the looper drains
    idle: Condvar,
    front: Arc<dyn FrontContext>,
    counters: Counters,
}

/// Single-worker task scheduler
///
/// Created with its worker already running. Share it with `Arc<Looper>`;
/// every operation takes `&self`. Dropping the looper quits it and joins the
/// worker after the current task finishes.
pub struct Looper {
    shared: Arc<Shared>,
    worker: ThreadId,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Looper {
    /// Start a looper whose staged hooks are posted to `front`
    pub fn new<F>(front: F) -> LooperResult<Self>
    where
        F: FrontContext + 'static,
    {
        Self::with_config(front, LooperConfig::default())
    }

    /// Start a looper with custom worker settings
    pub fn with_config<F>(front: F, config: LooperConfig) -> LooperResult<Self>
    where
        F: FrontContext + 'static,
    {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                pending: PendingQueue::new(),
                current: None,
                stopping: false,
                stopped: false,
            }),
            wake: Condvar::new(),
            idle: Condvar::new(),
            front: Arc::new(front),
            counters: Counters::default(),
        });

        let mut builder = thread::Builder::new().name(config.thread_name.clone());
        if let Some(size) = config.stack_size {
            builder = builder.stack_size(size);
        }

        let worker_shared = Arc::clone(&shared);
        let handle = builder.spawn(move || run_loop(&worker_shared))?;
        let worker = handle.thread().id();

        debug!(thread = %config.thread_name, "looper started");

        Ok(Self {
            shared,
            worker,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Schedule `task` to run once `delay` has elapsed.
    ///
    /// Tasks with equal deadlines run in submission order. Tasks sharing an
    /// id coexist until removed.
    pub fn submit(&self, task: impl Into<Task>, delay: Duration) -> LooperResult<()> {
        let task = task.into();
        let id = task.id();
        let scheduled_at = deadline_after(delay);

        let is_head = {
            let mut state = self.shared.state.lock();
            if state.stopping {
                return Err(LooperError::Stopped);
            }
            state.pending.push(task, scheduled_at)
        };

        Counters::add(&self.shared.counters.submitted, 1);
        // A later head changes nothing for a worker already waiting on an earlier one
        if is_head {
            self.shared.wake.notify_one();
        }
        debug!(task = %id, delay_ms = delay.as_millis() as u64, "submitted");
        Ok(())
    }

    /// Schedule `task` to run as soon as the worker is free
    pub fn post(&self, task: impl Into<Task>) -> LooperResult<()> {
        self.submit(task, Duration::ZERO)
    }

    /// Drop every pending task with `id` and cancel the running task if it has it.
    ///
    /// Never waits for the running body; returns how many pending tasks were dropped.
    pub fn remove(&self, id: TaskId) -> LooperResult<usize> {
        let (removed, running) = {
            let mut state = self.lock_live()?;
            let removed = state.pending.remove_matching(|task| task.id() == id);
            let running = state
                .current
                .as_ref()
                .filter(|running| running.id == id)
                .map(|running| Arc::clone(&running.canceller));
            self.after_removal(&state);
            (removed, running)
        };

        let count = self.finish_removal(removed, running);
        debug!(task = %id, removed = count, "removed");
        Ok(count)
    }

    /// Drop every pending task and cancel the running one, if any
    pub fn remove_all(&self) -> LooperResult<usize> {
        let (removed, running) = {
            let mut state = self.lock_live()?;
            let removed = state.pending.take_all();
            let running = state
                .current
                .as_ref()
                .map(|running| Arc::clone(&running.canceller));
            self.after_removal(&state);
            (removed, running)
        };

        let count = self.finish_removal(removed, running);
        debug!(removed = count, "removed all");
        Ok(count)
    }

    /// Drop every pending task, leaving the running one alone
    pub fn clear_pending(&self) -> LooperResult<usize> {
        let removed = {
            let mut state = self.lock_live()?;
            let removed = state.pending.take_all();
            self.after_removal(&state);
            removed
        };

        let count = self.finish_removal(removed, None);
        debug!(removed = count, "cleared pending");
        Ok(count)
    }

    /// Stop the worker once the current task (if any) returns.
    ///
    /// Pending tasks are discarded without running and the running task is
    /// not cancelled. Later submissions fail with [`LooperError::Stopped`];
    /// removal keeps working until the worker has exited, so a long running
    /// task can still be cancelled while the looper winds down.
    pub fn quit(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.stopping {
                return;
            }
            state.stopping = true;
        }
        self.shared.wake.notify_all();
        info!("looper quitting");
    }

    /// Whether quit has been requested
    pub fn is_quitting(&self) -> bool {
        self.shared.state.lock().stopping
    }

    /// True when nothing is pending and nothing is running
    pub fn is_idle(&self) -> bool {
        self.shared.state.lock().is_idle()
    }

    /// Number of tasks waiting for their deadline
    pub fn pending_count(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Id of the task executing right now
    pub fn current_id(&self) -> Option<TaskId> {
        self.shared.state.lock().current.as_ref().map(|running| running.id)
    }

    /// Snapshot of the looper's counters
    pub fn stats(&self) -> LooperStats {
        self.shared.counters.snapshot()
    }

    /// Block until the looper is idle or `timeout` elapses; returns whether it is idle.
    ///
    /// Called from a task on the worker itself, this only reports the current state.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let mut state = self.shared.state.lock();
        if thread::current().id() == self.worker {
            return state.is_idle();
        }

        let deadline = deadline_after(timeout);
        while !state.is_idle() {
            if self.shared.idle.wait_until(&mut state, deadline).timed_out() {
                return state.is_idle();
            }
        }
        true
    }

    /// Wait for the worker thread to exit. Call after [`Looper::quit`].
    ///
    /// Does nothing when called from the worker thread.
    pub fn join(&self) {
        if thread::current().id() == self.worker {
            return;
        }
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("looper worker exited by panic");
            }
        }
    }

    /// Lock for removal; fails only once the worker is gone
    fn lock_live(&self) -> LooperResult<MutexGuard<'_, State>> {
        let state = self.shared.state.lock();
        if state.stopped {
            return Err(LooperError::Stopped);
        }
        Ok(state)
    }

    fn after_removal(&self, state: &State) {
        // The worker may be waiting on a deadline that no longer exists
        self.shared.wake.notify_one();
        if state.is_idle() {
            self.shared.idle.notify_all();
        }
    }

    /// Drop removed tasks and deliver cancellation with the lock released
    fn finish_removal(&self, removed: Vec<Task>, running: Option<Arc<Canceller>>) -> usize {
        let count = removed.len();
        Counters::add(&self.shared.counters.removed, count);
        drop(removed);

        if let Some(canceller) = running {
            if canceller.cancel() {
                Counters::add(&self.shared.counters.cancelled, 1);
                debug!("cancelled running task");
            }
        }
        count
    }
}

impl Drop for Looper {
    fn drop(&mut self) {
        self.quit();
        self.join();
    }
}

/// `now + delay`, saturating for absurdly long delays
fn deadline_after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay)
        .unwrap_or_else(|| now + Duration::from_secs(60 * 60 * 24 * 365 * 100))
}

/// Worker thread main loop
fn run_loop(shared: &Shared) {
    let mut state = shared.state.lock();

    loop {
        if state.stopping {
            break;
        }

        let Some(deadline) = state.pending.next_deadline() else {
            trace!("waiting for tasks");
            shared.wake.wait(&mut state);
            continue;
        };

        let now = Instant::now();
        if deadline > now {
            trace!(wait_ms = (deadline - now).as_millis() as u64, "waiting for deadline");
            // Wakes early on submit/remove/quit; the head is re-read either way
            shared.wake.wait_until(&mut state, deadline);
            continue;
        }

        let Some(task) = state.pending.pop_due(now) else {
            continue;
        };
        let (id, work, canceller) = task.into_parts();
        state.current = Some(Running {
            id,
            canceller: Arc::clone(&canceller),
        });

        trace!(task = %id, "running");
        let outcome = MutexGuard::unlocked(&mut state, || {
            panic::catch_unwind(AssertUnwindSafe(|| {
                work.run(canceller.token(), shared.front.as_ref())
            }))
        });

        state.current = None;
        match outcome {
            Ok(()) => Counters::add(&shared.counters.executed, 1),
            Err(payload) => {
                Counters::add(&shared.counters.panicked, 1);
                warn!(task = %id, reason = panic_message(payload.as_ref()), "task panicked");
            }
        }

        if state.is_idle() {
            shared.idle.notify_all();
        }
    }

    let discarded = state.pending.take_all();
    state.current = None;
    state.stopped = true;
    shared.idle.notify_all();
    drop(state);

    if !discarded.is_empty() {
        Counters::add(&shared.counters.removed, discarded.len());
        debug!(discarded = discarded.len(), "discarded pending tasks on quit");
    }
    debug!("looper worker exiting");
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::FrontLoop;
    use std::sync::atomic::AtomicUsize;

    fn looper() -> (Looper, FrontLoop) {
        let (handle, front) = FrontLoop::new();
        (Looper::new(handle).expect("spawn looper"), front)
    }

    #[test]
    fn test_looper_starts_idle() {
        let (looper, _front) = looper();
        assert!(looper.is_idle());
        assert_eq!(looper.pending_count(), 0);
        assert_eq!(looper.current_id(), None);
        assert_eq!(looper.stats(), LooperStats::default());
    }

    #[test]
    fn test_posted_task_runs() {
        let (looper, _front) = looper();
        let ran = Arc::new(AtomicUsize::new(0));
        let r = ran.clone();
        looper
            .post(Task::new(TaskId::new(), move |_| {
                r.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        assert!(looper.wait_idle(Duration::from_secs(2)));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(looper.stats().executed, 1);
    }

    #[test]
    fn test_worker_thread_is_named() {
        let (handle, _front) = FrontLoop::new();
        let config = LooperConfig {
            thread_name: "looper-under-test".to_string(),
            stack_size: Some(256 * 1024),
        };
        let looper = Looper::with_config(handle, config).unwrap();
        let name = Arc::new(Mutex::new(None));
        let out = name.clone();
        looper
            .post(Task::new(TaskId::new(), move |_| {
                *out.lock() = thread::current().name().map(str::to_string);
            }))
            .unwrap();

        assert!(looper.wait_idle(Duration::from_secs(2)));
        assert_eq!(name.lock().as_deref(), Some("looper-under-test"));
    }

    #[test]
    fn test_remove_unknown_id_is_noop() {
        let (looper, _front) = looper();
        assert_eq!(looper.remove(TaskId::new()).unwrap(), 0);
        assert_eq!(looper.stats().cancelled, 0);
    }

    #[test]
    fn test_remove_counts_matches() {
        let (looper, _front) = looper();
        let id = TaskId::new();
        for _ in 0..3 {
            looper.submit(Task::new(id, |_| {}), Duration::from_secs(30)).unwrap();
        }
        looper
            .submit(Task::new(TaskId::new(), |_| {}), Duration::from_secs(30))
            .unwrap();

        assert_eq!(looper.remove(id).unwrap(), 3);
        assert_eq!(looper.pending_count(), 1);
        assert_eq!(looper.clear_pending().unwrap(), 1);
        assert!(looper.is_idle());
        assert_eq!(looper.stats().removed, 4);
    }

    #[test]
    fn test_operations_after_quit_fail() {
        let (looper, _front) = looper();
        looper.quit();
        looper.quit();
        assert!(looper.is_quitting());

        let err = looper.post(Task::new(TaskId::new(), |_| {})).unwrap_err();
        assert!(matches!(err, LooperError::Stopped));

        looper.join();
        assert!(looper.is_idle());
        assert!(matches!(looper.remove(TaskId::new()), Err(LooperError::Stopped)));
        assert!(matches!(looper.remove_all(), Err(LooperError::Stopped)));
        assert!(matches!(looper.clear_pending(), Err(LooperError::Stopped)));
    }

    #[test]
    fn test_remove_all_after_quit_cancels_running_task() {
        let (looper, _front) = looper();
        let (started_tx, started_rx) = crossbeam::channel::bounded(1);
        let saw_cancel = Arc::new(AtomicUsize::new(0));
        let seen = saw_cancel.clone();
        looper
            .post(Task::new(TaskId::new(), move |token| {
                let _ = started_tx.send(());
                let give_up = Instant::now() + Duration::from_secs(5);
                while !token.is_cancelled() && Instant::now() < give_up {
                    thread::sleep(Duration::from_millis(5));
                }
                if token.is_cancelled() {
                    seen.fetch_add(1, Ordering::SeqCst);
                }
            }))
            .unwrap();
        started_rx.recv_timeout(Duration::from_secs(2)).unwrap();

        looper.quit();
        assert_eq!(looper.remove_all().unwrap(), 0);

        let joined_at = Instant::now();
        looper.join();
        assert!(joined_at.elapsed() < Duration::from_secs(2));
        assert_eq!(saw_cancel.load(Ordering::SeqCst), 1);
        assert_eq!(looper.stats().cancelled, 1);
    }

    #[test]
    fn test_panicking_task_does_not_kill_worker() {
        let (looper, _front) = looper();
        looper
            .post(Task::new(TaskId::new(), |_| panic!("boom")))
            .unwrap();

        let ran = Arc::new(AtomicUsize::new(0));
        let r = ran.clone();
        looper
            .post(Task::new(TaskId::new(), move |_| {
                r.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        assert!(looper.wait_idle(Duration::from_secs(2)));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        let stats = looper.stats();
        assert_eq!(stats.panicked, 1);
        assert_eq!(stats.executed, 1);
    }

    #[test]
    fn test_current_id_visible_while_running() {
        let (looper, _front) = looper();
        let id = TaskId::new();
        let (started_tx, started_rx) = crossbeam::channel::bounded(1);
        let (release_tx, release_rx) = crossbeam::channel::bounded::<()>(1);
        looper
            .post(Task::new(id, move |_| {
                let _ = started_tx.send(());
                let _ = release_rx.recv();
            }))
            .unwrap();

        started_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(looper.current_id(), Some(id));
        assert!(!looper.is_idle());
        release_tx.send(()).unwrap();
        assert!(looper.wait_idle(Duration::from_secs(2)));
        assert_eq!(looper.current_id(), None);
    }

    #[test]
    fn test_wait_idle_times_out_with_future_task() {
        let (looper, _front) = looper();
        looper
            .submit(Task::new(TaskId::new(), |_| {}), Duration::from_secs(30))
            .unwrap();
        assert!(!looper.wait_idle(Duration::from_millis(30)));
    }

    #[test]
    fn test_wait_idle_from_worker_does_not_block() {
        let (looper, _front) = looper();
        let looper = Arc::new(looper);
        let observed = Arc::new(Mutex::new(None));
        let (inner, out) = (Arc::clone(&looper), observed.clone());
        looper
            .post(Task::new(TaskId::new(), move |_| {
                *out.lock() = Some(inner.wait_idle(Duration::from_secs(5)));
            }))
            .unwrap();

        assert!(looper.wait_idle(Duration::from_secs(2)));
        assert_eq!(*observed.lock(), Some(false));
    }

    #[test]
    fn test_deadline_after_saturates() {
        let far = deadline_after(Duration::MAX);
        assert!(far > Instant::now() + Duration::from_secs(60 * 60 * 24 * 365));
    }
}
