//! Task identity, cancellation tokens and the plain task type

use crate::front::FrontContext;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Identity of a logical operation
///
/// Ids are compared for equality only and are not unique per task: every
/// queued task sharing an id is affected by a removal of that id. Producers
/// usually declare one constant per operation kind with [`TaskId::from_u64`];
/// [`TaskId::new`] hands out ids from a range constants should stay below.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

const GENERATED_BASE: u64 = 1 << 48;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(GENERATED_BASE);

impl TaskId {
    /// Generate a fresh, process-unique id
    pub fn new() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Create an id from a fixed value (for per-operation constants)
    pub const fn from_u64(id: u64) -> Self {
        TaskId(id)
    }

    /// Get the numeric id value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task:{}", self.0)
    }
}

/// Cooperative cancellation flag shared between a task body and the looper
///
/// The looper flips the flag when the running task's id is removed. Bodies
/// that can stop early poll [`CancelToken::is_cancelled`]; nothing else
/// interrupts them.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Request cancellation; returns true only for the call that flipped the flag
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::AcqRel)
    }
}

/// Hook invoked from a producer thread when a running task is cancelled.
/// Must not block.
pub type CancelHook = Box<dyn Fn() + Send + Sync + 'static>;

/// What the worker executes for a task
pub(crate) enum Work {
    /// Runs entirely on the worker
    Plain(Box<dyn FnOnce(&CancelToken) + Send + 'static>),
    /// Posts hooks to the front context around a worker body
    Staged(Box<dyn FnOnce(&CancelToken, &dyn FrontContext) + Send + 'static>),
}

impl Work {
    pub(crate) fn run(self, token: &CancelToken, front: &dyn FrontContext) {
        match self {
            Work::Plain(run) => run(token),
            Work::Staged(run) => run(token, front),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Work::Plain(_) => "plain",
            Work::Staged(_) => "staged",
        }
    }
}

/// Cancellation side of a task, held by the looper while the task runs
pub(crate) struct Canceller {
    token: CancelToken,
    hook: Option<CancelHook>,
}

impl Canceller {
    pub(crate) fn token(&self) -> &CancelToken {
        &self.token
    }

    /// Flip the token and run the hook once; later calls do nothing
    pub(crate) fn cancel(&self) -> bool {
        if !self.token.cancel() {
            return false;
        }
        if let Some(hook) = &self.hook {
            hook();
        }
        true
    }
}

/// A unit of deferred work submitted to a [`crate::Looper`]
///
/// The run closure executes on the looper's worker at most once. Two-phase
/// work with front-context hooks is built with [`crate::AsyncTask`] and
/// converted into a `Task` on submission.
pub struct Task {
    id: TaskId,
    work: Work,
    token: CancelToken,
    on_cancel: Option<CancelHook>,
}

impl Task {
    /// Create a task running `run` on the worker thread
    pub fn new<F>(id: TaskId, run: F) -> Self
    where
        F: FnOnce(&CancelToken) + Send + 'static,
    {
        Self::from_work(id, Work::Plain(Box::new(run)), None)
    }

    pub(crate) fn from_work(id: TaskId, work: Work, on_cancel: Option<CancelHook>) -> Self {
        Self {
            id,
            work,
            token: CancelToken::new(),
            on_cancel,
        }
    }

    /// Install a hook called when this task is cancelled while running
    pub fn on_cancel<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_cancel = Some(Box::new(hook));
        self
    }

    /// The task's identity
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// The token the body will observe; clone it to watch cancellation from outside
    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    pub(crate) fn into_parts(self) -> (TaskId, Work, Arc<Canceller>) {
        let canceller = Arc::new(Canceller {
            token: self.token,
            hook: self.on_cancel,
        });
        (self.id, self.work, canceller)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("kind", &self.work.kind())
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = TaskId::new();
        let b = TaskId::new();
        assert_ne!(a, b);
        assert!(a.as_u64() >= GENERATED_BASE);
    }

    #[test]
    fn test_constant_ids_compare_equal() {
        const RELOAD: TaskId = TaskId::from_u64(7);
        assert_eq!(RELOAD, TaskId::from_u64(7));
        assert_eq!(RELOAD.to_string(), "task:7");
    }

    #[test]
    fn test_cancel_token_flips_once() {
        let token = CancelToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        assert!(token.cancel());
        assert!(!token.cancel());
        assert!(observer.is_cancelled());
    }

    #[test]
    fn test_canceller_runs_hook_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let task = Task::new(TaskId::new(), |_| {}).on_cancel(move || {
            counted.fetch_add(1, Ordering::SeqCst);
        });
        let token = task.token().clone();
        let (_, _, canceller) = task.into_parts();

        assert!(canceller.cancel());
        assert!(!canceller.cancel());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_debug_shows_id_and_kind() {
        let task = Task::new(TaskId::from_u64(3), |_| {});
        let text = format!("{:?}", task);
        assert!(text.contains("TaskId(3)"));
        assert!(text.contains("plain"));
    }
}
