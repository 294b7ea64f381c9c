//! Two-phase tasks with front-context hooks
//!
//! An [`AsyncTask`] splits its work into three stages:
//!
//! - `before` is posted to the front context when the worker picks the task up
//! - `body` runs synchronously on the worker and produces a result
//! - `after` is posted to the front context with exactly that result
//!
//! `before` is posted, not awaited, so it may still be running on the front
//! thread while the body starts. Because the front context runs callbacks in
//! post order, `before` always finishes before `after` begins.

use crate::front::{FrontCallback, FrontContext};
use crate::task::{CancelHook, CancelToken, Task, TaskId, Work};
use std::fmt;

type Body<R> = Box<dyn FnOnce(&CancelToken) -> R + Send + 'static>;
type After<R> = Box<dyn FnOnce(R) + Send + 'static>;

/// Task whose work is bracketed by front-context hooks
pub struct AsyncTask<R> {
    id: TaskId,
    before: Option<FrontCallback>,
    body: Body<R>,
    after: Option<After<R>>,
    on_cancel: Option<CancelHook>,
}

impl<R: Send + 'static> AsyncTask<R> {
    /// Create a task with the given worker body and no-op hooks
    pub fn new<F>(id: TaskId, body: F) -> Self
    where
        F: FnOnce(&CancelToken) -> R + Send + 'static,
    {
        Self {
            id,
            before: None,
            body: Box::new(body),
            after: None,
            on_cancel: None,
        }
    }

    /// Set the hook posted to the front context before the body runs
    pub fn before<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.before = Some(Box::new(hook));
        self
    }

    /// Set the hook posted to the front context with the body's result
    pub fn after<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(R) + Send + 'static,
    {
        self.after = Some(Box::new(hook));
        self
    }

    /// Set the hook called when the task is cancelled mid-flight.
    ///
    /// The hook runs on the thread that called `remove`, concurrently with the
    /// body, and must not block. Aborting an owned subprocess is the typical use.
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
}

impl<R: Send + 'static> From<AsyncTask<R>> for Task {
    fn from(task: AsyncTask<R>) -> Task {
        let AsyncTask {
            id,
            before,
            body,
            after,
            on_cancel,
        } = task;

        let staged = move |token: &CancelToken, front: &dyn FrontContext| {
            if let Some(before) = before {
                front.post(before);
            }
            let result = body(token);
            if let Some(after) = after {
                front.post(Box::new(move || after(result)));
            }
        };

        Task::from_work(id, Work::Staged(Box::new(staged)), on_cancel)
    }
}

impl<R> fmt::Debug for AsyncTask<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncTask")
            .field("id", &self.id)
            .field("before", &self.before.is_some())
            .field("after", &self.after.is_some())
            .field("on_cancel", &self.on_cancel.is_some())
            .finish()
    }
}
