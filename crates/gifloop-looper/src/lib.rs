//! Gifloop Looper - single-worker task scheduling
//!
//! Every user-triggered operation in gifloop runs through a [`Looper`]:
//!
//! - one dedicated worker thread executes tasks strictly one at a time
//! - tasks are ordered by deadline (submission time + delay), ties by submission order
//! - tasks can be removed by [`TaskId`] before they run; removing the id of
//!   the running task cancels it cooperatively through its [`CancelToken`]
//! - [`AsyncTask`] hands `before`/`after` hooks to a single-threaded
//!   [`FrontContext`] so presentation state is only touched from one thread
//!
//! # Example
//!
//! ```ignore
//! use gifloop_looper::{AsyncTask, FrontLoop, Looper, TaskId};
//! use std::time::Duration;
//!
//! const RELOAD: TaskId = TaskId::from_u64(1);
//!
//! let (handle, front) = FrontLoop::new();
//! let looper = Looper::new(handle)?;
//!
//! // Debounce: replace whatever reload is still waiting
//! looper.remove(RELOAD)?;
//! looper.submit(
//!     AsyncTask::new(RELOAD, |_token| expensive_reload())
//!         .after(|info| println!("{}", info)),
//!     Duration::from_millis(500),
//! )?;
//!
//! // Hooks run here, on the thread pumping the front loop
//! front.run();
//! ```

#![warn(missing_docs)]

mod async_task;
mod error;
mod front;
mod looper;
mod queue;
mod task;

pub use async_task::AsyncTask;
pub use error::{FrontError, LooperError, LooperResult};
pub use front::{FrontCallback, FrontContext, FrontHandle, FrontLoop};
pub use looper::{Looper, LooperConfig, LooperStats};
pub use task::{CancelHook, CancelToken, Task, TaskId};
