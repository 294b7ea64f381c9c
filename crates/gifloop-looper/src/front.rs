//! Front context: the single thread that owns presentation state
//!
//! The looper never touches front-owned state itself. It posts `before` and
//! `after` hooks through [`FrontContext::post`], and whoever implements the
//! trait runs them in post order on one thread distinct from the worker.
//!
//! [`FrontLoop`] is the built-in implementation: a channel whose receiving end
//! is pumped by the owning thread (a terminal UI loop, or a test).

use crate::error::FrontError;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::cell::Cell;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Callback executed on the front thread
pub type FrontCallback = Box<dyn FnOnce() + Send + 'static>;

/// Sink for callbacks that must run on the front thread
pub trait FrontContext: Send + Sync {
    /// Queue `callback` to run on the front thread after everything posted before it
    fn post(&self, callback: FrontCallback);
}

impl<T: FrontContext + ?Sized> FrontContext for Arc<T> {
    fn post(&self, callback: FrontCallback) {
        (**self).post(callback)
    }
}

enum Message {
    Run(FrontCallback),
    Exit,
}

/// Cloneable posting side of a [`FrontLoop`]
#[derive(Clone)]
pub struct FrontHandle {
    sender: Sender<Message>,
}

impl FrontHandle {
    /// Ask the loop to stop once it reaches this point in the queue
    pub fn exit(&self) {
        let _ = self.sender.send(Message::Exit);
    }
}

impl FrontContext for FrontHandle {
    fn post(&self, callback: FrontCallback) {
        if self.sender.send(Message::Run(callback)).is_err() {
            tracing::trace!("front loop dropped; discarding callback");
        }
    }
}

/// Receiving side of the front channel, owned by the front thread
pub struct FrontLoop {
    receiver: Receiver<Message>,
    exited: Cell<bool>,
}

impl FrontLoop {
    /// Create a connected handle/loop pair
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (FrontHandle, FrontLoop) {
        let (sender, receiver) = channel::unbounded();
        (
            FrontHandle { sender },
            FrontLoop {
                receiver,
                exited: Cell::new(false),
            },
        )
    }

    /// Whether an exit request has been processed
    pub fn is_exited(&self) -> bool {
        self.exited.get()
    }

    /// Run at most one callback, waiting up to `timeout` for it.
    ///
    /// Returns `Ok(true)` if a callback ran and `Ok(false)` on timeout.
    pub fn run_once(&self, timeout: Duration) -> Result<bool, FrontError> {
        if self.exited.get() {
            return Err(FrontError::Exited);
        }
        match self.receiver.recv_timeout(timeout) {
            Ok(message) => self.dispatch(message).map(|_| true),
            Err(RecvTimeoutError::Timeout) => Ok(false),
            Err(RecvTimeoutError::Disconnected) => Err(FrontError::Disconnected),
        }
    }

    /// Run every callback already queued without blocking; returns how many ran
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while !self.exited.get() {
            match self.receiver.try_recv() {
                Ok(message) => {
                    if self.dispatch(message).is_ok() {
                        ran += 1;
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        ran
    }

    /// Pump callbacks until `done` holds, checking it before each wait.
    ///
    /// A timeout too large to represent as an instant waits without limit.
    pub fn run_until<P>(&self, mut done: P, timeout: Duration) -> Result<(), FrontError>
    where
        P: FnMut() -> bool,
    {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            if done() {
                return Ok(());
            }
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => Duration::MAX,
            };
            if remaining.is_zero() {
                return Err(FrontError::Timeout);
            }
            self.run_once(remaining)?;
        }
    }

    /// Pump callbacks until [`FrontHandle::exit`] is seen or every handle is dropped
    pub fn run(&self) {
        while !self.exited.get() {
            match self.receiver.recv() {
                Ok(message) => {
                    let _ = self.dispatch(message);
                }
                Err(_) => break,
            }
        }
    }

    fn dispatch(&self, message: Message) -> Result<(), FrontError> {
        match message {
            Message::Run(callback) => {
                callback();
                Ok(())
            }
            Message::Exit => {
                self.exited.set(true);
                Err(FrontError::Exited)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::thread;

    #[test]
    fn test_callbacks_run_in_post_order() {
        let (handle, front) = FrontLoop::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let seen = seen.clone();
            handle.post(Box::new(move || seen.lock().push(i)));
        }
        assert_eq!(front.run_pending(), 5);
        assert_eq!(*seen.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_callbacks_run_on_pumping_thread() {
        let (handle, front) = FrontLoop::new();
        let ran_on = Arc::new(Mutex::new(None));
        let out = ran_on.clone();

        thread::spawn(move || {
            handle.post(Box::new(move || *out.lock() = Some(thread::current().id())));
        })
        .join()
        .unwrap();

        assert!(front.run_once(Duration::from_secs(1)).unwrap());
        assert_eq!(*ran_on.lock(), Some(thread::current().id()));
    }

    #[test]
    fn test_run_once_times_out() {
        let (_handle, front) = FrontLoop::new();
        assert_eq!(front.run_once(Duration::from_millis(10)), Ok(false));
    }

    #[test]
    fn test_disconnect_reported() {
        let (handle, front) = FrontLoop::new();
        drop(handle);
        assert_eq!(
            front.run_once(Duration::from_millis(10)),
            Err(FrontError::Disconnected)
        );
    }

    #[test]
    fn test_exit_stops_run() {
        let (handle, front) = FrontLoop::new();
        let count = Arc::new(Mutex::new(0));
        let c = count.clone();
        handle.post(Box::new(move || *c.lock() += 1));
        handle.exit();
        let c = count.clone();
        handle.post(Box::new(move || *c.lock() += 1));

        front.run();
        assert!(front.is_exited());
        assert_eq!(*count.lock(), 1);
        assert_eq!(front.run_once(Duration::ZERO), Err(FrontError::Exited));
    }

    #[test]
    fn test_run_until_times_out() {
        let (_handle, front) = FrontLoop::new();
        let result = front.run_until(|| false, Duration::from_millis(20));
        assert_eq!(result, Err(FrontError::Timeout));
    }

    #[test]
    fn test_run_until_unbounded_timeout() {
        let (handle, front) = FrontLoop::new();
        assert_eq!(front.run_until(|| true, Duration::MAX), Ok(()));

        let flag = Arc::new(Mutex::new(false));
        let f = flag.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            handle.post(Box::new(move || *f.lock() = true));
        });
        assert_eq!(front.run_until(|| *flag.lock(), Duration::MAX), Ok(()));
    }
}
