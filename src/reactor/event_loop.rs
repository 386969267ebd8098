//! Single-threaded reactor.
//!
//! An [`EventLoop`] owns one [`Selector`] and one timer queue and drives both
//! from a dedicated worker thread. Each iteration sleeps in the selector for
//! at most the time left before the earliest timer, dispatches the I/O that
//! became ready, then runs every timer that came due.
//!
//! Any thread may submit work. Submissions from outside the loop thread
//! wake the selector so the new work is not delayed by a long wait.

use super::selector::Selector;
use crate::builder::EventLoopBuilder;
use crate::timer::{TimerHandle, TimerQueue};

use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

struct Shared {
    name: String,
    idle_timeout: Duration,
    selector: Selector,
    timers: Mutex<TimerQueue>,
    running: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: Mutex<Option<ThreadId>>,
}

/// Handle to a reactor. Clones share the same loop.
///
/// # Example
/// ```ignore
/// let event_loop = EventLoop::new()?;
/// event_loop.startup()?;
///
/// event_loop.execute(|| println!("on the loop thread"));
/// event_loop.execute_after(Duration::from_secs(1), || println!("a second later"));
///
/// event_loop.shutdown();
/// ```
#[derive(Clone)]
pub struct EventLoop {
    shared: Arc<Shared>,
}

impl EventLoop {
    /// Creates a stopped loop with the default configuration.
    pub fn new() -> io::Result<Self> {
        EventLoopBuilder::new().build()
    }

    pub(crate) fn with_config(
        name: String,
        idle_timeout: Duration,
        events_capacity: usize,
    ) -> io::Result<Self> {
        Ok(Self {
            shared: Arc::new(Shared {
                name,
                idle_timeout,
                selector: Selector::new(events_capacity)?,
                timers: Mutex::new(TimerQueue::new()),
                running: AtomicBool::new(false),
                worker: Mutex::new(None),
                worker_id: Mutex::new(None),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Spawns the worker thread.
    ///
    /// # Panics
    /// Panics if the loop is already running.
    pub fn startup(&self) -> io::Result<()> {
        let mut worker_id = self.shared.worker_id.lock();
        assert!(
            !self.is_running(),
            "event loop `{}` is already running",
            self.shared.name
        );

        self.shared.running.store(true, Ordering::Release);

        let event_loop = self.clone();
        let spawned = thread::Builder::new()
            .name(self.shared.name.clone())
            .spawn(move || event_loop.run());

        let worker = match spawned {
            Ok(worker) => worker,
            Err(error) => {
                self.shared.running.store(false, Ordering::Release);
                return Err(error);
            }
        };

        *worker_id = Some(worker.thread().id());
        *self.shared.worker.lock() = Some(worker);

        debug!(name = %self.shared.name, "event loop started");
        Ok(())
    }

    /// Stops the worker thread and joins it. Pending timers are dropped
    /// without running and every selector registration is released.
    ///
    /// # Panics
    /// Panics when called from the loop's own thread, which could never be
    /// joined.
    pub fn shutdown(&self) {
        assert!(
            !self.in_current(),
            "event loop `{}` cannot be shut down from its own thread",
            self.shared.name
        );

        self.shared.running.store(false, Ordering::Release);
        self.wakeup();

        let worker = self.shared.worker.lock().take();
        if let Some(worker) = worker
            && worker.join().is_err()
        {
            warn!(name = %self.shared.name, "event loop thread panicked");
        }
        *self.shared.worker_id.lock() = None;

        let pending = self.shared.timers.lock().drain();
        debug!(
            name = %self.shared.name,
            discarded = pending.len(),
            "event loop stopped"
        );
        drop(pending);

        self.shared.selector.clean();
    }

    /// Runs `work` on the loop thread: inline when already there, otherwise
    /// as soon as the loop wakes up.
    pub fn execute<F>(&self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.in_current() {
            work();
            return;
        }

        self.shared
            .timers
            .lock()
            .push_once(Duration::ZERO, Box::new(work));
        self.wakeup();
    }

    /// Runs `work` once on the loop thread after `delay`.
    ///
    /// # Arguments
    /// * `delay` - Time to wait before running
    /// * `work` - The action to run
    ///
    /// # Returns
    /// A handle that cancels the task if it has not run yet
    pub fn execute_after<F>(&self, delay: Duration, work: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = self.shared.timers.lock().push_once(delay, Box::new(work));

        if !self.in_current() {
            self.wakeup();
        }

        handle
    }

    /// Runs `work` on the loop thread every `interval`, the first time one
    /// interval from now, until the returned handle is cancelled.
    ///
    /// # Panics
    /// Panics if `interval` is zero.
    pub fn execute_timer<F>(&self, interval: Duration, work: F) -> TimerHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        assert!(!interval.is_zero(), "timer interval must not be zero");

        let handle = self
            .shared
            .timers
            .lock()
            .push_repeating(interval, Arc::new(work));

        if !self.in_current() {
            self.wakeup();
        }

        handle
    }

    /// True when called from the loop's worker thread.
    pub fn in_current(&self) -> bool {
        *self.shared.worker_id.lock() == Some(thread::current().id())
    }

    /// # Panics
    /// Panics when not called from the loop's worker thread.
    pub fn assert_current(&self) {
        assert!(
            self.in_current(),
            "not on the thread of event loop `{}`",
            self.shared.name
        );
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Number of scheduled tasks that have not been cancelled.
    pub fn pending_tasks(&self) -> usize {
        self.shared.timers.lock().active()
    }

    pub fn selector(&self) -> &Selector {
        &self.shared.selector
    }

    fn wakeup(&self) {
        if let Err(error) = self.shared.selector.wakeup() {
            warn!(name = %self.shared.name, %error, "failed to wake event loop");
        }
    }

    fn run(&self) {
        while self.is_running() {
            let timeout = self
                .shared
                .timers
                .lock()
                .next_timeout(Instant::now())
                .unwrap_or(self.shared.idle_timeout);

            if let Err(error) = self.shared.selector.wait_for_events(timeout) {
                warn!(name = %self.shared.name, %error, "waiting for events failed");
            }

            if !self.is_running() {
                return;
            }

            let fired = self.shared.timers.lock().take_expired(Instant::now());
            if !fired.is_empty() {
                trace!(count = fired.len(), "running timers");
            }

            for task in fired {
                task.run();
            }
        }
    }
}
