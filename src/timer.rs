//! Timed tasks for the event loop.
//!
//! Every piece of work submitted to an [`EventLoop`](crate::EventLoop) becomes a
//! [`Task`] stored in a min-heap ordered by its next fire time. The loop asks
//! the queue how long it may sleep ([`TimerQueue::next_timeout`]) and, after
//! waking, collects everything that is due ([`TimerQueue::take_expired`]).
//! Collected work is returned as [`Runnable`]s so the caller can run user
//! code after releasing the lock that protects the queue.
//!
//! Callers only ever get a [`TimerHandle`] back. It can cancel the task but
//! can never put it back into the heap.

use crate::utils::heap::Heap;

use std::cmp::Ordering;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::time::{Duration, Instant};

// Stand-in for delays whose deadline `Instant` cannot represent, such as
// `Duration::MAX`.
const MAX_DELAY: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

fn deadline(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay).unwrap_or_else(|| now + MAX_DELAY)
}

/// Cancellation handle for a scheduled task.
///
/// Cancelling only flips a flag: the task is dropped the next time the loop
/// would have fired it. A task that is already running is not interrupted.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, AtomicOrdering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(AtomicOrdering::Acquire)
    }
}

enum Work {
    Once(Box<dyn FnOnce() + Send>),
    Repeat {
        interval: Duration,
        action: Arc<dyn Fn() + Send + Sync>,
    },
}

/// A pending timer entry.
///
/// Tasks compare by fire time first and by submission sequence second, so
/// two submissions due at the same instant run in the order they were made.
pub(crate) struct Task {
    fire_at: Instant,
    sequence: u64,
    cancelled: Arc<AtomicBool>,
    work: Work,
}

impl Task {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(AtomicOrdering::Acquire)
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Task {}

impl PartialOrd for Task {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Task {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fire_at
            .cmp(&other.fire_at)
            .then(self.sequence.cmp(&other.sequence))
    }
}

/// Work that became due, detached from the heap.
pub(crate) struct Runnable {
    cancelled: Arc<AtomicBool>,
    action: Action,
}

enum Action {
    Once(Box<dyn FnOnce() + Send>),
    Repeat(Arc<dyn Fn() + Send + Sync>),
}

impl Runnable {
    /// Runs the action unless the task was cancelled after being collected.
    pub(crate) fn run(self) {
        if self.cancelled.load(AtomicOrdering::Acquire) {
            return;
        }

        match self.action {
            Action::Once(work) => work(),
            Action::Repeat(work) => work(),
        }
    }
}

/// Heap of pending tasks.
#[derive(Default)]
pub(crate) struct TimerQueue {
    heap: Heap<Task>,
    next_sequence: u64,
}

impl TimerQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Schedules `work` to run once, `delay` from now.
    pub(crate) fn push_once(
        &mut self,
        delay: Duration,
        work: Box<dyn FnOnce() + Send>,
    ) -> TimerHandle {
        self.push(delay, Work::Once(work))
    }

    /// Schedules `action` to run every `interval`, first after one interval.
    pub(crate) fn push_repeating(
        &mut self,
        interval: Duration,
        action: Arc<dyn Fn() + Send + Sync>,
    ) -> TimerHandle {
        self.push(interval, Work::Repeat { interval, action })
    }

    fn push(&mut self, delay: Duration, work: Work) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        self.heap.push(Task {
            fire_at: deadline(Instant::now(), delay),
            sequence,
            cancelled: cancelled.clone(),
            work,
        });

        TimerHandle { cancelled }
    }

    /// Time left before the earliest task is due, zero if it is overdue.
    pub(crate) fn next_timeout(&self, now: Instant) -> Option<Duration> {
        self.heap
            .peek()
            .map(|task| task.fire_at.saturating_duration_since(now))
    }

    /// Collects every task due at `now`.
    ///
    /// One-shot tasks leave the heap. Repeating tasks get a new fire time
    /// one interval from `now` and stay at their place in the heap. Cancelled
    /// tasks are dropped without being collected.
    pub(crate) fn take_expired(&mut self, now: Instant) -> Vec<Runnable> {
        let mut fired = Vec::new();

        loop {
            let Some(task) = self.heap.peek_mut() else {
                break;
            };

            if task.fire_at > now {
                break;
            }

            if !task.is_cancelled()
                && let Work::Repeat { interval, action } = &task.work
            {
                let action = Action::Repeat(action.clone());
                task.fire_at = deadline(now, *interval);
                task.sequence = self.next_sequence;
                self.next_sequence += 1;

                fired.push(Runnable {
                    cancelled: task.cancelled.clone(),
                    action,
                });
                self.heap.heapify_root();
                continue;
            }

            if let Some(task) = self.heap.pop()
                && !task.is_cancelled()
                && let Work::Once(work) = task.work
            {
                fired.push(Runnable {
                    cancelled: task.cancelled,
                    action: Action::Once(work),
                });
            }
        }

        fired
    }

    /// Number of tasks that have not been cancelled.
    pub(crate) fn active(&self) -> usize {
        self.heap.iter().filter(|task| !task.is_cancelled()).count()
    }

    /// Empties the queue, handing the tasks back so they can be dropped
    /// outside of any lock.
    pub(crate) fn drain(&mut self) -> Heap<Task> {
        std::mem::take(&mut self.heap)
    }
}
