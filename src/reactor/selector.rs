//! Readiness multiplexer.
//!
//! The [`Selector`] owns the OS poller and the map from file descriptor to
//! the [`Selectable`] that registered it. One wait call coalesces every
//! readiness bit reported for a descriptor into a single
//! [`Selectable::on_events`] callback.
//!
//! Every registration gets a fresh generation number that travels with the
//! descriptor through the poller. An event whose generation no longer
//! matches the registry belongs to a descriptor that was closed and its
//! number reused, so it is dropped.

use super::event::Interest;
use super::poller::{Events, Poller};

use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;
use std::sync::Arc;
use std::time::Duration;
use tracing::{trace, warn};

/// Anything that owns a descriptor and wants readiness callbacks.
pub trait Selectable: Send + Sync {
    /// Called on the loop thread with the union of everything reported for
    /// the descriptor during one wait.
    fn on_events(self: Arc<Self>, events: Interest);
}

struct Registration {
    selectable: Arc<dyn Selectable>,
    interest: Interest,
    generation: u32,
}

#[derive(Default)]
struct Registry {
    entries: HashMap<RawFd, Registration>,
    next_generation: u32,
}

pub struct Selector {
    poller: Poller,
    registry: Mutex<Registry>,
    events: Mutex<Events>,
}

impl Selector {
    /// Creates a selector whose event buffer starts at `capacity` entries.
    pub fn new(capacity: usize) -> io::Result<Self> {
        Ok(Self {
            poller: Poller::new()?,
            registry: Mutex::new(Registry::default()),
            events: Mutex::new(Events::with_capacity(capacity.max(1))),
        })
    }

    /// Adds `fd` to the watch set.
    ///
    /// # Panics
    /// Panics if `fd` is negative.
    pub fn register(
        &self,
        fd: RawFd,
        selectable: Arc<dyn Selectable>,
        interest: Interest,
    ) -> io::Result<()> {
        assert!(fd >= 0, "cannot register invalid descriptor {fd}");

        let mut registry = self.registry.lock();
        let generation = registry.next_generation;
        self.poller.add(fd, generation, interest)?;
        registry.next_generation = generation.wrapping_add(1);
        registry.entries.insert(
            fd,
            Registration {
                selectable,
                interest,
                generation,
            },
        );

        trace!(fd, generation, ?interest, "registered");
        Ok(())
    }

    /// Removes `fd` from the watch set. Events already collected for it are
    /// not delivered.
    pub fn deregister(&self, fd: RawFd) -> io::Result<()> {
        let removed = self.registry.lock().entries.remove(&fd);
        if removed.is_none() {
            return Ok(());
        }

        trace!(fd, "deregistered");
        self.poller.delete(fd)
    }

    /// Toggles write interest, leaving read interest alone.
    pub fn enable_writable(&self, fd: RawFd, enabled: bool) -> io::Result<()> {
        self.toggle(fd, Interest::WRITE, enabled)
    }

    /// Toggles read interest, leaving write interest alone.
    pub fn enable_readable(&self, fd: RawFd, enabled: bool) -> io::Result<()> {
        self.toggle(fd, Interest::READ, enabled)
    }

    fn toggle(&self, fd: RawFd, bit: Interest, enabled: bool) -> io::Result<()> {
        let mut registry = self.registry.lock();
        let Some(registration) = registry.entries.get_mut(&fd) else {
            return Ok(());
        };

        let interest = if enabled {
            registration.interest.with(bit)
        } else {
            registration.interest.without(bit)
        };

        if interest != registration.interest {
            self.poller.modify(fd, registration.generation, interest)?;
            registration.interest = interest;
        }

        Ok(())
    }

    /// Makes a blocked [`Selector::wait_for_events`] return.
    pub fn wakeup(&self) -> io::Result<()> {
        self.poller.wake()
    }

    /// Blocks for at most `timeout`, then dispatches one callback per ready
    /// descriptor. Returns how many descriptors were ready.
    pub fn wait_for_events(&self, timeout: Duration) -> io::Result<usize> {
        let ready = {
            let mut events = self.events.lock();

            match self.poller.wait(&mut events, timeout) {
                Err(error) if error.kind() == io::ErrorKind::Interrupted => return Ok(0),
                Err(error) => return Err(error),
                Ok(()) => {}
            }

            let mut ready: HashMap<(RawFd, u32), Interest> = HashMap::new();
            for (fd, generation, interest) in events.iter() {
                *ready.entry((fd, generation)).or_default() |= interest;
            }

            if events.len() == events.capacity() {
                events.grow();
                trace!(capacity = events.capacity(), "event buffer grown");
            }

            ready
        };

        let count = ready.len();
        for ((fd, generation), interest) in ready {
            // Looked up again so a descriptor deregistered by an earlier
            // callback of this batch, or reused since, is skipped.
            let selectable = self
                .registry
                .lock()
                .entries
                .get(&fd)
                .filter(|registration| registration.generation == generation)
                .map(|registration| registration.selectable.clone());

            match selectable {
                Some(selectable) => selectable.on_events(interest),
                None => trace!(fd, generation, "stale event dropped"),
            }
        }

        Ok(count)
    }

    /// Interest currently registered for `fd`.
    pub fn interest(&self, fd: RawFd) -> Option<Interest> {
        self.registry
            .lock()
            .entries
            .get(&fd)
            .map(|registration| registration.interest)
    }

    /// Number of registered descriptors.
    pub fn registered(&self) -> usize {
        self.registry.lock().entries.len()
    }

    /// Drops every registration.
    pub fn clean(&self) {
        let registry = std::mem::take(&mut self.registry.lock().entries);

        for fd in registry.keys() {
            if let Err(error) = self.poller.delete(*fd) {
                warn!(fd, %error, "failed to remove descriptor");
            }
        }

        drop(registry);
    }
}
