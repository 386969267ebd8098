//! Fluent builders for event loops and channels.

use crate::buffer::DEFAULT_CAPACITY;
use crate::reactor::EventLoop;

use std::io;
use std::time::Duration;

const DEFAULT_NAME: &str = "sockloop";
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(600);
const DEFAULT_EVENTS_CAPACITY: usize = 16;
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_BACKLOG: i32 = 128;

/// Builder for [`EventLoop`] instances.
///
/// # Example
/// ```ignore
/// let event_loop = EventLoopBuilder::new()
///     .name("network")
///     .idle_timeout(Duration::from_secs(30))
///     .start()?;
/// ```
#[derive(Debug, Clone)]
pub struct EventLoopBuilder {
    name: String,
    idle_timeout: Duration,
    events_capacity: usize,
}

impl Default for EventLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoopBuilder {
    pub fn new() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            events_capacity: DEFAULT_EVENTS_CAPACITY,
        }
    }

    /// Name given to the worker thread.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Longest the loop sleeps when no timer is pending.
    pub fn idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Initial size of the selector's event buffer. It doubles on demand.
    pub fn events_capacity(mut self, capacity: usize) -> Self {
        self.events_capacity = capacity.max(1);
        self
    }

    /// Builds a loop that is not running yet.
    pub fn build(self) -> io::Result<EventLoop> {
        EventLoop::with_config(self.name, self.idle_timeout, self.events_capacity)
    }

    /// Builds a loop and starts its worker thread.
    pub fn start(self) -> io::Result<EventLoop> {
        let event_loop = self.build()?;
        event_loop.startup()?;

        Ok(event_loop)
    }
}

/// Tunables shared by client and server channels.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use sockloop::ChannelOptions;
///
/// let options = ChannelOptions::default()
///     .connect_timeout(Duration::from_secs(5))
///     .receive_capacity(4096);
///
/// assert_eq!(options.backlog, 128);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOptions {
    /// Used by [`ClientChannel::connect`](crate::ClientChannel::connect).
    pub connect_timeout: Duration,
    /// Size of the buffer each read lands in.
    pub receive_capacity: usize,
    /// Listen backlog of a server socket.
    pub backlog: i32,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            receive_capacity: DEFAULT_CAPACITY,
            backlog: DEFAULT_BACKLOG,
        }
    }
}

impl ChannelOptions {
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn receive_capacity(mut self, capacity: usize) -> Self {
        self.receive_capacity = capacity.max(1);
        self
    }

    pub fn backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }
}
