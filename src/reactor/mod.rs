//! Event-driven I/O reactor.
//!
//! - [`event`]: readiness interest bits
//! - [`selector`]: descriptor registry over epoll or kqueue
//! - [`event_loop`]: worker thread merging timers and I/O readiness

pub mod event;
pub mod event_loop;
mod poller;
pub mod selector;

pub use event::Interest;
pub use event_loop::EventLoop;
pub use selector::{Selectable, Selector};
