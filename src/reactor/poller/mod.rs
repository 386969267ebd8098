//! OS readiness backends.
//!
//! Both backends expose the same `Poller`/`Events` pair: epoll with an
//! eventfd on Linux, kqueue with an `EVFILT_USER` event on the BSDs.

#[cfg(any(target_os = "linux", target_os = "android"))]
mod epoll;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub(crate) use epoll::{Events, Poller};

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
mod kqueue;
#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
pub(crate) use kqueue::{Events, Poller};
