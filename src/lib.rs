//! Event-driven TCP networking without an async runtime.
//!
//! The crate is a small reactor plus the channel types built on it. Each
//! [`EventLoop`] runs on one dedicated thread and merges timer deadlines and
//! socket readiness into a single blocking wait. Channels register with a
//! loop and report back through a [`ChannelObserver`].
//!
//! # Architecture
//!
//! - **Timer queue**: min-heap of timed tasks ([`timer`], [`utils::heap`])
//! - **Buffers**: [`ByteBuffer`] for I/O staging, [`CircularBuffer`] for
//!   queued writes
//! - **Selector**: descriptor registry over epoll or kqueue ([`reactor`])
//! - **EventLoop**: the worker thread driving timers and readiness
//! - **Channels**: [`ClientChannel`] and [`ServerChannel`] ([`net`])
//! - **TLS**: [`SslHandler`](tls::SslHandler) layers rustls over a channel
//!   ([`tls`])
//!
//! # Example
//! ```ignore
//! struct Printer;
//!
//! impl ChannelObserver for Printer {
//!     fn on_connect(&self, client: &ClientChannel, host: &str, port: u16) {
//!         client.write(b"ping", None);
//!     }
//!
//!     fn on_read(&self, _client: &ClientChannel, buffer: ByteBuffer) {
//!         println!("{:?}", buffer.readable_bytes());
//!     }
//! }
//!
//! let observer = Arc::new(Printer);
//! let client = ClientChannel::new(&observer)?;
//! client.connect("127.0.0.1", 7000);
//! ```

pub mod buffer;
pub mod builder;
pub mod error;
pub mod net;
pub mod reactor;
pub mod timer;
pub mod tls;
pub mod utils;

pub use buffer::{ByteBuffer, CircularBuffer, Endian};
pub use builder::{ChannelOptions, EventLoopBuilder};
pub use error::{ChannelError, TlsError};
pub use net::{
    ChannelObserver, ChannelState, ClientChannel, IpDetector, ServerChannel, SocketAddress,
    UserInfo,
};
pub use reactor::{EventLoop, Interest, Selectable, Selector};
pub use timer::TimerHandle;
