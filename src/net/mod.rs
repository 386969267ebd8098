//! Channels: the TCP layer on top of the reactor.
//!
//! - [`client`]: [`ClientChannel`], the connect/read/write/heartbeat state machine
//! - [`server`]: [`ServerChannel`], listening and accepting
//! - [`observer`]: [`ChannelObserver`], how channels report back
//! - [`address`]: [`SocketAddress`] and host resolution
//! - [`ip_detector`]: [`IpDetector`], watches a local address
//!
//! # Example
//!
//! ```ignore
//! struct Echo;
//!
//! impl ChannelObserver for Echo {
//!     fn on_read(&self, client: &ClientChannel, buffer: ByteBuffer) {
//!         client.write(buffer, None);
//!     }
//! }
//!
//! let observer = Arc::new(Echo);
//! let server = ServerChannel::new(&observer)?;
//! server.start("0.0.0.0", 7000)?;
//! ```
//!
//! [`ClientChannel`]: client::ClientChannel
//! [`ServerChannel`]: server::ServerChannel
//! [`ChannelObserver`]: observer::ChannelObserver
//! [`SocketAddress`]: address::SocketAddress
//! [`IpDetector`]: ip_detector::IpDetector

pub mod address;
pub mod client;
pub mod ip_detector;
pub mod observer;
pub mod server;
pub(crate) mod socket;

pub use address::{Family, SocketAddress, resolve};
pub use client::{ChannelState, ClientChannel};
pub use ip_detector::{IpDetector, is_local_ip};
pub use observer::{ChannelObserver, UserInfo};
pub use server::ServerChannel;
