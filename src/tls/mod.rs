//! TLS over channels.
//!
//! - [`handler`]: [`SslHandler`], the adapter between a channel and a session
//! - [`engine`]: [`TlsEngine`] and its rustls implementation
//! - [`config`]: ready-made rustls configurations

pub mod config;
pub mod engine;
pub mod handler;

pub use config::{client_config, default_client_config, server_config};
pub use engine::{CipherIo, HandshakeStatus, RustlsEngine, TlsEngine};
pub use handler::{SslHandler, SslObserver};
pub use rustls;
