use super::client::ClientChannel;
use super::server::ServerChannel;
use crate::buffer::ByteBuffer;
use crate::error::ChannelError;

use std::any::Any;

/// Opaque tag attached to a write and handed back when it completes.
pub type UserInfo = Box<dyn Any + Send>;

/// Callbacks through which channels report to the application.
///
/// Every method defaults to doing nothing. Callbacks run on the channel's
/// event loop thread, so they must not block and must not call
/// [`EventLoop::shutdown`](crate::EventLoop::shutdown) on that loop.
/// Channels only keep a weak reference to their observer.
pub trait ChannelObserver: Send + Sync {
    /// A server accepted `client`. It is connected and registered, and no
    /// I/O has happened on it yet.
    fn on_accept(&self, _server: &ServerChannel, _client: &ClientChannel) {}

    fn on_server_error(&self, _server: &ServerChannel, _error: &ChannelError) {}

    fn on_connect(&self, _client: &ClientChannel, _host: &str, _port: u16) {}

    /// The channel is back to idle. `error` is `None` after a voluntary
    /// [`ClientChannel::disconnect`].
    fn on_disconnect(&self, _client: &ClientChannel, _error: Option<&ChannelError>) {}

    fn on_read(&self, _client: &ClientChannel, _buffer: ByteBuffer) {}

    /// A queued write went out completely. The buffer's readable window
    /// holds the bytes of its final send.
    fn on_write(&self, _client: &ClientChannel, _buffer: ByteBuffer, _user_info: Option<UserInfo>) {}

    fn on_heartbeat(&self, _client: &ClientChannel) {}
}
