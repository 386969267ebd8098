//! TCP listening channel.

use super::address::{SocketAddress, resolve};
use super::client::ClientChannel;
use super::observer::ChannelObserver;
use super::socket::Socket;
use crate::builder::{ChannelOptions, EventLoopBuilder};
use crate::error::ChannelError;
use crate::reactor::{EventLoop, Interest, Selectable};
use crate::utils::sys::is_transient;

use parking_lot::Mutex;
use std::fmt;
use std::io;
use std::os::fd::RawFd;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, warn};

// How long the listener stops polling after an accept error that retrying
// right away would only repeat, such as running out of descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

struct ServerInner {
    event_loop: EventLoop,
    options: ChannelOptions,
    observer: Weak<dyn ChannelObserver>,
    socket: Mutex<Option<Socket>>,
}

/// Listens for connections and hands each one to the observer as a
/// connected [`ClientChannel`].
///
/// The server and every channel it accepts share one event loop, owned by
/// the server.
///
/// # Example
/// ```ignore
/// let observer = Arc::new(EchoObserver::default());
/// let server = ServerChannel::new(&observer)?;
/// server.start("127.0.0.1", 0)?;
///
/// println!("listening on {}", server.local_address().unwrap());
/// ```
#[derive(Clone)]
pub struct ServerChannel {
    inner: Arc<ServerInner>,
}

impl ServerChannel {
    pub fn new<O>(observer: &Arc<O>) -> io::Result<Self>
    where
        O: ChannelObserver + 'static,
    {
        Self::with_options(observer, ChannelOptions::default())
    }

    /// Creates a server with its own started loop. Accepted channels inherit
    /// `options`.
    pub fn with_options<O>(observer: &Arc<O>, options: ChannelOptions) -> io::Result<Self>
    where
        O: ChannelObserver + 'static,
    {
        let event_loop = EventLoopBuilder::new().name("sockloop-server").start()?;
        let observer = Arc::downgrade(observer);
        let observer: Weak<dyn ChannelObserver> = observer;

        Ok(Self {
            inner: Arc::new(ServerInner {
                event_loop,
                options,
                observer,
                socket: Mutex::new(None),
            }),
        })
    }

    /// Binds to the first address `host` resolves to and starts accepting.
    ///
    /// # Arguments
    /// * `host` - Host name or textual IP to bind to
    /// * `port` - Port to bind; `0` picks an ephemeral one
    ///
    /// # Returns
    /// `Ok(())` once listening, or the reason the socket could not be set up.
    /// Starting a server that already listens fails with
    /// [`ChannelError::Unknown`].
    pub fn start(&self, host: &str, port: u16) -> Result<(), ChannelError> {
        let mut slot = self.inner.socket.lock();
        if slot.is_some() {
            return Err(ChannelError::Unknown);
        }

        let address = resolve(host, port)?[0];
        let socket = listen(&address, self.inner.options.backlog)?;
        let fd = socket.raw_fd();

        let selectable: Arc<dyn Selectable> = self.inner.clone();
        self.inner
            .event_loop
            .selector()
            .register(fd, selectable, Interest::READ)
            .map_err(|error| ChannelError::socket("failed to register listener", &error))?;

        *slot = Some(socket);

        debug!(fd, %address, "listening");
        Ok(())
    }

    /// Stops the loop and closes the listening socket. Channels accepted by
    /// this server lose their loop with it.
    ///
    /// # Panics
    /// Panics when called from the server's own loop thread.
    pub fn shutdown(&self) {
        self.inner.event_loop.shutdown();

        let socket = self.inner.socket.lock().take();
        if let Some(socket) = socket {
            debug!(fd = socket.raw_fd(), "listener closed");
        }
    }

    pub fn local_address(&self) -> Option<SocketAddress> {
        self.inner.socket.lock().as_ref()?.local_address().ok()
    }

    pub fn is_listening(&self) -> bool {
        self.inner.socket.lock().is_some()
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.inner.event_loop
    }

    fn on_acceptable(&self) {
        let (listener_fd, accepted) = {
            let slot = self.inner.socket.lock();
            let Some(listener) = slot.as_ref() else {
                return;
            };

            (listener.raw_fd(), listener.accept())
        };

        let socket = match accepted {
            Ok(socket) => socket,
            Err(error) if is_transient(&error) => return,
            Err(error) if error.raw_os_error() == Some(libc::ECONNABORTED) => return,
            Err(error) => {
                warn!(%error, backoff = ?ACCEPT_BACKOFF, "accept failed");
                self.pause_accepting(listener_fd);
                self.report_error(ChannelError::socket("accept failed", &error));
                return;
            }
        };
        let fd = socket.raw_fd();

        let client = ClientChannel::accepted(
            self.inner.observer.clone(),
            &self.inner.event_loop,
            self.inner.options.clone(),
            socket,
        );

        if let Err(error) = client.register_accepted() {
            warn!(fd, %error, "failed to register accepted socket");
            self.report_error(ChannelError::socket("failed to register accepted socket", &error));
            return;
        }

        debug!(fd, "accepted");
        if let Some(observer) = self.inner.observer.upgrade() {
            observer.on_accept(self, &client);
        }
    }

    /// Stops read interest on the listener and restores it after
    /// [`ACCEPT_BACKOFF`], unless the listener was closed in between.
    fn pause_accepting(&self, listener_fd: RawFd) {
        let selector = self.inner.event_loop.selector();
        if let Err(error) = selector.enable_readable(listener_fd, false) {
            warn!(fd = listener_fd, %error, "failed to pause listener");
            return;
        }

        let inner = Arc::downgrade(&self.inner);
        self.inner.event_loop.execute_after(ACCEPT_BACKOFF, move || {
            let Some(inner) = inner.upgrade() else {
                return;
            };

            let listening = inner
                .socket
                .lock()
                .as_ref()
                .is_some_and(|socket| socket.raw_fd() == listener_fd);
            if !listening {
                return;
            }

            if let Err(error) = inner.event_loop.selector().enable_readable(listener_fd, true) {
                warn!(fd = listener_fd, %error, "failed to resume listener");
            }
        });
    }

    fn report_error(&self, error: ChannelError) {
        if let Some(observer) = self.inner.observer.upgrade() {
            observer.on_server_error(self, &error);
        }
    }
}

impl Selectable for ServerInner {
    fn on_events(self: Arc<Self>, _events: Interest) {
        ServerChannel { inner: self }.on_acceptable();
    }
}

impl Drop for ServerInner {
    fn drop(&mut self) {
        if self.event_loop.is_running() && !self.event_loop.in_current() {
            self.event_loop.shutdown();
        }
    }
}

impl fmt::Debug for ServerChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerChannel")
            .field("local_address", &self.local_address())
            .finish()
    }
}

fn listen(address: &SocketAddress, backlog: i32) -> Result<Socket, ChannelError> {
    let socket = Socket::new(address.family())
        .map_err(|error| ChannelError::socket("failed to open socket", &error))?;

    socket
        .set_reuse_addr()
        .map_err(|error| ChannelError::socket("failed to enable address reuse", &error))?;
    socket
        .bind(address)
        .map_err(|error| ChannelError::socket("bind failed", &error))?;
    socket
        .listen(backlog)
        .map_err(|error| ChannelError::socket("listen failed", &error))?;
    socket
        .set_nonblocking()
        .map_err(|error| ChannelError::socket("failed to make socket non-blocking", &error))?;

    Ok(socket)
}
