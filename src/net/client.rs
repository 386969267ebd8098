//! TCP client channel.
//!
//! A [`ClientChannel`] moves through `Idle -> Connecting -> Connected` and
//! back to `Idle` on any disconnect. Public calls only submit work to the
//! channel's [`EventLoop`]; the state machine itself runs on the loop
//! thread, driven by readiness callbacks from the selector.

use super::address::{SocketAddress, resolve};
use super::observer::{ChannelObserver, UserInfo};
use super::socket::Socket;
use crate::buffer::{ByteBuffer, CircularBuffer};
use crate::builder::{ChannelOptions, EventLoopBuilder};
use crate::error::ChannelError;
use crate::reactor::{EventLoop, Interest, Selectable};
use crate::timer::TimerHandle;
use crate::utils::sys::is_transient;

use parking_lot::Mutex;
use std::fmt;
use std::io;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Connection state of a [`ClientChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Connecting,
    Connected,
}

struct PendingWrite {
    buffer: ByteBuffer,
    user_info: Option<UserInfo>,
}

struct Heartbeat {
    interval: Duration,
    reset_on_read: bool,
    reset_on_write: bool,
    timer: TimerHandle,
}

#[derive(Clone, Copy)]
enum Activity {
    Read,
    Write,
}

struct ClientCore {
    state: ChannelState,
    socket: Option<Socket>,
    endpoint: Option<(String, u16)>,
    connect_error: Option<io::Error>,
    connect_timer: Option<TimerHandle>,
    pending: CircularBuffer<PendingWrite>,
    heartbeat: Option<Heartbeat>,
}

impl ClientCore {
    fn new(state: ChannelState, socket: Option<Socket>) -> Self {
        Self {
            state,
            socket,
            endpoint: None,
            connect_error: None,
            connect_timer: None,
            pending: CircularBuffer::new(),
            heartbeat: None,
        }
    }
}

struct ClientInner {
    event_loop: EventLoop,
    owns_loop: bool,
    options: ChannelOptions,
    observer: Weak<dyn ChannelObserver>,
    core: Mutex<ClientCore>,
}

/// Handle to a client connection. Clones share the same channel.
///
/// # Example
/// ```ignore
/// let observer = Arc::new(MyObserver::default());
/// let client = ClientChannel::new(&observer)?;
///
/// client.connect("example.com", 80);
/// client.write(b"GET / HTTP/1.0\r\n\r\n", None);
/// ```
#[derive(Clone)]
pub struct ClientChannel {
    inner: Arc<ClientInner>,
}

enum WriteOutcome {
    Idle,
    Progress,
    Completed(PendingWrite),
    Failed(ChannelError),
}

impl ClientChannel {
    /// Creates an idle channel running on its own, already started, loop.
    pub fn new<O>(observer: &Arc<O>) -> io::Result<Self>
    where
        O: ChannelObserver + 'static,
    {
        Self::with_options(observer, ChannelOptions::default())
    }

    pub fn with_options<O>(observer: &Arc<O>, options: ChannelOptions) -> io::Result<Self>
    where
        O: ChannelObserver + 'static,
    {
        let event_loop = EventLoopBuilder::new().name("sockloop-client").start()?;
        let observer = Arc::downgrade(observer);
        let observer: Weak<dyn ChannelObserver> = observer;

        Ok(Self::build(
            event_loop,
            true,
            options,
            observer,
            ClientCore::new(ChannelState::Idle, None),
        ))
    }

    /// Creates an idle channel on a loop shared with other channels. The
    /// loop is not started or stopped by the channel.
    pub fn with_event_loop<O>(
        observer: &Arc<O>,
        event_loop: &EventLoop,
        options: ChannelOptions,
    ) -> Self
    where
        O: ChannelObserver + 'static,
    {
        let observer = Arc::downgrade(observer);
        let observer: Weak<dyn ChannelObserver> = observer;

        Self::build(
            event_loop.clone(),
            false,
            options,
            observer,
            ClientCore::new(ChannelState::Idle, None),
        )
    }

    /// Wraps a socket returned by `accept`. The channel starts connected.
    pub(crate) fn accepted(
        observer: Weak<dyn ChannelObserver>,
        event_loop: &EventLoop,
        options: ChannelOptions,
        socket: Socket,
    ) -> Self {
        Self::build(
            event_loop.clone(),
            false,
            options,
            observer,
            ClientCore::new(ChannelState::Connected, Some(socket)),
        )
    }

    fn build(
        event_loop: EventLoop,
        owns_loop: bool,
        options: ChannelOptions,
        observer: Weak<dyn ChannelObserver>,
        core: ClientCore,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                event_loop,
                owns_loop,
                options,
                observer,
                core: Mutex::new(core),
            }),
        }
    }

    /// Registers an accepted channel for read and write readiness.
    pub(crate) fn register_accepted(&self) -> io::Result<()> {
        let fd = self.raw_fd().ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        let selectable: Arc<dyn Selectable> = self.inner.clone();

        self.inner
            .event_loop
            .selector()
            .register(fd, selectable, Interest::READ | Interest::WRITE)
    }

    /// Connects with the configured connect timeout.
    pub fn connect(&self, host: &str, port: u16) {
        self.connect_with_timeout(host, port, self.inner.options.connect_timeout);
    }

    /// Starts connecting to `host:port`. The outcome arrives through
    /// [`ChannelObserver::on_connect`] or [`ChannelObserver::on_disconnect`].
    /// Ignored unless the channel is idle.
    ///
    /// # Arguments
    /// * `host` - Host name or textual IP; the first resolved address is used
    /// * `port` - Remote port
    /// * `timeout` - How long the connect may take before it is abandoned
    pub fn connect_with_timeout(&self, host: &str, port: u16, timeout: Duration) {
        let channel = self.clone();
        let host = host.to_string();

        self.inner
            .event_loop
            .execute(move || channel.start_connect(host, port, timeout));
    }

    /// Queues `data` for sending. `user_info` comes back untouched in
    /// [`ChannelObserver::on_write`]. Dropped when the channel is idle.
    pub fn write(&self, data: impl Into<ByteBuffer>, user_info: Option<UserInfo>) {
        let channel = self.clone();
        let write = PendingWrite {
            buffer: data.into(),
            user_info,
        };

        self.inner.event_loop.execute(move || channel.enqueue(write));
    }

    /// Closes the connection. Reported as `on_disconnect(None)`; does
    /// nothing when already idle.
    pub fn disconnect(&self) {
        let channel = self.clone();

        self.inner
            .event_loop
            .execute(move || channel.teardown(None));
    }

    /// Fires [`ChannelObserver::on_heartbeat`] every `interval`. With
    /// `reset_on_read` or `reset_on_write` the period restarts on each
    /// completed read or write, so the callback only fires after that much
    /// inactivity.
    ///
    /// # Panics
    /// Panics if `interval` is zero or a heartbeat is already enabled.
    pub fn enable_heartbeat(&self, interval: Duration, reset_on_read: bool, reset_on_write: bool) {
        assert!(!interval.is_zero(), "heartbeat interval must not be zero");

        let mut core = self.inner.core.lock();
        assert!(core.heartbeat.is_none(), "heartbeat is already enabled");

        core.heartbeat = Some(Heartbeat {
            interval,
            reset_on_read,
            reset_on_write,
            timer: self.arm_heartbeat(interval),
        });
    }

    pub fn disable_heartbeat(&self) {
        let heartbeat = self.inner.core.lock().heartbeat.take();

        if let Some(heartbeat) = heartbeat {
            heartbeat.timer.cancel();
        }
    }

    /// Stops the channel. A channel that owns its loop also stops the loop;
    /// one on a shared loop just disconnects.
    ///
    /// # Panics
    /// Panics when an owned loop is shut down from its own thread.
    pub fn shutdown(&self) {
        if !self.inner.owns_loop {
            self.disconnect();
            return;
        }

        self.inner.event_loop.shutdown();
        self.teardown(None);
    }

    pub fn state(&self) -> ChannelState {
        self.inner.core.lock().state
    }

    /// True once connected.
    pub fn is_active(&self) -> bool {
        self.state() == ChannelState::Connected
    }

    pub fn local_address(&self) -> Option<SocketAddress> {
        let core = self.inner.core.lock();
        core.socket.as_ref()?.local_address().ok()
    }

    pub fn remote_address(&self) -> Option<SocketAddress> {
        let core = self.inner.core.lock();
        core.socket.as_ref()?.remote_address().ok()
    }

    /// Writes queued and not yet fully sent.
    pub fn pending_writes(&self) -> usize {
        self.inner.core.lock().pending.len()
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.inner.event_loop
    }

    fn raw_fd(&self) -> Option<std::os::fd::RawFd> {
        self.inner.core.lock().socket.as_ref().map(Socket::raw_fd)
    }

    fn observer(&self) -> Option<Arc<dyn ChannelObserver>> {
        self.inner.observer.upgrade()
    }

    fn start_connect(&self, host: String, port: u16, timeout: Duration) {
        if self.state() != ChannelState::Idle {
            debug!(host = %host, port, "connect ignored, channel is busy");
            return;
        }

        let address = match resolve(&host, port) {
            Ok(addresses) => addresses[0],
            Err(error) => {
                self.report_disconnect(Some(error));
                return;
            }
        };

        let socket = match open(&address) {
            Ok(socket) => socket,
            Err(error) => {
                self.report_disconnect(Some(ChannelError::socket("failed to open socket", &error)));
                return;
            }
        };
        let fd = socket.raw_fd();

        {
            let mut core = self.inner.core.lock();
            core.state = ChannelState::Connecting;
            core.endpoint = Some((host.clone(), port));
            core.socket = Some(socket);
        }

        let selectable: Arc<dyn Selectable> = self.inner.clone();
        if let Err(error) = self.inner.event_loop.selector().register(
            fd,
            selectable,
            Interest::READ | Interest::WRITE,
        ) {
            self.teardown(Some(ChannelError::socket("failed to register socket", &error)));
            return;
        }

        {
            let mut core = self.inner.core.lock();

            // Completion, or failure, is reported through readiness.
            if let Some(socket) = core.socket.as_ref()
                && let Err(error) = socket.connect(&address)
                && error.raw_os_error() != Some(libc::EINPROGRESS)
                && !is_transient(&error)
            {
                trace!(fd, %error, "connect failed immediately");
                core.connect_error = Some(error);
            }

            let channel = Arc::downgrade(&self.inner);
            core.connect_timer = Some(self.inner.event_loop.execute_after(timeout, move || {
                if let Some(inner) = channel.upgrade() {
                    ClientChannel { inner }.connect_timed_out(timeout);
                }
            }));
        }

        debug!(fd, host = %host, port, %address, "connecting");
    }

    fn connect_timed_out(&self, timeout: Duration) {
        if self.state() == ChannelState::Connecting {
            self.teardown(Some(ChannelError::ConnectTimeout(timeout)));
        }
    }

    fn handle_events(&self, events: Interest) {
        trace!(?events, "readiness");

        match self.state() {
            ChannelState::Idle => {}
            ChannelState::Connecting => self.finish_connect(events),
            ChannelState::Connected => {
                if events.contains(Interest::WRITE) {
                    self.on_writable();
                }
                if events.intersects(Interest::READ | Interest::ERROR) {
                    self.on_readable();
                }
            }
        }
    }

    fn finish_connect(&self, events: Interest) {
        let suspect =
            events.contains(Interest::ERROR) || events.contains(Interest::READ | Interest::WRITE);

        if !suspect && !events.contains(Interest::WRITE) {
            return;
        }

        if suspect && let Some(error) = self.connect_failure() {
            self.teardown(Some(error));
            return;
        }

        let (endpoint, has_pending) = {
            let mut core = self.inner.core.lock();
            core.state = ChannelState::Connected;
            core.connect_error = None;
            if let Some(timer) = core.connect_timer.take() {
                timer.cancel();
            }

            (core.endpoint.clone(), !core.pending.is_empty())
        };

        if !has_pending {
            self.enable_writable(false);
        }

        let (host, port) = endpoint.unwrap_or_default();
        debug!(host = %host, port, "connected");

        if let Some(observer) = self.observer() {
            observer.on_connect(self, &host, port);
        }

        if has_pending && events.contains(Interest::WRITE) {
            self.on_writable();
        }
        if events.contains(Interest::READ) {
            self.on_readable();
        }
    }

    // Read and write readiness together is also what a connected socket
    // with inbound data reports, so the socket itself decides.
    fn connect_failure(&self) -> Option<ChannelError> {
        let mut core = self.inner.core.lock();
        let socket = core.socket.as_ref()?;

        match socket.take_error() {
            Ok(Some(error)) => return Some(ChannelError::socket("connect failed", &error)),
            Err(error) => return Some(ChannelError::socket("connect failed", &error)),
            Ok(None) => {}
        }

        if socket.remote_address().is_ok() {
            return None;
        }

        let error = core
            .connect_error
            .take()
            .unwrap_or_else(|| io::Error::from_raw_os_error(libc::ENOTCONN));

        Some(ChannelError::socket("connect failed", &error))
    }

    fn enqueue(&self, write: PendingWrite) {
        let fd = {
            let mut core = self.inner.core.lock();
            let Some(fd) = core.socket.as_ref().map(Socket::raw_fd) else {
                debug!("write dropped, channel is idle");
                return;
            };

            core.pending.push_back(write);
            fd
        };

        if let Err(error) = self.inner.event_loop.selector().enable_writable(fd, true) {
            warn!(fd, %error, "failed to enable write interest");
        }
    }

    fn enable_writable(&self, enabled: bool) {
        if let Some(fd) = self.raw_fd()
            && let Err(error) = self.inner.event_loop.selector().enable_writable(fd, enabled)
        {
            warn!(fd, %error, "failed to toggle write interest");
        }
    }

    /// Sends from the head of the queue, one syscall per notification.
    fn on_writable(&self) {
        let outcome = {
            let mut core = self.inner.core.lock();
            let ClientCore {
                socket, pending, ..
            } = &mut *core;

            match (socket.as_ref(), pending.front_mut()) {
                (Some(socket), Some(head)) => match socket.write(head.buffer.readable_bytes()) {
                    Ok(sent) if sent == head.buffer.len() => match pending.pop_front() {
                        Some(done) => WriteOutcome::Completed(done),
                        None => WriteOutcome::Idle,
                    },
                    Ok(0) => WriteOutcome::Failed(ChannelError::PeerDisconnected),
                    Ok(sent) => {
                        head.buffer.move_read_index(sent);
                        WriteOutcome::Progress
                    }
                    Err(error) if is_transient(&error) => return,
                    Err(error) => WriteOutcome::Failed(ChannelError::socket("write failed", &error)),
                },
                _ => WriteOutcome::Idle,
            }
        };

        match outcome {
            WriteOutcome::Failed(error) => {
                self.teardown(Some(error));
                return;
            }
            WriteOutcome::Idle => {
                self.enable_writable(false);
                return;
            }
            WriteOutcome::Progress => {}
            WriteOutcome::Completed(done) => {
                trace!(bytes = done.buffer.len(), "write completed");
                if let Some(observer) = self.observer() {
                    observer.on_write(self, done.buffer, done.user_info);
                }
            }
        }

        self.reset_heartbeat(Activity::Write);

        if self.pending_writes() == 0 {
            self.enable_writable(false);
        }
    }

    /// One read into a fresh buffer.
    fn on_readable(&self) {
        let mut buffer = ByteBuffer::with_capacity(self.inner.options.receive_capacity);

        let result = {
            let core = self.inner.core.lock();
            let Some(socket) = core.socket.as_ref() else {
                return;
            };

            socket.read(buffer.writable_bytes())
        };

        match result {
            Ok(0) => self.teardown(Some(ChannelError::PeerDisconnected)),
            Ok(count) => {
                buffer.move_write_index(count);
                trace!(bytes = count, "read");

                if let Some(observer) = self.observer() {
                    observer.on_read(self, buffer);
                }
                self.reset_heartbeat(Activity::Read);
            }
            Err(error) if is_transient(&error) => {}
            Err(error) => self.teardown(Some(ChannelError::socket("read failed", &error))),
        }
    }

    fn arm_heartbeat(&self, interval: Duration) -> TimerHandle {
        let channel = Arc::downgrade(&self.inner);

        self.inner.event_loop.execute_timer(interval, move || {
            if let Some(inner) = channel.upgrade() {
                let channel = ClientChannel { inner };
                if let Some(observer) = channel.observer() {
                    observer.on_heartbeat(&channel);
                }
            }
        })
    }

    fn reset_heartbeat(&self, activity: Activity) {
        let mut core = self.inner.core.lock();
        let Some(heartbeat) = core.heartbeat.as_mut() else {
            return;
        };

        let reset = match activity {
            Activity::Read => heartbeat.reset_on_read,
            Activity::Write => heartbeat.reset_on_write,
        };
        if !reset {
            return;
        }

        heartbeat.timer.cancel();
        heartbeat.timer = self.arm_heartbeat(heartbeat.interval);
    }

    /// Releases everything the connection holds and reports the
    /// disconnect. Does nothing when there is no socket.
    fn teardown(&self, error: Option<ChannelError>) {
        let (socket, pending) = {
            let mut core = self.inner.core.lock();
            let Some(socket) = core.socket.take() else {
                return;
            };

            if let Some(heartbeat) = core.heartbeat.take() {
                heartbeat.timer.cancel();
            }
            if let Some(timer) = core.connect_timer.take() {
                timer.cancel();
            }
            core.state = ChannelState::Idle;
            core.connect_error = None;

            (socket, std::mem::take(&mut core.pending))
        };

        if let Err(error) = self.inner.event_loop.selector().deregister(socket.raw_fd()) {
            warn!(fd = socket.raw_fd(), %error, "failed to deregister socket");
        }

        match &error {
            Some(error) => debug!(fd = socket.raw_fd(), %error, "disconnected"),
            None => debug!(fd = socket.raw_fd(), "disconnected"),
        }
        self.report_disconnect(error);

        drop(socket);
        drop(pending);
    }

    fn report_disconnect(&self, error: Option<ChannelError>) {
        if let Some(observer) = self.observer() {
            observer.on_disconnect(self, error.as_ref());
        }
    }
}

impl Selectable for ClientInner {
    fn on_events(self: Arc<Self>, events: Interest) {
        ClientChannel { inner: self }.handle_events(events);
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if self.owns_loop && self.event_loop.is_running() && !self.event_loop.in_current() {
            self.event_loop.shutdown();
        }
    }
}

impl PartialEq for ClientChannel {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ClientChannel {}

impl fmt::Debug for ClientChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.inner.core.lock();

        f.debug_struct("ClientChannel")
            .field("state", &core.state)
            .field("fd", &core.socket.as_ref().map(Socket::raw_fd))
            .field("pending_writes", &core.pending.len())
            .finish()
    }
}

fn open(address: &SocketAddress) -> io::Result<Socket> {
    let socket = Socket::new(address.family())?;
    socket.set_nonblocking()?;
    socket.ignore_sigpipe()?;

    Ok(socket)
}
