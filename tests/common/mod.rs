#![allow(dead_code)]

use sockloop::{ByteBuffer, ChannelError, ChannelObserver, ClientChannel, ServerChannel, UserInfo};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const WAIT: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub enum Event {
    Accepted(ClientChannel),
    ServerError(ChannelError),
    Connected(String, u16),
    Disconnected(Option<ChannelError>),
    Read(Vec<u8>),
    Written(Vec<u8>, Option<u32>),
    Heartbeat,
}

/// Forwards every callback to a channel the test reads from.
pub struct Recorder {
    events: Mutex<Sender<Event>>,
    echo: bool,
}

impl Recorder {
    pub fn new() -> (Arc<Self>, Receiver<Event>) {
        Self::build(false)
    }

    /// Same as [`Recorder::new`], and writes every read back to its sender.
    pub fn echo() -> (Arc<Self>, Receiver<Event>) {
        Self::build(true)
    }

    fn build(echo: bool) -> (Arc<Self>, Receiver<Event>) {
        let (tx, rx) = mpsc::channel();
        let recorder = Recorder {
            events: Mutex::new(tx),
            echo,
        };

        (Arc::new(recorder), rx)
    }

    fn send(&self, event: Event) {
        let _ = self.events.lock().unwrap().send(event);
    }
}

impl ChannelObserver for Recorder {
    fn on_accept(&self, _server: &ServerChannel, client: &ClientChannel) {
        self.send(Event::Accepted(client.clone()));
    }

    fn on_server_error(&self, _server: &ServerChannel, error: &ChannelError) {
        self.send(Event::ServerError(error.clone()));
    }

    fn on_connect(&self, _client: &ClientChannel, host: &str, port: u16) {
        self.send(Event::Connected(host.to_string(), port));
    }

    fn on_disconnect(&self, _client: &ClientChannel, error: Option<&ChannelError>) {
        self.send(Event::Disconnected(error.cloned()));
    }

    fn on_read(&self, client: &ClientChannel, buffer: ByteBuffer) {
        if self.echo {
            client.write(buffer.readable_bytes(), None);
        }
        self.send(Event::Read(buffer.to_vec()));
    }

    fn on_write(&self, _client: &ClientChannel, buffer: ByteBuffer, user_info: Option<UserInfo>) {
        let tag = user_info.and_then(|info| info.downcast::<u32>().ok()).map(|tag| *tag);
        self.send(Event::Written(buffer.to_vec(), tag));
    }

    fn on_heartbeat(&self, _client: &ClientChannel) {
        self.send(Event::Heartbeat);
    }
}

pub fn next(rx: &Receiver<Event>) -> Event {
    rx.recv_timeout(WAIT).expect("no event arrived in time")
}

/// Skips events until `select` picks one.
pub fn wait_for<T>(rx: &Receiver<Event>, mut select: impl FnMut(Event) -> Option<T>) -> T {
    let deadline = Instant::now() + WAIT;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let event = rx.recv_timeout(remaining).expect("expected event never arrived");

        if let Some(found) = select(event) {
            return found;
        }
    }
}

pub fn wait_connected(rx: &Receiver<Event>) -> (String, u16) {
    wait_for(rx, |event| match event {
        Event::Connected(host, port) => Some((host, port)),
        _ => None,
    })
}

pub fn wait_accepted(rx: &Receiver<Event>) -> ClientChannel {
    wait_for(rx, |event| match event {
        Event::Accepted(client) => Some(client),
        _ => None,
    })
}

pub fn wait_disconnected(rx: &Receiver<Event>) -> Option<ChannelError> {
    wait_for(rx, |event| match event {
        Event::Disconnected(error) => Some(error),
        _ => None,
    })
}

/// Collects read payloads until `len` bytes have arrived.
pub fn read_exactly(rx: &Receiver<Event>, len: usize) -> Vec<u8> {
    let mut received = Vec::with_capacity(len);

    while received.len() < len {
        let chunk = wait_for(rx, |event| match event {
            Event::Read(bytes) => Some(bytes),
            _ => None,
        });
        received.extend_from_slice(&chunk);
    }

    received
}

/// Starts an echo server on an ephemeral loopback port.
pub fn echo_server() -> (ServerChannel, Arc<Recorder>, Receiver<Event>, u16) {
    let (observer, rx) = Recorder::echo();
    let server = ServerChannel::new(&observer).unwrap();
    server.start("127.0.0.1", 0).unwrap();

    let port = server.local_address().unwrap().port();
    (server, observer, rx, port)
}
