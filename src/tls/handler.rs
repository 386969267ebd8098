use super::engine::{CipherIo, HandshakeStatus, RustlsEngine, TlsEngine};
use crate::buffer::ByteBuffer;
use crate::error::TlsError;
use crate::net::UserInfo;

use parking_lot::Mutex;
use rustls::{ClientConfig, ServerConfig};
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

// Largest TLS record payload.
const PLAINTEXT_CHUNK: usize = 16 * 1024;

/// Callbacks of an [`SslHandler`].
///
/// Callbacks run on the thread that called into the handler, after the
/// handler's internal lock has been released.
pub trait SslObserver: Send + Sync {
    fn on_handshake_success(&self, _handler: &SslHandler) {}

    /// The session failed, during the handshake or afterwards. The handler
    /// ignores every later call.
    fn on_handshake_failure(&self, _handler: &SslHandler, _error: &TlsError) {}

    /// Decrypted application data.
    fn on_plaintext(&self, _handler: &SslHandler, _data: ByteBuffer) {}

    /// Records to send to the peer, tagged with the `user_info` of the write
    /// that produced them.
    fn on_ciphertext(&self, _handler: &SslHandler, _data: ByteBuffer, _user_info: Option<UserInfo>) {}
}

enum SslEvent {
    Established,
    Failed(TlsError),
    Plaintext(Vec<u8>),
    Ciphertext(Vec<u8>, Option<UserInfo>),
}

struct Relay<'a> {
    inbound: &'a mut ByteBuffer,
    outbound: &'a mut Vec<u8>,
}

impl CipherIo for Relay<'_> {
    fn supply_ciphertext(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.inbound.is_empty() {
            return Err(io::ErrorKind::WouldBlock.into());
        }

        let count = buf.len().min(self.inbound.len());
        buf[..count].copy_from_slice(&self.inbound.readable_bytes()[..count]);
        self.inbound.move_read_index(count);

        Ok(count)
    }

    fn emit_ciphertext(&mut self, bytes: &[u8]) {
        self.outbound.extend_from_slice(bytes);
    }
}

struct SslSession {
    engine: Box<dyn TlsEngine>,
    inbound: ByteBuffer,
    established: bool,
    failed: bool,
    queued: VecDeque<(Vec<u8>, Option<UserInfo>)>,
}

impl SslSession {
    fn step_handshake(&mut self, events: &mut Vec<SslEvent>) {
        let mut outbound = Vec::new();
        let result = self.engine.handshake(&mut Relay {
            inbound: &mut self.inbound,
            outbound: &mut outbound,
        });

        if !outbound.is_empty() {
            events.push(SslEvent::Ciphertext(outbound, None));
        }

        match result {
            Ok(HandshakeStatus::WouldBlock) => {}
            Ok(HandshakeStatus::Complete) => {
                self.established = true;
                events.push(SslEvent::Established);

                while let Some((data, user_info)) = self.queued.pop_front() {
                    self.encrypt(&data, user_info, events);
                }
            }
            Err(error) => self.fail(error, events),
        }
    }

    fn decrypt_all(&mut self, events: &mut Vec<SslEvent>) {
        let mut chunk = vec![0; PLAINTEXT_CHUNK];

        while !self.failed {
            let mut outbound = Vec::new();
            let result = self.engine.decrypt(
                &mut Relay {
                    inbound: &mut self.inbound,
                    outbound: &mut outbound,
                },
                &mut chunk,
            );

            if !outbound.is_empty() {
                events.push(SslEvent::Ciphertext(outbound, None));
            }

            match result {
                Ok(0) => break,
                Ok(count) => events.push(SslEvent::Plaintext(chunk[..count].to_vec())),
                Err(error) => self.fail(error, events),
            }
        }
    }

    fn encrypt(&mut self, data: &[u8], user_info: Option<UserInfo>, events: &mut Vec<SslEvent>) {
        if self.failed {
            return;
        }

        let mut outbound = Vec::new();
        let result = self.engine.encrypt(
            &mut Relay {
                inbound: &mut self.inbound,
                outbound: &mut outbound,
            },
            data,
        );

        match result {
            Ok(()) => events.push(SslEvent::Ciphertext(outbound, user_info)),
            Err(error) => self.fail(error, events),
        }
    }

    fn fail(&mut self, error: TlsError, events: &mut Vec<SslEvent>) {
        self.failed = true;
        self.queued.clear();
        events.push(SslEvent::Failed(error));
    }
}

struct SslInner {
    observer: Weak<dyn SslObserver>,
    session: Mutex<SslSession>,
}

/// TLS layered over a byte relay, usually a [`ClientChannel`](crate::ClientChannel).
///
/// Feed everything the channel reads to [`SslHandler::on_read`] and send
/// everything [`SslObserver::on_ciphertext`] yields. Plaintext goes in
/// through [`SslHandler::write`] and comes out of
/// [`SslObserver::on_plaintext`]. Calls on one handler are serialized.
///
/// # Example
/// ```ignore
/// let tls = SslHandler::client(&observer, default_client_config()?, "example.com")?;
/// tls.handshake();
///
/// // in ChannelObserver::on_read
/// tls.on_read(buffer.readable_bytes());
///
/// // in SslObserver::on_ciphertext
/// client.write(data, user_info);
/// ```
#[derive(Clone)]
pub struct SslHandler {
    inner: Arc<SslInner>,
}

impl SslHandler {
    pub fn new<O>(observer: &Arc<O>, engine: Box<dyn TlsEngine>) -> Self
    where
        O: SslObserver + 'static,
    {
        let observer = Arc::downgrade(observer);
        let observer: Weak<dyn SslObserver> = observer;

        Self {
            inner: Arc::new(SslInner {
                observer,
                session: Mutex::new(SslSession {
                    engine,
                    inbound: ByteBuffer::new(),
                    established: false,
                    failed: false,
                    queued: VecDeque::new(),
                }),
            }),
        }
    }

    /// Client side of a session with the server named `domain`.
    pub fn client<O>(
        observer: &Arc<O>,
        config: Arc<ClientConfig>,
        domain: &str,
    ) -> Result<Self, TlsError>
    where
        O: SslObserver + 'static,
    {
        let engine = RustlsEngine::client(config, domain)?;

        Ok(Self::new(observer, Box::new(engine)))
    }

    pub fn server<O>(observer: &Arc<O>, config: Arc<ServerConfig>) -> Result<Self, TlsError>
    where
        O: SslObserver + 'static,
    {
        let engine = RustlsEngine::server(config)?;

        Ok(Self::new(observer, Box::new(engine)))
    }

    /// Drives one handshake step. A client calls this once the underlying
    /// channel is connected to send its first flight.
    pub fn handshake(&self) {
        let events = {
            let mut session = self.inner.session.lock();
            if session.established || session.failed {
                return;
            }

            let mut events = Vec::new();
            session.step_handshake(&mut events);
            events
        };

        self.deliver(events);
    }

    /// Consumes ciphertext received from the peer.
    pub fn on_read(&self, data: &[u8]) {
        let events = {
            let mut session = self.inner.session.lock();
            if session.failed {
                return;
            }

            session.inbound.write_bytes(data);
            trace!(bytes = data.len(), "ciphertext buffered");

            let mut events = Vec::new();
            if !session.established {
                session.step_handshake(&mut events);
            }
            if session.established {
                session.decrypt_all(&mut events);
            }
            events
        };

        self.deliver(events);
    }

    /// Encrypts `data`. Before the handshake completes the data is queued
    /// and sent, in order, right after it does.
    pub fn write(&self, data: &[u8], user_info: Option<UserInfo>) {
        let events = {
            let mut session = self.inner.session.lock();
            if session.failed {
                return;
            }

            if !session.established {
                session.queued.push_back((data.to_vec(), user_info));
                return;
            }

            let mut events = Vec::new();
            session.encrypt(data, user_info, &mut events);
            events
        };

        self.deliver(events);
    }

    pub fn is_established(&self) -> bool {
        let session = self.inner.session.lock();
        session.established && !session.failed
    }

    fn deliver(&self, events: Vec<SslEvent>) {
        let Some(observer) = self.inner.observer.upgrade() else {
            return;
        };

        for event in events {
            match event {
                SslEvent::Established => {
                    debug!("TLS handshake completed");
                    observer.on_handshake_success(self);
                }
                SslEvent::Failed(error) => {
                    debug!(%error, "TLS session failed");
                    observer.on_handshake_failure(self, &error);
                }
                SslEvent::Plaintext(data) => observer.on_plaintext(self, ByteBuffer::from(data)),
                SslEvent::Ciphertext(data, user_info) => {
                    observer.on_ciphertext(self, ByteBuffer::from(data), user_info)
                }
            }
        }
    }
}
