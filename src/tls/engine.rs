//! The TLS state machine behind [`SslHandler`](super::SslHandler).
//!
//! An engine never touches a socket. Ciphertext reaches it through
//! [`CipherIo::supply_ciphertext`] and leaves it through
//! [`CipherIo::emit_ciphertext`], both called synchronously from inside
//! [`TlsEngine`] methods.

use crate::error::TlsError;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, Connection, ServerConfig, ServerConnection};
use std::io::{self, Read, Write};
use std::sync::Arc;

/// Ciphertext transport used by an engine during one call.
pub trait CipherIo {
    /// Copies buffered ciphertext into `buf`.
    ///
    /// Fails with [`io::ErrorKind::WouldBlock`] when nothing is buffered;
    /// never blocks.
    fn supply_ciphertext(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Takes ciphertext that must go out on the wire.
    fn emit_ciphertext(&mut self, bytes: &[u8]);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStatus {
    Complete,
    /// More ciphertext from the peer is needed.
    WouldBlock,
}

/// A TLS session driven one step at a time.
pub trait TlsEngine: Send {
    /// Advances the handshake as far as the buffered ciphertext allows.
    fn handshake(&mut self, io: &mut dyn CipherIo) -> Result<HandshakeStatus, TlsError>;

    /// Decrypts into `out` and returns the number of plaintext bytes
    /// produced, `0` when nothing more is available.
    fn decrypt(&mut self, io: &mut dyn CipherIo, out: &mut [u8]) -> Result<usize, TlsError>;

    /// Encrypts `plaintext`, emitting the resulting records.
    fn encrypt(&mut self, io: &mut dyn CipherIo, plaintext: &[u8]) -> Result<(), TlsError>;

    fn is_established(&self) -> bool;
}

/// [`TlsEngine`] backed by a rustls connection.
pub struct RustlsEngine {
    connection: Connection,
}

impl RustlsEngine {
    /// Client side, verifying the server against `domain`.
    pub fn client(config: Arc<ClientConfig>, domain: &str) -> Result<Self, TlsError> {
        let name = ServerName::try_from(domain.to_string())
            .map_err(|_| TlsError::InvalidServerName(domain.to_string()))?;
        let connection = ClientConnection::new(config, name)
            .map_err(|error| TlsError::Config(error.to_string()))?;

        Ok(Self {
            connection: connection.into(),
        })
    }

    pub fn server(config: Arc<ServerConfig>) -> Result<Self, TlsError> {
        let connection =
            ServerConnection::new(config).map_err(|error| TlsError::Config(error.to_string()))?;

        Ok(Self {
            connection: connection.into(),
        })
    }

    /// Feeds one read's worth of ciphertext to rustls. Returns `false` once
    /// the transport has nothing buffered.
    fn read_once(&mut self, io: &mut dyn CipherIo) -> Result<bool, TlsError> {
        match self.connection.read_tls(&mut Inbound(&mut *io)) {
            Ok(0) => Ok(false),
            Ok(_) => {
                let handshaking = self.connection.is_handshaking();
                let processed = self.connection.process_new_packets();

                // Alerts describing a failure still have to reach the peer.
                self.flush(io)?;

                processed.map_err(|error| {
                    if handshaking {
                        TlsError::Handshake(error.to_string())
                    } else {
                        TlsError::Protocol(error.to_string())
                    }
                })?;
                Ok(true)
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(false),
            Err(error) => Err(TlsError::Io(error.to_string())),
        }
    }

    fn flush(&mut self, io: &mut dyn CipherIo) -> Result<(), TlsError> {
        while self.connection.wants_write() {
            self.connection
                .write_tls(&mut Outbound(&mut *io))
                .map_err(|error| TlsError::Io(error.to_string()))?;
        }

        Ok(())
    }
}

impl TlsEngine for RustlsEngine {
    fn handshake(&mut self, io: &mut dyn CipherIo) -> Result<HandshakeStatus, TlsError> {
        self.flush(io)?;

        while self.connection.is_handshaking() && self.read_once(io)? {}

        self.flush(io)?;

        if self.connection.is_handshaking() {
            return Ok(HandshakeStatus::WouldBlock);
        }

        Ok(HandshakeStatus::Complete)
    }

    // Plaintext is drained before more ciphertext is read so the rustls
    // plaintext buffer never fills up.
    fn decrypt(&mut self, io: &mut dyn CipherIo, out: &mut [u8]) -> Result<usize, TlsError> {
        loop {
            match self.connection.reader().read(out) {
                Ok(count) => return Ok(count),
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => {}
                Err(error) => return Err(TlsError::Io(error.to_string())),
            }

            if !self.read_once(io)? {
                return Ok(0);
            }
        }
    }

    // rustls caps its outgoing buffer, so records are flushed between
    // partial writes.
    fn encrypt(&mut self, io: &mut dyn CipherIo, plaintext: &[u8]) -> Result<(), TlsError> {
        let mut remaining = plaintext;

        while !remaining.is_empty() {
            let written = self
                .connection
                .writer()
                .write(remaining)
                .map_err(|error| TlsError::Io(error.to_string()))?;
            self.flush(io)?;

            if written == 0 {
                return Err(TlsError::Io("session refused more plaintext".to_string()));
            }
            remaining = &remaining[written..];
        }

        Ok(())
    }

    fn is_established(&self) -> bool {
        !self.connection.is_handshaking()
    }
}

struct Inbound<'a, I: ?Sized>(&'a mut I);

impl<I: CipherIo + ?Sized> Read for Inbound<'_, I> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.supply_ciphertext(buf)
    }
}

struct Outbound<'a, I: ?Sized>(&'a mut I);

impl<I: CipherIo + ?Sized> Write for Outbound<'_, I> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.emit_ciphertext(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
