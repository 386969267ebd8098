//! Socket addresses and host resolution.

use crate::error::ChannelError;

use libc::{AF_INET, AF_INET6, sa_family_t, sockaddr_in, sockaddr_in6, sockaddr_storage, socklen_t};
use std::fmt;
use std::mem;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6, ToSocketAddrs};
use tracing::debug;

/// Address family of a [`SocketAddress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Inet,
    Inet6,
}

impl Family {
    pub(crate) fn raw(self) -> libc::c_int {
        match self {
            Family::Inet => AF_INET,
            Family::Inet6 => AF_INET6,
        }
    }
}

/// An IPv4 or IPv6 endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketAddress(SocketAddr);

impl SocketAddress {
    pub fn new(address: SocketAddr) -> Self {
        Self(address)
    }

    pub fn family(&self) -> Family {
        match self.0 {
            SocketAddr::V4(_) => Family::Inet,
            SocketAddr::V6(_) => Family::Inet6,
        }
    }

    /// Textual IP, without the port.
    pub fn ip(&self) -> String {
        self.0.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.0.port()
    }

    pub fn as_socket_addr(&self) -> SocketAddr {
        self.0
    }

    /// Encodes the address for `bind`/`connect`.
    pub(crate) fn to_raw(&self) -> (sockaddr_storage, socklen_t) {
        // SAFETY: an all-zero sockaddr_storage is a valid unspecified address.
        let mut storage: sockaddr_storage = unsafe { mem::zeroed() };

        match self.0 {
            SocketAddr::V4(address) => {
                // SAFETY: sockaddr_storage is large and aligned enough for
                // every concrete sockaddr type.
                let raw = unsafe { &mut *(&mut storage as *mut _ as *mut sockaddr_in) };
                raw.sin_family = AF_INET as sa_family_t;
                raw.sin_port = address.port().to_be();
                raw.sin_addr.s_addr = u32::from_ne_bytes(address.ip().octets());
                #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
                {
                    raw.sin_len = mem::size_of::<sockaddr_in>() as u8;
                }

                (storage, mem::size_of::<sockaddr_in>() as socklen_t)
            }
            SocketAddr::V6(address) => {
                let raw = unsafe { &mut *(&mut storage as *mut _ as *mut sockaddr_in6) };
                raw.sin6_family = AF_INET6 as sa_family_t;
                raw.sin6_port = address.port().to_be();
                raw.sin6_addr.s6_addr = address.ip().octets();
                raw.sin6_flowinfo = address.flowinfo();
                raw.sin6_scope_id = address.scope_id();
                #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
                {
                    raw.sin6_len = mem::size_of::<sockaddr_in6>() as u8;
                }

                (storage, mem::size_of::<sockaddr_in6>() as socklen_t)
            }
        }
    }

    /// Decodes an address filled in by the kernel. Families other than
    /// IPv4 and IPv6 give `None`.
    pub(crate) fn from_raw(storage: &sockaddr_storage) -> Option<Self> {
        match storage.ss_family as libc::c_int {
            AF_INET => {
                let raw = unsafe { &*(storage as *const _ as *const sockaddr_in) };
                let ip = Ipv4Addr::from(raw.sin_addr.s_addr.to_ne_bytes());

                Some(Self(SocketAddr::V4(SocketAddrV4::new(
                    ip,
                    u16::from_be(raw.sin_port),
                ))))
            }
            AF_INET6 => {
                let raw = unsafe { &*(storage as *const _ as *const sockaddr_in6) };
                let ip = Ipv6Addr::from(raw.sin6_addr.s6_addr);

                Some(Self(SocketAddr::V6(SocketAddrV6::new(
                    ip,
                    u16::from_be(raw.sin6_port),
                    raw.sin6_flowinfo,
                    raw.sin6_scope_id,
                ))))
            }
            _ => None,
        }
    }
}

impl From<SocketAddr> for SocketAddress {
    fn from(address: SocketAddr) -> Self {
        Self(address)
    }
}

impl From<(IpAddr, u16)> for SocketAddress {
    fn from((ip, port): (IpAddr, u16)) -> Self {
        Self(SocketAddr::new(ip, port))
    }
}

impl fmt::Display for SocketAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip(), self.port())
    }
}

/// Resolves `host` into the addresses it maps to, in resolver order.
///
/// Fails with [`ChannelError::DnsFailed`] when the lookup fails or yields
/// nothing, so a successful result is never empty.
///
/// # Example
/// ```
/// use sockloop::net::address::resolve;
///
/// let addresses = resolve("127.0.0.1", 8080).unwrap();
/// assert_eq!(addresses[0].to_string(), "127.0.0.1:8080");
/// ```
pub fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddress>, ChannelError> {
    let addresses: Vec<SocketAddress> = match (host, port).to_socket_addrs() {
        Ok(addresses) => addresses.map(SocketAddress::from).collect(),
        Err(error) => {
            debug!(host, %error, "resolution failed");
            return Err(ChannelError::DnsFailed(host.to_string()));
        }
    };

    if addresses.is_empty() {
        return Err(ChannelError::DnsFailed(host.to_string()));
    }

    Ok(addresses)
}
