//! Thin non-blocking TCP socket over libc.

use super::address::{Family, SocketAddress};
use crate::utils::sys::{cvt, cvt_size};

use libc::{SOCK_STREAM, SOL_SOCKET, c_int, c_void, sockaddr, sockaddr_storage, socklen_t};
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

#[cfg(any(target_os = "linux", target_os = "android"))]
const SEND_FLAGS: c_int = libc::MSG_NOSIGNAL;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SEND_FLAGS: c_int = 0;

/// Owned stream socket. The descriptor is closed on drop.
#[derive(Debug)]
pub(crate) struct Socket {
    fd: OwnedFd,
}

impl Socket {
    pub(crate) fn new(family: Family) -> io::Result<Self> {
        #[cfg(any(target_os = "linux", target_os = "android"))]
        let kind = SOCK_STREAM | libc::SOCK_CLOEXEC;
        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        let kind = SOCK_STREAM;

        let fd = cvt(unsafe { libc::socket(family.raw(), kind, 0) })?;
        let socket = Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        };

        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        socket.set_cloexec()?;

        Ok(socket)
    }

    pub(crate) fn raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    pub(crate) fn set_nonblocking(&self) -> io::Result<()> {
        let flags = cvt(unsafe { libc::fcntl(self.raw_fd(), libc::F_GETFL) })?;
        cvt(unsafe { libc::fcntl(self.raw_fd(), libc::F_SETFL, flags | libc::O_NONBLOCK) })?;

        Ok(())
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    fn set_cloexec(&self) -> io::Result<()> {
        cvt(unsafe { libc::fcntl(self.raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC) })?;

        Ok(())
    }

    /// Keeps writes to a closed peer from raising `SIGPIPE`. Linux gets the
    /// same effect from `MSG_NOSIGNAL` on every send.
    pub(crate) fn ignore_sigpipe(&self) -> io::Result<()> {
        #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
        self.set_option(libc::SO_NOSIGPIPE, 1)?;

        Ok(())
    }

    pub(crate) fn set_reuse_addr(&self) -> io::Result<()> {
        self.set_option(libc::SO_REUSEADDR, 1)
    }

    pub(crate) fn bind(&self, address: &SocketAddress) -> io::Result<()> {
        let (storage, length) = address.to_raw();
        cvt(unsafe {
            libc::bind(
                self.raw_fd(),
                &storage as *const _ as *const sockaddr,
                length,
            )
        })?;

        Ok(())
    }

    pub(crate) fn listen(&self, backlog: c_int) -> io::Result<()> {
        cvt(unsafe { libc::listen(self.raw_fd(), backlog) })?;

        Ok(())
    }

    /// Accepts one pending connection. The new socket is non-blocking.
    pub(crate) fn accept(&self) -> io::Result<Socket> {
        // SAFETY: the kernel fills at most `length` bytes.
        let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
        let mut length = mem::size_of::<sockaddr_storage>() as socklen_t;

        #[cfg(any(target_os = "linux", target_os = "android"))]
        let fd = cvt(unsafe {
            libc::accept4(
                self.raw_fd(),
                &mut storage as *mut _ as *mut sockaddr,
                &mut length,
                libc::SOCK_CLOEXEC | libc::SOCK_NONBLOCK,
            )
        })?;
        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        let fd = cvt(unsafe {
            libc::accept(
                self.raw_fd(),
                &mut storage as *mut _ as *mut sockaddr,
                &mut length,
            )
        })?;

        let socket = Socket {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        };

        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        {
            socket.set_cloexec()?;
            socket.set_nonblocking()?;
        }
        socket.ignore_sigpipe()?;

        Ok(socket)
    }

    /// Starts a connect. On a non-blocking socket this usually fails with
    /// `EINPROGRESS` and completes later.
    pub(crate) fn connect(&self, address: &SocketAddress) -> io::Result<()> {
        let (storage, length) = address.to_raw();
        cvt(unsafe {
            libc::connect(
                self.raw_fd(),
                &storage as *const _ as *const sockaddr,
                length,
            )
        })?;

        Ok(())
    }

    pub(crate) fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        cvt_size(unsafe { libc::read(self.raw_fd(), buf.as_mut_ptr() as *mut c_void, buf.len()) })
    }

    pub(crate) fn write(&self, buf: &[u8]) -> io::Result<usize> {
        cvt_size(unsafe {
            libc::send(
                self.raw_fd(),
                buf.as_ptr() as *const c_void,
                buf.len(),
                SEND_FLAGS,
            )
        })
    }

    pub(crate) fn local_address(&self) -> io::Result<SocketAddress> {
        self.address_with(libc::getsockname)
    }

    pub(crate) fn remote_address(&self) -> io::Result<SocketAddress> {
        self.address_with(libc::getpeername)
    }

    /// Pending error of the socket (`SO_ERROR`), cleared by the query.
    pub(crate) fn take_error(&self) -> io::Result<Option<io::Error>> {
        let code = self.get_option(libc::SO_ERROR)?;
        if code == 0 {
            return Ok(None);
        }

        Ok(Some(io::Error::from_raw_os_error(code)))
    }

    fn address_with(
        &self,
        query: unsafe extern "C" fn(c_int, *mut sockaddr, *mut socklen_t) -> c_int,
    ) -> io::Result<SocketAddress> {
        let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
        let mut length = mem::size_of::<sockaddr_storage>() as socklen_t;

        cvt(unsafe {
            query(
                self.raw_fd(),
                &mut storage as *mut _ as *mut sockaddr,
                &mut length,
            )
        })?;

        SocketAddress::from_raw(&storage).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "unsupported address family")
        })
    }

    fn set_option(&self, name: c_int, value: c_int) -> io::Result<()> {
        cvt(unsafe {
            libc::setsockopt(
                self.raw_fd(),
                SOL_SOCKET,
                name,
                &value as *const c_int as *const c_void,
                mem::size_of::<c_int>() as socklen_t,
            )
        })?;

        Ok(())
    }

    fn get_option(&self, name: c_int) -> io::Result<c_int> {
        let mut value: c_int = 0;
        let mut length = mem::size_of::<c_int>() as socklen_t;

        cvt(unsafe {
            libc::getsockopt(
                self.raw_fd(),
                SOL_SOCKET,
                name,
                &mut value as *mut c_int as *mut c_void,
                &mut length,
            )
        })?;

        Ok(value)
    }
}
