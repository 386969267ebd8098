use crate::reactor::event::Interest;
use crate::utils::sys::{cvt, cvt_size};

use libc::{
    EFD_CLOEXEC, EFD_NONBLOCK, EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD,
    EPOLLERR, EPOLLHUP, EPOLLIN, EPOLLOUT, EPOLLRDHUP, epoll_ctl, epoll_event, epoll_wait,
    eventfd,
};
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

// Token carried by the eventfd used for cross-thread wakeups. Descriptor
// tokens never reach it because their low half is a non-negative fd.
const WAKE_TOKEN: u64 = u64::MAX;

/// Level-triggered epoll instance with an always-registered eventfd for
/// wakeups.
pub(crate) struct Poller {
    epoll: OwnedFd,
    wake: OwnedFd,
}

impl Poller {
    pub(crate) fn new() -> io::Result<Self> {
        let epoll = cvt(unsafe { libc::epoll_create1(EPOLL_CLOEXEC) })?;
        let epoll = unsafe { OwnedFd::from_raw_fd(epoll) };

        let wake = cvt(unsafe { eventfd(0, EFD_CLOEXEC | EFD_NONBLOCK) })?;
        let wake = unsafe { OwnedFd::from_raw_fd(wake) };

        let mut event = epoll_event {
            events: EPOLLIN as u32,
            u64: WAKE_TOKEN,
        };
        cvt(unsafe {
            epoll_ctl(
                epoll.as_raw_fd(),
                EPOLL_CTL_ADD,
                wake.as_raw_fd(),
                &mut event,
            )
        })?;

        Ok(Self { epoll, wake })
    }

    /// Watches `fd`. Its events come back tagged with `generation`.
    pub(crate) fn add(&self, fd: RawFd, generation: u32, interest: Interest) -> io::Result<()> {
        self.ctl(EPOLL_CTL_ADD, fd, generation, interest)
    }

    pub(crate) fn modify(&self, fd: RawFd, generation: u32, interest: Interest) -> io::Result<()> {
        self.ctl(EPOLL_CTL_MOD, fd, generation, interest)
    }

    pub(crate) fn delete(&self, fd: RawFd) -> io::Result<()> {
        self.ctl(EPOLL_CTL_DEL, fd, 0, Interest::NONE)
    }

    pub(crate) fn wake(&self) -> io::Result<()> {
        let one: u64 = 1;
        let result = cvt_size(unsafe {
            libc::write(
                self.wake.as_raw_fd(),
                &one as *const u64 as *const _,
                std::mem::size_of::<u64>(),
            )
        });

        match result {
            // The counter is saturated, a wakeup is already pending.
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(error) => Err(error),
            Ok(_) => Ok(()),
        }
    }

    /// Blocks for at most `timeout`, filling `events` with what fired.
    pub(crate) fn wait(&self, events: &mut Events, timeout: Duration) -> io::Result<()> {
        events.raw.clear();

        let ready = cvt(unsafe {
            epoll_wait(
                self.epoll.as_raw_fd(),
                events.raw.as_mut_ptr(),
                events.capacity as i32,
                timeout_ms(timeout),
            )
        })?;

        // SAFETY: epoll_wait initialised the first `ready` entries.
        unsafe { events.raw.set_len(ready as usize) };

        if events.raw.iter().any(|event| {
            let token = event.u64;
            token == WAKE_TOKEN
        }) {
            self.drain_wake();
        }

        Ok(())
    }

    fn drain_wake(&self) {
        let mut counter: u64 = 0;

        unsafe {
            libc::read(
                self.wake.as_raw_fd(),
                &mut counter as *mut u64 as *mut _,
                std::mem::size_of::<u64>(),
            );
        }
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, generation: u32, interest: Interest) -> io::Result<()> {
        let mut event = epoll_event {
            events: flags(interest),
            u64: (u64::from(generation) << 32) | u64::from(fd as u32),
        };

        cvt(unsafe { epoll_ctl(self.epoll.as_raw_fd(), op, fd, &mut event) })?;

        Ok(())
    }
}

/// Buffer that receives the events of one wait call.
pub(crate) struct Events {
    raw: Vec<epoll_event>,
    capacity: usize,
}

impl Events {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            raw: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entries filled by the last wait, wakeups included.
    pub(crate) fn len(&self) -> usize {
        self.raw.len()
    }

    pub(crate) fn grow(&mut self) {
        self.capacity *= 2;
        self.raw = Vec::with_capacity(self.capacity);
    }

    /// Ready descriptors with their registration generation and the
    /// readiness each one reported.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (RawFd, u32, Interest)> + '_ {
        self.raw.iter().filter_map(|event| {
            let (bits, token) = (event.events, event.u64);
            if token == WAKE_TOKEN {
                return None;
            }

            let fd = token as u32 as RawFd;
            let generation = (token >> 32) as u32;
            Some((fd, generation, readiness(bits)))
        })
    }
}

fn flags(interest: Interest) -> u32 {
    let mut flags = 0;

    if interest.contains(Interest::READ) {
        flags |= EPOLLIN | EPOLLRDHUP;
    }
    if interest.contains(Interest::WRITE) {
        flags |= EPOLLOUT;
    }

    flags as u32
}

fn readiness(bits: u32) -> Interest {
    let bits = bits as libc::c_int;
    let mut interest = Interest::NONE;

    // A hang-up is surfaced as readability so the next read observes EOF.
    if bits & (EPOLLIN | EPOLLRDHUP | EPOLLHUP) != 0 {
        interest |= Interest::READ;
    }
    if bits & EPOLLOUT != 0 {
        interest |= Interest::WRITE;
    }
    if bits & EPOLLERR != 0 {
        interest |= Interest::ERROR;
    }

    interest
}

// Rounded up so a sub-millisecond deadline does not turn into a busy loop.
fn timeout_ms(timeout: Duration) -> libc::c_int {
    let mut millis = timeout.as_millis();
    if Duration::from_millis(millis as u64) < timeout {
        millis += 1;
    }

    millis.min(libc::c_int::MAX as u128) as libc::c_int
}
