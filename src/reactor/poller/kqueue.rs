use crate::reactor::event::Interest;
use crate::utils::sys::cvt;

use libc::{
    EV_ADD, EV_CLEAR, EV_DELETE, EV_DISABLE, EV_ENABLE, EV_EOF, EV_ERROR, EVFILT_READ,
    EVFILT_USER, EVFILT_WRITE, NOTE_TRIGGER, kevent, kqueue,
};
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::ptr;
use std::time::Duration;

const WAKE_IDENT: usize = 1;

/// kqueue instance with an `EVFILT_USER` event used for wakeups.
pub(crate) struct Poller {
    kqueue: OwnedFd,
}

impl Poller {
    pub(crate) fn new() -> io::Result<Self> {
        let fd = cvt(unsafe { kqueue() })?;
        let kqueue = unsafe { OwnedFd::from_raw_fd(fd) };

        let poller = Poller { kqueue };
        poller.apply(&[change(
            WAKE_IDENT,
            EVFILT_USER,
            EV_ADD | EV_ENABLE | EV_CLEAR,
            0,
            0,
        )])?;

        Ok(poller)
    }

    /// Watches `fd`. Its events come back tagged with `generation`, carried
    /// in `udata`.
    pub(crate) fn add(&self, fd: RawFd, generation: u32, interest: Interest) -> io::Result<()> {
        self.apply(&filters(fd, generation, EV_ADD, interest))
    }

    pub(crate) fn modify(&self, fd: RawFd, generation: u32, interest: Interest) -> io::Result<()> {
        self.apply(&filters(fd, generation, EV_ADD, interest))
    }

    pub(crate) fn delete(&self, fd: RawFd) -> io::Result<()> {
        self.apply(&[
            change(fd as usize, EVFILT_READ, EV_DELETE, 0, 0),
            change(fd as usize, EVFILT_WRITE, EV_DELETE, 0, 0),
        ])
    }

    pub(crate) fn wake(&self) -> io::Result<()> {
        self.apply(&[change(WAKE_IDENT, EVFILT_USER, 0, NOTE_TRIGGER, 0)])
    }

    /// Blocks for at most `timeout`, filling `events` with what fired.
    pub(crate) fn wait(&self, events: &mut Events, timeout: Duration) -> io::Result<()> {
        events.raw.clear();

        let timeout = libc::timespec {
            tv_sec: timeout.as_secs().min(libc::time_t::MAX as u64) as libc::time_t,
            tv_nsec: timeout.subsec_nanos() as _,
        };

        let ready = cvt(unsafe {
            kevent(
                self.kqueue.as_raw_fd(),
                ptr::null(),
                0,
                events.raw.as_mut_ptr(),
                events.capacity as libc::c_int,
                &timeout,
            )
        })?;

        // SAFETY: kevent initialised the first `ready` entries.
        unsafe { events.raw.set_len(ready as usize) };

        Ok(())
    }

    fn apply(&self, changes: &[libc::kevent]) -> io::Result<()> {
        cvt(unsafe {
            kevent(
                self.kqueue.as_raw_fd(),
                changes.as_ptr(),
                changes.len() as libc::c_int,
                ptr::null_mut(),
                0,
                ptr::null(),
            )
        })?;

        Ok(())
    }
}

/// Buffer that receives the events of one wait call.
pub(crate) struct Events {
    raw: Vec<libc::kevent>,
    capacity: usize,
}

// The raw entries carry a `udata` pointer that only holds a generation
// number and is never dereferenced.
unsafe impl Send for Events {}

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
    /// readiness each one reported. A descriptor may show up twice, once per
    /// filter.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (RawFd, u32, Interest)> + '_ {
        self.raw.iter().filter_map(|event| {
            if event.filter == EVFILT_USER {
                return None;
            }

            let mut interest = Interest::NONE;
            match event.filter {
                EVFILT_READ => interest |= Interest::READ,
                EVFILT_WRITE => interest |= Interest::WRITE,
                _ => {}
            }
            if event.flags & EV_ERROR != 0 {
                interest |= Interest::ERROR;
            }
            // EOF on the write side with a pending socket error.
            if event.flags & EV_EOF != 0 && event.fflags != 0 {
                interest |= Interest::ERROR;
            }

            Some((event.ident as RawFd, event.udata as usize as u32, interest))
        })
    }
}

// Both filters are always installed and toggled, so modify never has to
// know what was registered before.
fn filters(fd: RawFd, generation: u32, flags: u16, interest: Interest) -> [libc::kevent; 2] {
    let toggle = |enabled: bool| if enabled { EV_ENABLE } else { EV_DISABLE };

    [
        change(
            fd as usize,
            EVFILT_READ,
            flags | toggle(interest.is_readable()),
            0,
            generation,
        ),
        change(
            fd as usize,
            EVFILT_WRITE,
            flags | toggle(interest.is_writable()),
            0,
            generation,
        ),
    ]
}

fn change(ident: usize, filter: i16, flags: u16, fflags: u32, generation: u32) -> libc::kevent {
    // SAFETY: kevent is plain old data and the layout differs between BSDs.
    let mut event: libc::kevent = unsafe { std::mem::zeroed() };

    event.ident = ident as _;
    event.filter = filter as _;
    event.flags = flags as _;
    event.fflags = fflags as _;
    event.udata = generation as usize as _;

    event
}
