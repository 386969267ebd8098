//! Watches whether a local IP address is still assigned.
//!
//! A connection bound to an address that disappears (Wi-Fi handover, VPN
//! teardown) can stay silent for a long time before TCP notices. Polling the
//! interface list catches that within a second.

use crate::reactor::EventLoop;
use crate::timer::TimerHandle;

use libc::{AF_INET, AF_INET6, freeifaddrs, getifaddrs, ifaddrs, sockaddr_in, sockaddr_in6};
use parking_lot::Mutex;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::ptr;
use std::time::Duration;
use tracing::debug;

const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Fires a callback on an event loop while a watched IP is missing from
/// every interface.
pub struct IpDetector {
    event_loop: EventLoop,
    interval: Duration,
    timer: Mutex<Option<TimerHandle>>,
}

impl IpDetector {
    /// Checks once per second on `event_loop`.
    pub fn new(event_loop: &EventLoop) -> Self {
        Self::with_interval(event_loop, DEFAULT_INTERVAL)
    }

    pub fn with_interval(event_loop: &EventLoop, interval: Duration) -> Self {
        Self {
            event_loop: event_loop.clone(),
            interval,
            timer: Mutex::new(None),
        }
    }

    /// Starts watching `ip`, replacing any previous watch. `on_lost` runs on
    /// every check that finds the address missing.
    ///
    /// Returns `false`, without watching, when `ip` is empty or not assigned
    /// right now.
    pub fn start_detect<F>(&self, ip: &str, on_lost: F) -> bool
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.stop_detect();

        if ip.is_empty() || !is_local_ip(ip) {
            return false;
        }

        let watched = ip.to_string();
        let timer = self.event_loop.execute_timer(self.interval, move || {
            if !is_local_ip(&watched) {
                debug!(ip = %watched, "local address lost");
                on_lost();
            }
        });

        *self.timer.lock() = Some(timer);
        true
    }

    pub fn stop_detect(&self) {
        if let Some(timer) = self.timer.lock().take() {
            timer.cancel();
        }
    }

    pub fn is_detecting(&self) -> bool {
        self.timer.lock().is_some()
    }
}

impl Drop for IpDetector {
    fn drop(&mut self) {
        self.stop_detect();
    }
}

/// True when `ip` is assigned to one of this host's interfaces.
///
/// An empty address, or a failure to list interfaces, counts as present.
pub fn is_local_ip(ip: &str) -> bool {
    if ip.is_empty() {
        return true;
    }

    let mut list: *mut ifaddrs = ptr::null_mut();
    if unsafe { getifaddrs(&mut list) } != 0 {
        return true;
    }

    let wanted = ip.parse::<IpAddr>().ok();
    let mut found = false;
    let mut cursor = list;

    while !cursor.is_null() {
        // SAFETY: getifaddrs returned a valid linked list, freed below.
        let entry = unsafe { &*cursor };
        cursor = entry.ifa_next;

        let Some(address) = (unsafe { interface_ip(entry) }) else {
            continue;
        };

        let matches = match wanted {
            Some(wanted) => address == wanted,
            None => address.to_string() == ip,
        };
        if matches {
            found = true;
            break;
        }
    }

    unsafe { freeifaddrs(list) };
    found
}

unsafe fn interface_ip(entry: &ifaddrs) -> Option<IpAddr> {
    if entry.ifa_addr.is_null() {
        return None;
    }

    let family = unsafe { (*entry.ifa_addr).sa_family } as libc::c_int;
    match family {
        AF_INET => {
            let raw = unsafe { &*(entry.ifa_addr as *const sockaddr_in) };
            Some(IpAddr::V4(Ipv4Addr::from(raw.sin_addr.s_addr.to_ne_bytes())))
        }
        AF_INET6 => {
            let raw = unsafe { &*(entry.ifa_addr as *const sockaddr_in6) };
            Some(IpAddr::V6(Ipv6Addr::from(raw.sin6_addr.s6_addr)))
        }
        _ => None,
    }
}
