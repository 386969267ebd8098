use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Readiness interest bits for a registered descriptor.
///
/// The same type describes what a selectable wants to be told about
/// (registration) and what actually happened (delivery). `ERROR` is never
/// requested explicitly: the OS always reports it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Interest(u8);

impl Interest {
    pub const NONE: Interest = Interest(0);
    pub const READ: Interest = Interest(1 << 0);
    pub const WRITE: Interest = Interest(1 << 1);
    pub const ERROR: Interest = Interest(1 << 2);

    /// True when every bit of `other` is set in `self`.
    pub const fn contains(self, other: Interest) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when at least one bit of `other` is set in `self`.
    pub const fn intersects(self, other: Interest) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn with(self, other: Interest) -> Interest {
        Interest(self.0 | other.0)
    }

    pub const fn without(self, other: Interest) -> Interest {
        Interest(self.0 & !other.0)
    }

    pub const fn is_readable(self) -> bool {
        self.contains(Interest::READ)
    }

    pub const fn is_writable(self) -> bool {
        self.contains(Interest::WRITE)
    }
}

impl BitOr for Interest {
    type Output = Interest;

    fn bitor(self, rhs: Interest) -> Interest {
        self.with(rhs)
    }
}

impl BitOrAssign for Interest {
    fn bitor_assign(&mut self, rhs: Interest) {
        *self = self.with(rhs);
    }
}

impl fmt::Debug for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();

        if self.contains(Interest::READ) {
            names.push("READ");
        }
        if self.contains(Interest::WRITE) {
            names.push("WRITE");
        }
        if self.contains(Interest::ERROR) {
            names.push("ERROR");
        }
        if names.is_empty() {
            names.push("NONE");
        }

        write!(f, "{}", names.join(" | "))
    }
}
