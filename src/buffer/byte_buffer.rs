//! Growable byte staging buffer with independent read and write cursors.

use std::fmt;

/// Capacity of a receive buffer created with [`ByteBuffer::new`].
pub const DEFAULT_CAPACITY: usize = 1024;

/// Byte order used by [`ByteBuffer::read_integer`] and
/// [`ByteBuffer::write_integer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    #[default]
    Big,
    Little,
}

/// Fixed-width integers that can be encoded into a [`ByteBuffer`].
///
/// Implemented for every primitive integer type from 8 to 128 bits.
pub trait FixedWidth: Copy + sealed::Sealed {
    /// Encoded width in bytes.
    const SIZE: usize;

    #[doc(hidden)]
    fn decode(bytes: &[u8], endian: Endian) -> Self;

    #[doc(hidden)]
    fn encode(self, out: &mut [u8], endian: Endian);
}

mod sealed {
    pub trait Sealed {}
}

macro_rules! fixed_width {
    ($($ty:ty),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}

            impl FixedWidth for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn decode(bytes: &[u8], endian: Endian) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&bytes[..Self::SIZE]);

                    match endian {
                        Endian::Big => <$ty>::from_be_bytes(raw),
                        Endian::Little => <$ty>::from_le_bytes(raw),
                    }
                }

                fn encode(self, out: &mut [u8], endian: Endian) {
                    let raw = match endian {
                        Endian::Big => self.to_be_bytes(),
                        Endian::Little => self.to_le_bytes(),
                    };

                    out[..Self::SIZE].copy_from_slice(&raw);
                }
            }
        )*
    };
}

fixed_width!(u8, i8, u16, i16, u32, i32, u64, i64, u128, i128);

/// The unit of I/O staging for channels.
///
/// A `ByteBuffer` owns a block of storage and two cursors into it. Bytes
/// between the read cursor and the write cursor are the readable window,
/// bytes from the write cursor to the end of storage are free space:
///
/// ```text
/// 0 <= read_index <= write_index <= capacity
/// ```
///
/// Channels read straight into [`ByteBuffer::writable_bytes`] and then
/// commit the transfer with [`ByteBuffer::move_write_index`]; outbound data
/// is consumed from [`ByteBuffer::readable_bytes`] and released with
/// [`ByteBuffer::move_read_index`]. When a write does not fit, the capacity
/// doubles and the unread window is moved back to offset zero.
///
/// # Example
/// ```
/// use sockloop::{ByteBuffer, Endian};
///
/// let mut buffer = ByteBuffer::new();
/// buffer.write_integer(0xCAFEu16, Endian::Big);
/// buffer.write_integer(7u32, Endian::Little);
///
/// assert_eq!(buffer.len(), 6);
/// assert_eq!(buffer.read_integer::<u16>(Endian::Big), Some(0xCAFE));
/// assert_eq!(buffer.read_integer::<u32>(Endian::Little), Some(7));
/// assert_eq!(buffer.read_integer::<u8>(Endian::Big), None);
/// ```
#[derive(Clone, Default)]
pub struct ByteBuffer {
    storage: Vec<u8>,
    read_index: usize,
    write_index: usize,
}

impl ByteBuffer {
    /// Creates an empty buffer with [`DEFAULT_CAPACITY`] bytes of free space.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates an empty buffer with `capacity` bytes of free space.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: vec![0; capacity],
            read_index: 0,
            write_index: 0,
        }
    }

    /// Total size of the backing storage.
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Number of unread bytes.
    pub fn len(&self) -> usize {
        self.write_index - self.read_index
    }

    pub fn is_empty(&self) -> bool {
        self.read_index == self.write_index
    }

    pub fn read_index(&self) -> usize {
        self.read_index
    }

    pub fn write_index(&self) -> usize {
        self.write_index
    }

    /// The unread window.
    pub fn readable_bytes(&self) -> &[u8] {
        &self.storage[self.read_index..self.write_index]
    }

    /// The free space after the write cursor.
    pub fn writable_bytes(&mut self) -> &mut [u8] {
        &mut self.storage[self.write_index..]
    }

    /// Advances the read cursor after `count` bytes were consumed.
    ///
    /// # Panics
    /// Panics if `count` exceeds [`ByteBuffer::len`].
    pub fn move_read_index(&mut self, count: usize) {
        assert!(
            count <= self.len(),
            "read cursor moved past the write cursor ({count} > {})",
            self.len()
        );

        self.read_index += count;
    }

    /// Advances the write cursor after `count` bytes were produced in
    /// [`ByteBuffer::writable_bytes`].
    ///
    /// # Panics
    /// Panics if `count` exceeds the free space.
    pub fn move_write_index(&mut self, count: usize) {
        assert!(
            self.write_index + count <= self.capacity(),
            "write cursor moved past the end of storage"
        );

        self.write_index += count;
    }

    /// Decodes a `T` at the read cursor and advances past it.
    ///
    /// Returns `None`, leaving the cursor untouched, when fewer than
    /// `T::SIZE` bytes are readable.
    pub fn read_integer<T: FixedWidth>(&mut self, endian: Endian) -> Option<T> {
        if self.len() < T::SIZE {
            return None;
        }

        let value = T::decode(self.readable_bytes(), endian);
        self.read_index += T::SIZE;

        Some(value)
    }

    /// Encodes `value` at the write cursor, growing the buffer if needed.
    pub fn write_integer<T: FixedWidth>(&mut self, value: T, endian: Endian) {
        self.reserve(T::SIZE);

        value.encode(self.writable_bytes(), endian);
        self.write_index += T::SIZE;
    }

    /// Appends `bytes` at the write cursor, growing the buffer if needed.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.reserve(bytes.len());

        self.storage[self.write_index..self.write_index + bytes.len()].copy_from_slice(bytes);
        self.write_index += bytes.len();
    }

    /// Consumes and returns exactly `count` bytes, or `None` if fewer are
    /// readable.
    pub fn read_bytes(&mut self, count: usize) -> Option<Vec<u8>> {
        if self.len() < count {
            return None;
        }

        let bytes = self.storage[self.read_index..self.read_index + count].to_vec();
        self.read_index += count;

        Some(bytes)
    }

    /// Copies the unread window out.
    pub fn to_vec(&self) -> Vec<u8> {
        self.readable_bytes().to_vec()
    }

    /// Makes room for at least `additional` bytes after the write cursor.
    ///
    /// Already consumed space is reclaimed first; when that is not enough
    /// the capacity doubles until the write fits.
    pub fn reserve(&mut self, additional: usize) {
        if self.write_index + additional <= self.capacity() {
            return;
        }

        if self.len() + additional <= self.capacity() {
            self.compact();
            return;
        }

        while self.len() + additional > self.capacity() {
            self.double_capacity();
        }
    }

    /// Doubles the capacity and moves the unread window to offset zero.
    pub fn double_capacity(&mut self) {
        let capacity = (self.capacity() * 2).max(1);
        let mut storage = vec![0; capacity];
        let count = self.len();

        storage[..count].copy_from_slice(self.readable_bytes());

        self.storage = storage;
        self.read_index = 0;
        self.write_index = count;
    }

    /// Moves the unread window to offset zero without growing.
    pub fn compact(&mut self) {
        if self.read_index == 0 {
            return;
        }

        self.storage
            .copy_within(self.read_index..self.write_index, 0);
        self.write_index -= self.read_index;
        self.read_index = 0;
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        let write_index = bytes.len();

        Self {
            storage: bytes,
            read_index: 0,
            write_index,
        }
    }
}

impl From<&[u8]> for ByteBuffer {
    fn from(bytes: &[u8]) -> Self {
        Self::from(bytes.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for ByteBuffer {
    fn from(bytes: &[u8; N]) -> Self {
        Self::from(bytes.to_vec())
    }
}

impl From<&str> for ByteBuffer {
    fn from(text: &str) -> Self {
        Self::from(text.as_bytes().to_vec())
    }
}

impl fmt::Debug for ByteBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteBuffer")
            .field("read_index", &self.read_index)
            .field("write_index", &self.write_index)
            .field("capacity", &self.capacity())
            .finish()
    }
}
