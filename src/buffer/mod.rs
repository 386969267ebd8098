//! Byte staging buffers used on the channel I/O paths.
//!
//! - [`byte_buffer`]: [`ByteBuffer`], a growable buffer with read/write cursors
//!   and an integer codec
//! - [`circular`]: [`CircularBuffer`], the power-of-two FIFO that holds
//!   outbound buffers until the socket accepts them

pub mod byte_buffer;
pub mod circular;

pub use byte_buffer::{ByteBuffer, DEFAULT_CAPACITY, Endian, FixedWidth};
pub use circular::CircularBuffer;
