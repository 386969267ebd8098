use sockloop::buffer::DEFAULT_CAPACITY;
use sockloop::{ByteBuffer, Endian};

#[test]
fn test_integers_round_trip_in_both_byte_orders() {
    for endian in [Endian::Big, Endian::Little] {
        let mut buffer = ByteBuffer::with_capacity(4);

        for step in 0..50u64 {
            buffer.write_integer(step as u8, endian);
            buffer.write_integer((step * 257) as u16, endian);
            buffer.write_integer((step * 65_537) as u32, endian);
            buffer.write_integer(step * 0x0101_0101_0101, endian);
        }

        for step in 0..50u64 {
            assert_eq!(buffer.read_integer::<u8>(endian), Some(step as u8));
            assert_eq!(buffer.read_integer::<u16>(endian), Some((step * 257) as u16));
            assert_eq!(buffer.read_integer::<u32>(endian), Some((step * 65_537) as u32));
            assert_eq!(buffer.read_integer::<u64>(endian), Some(step * 0x0101_0101_0101));
        }

        assert!(buffer.is_empty());
    }
}

#[test]
fn test_byte_order_on_the_wire() {
    let mut buffer = ByteBuffer::new();
    buffer.write_integer(0x0102_0304u32, Endian::Big);
    buffer.write_integer(0x0102_0304u32, Endian::Little);
    buffer.write_integer(-2i16, Endian::Big);

    assert_eq!(
        buffer.readable_bytes(),
        &[1, 2, 3, 4, 4, 3, 2, 1, 0xFF, 0xFE]
    );
}

#[test]
fn test_read_past_count_fails_without_moving() {
    let mut buffer = ByteBuffer::from(&[0xABu8, 0xCD, 0xEF]);

    assert_eq!(buffer.read_integer::<u32>(Endian::Big), None);
    assert_eq!(buffer.read_index(), 0);
    assert_eq!(buffer.read_bytes(4), None);

    assert_eq!(buffer.read_integer::<u16>(Endian::Big), Some(0xABCD));
    assert_eq!(buffer.read_bytes(1), Some(vec![0xEF]));
    assert_eq!(buffer.read_integer::<u8>(Endian::Little), None);
}

#[test]
fn test_doubling_preserves_unread_bytes() {
    let mut buffer = ByteBuffer::with_capacity(8);
    buffer.write_bytes(b"abcdefgh");
    buffer.move_read_index(3);

    let before = buffer.to_vec();
    let count = buffer.len();
    buffer.double_capacity();

    assert_eq!(buffer.capacity(), 16);
    assert_eq!(buffer.len(), count);
    assert_eq!(buffer.to_vec(), before);
    assert_eq!(buffer.read_index(), 0);
}

#[test]
fn test_write_grows_to_fit() {
    let mut buffer = ByteBuffer::with_capacity(4);
    let payload: Vec<u8> = (0..=255).collect();

    buffer.write_bytes(&payload);

    assert_eq!(buffer.capacity(), 256);
    assert_eq!(buffer.readable_bytes(), payload.as_slice());
}

#[test]
fn test_reserve_reuses_consumed_space_first() {
    let mut buffer = ByteBuffer::with_capacity(8);
    buffer.write_bytes(b"12345678");
    buffer.move_read_index(6);

    buffer.write_bytes(b"abc");

    assert_eq!(buffer.capacity(), 8);
    assert_eq!(buffer.readable_bytes(), b"78abc");
}

#[test]
fn test_cursor_moves_after_external_transfer() {
    let mut buffer = ByteBuffer::new();
    assert_eq!(buffer.capacity(), DEFAULT_CAPACITY);

    let writable = buffer.writable_bytes();
    writable[..5].copy_from_slice(b"hello");
    buffer.move_write_index(5);

    assert_eq!(buffer.readable_bytes(), b"hello");

    buffer.move_read_index(2);
    assert_eq!(buffer.readable_bytes(), b"llo");
    assert_eq!(buffer.len(), 3);
}

#[test]
#[should_panic]
fn test_move_read_index_past_write_index_panics() {
    let mut buffer = ByteBuffer::from("ab");
    buffer.move_read_index(3);
}

#[test]
#[should_panic]
fn test_move_write_index_past_capacity_panics() {
    let mut buffer = ByteBuffer::with_capacity(4);
    buffer.move_write_index(5);
}

#[test]
fn test_wrapping_existing_bytes() {
    let buffer = ByteBuffer::from(b"ping".to_vec());

    assert_eq!(buffer.len(), 4);
    assert_eq!(buffer.capacity(), 4);
    assert_eq!(buffer.to_vec(), b"ping");
}
