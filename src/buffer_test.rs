use std::io::Cursor;

use crate::buffer::Bufio;
use crate::constant::{DEFAULT_BUF_SIZE, MAX_CACHED_BUF_SIZE};
use crate::error::Error;

#[test]
fn read_next_basic() {
    let mut buf = Bufio::new();
    let mut src = Cursor::new(vec![1u8, 2, 3, 4, 5, 6, 7, 8]);

    let view = buf.read_next(&mut src, 4).unwrap();
    assert_eq!(view, &[1, 2, 3, 4]);
    let view = buf.read_next(&mut src, 4).unwrap();
    assert_eq!(view, &[5, 6, 7, 8]);
}

#[test]
fn read_next_larger_than_default() {
    let data: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
    let mut buf = Bufio::new();
    let mut src = Cursor::new(data.clone());

    let view = buf.read_next(&mut src, 4).unwrap();
    assert_eq!(view, &data[..4]);
    let view = buf.read_next(&mut src, 19_000).unwrap();
    assert_eq!(view, &data[4..19_004]);
    let view = buf.read_next(&mut src, 996).unwrap();
    assert_eq!(view, &data[19_004..]);
}

#[test]
fn read_next_eof() {
    let mut buf = Bufio::new();
    let mut src = Cursor::new(vec![1u8, 2]);
    let err = buf.read_next(&mut src, 4).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
}

#[test]
fn flip_preserves_window_across_fill() {
    // Drain a partial window, schedule a flip, then force a fill; the
    // leftover bytes must migrate into the idle slice intact.
    let data: Vec<u8> = (0..DEFAULT_BUF_SIZE as u32 * 2).map(|i| (i % 256) as u8).collect();
    let mut buf = Bufio::new();
    let mut src = Cursor::new(data.clone());

    let view = buf.read_next(&mut src, 16).unwrap();
    assert_eq!(view, &data[..16]);
    buf.flip();
    // Larger than what is buffered: triggers a fill in the other slice.
    let view = buf.read_next(&mut src, DEFAULT_BUF_SIZE + 100).unwrap();
    assert_eq!(view, &data[16..16 + DEFAULT_BUF_SIZE + 100]);
}

#[test]
fn take_buffer_busy_latch() {
    let mut buf = Bufio::new();
    let taken = buf.take_buffer(64).unwrap();
    assert!(buf.is_busy());
    assert_eq!(taken.len(), 64);

    assert!(matches!(buf.take_buffer(16), Err(Error::BusyBuffer)));
    assert!(matches!(buf.take_small_buffer(16), Err(Error::BusyBuffer)));
    assert!(matches!(buf.take_complete_buffer(), Err(Error::BusyBuffer)));

    buf.store(taken);
    assert!(!buf.is_busy());
    assert!(buf.take_buffer(16).is_ok());
}

#[test]
fn take_complete_buffer_reserves_header() {
    let mut buf = Bufio::new();
    let taken = buf.take_complete_buffer().unwrap();
    assert_eq!(taken.len(), 4);
    assert_eq!(&taken[..], &[0, 0, 0, 0]);
    buf.store(taken);
}

#[test]
fn store_adopts_grown_buffer() {
    let mut buf = Bufio::new();
    let mut taken = buf.take_buffer(64).unwrap();
    taken.reserve(32 * 1024);
    let grown_cap = taken.capacity();
    buf.store(taken);

    // The grown buffer became the scratch: taking again yields it back.
    let taken = buf.take_buffer(64).unwrap();
    assert!(taken.capacity() >= grown_cap);
    buf.store(taken);
}

#[test]
fn store_rejects_oversized_buffer() {
    let mut buf = Bufio::new();
    let taken = buf.take_buffer(64).unwrap();
    buf.store(taken);

    // A buffer above the cached cap is not adopted.
    let huge = vec![0u8; MAX_CACHED_BUF_SIZE + 1];
    buf.store(huge);
    let taken = buf.take_buffer(64).unwrap();
    assert!(taken.capacity() <= MAX_CACHED_BUF_SIZE);
    buf.store(taken);
}
