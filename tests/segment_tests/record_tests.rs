//! Tests for the record codec and record scanner
//!
//! These tests verify:
//! - Frame layout (little-endian length prefixes)
//! - Decoding a single frame at an offset
//! - Corruption detection (lengths past the end, bad UTF-8, truncation)
//! - Scanning stops cleanly at a torn trailing record

use std::io::Cursor;
use std::path::Path;

use segkv::segment::{Record, RecordScanner};
use segkv::KvError;

// =============================================================================
// Helper Functions
// =============================================================================

fn frame(key: &str, value: &str) -> Vec<u8> {
    Record::encode(key, value).unwrap().to_vec()
}

fn path() -> &'static Path {
    Path::new("segment0")
}

// =============================================================================
// Encoding Tests
// =============================================================================

#[test]
fn test_encode_layout() {
    let bytes = frame("key", "value");

    assert_eq!(bytes.len(), 4 + 3 + 4 + 5);
    assert_eq!(&bytes[0..4], &3u32.to_le_bytes());
    assert_eq!(&bytes[4..7], b"key");
    assert_eq!(&bytes[7..11], &5u32.to_le_bytes());
    assert_eq!(&bytes[11..16], b"value");
}

#[test]
fn test_encoded_len_matches_encode() {
    let key = "ключ";
    let value = "значение";

    assert_eq!(
        Record::encoded_len(key, value),
        frame(key, value).len() as u64
    );
}

#[test]
fn test_encode_empty_key_and_value() {
    let bytes = frame("", "");

    assert_eq!(bytes, [0u8; 8].to_vec());
}

// =============================================================================
// Decoding Tests
// =============================================================================

#[test]
fn test_decode_single_frame() {
    let bytes = frame("hello", "world");
    let limit = bytes.len() as u64;

    let record = Record::decode_at(&mut Cursor::new(bytes), path(), 0, limit).unwrap();

    assert_eq!(record, Record::new("hello", "world"));
}

#[test]
fn test_decode_second_frame_at_offset() {
    let mut bytes = frame("a", "1");
    let offset = bytes.len() as u64;
    bytes.extend(frame("b", "22"));
    let limit = bytes.len() as u64;

    let mut cursor = Cursor::new(bytes);
    cursor.set_position(offset);
    let record = Record::decode_at(&mut cursor, path(), offset, limit).unwrap();

    assert_eq!(record, Record::new("b", "22"));
}

#[test]
fn test_decode_key_length_past_limit_is_corrupt() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&1000u32.to_le_bytes());
    bytes.extend_from_slice(b"short");
    let limit = bytes.len() as u64;

    let result = Record::decode_at(&mut Cursor::new(bytes), path(), 0, limit);

    assert!(matches!(
        result,
        Err(KvError::CorruptRecord { offset: 0, .. })
    ));
}

#[test]
fn test_decode_value_length_past_limit_is_corrupt() {
    let mut bytes = frame("key", "value");
    // Cut the last two bytes off the value
    bytes.truncate(bytes.len() - 2);
    let limit = bytes.len() as u64;

    let result = Record::decode_at(&mut Cursor::new(bytes), path(), 0, limit);

    assert!(matches!(result, Err(KvError::CorruptRecord { .. })));
}

#[test]
fn test_decode_truncated_reader_is_corrupt() {
    let bytes = frame("key", "value");
    let short = bytes[..6].to_vec();

    // Limit claims the full frame exists, but the reader runs dry
    let result = Record::decode_at(&mut Cursor::new(short), path(), 0, bytes.len() as u64);

    assert!(matches!(result, Err(KvError::CorruptRecord { .. })));
}

#[test]
fn test_decode_invalid_utf8_is_corrupt() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&2u32.to_le_bytes());
    bytes.extend_from_slice(&[0xFF, 0xFE]);
    bytes.extend_from_slice(&1u32.to_le_bytes());
    bytes.extend_from_slice(b"v");
    let limit = bytes.len() as u64;

    let err = Record::decode_at(&mut Cursor::new(bytes), path(), 0, limit).unwrap_err();

    match err {
        KvError::CorruptRecord { reason, .. } => assert!(reason.contains("UTF-8")),
        other => panic!("expected CorruptRecord, got {:?}", other),
    }
}

// =============================================================================
// Scanner Tests
// =============================================================================

#[test]
fn test_scanner_yields_every_record() {
    let mut bytes = frame("k1", "v1");
    bytes.extend(frame("k2", "value2"));
    bytes.extend(frame("k1", "v3"));
    let end = bytes.len() as u64;

    let mut scanner = RecordScanner::new(Cursor::new(bytes), path(), end);
    let locations: Vec<_> = scanner.by_ref().map(|r| r.unwrap()).collect();

    assert_eq!(locations.len(), 3);
    assert_eq!(locations[0].offset, 0);
    assert_eq!(locations[0].key, "k1");
    assert_eq!(locations[1].offset, 12);
    assert_eq!(locations[1].key, "k2");
    assert_eq!(locations[2].offset, 12 + 16);
    assert_eq!(locations[2].key, "k1");
    assert!(!scanner.is_torn());
    assert_eq!(scanner.valid_len(), end);
}

#[test]
fn test_scanner_empty_input() {
    let mut scanner = RecordScanner::new(Cursor::new(Vec::new()), path(), 0);

    assert!(scanner.next().is_none());
    assert!(!scanner.is_torn());
    assert_eq!(scanner.valid_len(), 0);
}

#[test]
fn test_scanner_stops_at_torn_tail() {
    let mut bytes = frame("k1", "v1");
    let valid = bytes.len() as u64;
    let torn = frame("k2", "a longer value");
    bytes.extend_from_slice(&torn[..torn.len() - 3]);
    let end = bytes.len() as u64;

    let mut scanner = RecordScanner::new(Cursor::new(bytes), path(), end);
    let locations: Vec<_> = scanner.by_ref().map(|r| r.unwrap()).collect();

    assert_eq!(locations.len(), 1);
    assert!(scanner.is_torn());
    assert_eq!(scanner.valid_len(), valid);
    assert_eq!(scanner.discarded_bytes(), end - valid);
}

#[test]
fn test_scanner_stops_at_partial_length_prefix() {
    let mut bytes = frame("k1", "v1");
    let valid = bytes.len() as u64;
    bytes.extend_from_slice(&[7, 0]);
    let end = bytes.len() as u64;

    let mut scanner = RecordScanner::new(Cursor::new(bytes), path(), end);

    assert_eq!(scanner.by_ref().count(), 1);
    assert!(scanner.is_torn());
    assert_eq!(scanner.valid_len(), valid);
}

#[test]
fn test_scanner_reports_invalid_utf8_key() {
    let mut bytes = frame("ok", "v");
    bytes.extend_from_slice(&1u32.to_le_bytes());
    bytes.push(0xFF);
    bytes.extend_from_slice(&0u32.to_le_bytes());
    let end = bytes.len() as u64;

    let results: Vec<_> = RecordScanner::new(Cursor::new(bytes), path(), end).collect();

    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(KvError::CorruptRecord { offset: 11, .. })));
}
