//! On-disk layout of the root directory and record headers
//!
//! All multi-byte fields are little-endian and are read and written in
//! place at absolute byte offsets inside the mapped region, so a field
//! update is immediately visible to anything else holding the mapping.
//! Offsets stay valid across growth; raw slices do not, so nothing here
//! hands out a view that outlives a single call.
//!
//! ```text
//! offset 0 .. 24      root:   first u64 | last u64 | last_inserted u64
//! offset 24 ..        record: prev u64 | next u64 | key_len u16 |
//!                             value_len u16 | removed u8 | key | value
//! ```

use byteorder::{ByteOrder, LittleEndian};

use crate::types::Offset;

/// Null link sentinel.
pub const NIL: Offset = 0;

/// Byte length of the root directory at the start of the file.
pub const ROOT_LEN: usize = 24;

/// Byte length of a record header. Payload bytes follow with no padding.
pub const RECORD_HEADER_LEN: usize = 21;

/// Largest possible record: header plus maximal key and value payloads.
pub const MAX_RECORD_LEN: usize = RECORD_HEADER_LEN + u16::MAX as usize + u16::MAX as usize;

// Field offsets inside the root directory.
const ROOT_FIRST: usize = 0;
const ROOT_LAST: usize = 8;
const ROOT_LAST_INSERTED: usize = 16;

// Field offsets inside a record header, relative to the record start.
const REC_PREV: usize = 0;
const REC_NEXT: usize = 8;
const REC_KEY_LEN: usize = 16;
const REC_VALUE_LEN: usize = 18;
const REC_REMOVED: usize = 20;

/// Accessors for the root directory at the start of the mapped region.
pub mod root {
    use super::*;

    /// Head of the sorted chain, or [`NIL`] on an empty map.
    pub fn first(buf: &[u8]) -> Offset {
        LittleEndian::read_u64(&buf[ROOT_FIRST..])
    }

    pub fn set_first(buf: &mut [u8], at: Offset) {
        LittleEndian::write_u64(&mut buf[ROOT_FIRST..], at);
    }

    /// Tail of the sorted chain, or [`NIL`] on an empty map.
    pub fn last(buf: &[u8]) -> Offset {
        LittleEndian::read_u64(&buf[ROOT_LAST..])
    }

    pub fn set_last(buf: &mut [u8], at: Offset) {
        LittleEndian::write_u64(&mut buf[ROOT_LAST..], at);
    }

    /// Start of the most recently appended record. [`NIL`] means the map
    /// has never held a record; the bump pointer only ever increases.
    pub fn last_inserted(buf: &[u8]) -> Offset {
        LittleEndian::read_u64(&buf[ROOT_LAST_INSERTED..])
    }

    pub fn set_last_inserted(buf: &mut [u8], at: Offset) {
        LittleEndian::write_u64(&mut buf[ROOT_LAST_INSERTED..], at);
    }
}

/// Accessors for a record at a given offset in the mapped region.
pub mod record {
    use super::*;

    pub fn prev(buf: &[u8], at: Offset) -> Offset {
        LittleEndian::read_u64(&buf[at as usize + REC_PREV..])
    }

    pub fn set_prev(buf: &mut [u8], at: Offset, link: Offset) {
        LittleEndian::write_u64(&mut buf[at as usize + REC_PREV..], link);
    }

    pub fn next(buf: &[u8], at: Offset) -> Offset {
        LittleEndian::read_u64(&buf[at as usize + REC_NEXT..])
    }

    pub fn set_next(buf: &mut [u8], at: Offset, link: Offset) {
        LittleEndian::write_u64(&mut buf[at as usize + REC_NEXT..], link);
    }

    pub fn key_len(buf: &[u8], at: Offset) -> usize {
        LittleEndian::read_u16(&buf[at as usize + REC_KEY_LEN..]) as usize
    }

    pub fn value_len(buf: &[u8], at: Offset) -> usize {
        LittleEndian::read_u16(&buf[at as usize + REC_VALUE_LEN..]) as usize
    }

    pub fn removed(buf: &[u8], at: Offset) -> bool {
        buf[at as usize + REC_REMOVED] != 0
    }

    pub fn set_removed(buf: &mut [u8], at: Offset) {
        buf[at as usize + REC_REMOVED] = 1;
    }

    /// Key bytes of the record at `at`.
    pub fn key(buf: &[u8], at: Offset) -> &[u8] {
        let start = at as usize + RECORD_HEADER_LEN;
        &buf[start..start + key_len(buf, at)]
    }

    /// Value bytes of the record at `at`.
    pub fn value(buf: &[u8], at: Offset) -> &[u8] {
        let start = at as usize + RECORD_HEADER_LEN + key_len(buf, at);
        &buf[start..start + value_len(buf, at)]
    }

    /// Offset one past the record at `at`, where the next bump-pointer
    /// append lands.
    pub fn end(buf: &[u8], at: Offset) -> Offset {
        at + (RECORD_HEADER_LEN + key_len(buf, at) + value_len(buf, at)) as Offset
    }

    /// Write a fresh, unlinked record at `at`, copying the payload into
    /// place. Links start at [`NIL`] and get patched during splicing. The
    /// region may hold stale bytes from an interrupted insert, so every
    /// header field is written explicitly.
    pub fn write(buf: &mut [u8], at: Offset, key: &[u8], value: &[u8]) {
        let rec = at as usize;
        LittleEndian::write_u64(&mut buf[rec + REC_PREV..], NIL);
        LittleEndian::write_u64(&mut buf[rec + REC_NEXT..], NIL);
        LittleEndian::write_u16(&mut buf[rec + REC_KEY_LEN..], key.len() as u16);
        LittleEndian::write_u16(&mut buf[rec + REC_VALUE_LEN..], value.len() as u16);
        buf[rec + REC_REMOVED] = 0;
        let key_start = rec + RECORD_HEADER_LEN;
        buf[key_start..key_start + key.len()].copy_from_slice(key);
        let value_start = key_start + key.len();
        buf[value_start..value_start + value.len()].copy_from_slice(value);
    }
}
