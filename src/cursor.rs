//! Cursors over the sorted record chain
//!
//! A cursor is a byte offset plus a view of the mapped region. The public
//! [`Cursor`] pins the map with a read guard for its whole lifetime, so the
//! links and payloads it walks cannot move or grow underneath it. The
//! crate-internal [`ChainCursor`] is the same walk over a plain byte slice;
//! the insertion-point search in `set` drives it directly.

use parking_lot::RwLockReadGuard;

use crate::layout::{NIL, record};
use crate::region::MappedFile;
use crate::types::Offset;

/// Chain walker over a raw region buffer.
pub(crate) struct ChainCursor<'a> {
    buf: &'a [u8],
    pub(crate) offset: Offset,
}

impl<'a> ChainCursor<'a> {
    pub(crate) fn new(buf: &'a [u8], offset: Offset) -> Self {
        Self { buf, offset }
    }

    /// Follow the forward link. Returns false at the tail.
    pub(crate) fn advance(&mut self) -> bool {
        match record::next(self.buf, self.offset) {
            NIL => false,
            next => {
                self.offset = next;
                true
            }
        }
    }

    /// Follow the backward link. Returns false at the head.
    pub(crate) fn retreat(&mut self) -> bool {
        match record::prev(self.buf, self.offset) {
            NIL => false,
            prev => {
                self.offset = prev;
                true
            }
        }
    }

    pub(crate) fn key(&self) -> &'a [u8] {
        record::key(self.buf, self.offset)
    }

    pub(crate) fn value(&self) -> &'a [u8] {
        record::value(self.buf, self.offset)
    }

    pub(crate) fn removed(&self) -> bool {
        record::removed(self.buf, self.offset)
    }
}

/// Read-only cursor over the records of a map, in key order.
///
/// Tombstoned records stay in the chain and are visible to the cursor;
/// check [`Cursor::removed`] to skip them. The cursor holds a read lock on
/// the map, so mutations block until every cursor is dropped — a thread
/// must drop its cursors before calling `set` or `remove` on the same map.
pub struct Cursor<'a> {
    region: RwLockReadGuard<'a, MappedFile>,
    offset: Offset,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(region: RwLockReadGuard<'a, MappedFile>, offset: Offset) -> Self {
        Self { region, offset }
    }

    fn chain(&self) -> ChainCursor<'_> {
        ChainCursor::new(self.region.bytes(), self.offset)
    }

    /// Move to the next record in key order. Returns false at the tail.
    pub fn advance(&mut self) -> bool {
        let next = record::next(self.region.bytes(), self.offset);
        if next == NIL {
            return false;
        }
        self.offset = next;
        true
    }

    /// Move to the previous record in key order. Returns false at the head.
    pub fn retreat(&mut self) -> bool {
        let prev = record::prev(self.region.bytes(), self.offset);
        if prev == NIL {
            return false;
        }
        self.offset = prev;
        true
    }

    /// Key bytes of the current record.
    pub fn key(&self) -> &[u8] {
        self.chain().key()
    }

    /// Value bytes of the current record.
    pub fn value(&self) -> &[u8] {
        self.chain().value()
    }

    /// Whether the current record is a tombstone.
    pub fn removed(&self) -> bool {
        self.chain().removed()
    }
}

/// Iterator over live `(key, value)` pairs in key order, copied out of the
/// map. Holds a read lock until exhausted or dropped.
pub struct Iter<'a> {
    cursor: Option<Cursor<'a>>,
}

impl<'a> Iter<'a> {
    pub(crate) fn new(cursor: Option<Cursor<'a>>) -> Self {
        Self { cursor }
    }
}

impl Iterator for Iter<'_> {
    type Item = (Vec<u8>, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        let mut cursor = self.cursor.take()?;
        loop {
            if !cursor.removed() {
                let item = (cursor.key().to_vec(), cursor.value().to_vec());
                if cursor.advance() {
                    self.cursor = Some(cursor);
                }
                return Some(item);
            }
            if !cursor.advance() {
                return None;
            }
        }
    }
}
