//! The map engine: ordered insert, lookup, and tombstone removal
//!
//! All records live in one growable mapped file as a sorted doubly linked
//! list. Inserts are bump-pointer appends spliced into the chain; nothing
//! is ever moved or reclaimed. A crash mid-insert can leave at most one
//! appended-but-unlinked record, which is unreachable from the chain and
//! harmless on the next open.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::trace;

use crate::cursor::{ChainCursor, Cursor, Iter};
use crate::error::{ListMapError, Result};
use crate::layout::{NIL, RECORD_HEADER_LEN, ROOT_LEN, record, root};
use crate::region::MappedFile;
use crate::types::{ListMapConfig, MAX_KEY_LEN, MAX_VALUE_LEN, Offset};

/// Persistent ordered key-value map over a single memory-mapped file.
///
/// Mutations (`set`, `remove`) take the write side of one lock and are
/// fully serialized; lookups and cursors share the read side, so growth
/// can never remap the region while a reader holds a view into it.
#[derive(Debug)]
pub struct ListMap {
    region: RwLock<MappedFile>,
}

impl ListMap {
    /// Create a new map, truncating any existing file at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::create_with_config(path, ListMapConfig::default())
    }

    /// Create a new map with an explicit configuration.
    pub fn create_with_config<P: AsRef<Path>>(path: P, config: ListMapConfig) -> Result<Self> {
        let region = MappedFile::create(path.as_ref(), &config)?;
        Ok(Self {
            region: RwLock::new(region),
        })
    }

    /// Open an existing map file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, ListMapConfig::default())
    }

    /// Open an existing map file with an explicit configuration.
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: ListMapConfig) -> Result<Self> {
        let region = MappedFile::open(path.as_ref(), &config)?;
        check_root(&region)?;
        Ok(Self {
            region: RwLock::new(region),
        })
    }

    /// Insert a key-value pair. Keys are kept in lexicographic order;
    /// inserting a key that is already live fails with
    /// [`ListMapError::KeyExists`], leaving the stored value unchanged.
    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.len() > MAX_KEY_LEN {
            return Err(ListMapError::KeyTooLarge(key.len()));
        }
        if value.len() > MAX_VALUE_LEN {
            return Err(ListMapError::ValueTooLarge(value.len()));
        }

        let mut region = self.region.write();

        let last_inserted = root::last_inserted(region.bytes());
        let at = if last_inserted == NIL {
            ROOT_LEN as Offset
        } else {
            record::end(region.bytes(), last_inserted)
        };
        region.ensure_capacity(at)?;

        record::write(region.bytes_mut(), at, key, value);
        trace!(
            "appended record at {at} ({} key bytes, {} value bytes)",
            key.len(),
            value.len()
        );

        if last_inserted == NIL {
            let buf = region.bytes_mut();
            root::set_first(buf, at);
            root::set_last(buf, at);
            root::set_last_inserted(buf, at);
            return Ok(());
        }
        root::set_last_inserted(region.bytes_mut(), at);

        // Tail fast path: sequential inserts land right after the tail.
        let last = root::last(region.bytes());
        let tail_ord = record::key(region.bytes(), last).cmp(key);
        if tail_ord == Ordering::Less
            || (tail_ord == Ordering::Equal && record::removed(region.bytes(), last))
        {
            link_after_tail(&mut region, last, at);
            return Ok(());
        }

        // Head fast path: mirror image for reverse-sequential inserts.
        let first = root::first(region.bytes());
        let head_ord = record::key(region.bytes(), first).cmp(key);
        if head_ord == Ordering::Greater
            || (head_ord == Ordering::Equal && record::removed(region.bytes(), first))
        {
            link_before_head(&mut region, first, at);
            return Ok(());
        }

        // General path: walk backward from the tail to the first key
        // strictly smaller than the new one. A live equal key rejects the
        // insert; tombstoned equals never end the search.
        let (pred, succ) = {
            let buf = region.bytes();
            let mut chain = ChainCursor::new(buf, last);
            loop {
                match chain.key().cmp(key) {
                    Ordering::Equal if !chain.removed() => {
                        // The appended bytes stay behind as unreachable
                        // dead space; links were never touched.
                        return Err(ListMapError::KeyExists);
                    }
                    Ordering::Less => {
                        break (chain.offset, record::next(buf, chain.offset));
                    }
                    _ => {}
                }
                if !chain.retreat() {
                    return Err(ListMapError::CorruptChain(format!(
                        "backward scan from tail {last} passed the head without an insertion point"
                    )));
                }
            }
        };

        let buf = region.bytes_mut();
        record::set_prev(buf, at, pred);
        record::set_next(buf, at, succ);
        record::set_next(buf, pred, at);
        record::set_prev(buf, succ, at);
        Ok(())
    }

    /// Look up the live value for `key`, copied out of the map.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let region = self.region.read();
        let buf = region.bytes();
        if root::last_inserted(buf) == NIL {
            return Err(ListMapError::KeyNotFound);
        }

        let mut chain = ChainCursor::new(buf, root::first(buf));
        loop {
            match chain.key().cmp(key) {
                // The chain is sorted, nothing further can match.
                Ordering::Greater => return Err(ListMapError::KeyNotFound),
                Ordering::Equal if !chain.removed() => return Ok(chain.value().to_vec()),
                _ => {}
            }
            if !chain.advance() {
                return Err(ListMapError::KeyNotFound);
            }
        }
    }

    /// Tombstone the live record for `key`. The record stays in the chain;
    /// removing an absent key is a no-op.
    pub fn remove(&self, key: &[u8]) -> Result<()> {
        let mut region = self.region.write();
        if root::last_inserted(region.bytes()) == NIL {
            return Ok(());
        }

        let target = {
            let buf = region.bytes();
            let mut chain = ChainCursor::new(buf, root::first(buf));
            loop {
                match chain.key().cmp(key) {
                    Ordering::Greater => break None,
                    Ordering::Equal if !chain.removed() => break Some(chain.offset),
                    _ => {}
                }
                if !chain.advance() {
                    break None;
                }
            }
        };

        if let Some(at) = target {
            record::set_removed(region.bytes_mut(), at);
            trace!("tombstoned record at {at}");
        }
        Ok(())
    }

    /// Current length of the backing file in bytes.
    pub fn size(&self) -> u64 {
        self.region.read().size()
    }

    /// Path of the backing file.
    pub fn path(&self) -> PathBuf {
        self.region.read().path().to_path_buf()
    }

    /// Cursor positioned at the first record in key order, or `None` when
    /// the map is empty.
    pub fn first_cursor(&self) -> Option<Cursor<'_>> {
        let region = self.region.read();
        if root::last_inserted(region.bytes()) == NIL {
            return None;
        }
        let first = root::first(region.bytes());
        Some(Cursor::new(region, first))
    }

    /// Iterate live `(key, value)` pairs in key order, copied out.
    pub fn iter(&self) -> Iter<'_> {
        Iter::new(self.first_cursor())
    }

    /// Drop the mapping and delete the backing file.
    pub fn destroy(self) -> Result<()> {
        self.region.into_inner().destroy()
    }
}

fn link_after_tail(region: &mut MappedFile, last: Offset, at: Offset) {
    let buf = region.bytes_mut();
    record::set_next(buf, last, at);
    record::set_prev(buf, at, last);
    root::set_last(buf, at);
}

fn link_before_head(region: &mut MappedFile, first: Offset, at: Offset) {
    let buf = region.bytes_mut();
    record::set_prev(buf, first, at);
    record::set_next(buf, at, first);
    root::set_first(buf, at);
}

/// Reject files whose root links point outside the mapped bytes.
fn check_root(region: &MappedFile) -> Result<()> {
    let buf = region.bytes();
    let size = region.size();
    for (name, at) in [
        ("first", root::first(buf)),
        ("last", root::last(buf)),
        ("last_inserted", root::last_inserted(buf)),
    ] {
        if at == NIL {
            continue;
        }
        if at < ROOT_LEN as Offset || at.saturating_add(RECORD_HEADER_LEN as Offset) > size {
            return Err(ListMapError::Corrupt(format!(
                "root {name} offset {at} is outside the file ({size} bytes)"
            )));
        }
        if record::end(buf, at) > size {
            return Err(ListMapError::Corrupt(format!(
                "record at root {name} offset {at} runs past the end of the file ({size} bytes)"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn traversal_keys(map: &ListMap) -> Vec<Vec<u8>> {
        let mut keys = Vec::new();
        let Some(mut cursor) = map.first_cursor() else {
            return keys;
        };
        loop {
            keys.push(cursor.key().to_vec());
            if !cursor.advance() {
                return keys;
            }
        }
    }

    #[test]
    fn test_set_then_get() {
        let dir = tempdir().unwrap();
        let map = ListMap::create(dir.path().join("map.lm")).unwrap();

        map.set(b"foo", b"bar").unwrap();
        assert_eq!(map.get(b"foo").unwrap(), b"bar");
    }

    #[test]
    fn test_get_on_empty_map() {
        let dir = tempdir().unwrap();
        let map = ListMap::create(dir.path().join("map.lm")).unwrap();

        assert!(matches!(
            map.get(b"anything"),
            Err(ListMapError::KeyNotFound)
        ));
    }

    #[test]
    fn test_out_of_order_inserts_traverse_sorted() {
        let dir = tempdir().unwrap();
        let map = ListMap::create(dir.path().join("map.lm")).unwrap();

        map.set(b"a", b"AAAAA").unwrap();
        map.set(b"c", b"CCCCC").unwrap();
        map.set(b"b", b"BBBBB").unwrap();

        assert_eq!(traversal_keys(&map), vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn test_lexicographic_not_numeric_order() {
        let dir = tempdir().unwrap();
        let map = ListMap::create(dir.path().join("map.lm")).unwrap();

        map.set(b"1", b"bar").unwrap();
        map.set(b"2", b"foobar").unwrap();
        map.set(b"3", b"barbaz").unwrap();
        map.set(b"4", b"b").unwrap();
        map.set(b"45", b"foo").unwrap();

        let expected: Vec<Vec<u8>> = ["1", "2", "3", "4", "45"]
            .iter()
            .map(|k| k.as_bytes().to_vec())
            .collect();
        assert_eq!(traversal_keys(&map), expected);
    }

    #[test]
    fn test_insert_before_head() {
        let dir = tempdir().unwrap();
        let map = ListMap::create(dir.path().join("map.lm")).unwrap();

        map.set(b"1", b"AAAAA").unwrap();
        map.set(b"3", b"CCCCC").unwrap();
        map.set(b"2", b"BBBBB").unwrap();
        map.set(b"0", b"00000").unwrap();

        let expected: Vec<Vec<u8>> = ["0", "1", "2", "3"]
            .iter()
            .map(|k| k.as_bytes().to_vec())
            .collect();
        assert_eq!(traversal_keys(&map), expected);
    }

    #[test]
    fn test_duplicate_live_key_rejected() {
        let dir = tempdir().unwrap();
        let map = ListMap::create(dir.path().join("map.lm")).unwrap();

        map.set(b"k", b"original").unwrap();
        assert!(matches!(
            map.set(b"k", b"replacement"),
            Err(ListMapError::KeyExists)
        ));
        // The original value is still the live one.
        assert_eq!(map.get(b"k").unwrap(), b"original");
        assert_eq!(traversal_keys(&map).len(), 1);
    }

    #[test]
    fn test_remove_then_reinsert() {
        let dir = tempdir().unwrap();
        let map = ListMap::create(dir.path().join("map.lm")).unwrap();

        map.set(b"foo", b"bar").unwrap();
        map.remove(b"foo").unwrap();
        assert!(matches!(map.get(b"foo"), Err(ListMapError::KeyNotFound)));

        map.set(b"foo", b"baz").unwrap();
        assert_eq!(map.get(b"foo").unwrap(), b"baz");
    }

    #[test]
    fn test_remove_absent_key_is_a_no_op() {
        let dir = tempdir().unwrap();
        let map = ListMap::create(dir.path().join("map.lm")).unwrap();

        map.set(b"a", b"1").unwrap();
        map.set(b"c", b"3").unwrap();
        map.remove(b"b").unwrap();
        map.remove(b"zzz").unwrap();

        assert_eq!(traversal_keys(&map), vec![b"a".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn test_tombstones_stay_in_traversal() {
        let dir = tempdir().unwrap();
        let map = ListMap::create(dir.path().join("map.lm")).unwrap();

        map.set(b"a", b"1").unwrap();
        map.set(b"b", b"2").unwrap();
        map.remove(b"a").unwrap();

        // The raw cursor still sees the tombstone; iter() skips it.
        assert_eq!(traversal_keys(&map).len(), 2);
        let live: Vec<_> = map.iter().collect();
        assert_eq!(live, vec![(b"b".to_vec(), b"2".to_vec())]);
    }

    #[test]
    fn test_reinserted_key_keeps_sort_position() {
        let dir = tempdir().unwrap();
        let map = ListMap::create(dir.path().join("map.lm")).unwrap();

        map.set(b"a", b"1").unwrap();
        map.set(b"b", b"2").unwrap();
        map.set(b"c", b"3").unwrap();
        map.remove(b"b").unwrap();
        map.set(b"b", b"2v2").unwrap();

        let live: Vec<_> = map.iter().map(|(k, _)| k).collect();
        assert_eq!(live, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        assert_eq!(map.get(b"b").unwrap(), b"2v2");
    }

    #[test]
    fn test_oversized_key_and_value_rejected() {
        let dir = tempdir().unwrap();
        let map = ListMap::create(dir.path().join("map.lm")).unwrap();

        let big = vec![0u8; MAX_KEY_LEN + 1];
        assert!(matches!(
            map.set(&big, b"v"),
            Err(ListMapError::KeyTooLarge(_))
        ));
        assert!(matches!(
            map.set(b"k", &big),
            Err(ListMapError::ValueTooLarge(_))
        ));
        // Nothing was appended.
        assert!(map.first_cursor().is_none());
    }

    #[test]
    fn test_max_sized_record_accepted() {
        let dir = tempdir().unwrap();
        let map = ListMap::create(dir.path().join("map.lm")).unwrap();

        let key = vec![b'k'; MAX_KEY_LEN];
        let value = vec![b'v'; MAX_VALUE_LEN];
        map.set(&key, &value).unwrap();
        assert_eq!(map.get(&key).unwrap(), value);
    }

    #[test]
    fn test_cursor_retreat_walks_backward() {
        let dir = tempdir().unwrap();
        let map = ListMap::create(dir.path().join("map.lm")).unwrap();

        map.set(b"b", b"2").unwrap();
        map.set(b"a", b"1").unwrap();
        map.set(b"c", b"3").unwrap();

        let mut cursor = map.first_cursor().unwrap();
        while cursor.advance() {}
        assert_eq!(cursor.key(), b"c");
        assert!(cursor.retreat());
        assert_eq!(cursor.key(), b"b");
        assert!(cursor.retreat());
        assert_eq!(cursor.key(), b"a");
        assert!(!cursor.retreat());
    }

    #[test]
    fn test_size_reports_backing_file_length() {
        let dir = tempdir().unwrap();
        let map = ListMap::create(dir.path().join("map.lm")).unwrap();
        assert_eq!(map.size(), ROOT_LEN as u64);

        map.set(b"k", b"v").unwrap();
        let config = ListMapConfig::default();
        assert_eq!(map.size(), ROOT_LEN as u64 + config.growth_chunk);
    }

    #[test]
    fn test_destroy_deletes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("map.lm");
        let map = ListMap::create(&path).unwrap();
        map.set(b"k", b"v").unwrap();

        map.destroy().unwrap();
        assert!(!path.exists());
    }
}
