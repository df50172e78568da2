//! Persistent, ordered key-value map backed by a growable memory-mapped file
//!
//! Records live directly in the mapped bytes as a sorted doubly linked list:
//! inserts append at the end of the file and splice themselves into the
//! chain, removals set a tombstone flag, and cursors walk the links in key
//! order. There is no index structure and no compaction; the map targets
//! embedded use where sorted iteration and durable storage matter more than
//! transactional guarantees.

pub mod cursor;
pub mod error;
pub mod layout;
pub mod map;
pub mod region;
pub mod types;

pub use cursor::{Cursor, Iter};
pub use error::{ListMapError, Result};
pub use map::ListMap;
pub use types::{ListMapConfig, Offset};
