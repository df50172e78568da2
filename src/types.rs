//! Common types and limits for the map storage format

use crate::error::{ListMapError, Result};
use crate::layout;

/// Byte offset into the mapped region. Offset 0 is the null link sentinel;
/// no record can live there because the root directory does.
pub type Offset = u64;

/// Maximum key length storable in a record's length field.
pub const MAX_KEY_LEN: usize = u16::MAX as usize;

/// Maximum value length storable in a record's length field.
pub const MAX_VALUE_LEN: usize = u16::MAX as usize;

/// Configuration for a map instance
#[derive(Debug, Clone)]
pub struct ListMapConfig {
    /// Increment, in bytes, by which the backing file grows when capacity
    /// runs low. Must hold at least one maximum-size record so a single
    /// grow always makes room for the next insert.
    pub growth_chunk: u64,
}

impl Default for ListMapConfig {
    fn default() -> Self {
        Self {
            growth_chunk: 256 * 1024,
        }
    }
}

impl ListMapConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        let min = layout::MAX_RECORD_LEN as u64;
        if self.growth_chunk < min {
            return Err(ListMapError::Config(format!(
                "growth_chunk {} is smaller than the maximum record size {min}",
                self.growth_chunk
            )));
        }
        Ok(())
    }
}
