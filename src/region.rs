//! Growable memory-mapped backing file
//!
//! The whole map lives in a single file mapped read-write. Growth extends
//! the file by a fixed chunk and remaps the full new length; offsets handed
//! out before a grow stay valid, raw slices do not.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use memmap2::{MmapMut, MmapOptions};
use tracing::debug;

use crate::error::{ListMapError, Result};
use crate::layout::ROOT_LEN;
use crate::types::{ListMapConfig, Offset};

/// Read-write memory mapping over the backing file.
#[derive(Debug)]
pub struct MappedFile {
    file: std::fs::File,
    path: PathBuf,
    map: MmapMut,
    growth_chunk: u64,
}

impl MappedFile {
    /// Create or truncate the backing file, sized to hold just the root
    /// directory, and map it. Fresh pages are zero-filled, which is exactly
    /// the empty root.
    pub fn create(path: &Path, config: &ListMapConfig) -> Result<Self> {
        config.validate()?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(ROOT_LEN as u64)?;

        let map = unsafe { MmapOptions::new().map_mut(&file) }?;
        debug!("created map file {:?} ({} bytes)", path, map.len());

        Ok(Self {
            file,
            path: path.to_path_buf(),
            map,
            growth_chunk: config.growth_chunk,
        })
    }

    /// Map an existing backing file at its full current length.
    pub fn open(path: &Path, config: &ListMapConfig) -> Result<Self> {
        config.validate()?;

        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        if (len as usize) < ROOT_LEN {
            return Err(ListMapError::Corrupt(format!(
                "file {path:?} is {len} bytes, shorter than the root directory"
            )));
        }

        let map = unsafe { MmapOptions::new().map_mut(&file) }?;
        debug!("opened map file {:?} ({len} bytes)", path);

        Ok(Self {
            file,
            path: path.to_path_buf(),
            map,
            growth_chunk: config.growth_chunk,
        })
    }

    /// Bytes currently mapped.
    pub fn size(&self) -> u64 {
        self.map.len() as u64
    }

    pub fn bytes(&self) -> &[u8] {
        &self.map
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.map
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Make sure a record starting at `next_write` has a full growth chunk
    /// of room, extending the file by one chunk and remapping when it does
    /// not. A failed extension leaves the existing mapping and all logical
    /// state untouched; the map stays usable at its prior capacity.
    pub fn ensure_capacity(&mut self, next_write: Offset) -> Result<()> {
        if next_write + self.growth_chunk <= self.size() {
            return Ok(());
        }

        let new_len = self.size() + self.growth_chunk;
        self.file
            .set_len(new_len)
            .map_err(ListMapError::GrowthFailed)?;
        self.map =
            unsafe { MmapOptions::new().map_mut(&self.file) }.map_err(ListMapError::GrowthFailed)?;

        debug!("grew map file {:?} to {new_len} bytes", self.path);
        Ok(())
    }

    /// Drop the mapping and delete the backing file.
    pub fn destroy(self) -> Result<()> {
        let path = self.path.clone();
        drop(self);
        std::fs::remove_file(&path)?;
        debug!("destroyed map file {path:?}");
        Ok(())
    }
}

impl Drop for MappedFile {
    fn drop(&mut self) {
        let _ = self.map.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_maps_root_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("map.lm");
        let region = MappedFile::create(&path, &ListMapConfig::default()).unwrap();

        assert_eq!(region.size(), ROOT_LEN as u64);
        assert_eq!(region.bytes(), &[0u8; ROOT_LEN]);
    }

    #[test]
    fn test_growth_extends_by_one_chunk_and_keeps_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("map.lm");
        let config = ListMapConfig::default();
        let mut region = MappedFile::create(&path, &config).unwrap();

        region.ensure_capacity(ROOT_LEN as u64).unwrap();
        assert_eq!(region.size(), ROOT_LEN as u64 + config.growth_chunk);

        region.bytes_mut()[ROOT_LEN] = 0xCD;
        let next = region.size() - 8;
        region.ensure_capacity(next).unwrap();
        assert_eq!(region.size(), ROOT_LEN as u64 + 2 * config.growth_chunk);
        assert_eq!(region.bytes()[ROOT_LEN], 0xCD);
    }

    #[test]
    fn test_capacity_check_is_a_no_op_with_headroom() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("map.lm");
        let mut region = MappedFile::create(&path, &ListMapConfig::default()).unwrap();

        region.ensure_capacity(ROOT_LEN as u64).unwrap();
        let len = region.size();
        region.ensure_capacity(ROOT_LEN as u64).unwrap();
        assert_eq!(region.size(), len);
    }

    #[test]
    fn test_open_rejects_truncated_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("map.lm");
        std::fs::write(&path, [0u8; 7]).unwrap();

        let err = MappedFile::open(&path, &ListMapConfig::default()).unwrap_err();
        assert!(matches!(err, ListMapError::Corrupt(_)));
    }

    #[test]
    fn test_undersized_growth_chunk_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("map.lm");
        let config = ListMapConfig { growth_chunk: 4096 };

        let err = MappedFile::create(&path, &config).unwrap_err();
        assert!(matches!(err, ListMapError::Config(_)));
    }

    #[test]
    fn test_destroy_removes_backing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("map.lm");
        let region = MappedFile::create(&path, &ListMapConfig::default()).unwrap();

        region.destroy().unwrap();
        assert!(!path.exists());
    }
}
