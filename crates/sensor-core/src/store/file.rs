//! File-backed byte store.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{check_range, ByteStore, ERASED_BYTE};
use crate::error::StoreError;

/// A [`ByteStore`] backed by a single file on disk.
///
/// The whole region is cached in memory; reads and writes touch only
/// the cache. [`ByteStore::commit`] rewrites the file and syncs it, so
/// an interrupted process never leaves a half-applied region behind.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    cache: Vec<u8>,
}

impl FileStore {
    /// Opens the store at `path` with the given capacity.
    ///
    /// A missing file is treated as a blank, fully erased region; it is
    /// created on the first commit. Any other I/O failure means the
    /// medium is unavailable.
    pub fn open(path: impl AsRef<Path>, capacity: usize) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let cache = match fs::read(&path) {
            Ok(mut data) => {
                data.resize(capacity, ERASED_BYTE);
                data
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "store file not found, starting blank");
                vec![ERASED_BYTE; capacity]
            }
            Err(err) => {
                return Err(StoreError::MediumUnavailable(format!(
                    "{}: {err}",
                    path.display()
                )))
            }
        };
        Ok(Self { path, cache })
    }
}

impl ByteStore for FileStore {
    fn capacity(&self) -> usize {
        self.cache.len()
    }

    fn read_bytes(&self, offset: usize, len: usize) -> Result<Vec<u8>, StoreError> {
        check_range(offset, len, self.cache.len())?;
        Ok(self.cache[offset..offset + len].to_vec())
    }

    fn write_bytes(&mut self, offset: usize, bytes: &[u8]) -> Result<(), StoreError> {
        check_range(offset, bytes.len(), self.cache.len())?;
        self.cache[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        let mut file = File::create(&self.path)
            .map_err(|err| StoreError::CommitFailed(format!("{}: {err}", self.path.display())))?;
        file.write_all(&self.cache)
            .and_then(|()| file.sync_all())
            .map_err(|err| StoreError::CommitFailed(format!("{}: {err}", self.path.display())))?;
        debug!(path = %self.path.display(), len = self.cache.len(), "store committed");
        Ok(())
    }

    fn erase(&mut self) -> Result<(), StoreError> {
        self.cache.fill(ERASED_BYTE);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_reads_as_erased() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("region.bin"), 16).unwrap();
        assert_eq!(store.read_bytes(0, 16).unwrap(), vec![ERASED_BYTE; 16]);
    }

    #[test]
    fn writes_survive_reopen_only_after_commit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("region.bin");

        let mut store = FileStore::open(&path, 8).unwrap();
        store.write_bytes(2, b"ab").unwrap();

        // Not committed yet: a fresh open still sees a blank region.
        let fresh = FileStore::open(&path, 8).unwrap();
        assert_eq!(fresh.read_bytes(2, 2).unwrap(), vec![ERASED_BYTE; 2]);

        store.commit().unwrap();
        let fresh = FileStore::open(&path, 8).unwrap();
        assert_eq!(fresh.read_bytes(2, 2).unwrap(), b"ab".to_vec());
    }

    #[test]
    fn short_file_is_padded_to_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("region.bin");
        fs::write(&path, b"xy").unwrap();

        let store = FileStore::open(&path, 4).unwrap();
        assert_eq!(store.read_bytes(0, 4).unwrap(), b"xy\xFF\xFF".to_vec());
    }

    #[test]
    fn out_of_range_access_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(dir.path().join("region.bin"), 4).unwrap();
        assert!(matches!(
            store.read_bytes(2, 3),
            Err(StoreError::OutOfRange { .. })
        ));
        assert!(matches!(
            store.write_bytes(4, b"z"),
            Err(StoreError::OutOfRange { .. })
        ));
    }

    #[test]
    fn unreadable_path_is_medium_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be read as a file.
        let err = FileStore::open(dir.path(), 4).unwrap_err();
        assert!(matches!(err, StoreError::MediumUnavailable(_)));
    }
}
