//! Byte-addressed persistence with staged writes.
//!
//! A [`ByteStore`] models a small fixed-size region of non-volatile
//! storage. Writes land in a staging buffer and only reach the medium
//! on [`ByteStore::commit`], so a crash between the two leaves the
//! previously committed bytes intact.

mod file;
mod mem;

pub use file::FileStore;
pub use mem::MemStore;

use crate::error::StoreError;

/// The byte value a freshly erased region reads as.
pub const ERASED_BYTE: u8 = 0xFF;

/// A fixed-capacity region of persistent storage.
pub trait ByteStore: Send {
    /// Capacity of the region in bytes.
    fn capacity(&self) -> usize;

    /// Reads `len` bytes starting at `offset` from the staged view.
    fn read_bytes(&self, offset: usize, len: usize) -> Result<Vec<u8>, StoreError>;

    /// Stages `bytes` at `offset`. Not durable until [`ByteStore::commit`].
    fn write_bytes(&mut self, offset: usize, bytes: &[u8]) -> Result<(), StoreError>;

    /// Flushes all staged bytes to the medium.
    fn commit(&mut self) -> Result<(), StoreError>;

    /// Stages an erase of the whole region to [`ERASED_BYTE`].
    fn erase(&mut self) -> Result<(), StoreError>;
}

pub(crate) fn check_range(
    offset: usize,
    len: usize,
    capacity: usize,
) -> Result<(), StoreError> {
    match offset.checked_add(len) {
        Some(end) if end <= capacity => Ok(()),
        _ => Err(StoreError::OutOfRange {
            offset,
            len,
            capacity,
        }),
    }
}
