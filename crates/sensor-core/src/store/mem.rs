//! In-memory byte store for tests.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{check_range, ByteStore, ERASED_BYTE};
use crate::error::StoreError;

/// An in-memory [`ByteStore`] that models the staged/committed split.
///
/// Cloning yields a second handle to the same region, so a test can
/// hand one handle to the code under test and keep the other to
/// inject faults or cut power mid-transaction.
#[derive(Clone)]
pub struct MemStore {
    inner: Arc<Mutex<MemInner>>,
}

struct MemInner {
    committed: Vec<u8>,
    staged: Vec<u8>,
    unavailable: bool,
    fail_commit: bool,
    commits: usize,
}

impl MemStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemInner {
                committed: vec![ERASED_BYTE; capacity],
                staged: vec![ERASED_BYTE; capacity],
                unavailable: false,
                fail_commit: false,
                commits: 0,
            })),
        }
    }

    /// Builds a store whose committed contents start as `bytes`.
    pub fn with_contents(capacity: usize, bytes: &[u8]) -> Self {
        let store = Self::new(capacity);
        {
            let mut inner = store.inner.lock();
            inner.committed[..bytes.len()].copy_from_slice(bytes);
            inner.staged = inner.committed.clone();
        }
        store
    }

    /// Makes every access fail with `MediumUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().unavailable = unavailable;
    }

    /// Makes commits fail without touching committed bytes.
    pub fn set_fail_commit(&self, fail: bool) {
        self.inner.lock().fail_commit = fail;
    }

    /// Drops staged bytes, as if power was cut before a commit.
    pub fn power_loss(&self) {
        let mut inner = self.inner.lock();
        inner.staged = inner.committed.clone();
    }

    /// Number of successful commits so far.
    pub fn commits(&self) -> usize {
        self.inner.lock().commits
    }

    /// Snapshot of the committed contents, bypassing the staged view.
    pub fn committed(&self) -> Vec<u8> {
        self.inner.lock().committed.clone()
    }

    /// Flips one committed byte, corrupting whatever record covers it.
    pub fn corrupt_committed(&self, offset: usize) {
        let mut inner = self.inner.lock();
        inner.committed[offset] ^= 0xFF;
        inner.staged = inner.committed.clone();
    }
}

impl MemInner {
    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(StoreError::MediumUnavailable("injected fault".into()));
        }
        Ok(())
    }
}

impl ByteStore for MemStore {
    fn capacity(&self) -> usize {
        self.inner.lock().staged.len()
    }

    fn read_bytes(&self, offset: usize, len: usize) -> Result<Vec<u8>, StoreError> {
        let inner = self.inner.lock();
        inner.check_available()?;
        check_range(offset, len, inner.staged.len())?;
        Ok(inner.staged[offset..offset + len].to_vec())
    }

    fn write_bytes(&mut self, offset: usize, bytes: &[u8]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.check_available()?;
        check_range(offset, bytes.len(), inner.staged.len())?;
        inner.staged[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.check_available()?;
        if inner.fail_commit {
            return Err(StoreError::CommitFailed("injected fault".into()));
        }
        inner.committed = inner.staged.clone();
        inner.commits += 1;
        Ok(())
    }

    fn erase(&mut self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.check_available()?;
        inner.staged.fill(ERASED_BYTE);
        Ok(())
    }
}
