//! Persistent record of an in-flight firmware update.
//!
//! Exactly one entry exists at a time, written after an image has been
//! fully staged and removed once the post-reboot outcome report has
//! been attempted. Its presence is what tells a freshly booted process
//! that the previous one rebooted into new firmware on purpose.

use tracing::warn;

use crate::error::StoreError;
use crate::store::{ByteStore, ERASED_BYTE};

/// The versions journaled across an update reboot, stored as two
/// newline-terminated lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub previous: String,
    pub target: String,
}

pub struct UpdateJournal {
    region: Box<dyn ByteStore>,
}

impl UpdateJournal {
    pub fn new(region: Box<dyn ByteStore>) -> Self {
        Self { region }
    }

    /// Returns the pending entry, if one was committed.
    ///
    /// An unreadable region reads as no entry; a boot must never hang
    /// on journal state.
    pub fn read(&self) -> Option<JournalEntry> {
        let bytes = match self.region.read_bytes(0, self.region.capacity()) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(error = %err, "update journal unreadable");
                return None;
            }
        };
        let end = bytes
            .iter()
            .position(|&b| b == ERASED_BYTE || b == 0)
            .unwrap_or(bytes.len());
        if end == 0 {
            return None;
        }
        let text = String::from_utf8_lossy(&bytes[..end]);
        let mut lines = text.lines();
        let previous = lines.next().unwrap_or("").trim().to_string();
        let target = lines.next().unwrap_or("").trim().to_string();
        if previous.is_empty() && target.is_empty() {
            return None;
        }
        Some(JournalEntry { previous, target })
    }

    /// Writes the entry and commits it; durable when this returns Ok.
    pub fn write(&mut self, entry: &JournalEntry) -> Result<(), StoreError> {
        let text = format!("{}\n{}\n", entry.previous, entry.target);
        let capacity = self.region.capacity();
        if text.len() > capacity {
            return Err(StoreError::OutOfRange {
                offset: 0,
                len: text.len(),
                capacity,
            });
        }
        let mut region = vec![ERASED_BYTE; capacity];
        region[..text.len()].copy_from_slice(text.as_bytes());
        self.region.write_bytes(0, &region)?;
        self.region.commit()
    }

    /// Removes any entry, committed immediately.
    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.region.erase()?;
        self.region.commit()
    }
}
