//! Staged firmware image writes.

use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SlotError {
    #[error("declared image size {size} exceeds slot capacity {capacity}")]
    TooLarge { size: u64, capacity: u64 },

    #[error("declared image size must be positive")]
    EmptyImage,

    #[error("write past the declared image size {declared}")]
    Overflow { declared: u64 },

    #[error("staged {written} bytes of a declared {declared}")]
    Incomplete { written: u64, declared: u64 },

    #[error("no staging in progress")]
    NotStaging,

    #[error("no finalized image to activate")]
    NothingStaged,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Write path for a firmware image: stage, verify, then swap.
///
/// `begin` through `finalize` never touch the running firmware;
/// `activate` is the single irreversible step.
pub trait FirmwareSlot: Send {
    /// Starts staging an image of exactly `declared` bytes.
    fn begin(&mut self, declared: u64) -> Result<(), SlotError>;

    fn write(&mut self, chunk: &[u8]) -> Result<(), SlotError>;

    /// Ends staging and verifies the byte count.
    fn finalize(&mut self) -> Result<(), SlotError>;

    /// Atomically swaps the staged image into the active slot.
    fn activate(&mut self) -> Result<(), SlotError>;

    /// Discards any staged state. Safe to call at any point.
    fn abort(&mut self);

    fn written(&self) -> u64;
}

enum SlotState {
    Idle,
    Staging {
        file: File,
        declared: u64,
        written: u64,
    },
    Finalized {
        declared: u64,
    },
}

/// [`FirmwareSlot`] staging into a scratch file next to the active
/// image; activation is an atomic rename.
pub struct FileSlot {
    staging_path: PathBuf,
    active_path: PathBuf,
    capacity: u64,
    state: SlotState,
}

impl FileSlot {
    pub fn new(
        staging_path: impl Into<PathBuf>,
        active_path: impl Into<PathBuf>,
        capacity: u64,
    ) -> Self {
        Self {
            staging_path: staging_path.into(),
            active_path: active_path.into(),
            capacity,
            state: SlotState::Idle,
        }
    }

    fn discard_staging(&mut self) {
        self.state = SlotState::Idle;
        let _ = fs::remove_file(&self.staging_path);
    }
}

impl FirmwareSlot for FileSlot {
    fn begin(&mut self, declared: u64) -> Result<(), SlotError> {
        if declared == 0 {
            return Err(SlotError::EmptyImage);
        }
        if declared > self.capacity {
            return Err(SlotError::TooLarge {
                size: declared,
                capacity: self.capacity,
            });
        }
        let file = File::create(&self.staging_path)?;
        debug!(path = %self.staging_path.display(), declared, "staging firmware image");
        self.state = SlotState::Staging {
            file,
            declared,
            written: 0,
        };
        Ok(())
    }

    fn write(&mut self, chunk: &[u8]) -> Result<(), SlotError> {
        match &mut self.state {
            SlotState::Staging {
                file,
                declared,
                written,
            } => {
                if *written + chunk.len() as u64 > *declared {
                    return Err(SlotError::Overflow {
                        declared: *declared,
                    });
                }
                file.write_all(chunk)?;
                *written += chunk.len() as u64;
                Ok(())
            }
            _ => Err(SlotError::NotStaging),
        }
    }

    fn finalize(&mut self) -> Result<(), SlotError> {
        match std::mem::replace(&mut self.state, SlotState::Idle) {
            SlotState::Staging {
                file,
                declared,
                written,
            } => {
                if written != declared {
                    drop(file);
                    self.discard_staging();
                    return Err(SlotError::Incomplete { written, declared });
                }
                if let Err(err) = file.sync_all() {
                    drop(file);
                    self.discard_staging();
                    return Err(err.into());
                }
                self.state = SlotState::Finalized { declared };
                Ok(())
            }
            other => {
                self.state = other;
                Err(SlotError::NotStaging)
            }
        }
    }

    fn activate(&mut self) -> Result<(), SlotError> {
        match self.state {
            SlotState::Finalized { declared } => {
                fs::rename(&self.staging_path, &self.active_path)?;
                debug!(
                    path = %self.active_path.display(),
                    bytes = declared,
                    "staged image activated"
                );
                self.state = SlotState::Idle;
                Ok(())
            }
            _ => Err(SlotError::NothingStaged),
        }
    }

    fn abort(&mut self) {
        if !matches!(self.state, SlotState::Idle) {
            debug!("staged firmware image discarded");
        }
        self.discard_staging();
    }

    fn written(&self) -> u64 {
        match self.state {
            SlotState::Staging { written, .. } => written,
            SlotState::Finalized { declared } => declared,
            SlotState::Idle => 0,
        }
    }
}

#[derive(Default)]
struct MockSlotState {
    begun: Option<u64>,
    bytes: Vec<u8>,
    finalized: bool,
    activated: bool,
    aborted: bool,
    fail_begin: bool,
    fail_write_after: Option<usize>,
    fail_finalize: bool,
    fail_activate: bool,
}

/// Recording [`FirmwareSlot`] with injectable faults. Cloning yields a
/// second handle onto the same slot, so a test keeps one while the
/// coordinator owns the other.
#[derive(Clone, Default)]
pub struct MockSlot {
    inner: Arc<Mutex<MockSlotState>>,
}

impl MockSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.inner.lock().bytes.clone()
    }

    pub fn activated(&self) -> bool {
        self.inner.lock().activated
    }

    pub fn aborted(&self) -> bool {
        self.inner.lock().aborted
    }

    pub fn finalized(&self) -> bool {
        self.inner.lock().finalized
    }

    pub fn set_fail_begin(&self) {
        self.inner.lock().fail_begin = true;
    }

    /// Fails the write that would push the byte count past `limit`.
    pub fn set_fail_write_after(&self, limit: usize) {
        self.inner.lock().fail_write_after = Some(limit);
    }

    pub fn set_fail_finalize(&self) {
        self.inner.lock().fail_finalize = true;
    }

    pub fn set_fail_activate(&self) {
        self.inner.lock().fail_activate = true;
    }

    fn injected() -> SlotError {
        SlotError::Io(std::io::Error::other("injected fault"))
    }
}

impl FirmwareSlot for MockSlot {
    fn begin(&mut self, declared: u64) -> Result<(), SlotError> {
        let mut state = self.inner.lock();
        if state.fail_begin {
            return Err(Self::injected());
        }
        if declared == 0 {
            return Err(SlotError::EmptyImage);
        }
        state.begun = Some(declared);
        state.bytes.clear();
        state.finalized = false;
        state.activated = false;
        state.aborted = false;
        Ok(())
    }

    fn write(&mut self, chunk: &[u8]) -> Result<(), SlotError> {
        let mut state = self.inner.lock();
        if state.begun.is_none() {
            return Err(SlotError::NotStaging);
        }
        if let Some(limit) = state.fail_write_after {
            if state.bytes.len() + chunk.len() > limit {
                return Err(Self::injected());
            }
        }
        state.bytes.extend_from_slice(chunk);
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), SlotError> {
        let mut state = self.inner.lock();
        if state.fail_finalize {
            return Err(Self::injected());
        }
        match state.begun {
            Some(declared) if state.bytes.len() as u64 == declared => {
                state.finalized = true;
                Ok(())
            }
            Some(declared) => Err(SlotError::Incomplete {
                written: state.bytes.len() as u64,
                declared,
            }),
            None => Err(SlotError::NotStaging),
        }
    }

    fn activate(&mut self) -> Result<(), SlotError> {
        let mut state = self.inner.lock();
        if state.fail_activate {
            return Err(Self::injected());
        }
        if !state.finalized {
            return Err(SlotError::NothingStaged);
        }
        state.activated = true;
        Ok(())
    }

    fn abort(&mut self) {
        let mut state = self.inner.lock();
        state.begun = None;
        state.finalized = false;
        state.aborted = true;
    }

    fn written(&self) -> u64 {
        self.inner.lock().bytes.len() as u64
    }
}
