//! Over-the-air firmware updates.

mod coordinator;
mod slot;

pub use coordinator::{UpdateCoordinator, UpdateError};
pub use slot::{FileSlot, FirmwareSlot, MockSlot, SlotError};
