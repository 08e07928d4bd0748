//! Shared ownership of the live configuration.

use parking_lot::Mutex;

use super::{ConfigLedger, ConfigRecord, LoadReport};
use crate::error::LedgerError;

/// Shared owner of the in-memory [`ConfigRecord`] and its ledger.
///
/// One mutex guards both. A configuration transaction holds it across
/// mutation and store, so concurrent readers see either the previous
/// fully-committed record or the next one. The lock is never held
/// across an await point.
pub struct ConfigHandle {
    inner: Mutex<Inner>,
}

struct Inner {
    ledger: ConfigLedger,
    record: ConfigRecord,
}

impl ConfigHandle {
    /// Loads the record from the ledger and wraps both in one handle.
    pub fn open(mut ledger: ConfigLedger) -> Self {
        let record = ledger.load();
        Self {
            inner: Mutex::new(Inner { ledger, record }),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_record(ledger: ConfigLedger, record: ConfigRecord) -> Self {
        Self {
            inner: Mutex::new(Inner { ledger, record }),
        }
    }

    /// Clones the current record.
    pub fn snapshot(&self) -> ConfigRecord {
        self.inner.lock().record.clone()
    }

    /// Reads under the lock without cloning the whole record.
    pub fn with<R>(&self, f: impl FnOnce(&ConfigRecord) -> R) -> R {
        f(&self.inner.lock().record)
    }

    /// Runs a configuration transaction: mutate the record, then
    /// persist it durably, under a single lock acquisition.
    pub fn transact<R>(&self, f: impl FnOnce(&mut ConfigRecord) -> R) -> Result<R, LedgerError> {
        let mut inner = self.inner.lock();
        let Inner { ledger, record } = &mut *inner;
        let out = f(record);
        ledger.store(record, true)?;
        Ok(out)
    }

    /// Outcome of the boot-time load, for the status interface.
    pub fn load_report(&self) -> LoadReport {
        self.inner.lock().ledger.load_report().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemStore;

    #[test]
    fn transaction_persists_before_returning() {
        let store = MemStore::new(1024);
        let medium = store.clone();
        let handle = ConfigHandle::open(ConfigLedger::new(Box::new(store)));

        handle
            .transact(|record| {
                record.set_field("ssid", "Home");
                record.set_field("mqtt_port", "8883");
            })
            .unwrap();

        // Committed on the medium, not just staged in memory.
        let mut fresh = ConfigLedger::new(Box::new(MemStore::with_contents(
            1024,
            &medium.committed(),
        )));
        let reloaded = fresh.load();
        assert_eq!(reloaded.ssid, "Home");
        assert_eq!(reloaded.mqtt_port, 8883);
    }

    #[test]
    fn failed_store_surfaces_to_the_caller() {
        let store = MemStore::new(1024);
        let twin = store.clone();
        let handle = ConfigHandle::open(ConfigLedger::new(Box::new(store)));

        twin.set_fail_commit(true);
        let result = handle.transact(|record| {
            record.set_field("ssid", "Home");
        });
        assert!(result.is_err());
    }

    #[test]
    fn snapshot_sees_transacted_values() {
        let handle = ConfigHandle::with_record(
            ConfigLedger::new(Box::new(MemStore::new(1024))),
            ConfigRecord::default(),
        );
        handle
            .transact(|record| {
                record.set_field("uid", "sensor-17");
            })
            .unwrap();
        assert_eq!(handle.snapshot().uid, "sensor-17");
        assert_eq!(handle.with(|r| r.uid.clone()), "sensor-17");
    }
}
