//! Schema-aware persistence of the node configuration.
//!
//! The ledger maps the typed [`ConfigRecord`] to a fixed-layout block
//! on a [`ByteStore`] and back. Each schema layer is checksummed on its
//! own, so damage reverts only the affected layers to their defaults
//! instead of wiping the whole record.

mod handle;
mod record;
mod schema;

pub use handle::ConfigHandle;
pub use record::ConfigRecord;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::LedgerError;
use crate::store::ByteStore;

/// What `load()` found on the medium, kept for the status interface.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    /// True when the stored signature matched and layers were decoded.
    pub signature_valid: bool,
    /// Layers whose checksum failed and whose fields were reverted.
    pub layer_faults: Vec<&'static str>,
    /// Set when the medium could not be read at all.
    pub medium_error: Option<String>,
}

pub struct ConfigLedger {
    medium: Box<dyn ByteStore>,
    report: LoadReport,
}

impl ConfigLedger {
    pub fn new(medium: Box<dyn ByteStore>) -> Self {
        Self {
            medium,
            report: LoadReport::default(),
        }
    }

    /// Reads the config block and decodes it layer by layer.
    ///
    /// Never fails: an unreadable medium or a missing signature yields
    /// the compiled-in defaults, a bad layer checksum yields that
    /// layer's defaults. A blank or damaged block is rewritten in
    /// repaired form so the next boot loads cleanly.
    pub fn load(&mut self) -> ConfigRecord {
        let mut record = ConfigRecord::default();
        self.report = LoadReport::default();

        let block = match self.medium.read_bytes(0, schema::BLOCK_LEN) {
            Ok(block) => block,
            Err(err) => {
                warn!(error = %err, "config medium unreadable, using defaults");
                self.report.medium_error = Some(err.to_string());
                return record;
            }
        };

        if block[..schema::SIGNATURE.len()] != schema::SIGNATURE[..] {
            info!("no config signature found, initializing defaults");
            if let Err(err) = self.store(&record, true) {
                warn!(error = %err, "failed to initialize config block");
            }
            return record;
        }
        self.report.signature_valid = true;

        let mut offset = schema::SIGNATURE.len();
        for layer in schema::SCHEMA {
            for field in layer.fields {
                let width = field.kind.width();
                let value = schema::decode_field(field.kind, &block[offset..offset + width]);
                record.put(field.name, value);
                offset += width;
            }
            let computed = schema::layer_crc(&block[schema::SIGNATURE.len()..offset]);
            let stored = block[offset];
            offset += 1;
            if computed != stored {
                let fault = LedgerError::IntegrityFailure { layer: layer.name };
                warn!(
                    layer = layer.name,
                    computed = format_args!("{computed:#04x}"),
                    stored = format_args!("{stored:#04x}"),
                    "{fault}, reverting layer to defaults"
                );
                record.reset_layer(layer.name);
                self.report.layer_faults.push(layer.name);
            }
        }

        if !self.report.layer_faults.is_empty() {
            if let Err(err) = self.store(&record, true) {
                warn!(error = %err, "failed to rewrite repaired config block");
            }
        } else {
            debug!("config block loaded");
        }
        record
    }

    /// Encodes the record at its fixed offsets and writes it to the
    /// medium; with `commit` the write is durable before returning.
    pub fn store(&mut self, record: &ConfigRecord, commit: bool) -> Result<(), LedgerError> {
        let mut block = Vec::with_capacity(schema::BLOCK_LEN);
        block.extend_from_slice(schema::SIGNATURE);
        for layer in schema::SCHEMA {
            for field in layer.fields {
                schema::encode_field(field.kind, record.get(field.name), &mut block);
            }
            let crc = schema::layer_crc(&block[schema::SIGNATURE.len()..]);
            block.push(crc);
        }
        debug_assert_eq!(block.len(), schema::BLOCK_LEN);

        self.medium.write_bytes(0, &block)?;
        if commit {
            self.medium.commit()?;
        }
        Ok(())
    }

    /// Outcome of the most recent [`ConfigLedger::load`].
    pub fn load_report(&self) -> &LoadReport {
        &self.report
    }
}
