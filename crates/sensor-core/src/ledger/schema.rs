//! On-medium layout of the config block.
//!
//! The block is a signature followed by an ordered list of schema
//! layers. Every field sits at a fixed offset; each layer ends with a
//! CRC-8 byte covering everything between the end of the signature and
//! that byte, so a later layer's checksum also covers all earlier
//! layers. New fields must be added before their layer's checksum.

use std::borrow::Cow;

use crc::{Algorithm, Crc};

/// Magic bytes marking an initialized config block.
pub(crate) const SIGNATURE: &[u8; 4] = b"#ESP";

/// Layer holding network identity and time settings.
pub(crate) const CORE_LAYER: &str = "core";
/// Layer holding the node's reporting endpoints and MQTT settings.
pub(crate) const NODE_LAYER: &str = "node";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldKind {
    Bool,
    I8,
    U16,
    U32,
    F32,
    /// Zero-padded string slot of `max` bytes; a value filling the
    /// whole slot has no terminator.
    Str { max: usize },
}

impl FieldKind {
    pub(crate) const fn width(self) -> usize {
        match self {
            FieldKind::Bool | FieldKind::I8 => 1,
            FieldKind::U16 => 2,
            FieldKind::U32 | FieldKind::F32 => 4,
            FieldKind::Str { max } => max,
        }
    }
}

pub(crate) struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

pub(crate) struct SchemaLayer {
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
}

const fn field(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, kind }
}

const CORE_FIELDS: &[FieldSpec] = &[
    field("apmode", FieldKind::Bool),
    field("ssid", FieldKind::Str { max: 32 }),
    field("password", FieldKind::Str { max: 64 }),
    field("domain", FieldKind::Str { max: 32 }),
    field("web_password", FieldKind::Str { max: 64 }),
    field("ntpserver1", FieldKind::Str { max: 32 }),
    field("ntpserver2", FieldKind::Str { max: 32 }),
    field("ntpserver3", FieldKind::Str { max: 32 }),
    field("ntptimezone", FieldKind::I8),
    field("ntpupdateinterval", FieldKind::U32),
];

const NODE_FIELDS: &[FieldSpec] = &[
    field("mqtt_server", FieldKind::Str { max: 64 }),
    field("mqtt_port", FieldKind::U16),
    field("mqtt_user", FieldKind::Str { max: 32 }),
    field("mqtt_password", FieldKind::Str { max: 64 }),
    field("mqtt_client_id", FieldKind::Str { max: 32 }),
    field("post_url", FieldKind::Str { max: 64 }),
    field("ota_url", FieldKind::Str { max: 64 }),
    field("ota_result_url", FieldKind::Str { max: 64 }),
    field("uid", FieldKind::Str { max: 32 }),
    field("publishingInterval", FieldKind::U32),
    field("temp_offset", FieldKind::F32),
];

/// Schema layers in on-medium order.
pub(crate) const SCHEMA: &[SchemaLayer] = &[
    SchemaLayer {
        name: CORE_LAYER,
        fields: CORE_FIELDS,
    },
    SchemaLayer {
        name: NODE_LAYER,
        fields: NODE_FIELDS,
    },
];

const fn fields_width(fields: &[FieldSpec]) -> usize {
    let mut total = 0;
    let mut i = 0;
    while i < fields.len() {
        total += fields[i].kind.width();
        i += 1;
    }
    total
}

/// Total encoded size of the block, signature and checksum bytes
/// included.
pub(crate) const BLOCK_LEN: usize = {
    let mut total = SIGNATURE.len();
    let mut i = 0;
    while i < SCHEMA.len() {
        total += fields_width(SCHEMA[i].fields) + 1;
        i += 1;
    }
    total
};

/// CRC-8 with polynomial 0x31, zero init, MSB first, no reflection.
const CRC_8_CONFIG: Algorithm<u8> = Algorithm {
    width: 8,
    poly: 0x31,
    init: 0x00,
    refin: false,
    refout: false,
    xorout: 0x00,
    check: 0xA2,
    residue: 0x00,
};

const CONFIG_CRC: Crc<u8> = Crc::<u8>::new(&CRC_8_CONFIG);

pub(crate) fn layer_crc(bytes: &[u8]) -> u8 {
    CONFIG_CRC.checksum(bytes)
}

/// A field value in transit between a [`super::ConfigRecord`] and its
/// encoded form.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FieldValue<'a> {
    Bool(bool),
    I8(i8),
    U16(u16),
    U32(u32),
    F32(f32),
    Str(Cow<'a, str>),
}

pub(crate) fn encode_field(kind: FieldKind, value: FieldValue<'_>, out: &mut Vec<u8>) {
    match (kind, value) {
        (FieldKind::Bool, FieldValue::Bool(v)) => out.push(v as u8),
        (FieldKind::I8, FieldValue::I8(v)) => out.push(v as u8),
        (FieldKind::U16, FieldValue::U16(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (FieldKind::U32, FieldValue::U32(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (FieldKind::F32, FieldValue::F32(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (FieldKind::Str { max }, FieldValue::Str(v)) => {
            let bytes = truncated(&v, max);
            out.extend_from_slice(bytes);
            out.resize(out.len() + (max - bytes.len()), 0);
        }
        _ => unreachable!("config schema kind mismatch"),
    }
}

pub(crate) fn decode_field(kind: FieldKind, bytes: &[u8]) -> FieldValue<'static> {
    match kind {
        FieldKind::Bool => FieldValue::Bool(bytes[0] != 0),
        FieldKind::I8 => FieldValue::I8(bytes[0] as i8),
        FieldKind::U16 => FieldValue::U16(u16::from_le_bytes([bytes[0], bytes[1]])),
        FieldKind::U32 => {
            FieldValue::U32(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        }
        FieldKind::F32 => {
            FieldValue::F32(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        }
        FieldKind::Str { .. } => {
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            FieldValue::Str(Cow::Owned(
                String::from_utf8_lossy(&bytes[..end]).into_owned(),
            ))
        }
    }
}

/// Longest prefix of `s` that fits `max` bytes without splitting a
/// character.
fn truncated(s: &str, max: usize) -> &[u8] {
    if s.len() <= max {
        return s.as_bytes();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s.as_bytes()[..end]
}
