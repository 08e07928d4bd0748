//! The typed configuration record and its field-level mutation rules.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use super::schema::{FieldValue, CORE_LAYER, NODE_LAYER};

/// The node's persisted configuration.
///
/// Serde names match the canonical wire names used by the config API,
/// which are also the names [`ConfigRecord::set_field`] accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigRecord {
    pub apmode: bool,
    pub ssid: String,
    pub password: String,
    pub domain: String,
    pub web_password: String,
    pub ntpserver1: String,
    pub ntpserver2: String,
    pub ntpserver3: String,
    pub ntptimezone: i8,
    /// NTP sync interval in milliseconds.
    pub ntpupdateinterval: u32,
    pub mqtt_server: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_password: String,
    pub mqtt_client_id: String,
    pub post_url: String,
    pub ota_url: String,
    pub ota_result_url: String,
    pub uid: String,
    /// Publish cadence in milliseconds.
    #[serde(rename = "publishingInterval")]
    pub publishing_interval: u32,
    pub temp_offset: f32,
}

impl Default for ConfigRecord {
    fn default() -> Self {
        let mut record = Self {
            apmode: false,
            ssid: String::new(),
            password: String::new(),
            domain: String::new(),
            web_password: String::new(),
            ntpserver1: String::new(),
            ntpserver2: String::new(),
            ntpserver3: String::new(),
            ntptimezone: 0,
            ntpupdateinterval: 0,
            mqtt_server: String::new(),
            mqtt_port: 0,
            mqtt_user: String::new(),
            mqtt_password: String::new(),
            mqtt_client_id: String::new(),
            post_url: String::new(),
            ota_url: String::new(),
            ota_result_url: String::new(),
            uid: String::new(),
            publishing_interval: 0,
            temp_offset: 0.0,
        };
        record.reset_layer(CORE_LAYER);
        record.reset_layer(NODE_LAYER);
        record
    }
}

impl ConfigRecord {
    /// Reverts one schema layer's fields to their compiled-in defaults,
    /// leaving the other layer untouched.
    pub(crate) fn reset_layer(&mut self, layer: &str) {
        match layer {
            CORE_LAYER => {
                self.apmode = false;
                self.ssid.clear();
                self.password.clear();
                self.domain.clear();
                self.web_password = "admin".into();
                self.ntpserver1 = "pool.ntp.org".into();
                self.ntpserver2.clear();
                self.ntpserver3.clear();
                self.ntptimezone = 3;
                self.ntpupdateinterval = 3_600_000;
            }
            NODE_LAYER => {
                self.mqtt_server.clear();
                self.mqtt_port = 1883;
                self.mqtt_user.clear();
                self.mqtt_password.clear();
                self.mqtt_client_id.clear();
                self.post_url.clear();
                self.ota_url.clear();
                self.ota_result_url.clear();
                self.uid.clear();
                self.publishing_interval = 10_000;
                self.temp_offset = 0.0;
            }
            _ => {}
        }
    }

    /// Sets one field from its string representation, applying the
    /// field's clamping rules. Returns false for a name no schema layer
    /// knows, without mutating anything.
    pub fn set_field(&mut self, name: &str, value: &str) -> bool {
        match name {
            "apmode" => self.apmode = parse_int(value).clamp(0, 1) != 0,
            "ssid" => self.ssid = value.to_string(),
            "password" => self.password = value.to_string(),
            "domain" => self.domain = value.to_string(),
            "web_password" => self.web_password = value.to_string(),
            "ntpserver1" => self.ntpserver1 = value.to_string(),
            "ntpserver2" => self.ntpserver2 = value.to_string(),
            "ntpserver3" => self.ntpserver3 = value.to_string(),
            "ntptimezone" => self.ntptimezone = parse_int(value).clamp(-11, 13) as i8,
            // Input is in seconds, stored in milliseconds.
            "ntpupdateinterval" => {
                self.ntpupdateinterval =
                    parse_int(value).max(0).saturating_mul(1000).min(u32::MAX as i64) as u32
            }
            "mqtt_server" => self.mqtt_server = value.to_string(),
            "mqtt_port" => self.mqtt_port = parse_int(value).clamp(0, u16::MAX as i64) as u16,
            "mqtt_user" => self.mqtt_user = value.to_string(),
            "mqtt_password" => self.mqtt_password = value.to_string(),
            "mqtt_client_id" => self.mqtt_client_id = value.to_string(),
            "post_url" => self.post_url = value.to_string(),
            "ota_url" => self.ota_url = value.to_string(),
            "ota_result_url" => self.ota_result_url = value.to_string(),
            "uid" => self.uid = value.to_string(),
            "publishingInterval" => {
                self.publishing_interval = parse_int(value).clamp(0, u32::MAX as i64) as u32
            }
            "temp_offset" => self.temp_offset = value.trim().parse().unwrap_or(0.0),
            _ => return false,
        }
        true
    }

    pub(crate) fn get(&self, name: &str) -> FieldValue<'_> {
        match name {
            "apmode" => FieldValue::Bool(self.apmode),
            "ssid" => FieldValue::Str(Cow::Borrowed(&self.ssid)),
            "password" => FieldValue::Str(Cow::Borrowed(&self.password)),
            "domain" => FieldValue::Str(Cow::Borrowed(&self.domain)),
            "web_password" => FieldValue::Str(Cow::Borrowed(&self.web_password)),
            "ntpserver1" => FieldValue::Str(Cow::Borrowed(&self.ntpserver1)),
            "ntpserver2" => FieldValue::Str(Cow::Borrowed(&self.ntpserver2)),
            "ntpserver3" => FieldValue::Str(Cow::Borrowed(&self.ntpserver3)),
            "ntptimezone" => FieldValue::I8(self.ntptimezone),
            "ntpupdateinterval" => FieldValue::U32(self.ntpupdateinterval),
            "mqtt_server" => FieldValue::Str(Cow::Borrowed(&self.mqtt_server)),
            "mqtt_port" => FieldValue::U16(self.mqtt_port),
            "mqtt_user" => FieldValue::Str(Cow::Borrowed(&self.mqtt_user)),
            "mqtt_password" => FieldValue::Str(Cow::Borrowed(&self.mqtt_password)),
            "mqtt_client_id" => FieldValue::Str(Cow::Borrowed(&self.mqtt_client_id)),
            "post_url" => FieldValue::Str(Cow::Borrowed(&self.post_url)),
            "ota_url" => FieldValue::Str(Cow::Borrowed(&self.ota_url)),
            "ota_result_url" => FieldValue::Str(Cow::Borrowed(&self.ota_result_url)),
            "uid" => FieldValue::Str(Cow::Borrowed(&self.uid)),
            "publishingInterval" => FieldValue::U32(self.publishing_interval),
            "temp_offset" => FieldValue::F32(self.temp_offset),
            _ => unreachable!("unknown schema field {name}"),
        }
    }

    pub(crate) fn put(&mut self, name: &str, value: FieldValue<'_>) {
        match (name, value) {
            ("apmode", FieldValue::Bool(v)) => self.apmode = v,
            ("ssid", FieldValue::Str(v)) => self.ssid = v.into_owned(),
            ("password", FieldValue::Str(v)) => self.password = v.into_owned(),
            ("domain", FieldValue::Str(v)) => self.domain = v.into_owned(),
            ("web_password", FieldValue::Str(v)) => self.web_password = v.into_owned(),
            ("ntpserver1", FieldValue::Str(v)) => self.ntpserver1 = v.into_owned(),
            ("ntpserver2", FieldValue::Str(v)) => self.ntpserver2 = v.into_owned(),
            ("ntpserver3", FieldValue::Str(v)) => self.ntpserver3 = v.into_owned(),
            ("ntptimezone", FieldValue::I8(v)) => self.ntptimezone = v,
            ("ntpupdateinterval", FieldValue::U32(v)) => self.ntpupdateinterval = v,
            ("mqtt_server", FieldValue::Str(v)) => self.mqtt_server = v.into_owned(),
            ("mqtt_port", FieldValue::U16(v)) => self.mqtt_port = v,
            ("mqtt_user", FieldValue::Str(v)) => self.mqtt_user = v.into_owned(),
            ("mqtt_password", FieldValue::Str(v)) => self.mqtt_password = v.into_owned(),
            ("mqtt_client_id", FieldValue::Str(v)) => self.mqtt_client_id = v.into_owned(),
            ("post_url", FieldValue::Str(v)) => self.post_url = v.into_owned(),
            ("ota_url", FieldValue::Str(v)) => self.ota_url = v.into_owned(),
            ("ota_result_url", FieldValue::Str(v)) => self.ota_result_url = v.into_owned(),
            ("uid", FieldValue::Str(v)) => self.uid = v.into_owned(),
            ("publishingInterval", FieldValue::U32(v)) => self.publishing_interval = v,
            ("temp_offset", FieldValue::F32(v)) => self.temp_offset = v,
            _ => unreachable!("config schema kind mismatch"),
        }
    }
}

/// Lenient integer parse in the C `atoi` tradition: an optional sign
/// and the longest leading run of digits; anything else yields 0.
fn parse_int(value: &str) -> i64 {
    let s = value.trim();
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, s.strip_prefix('+').unwrap_or(s)),
    };
    let run: &str = digits
        .find(|c: char| !c.is_ascii_digit())
        .map_or(digits, |end| &digits[..end]);
    run.parse::<i64>().map_or(0, |n| n * sign)
}
