//! ==============================================================================
//! domain.rs - typed records exchanged with the dashboard backend
//! ==============================================================================
//!
//! ```text
//! purpose:
//!     explicit shapes for sensors, plugs and sensor-plug mappings, plus the
//!     list envelopes and request bodies the backend speaks. responses are
//!     parsed into these at the api client boundary; nothing downstream sees
//!     untyped json.
//!
//! relationships:
//!     - used by: api.rs (decode / encode), main.rs and view.rs (rendering)
//! ```
//!
//! ==============================================================================

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};

// ==============================================================================
// records
// ==============================================================================

/// a qingping air-quality sensor bound to the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// mac-like identifier, uppercase without separators (e.g. "CCB5D131C3D0")
    pub sensor_mac: String,
    #[serde(default)]
    pub device_name: Option<String>,
    /// vendor product metadata, kept opaque
    #[serde(default)]
    pub product: Option<serde_json::Value>,
    #[serde(default = "default_enabled", deserialize_with = "null_as_enabled")]
    pub enabled: bool,
    /// epoch seconds
    #[serde(default)]
    pub bound_at: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub version: Option<String>,
}

/// a tuya smart plug available for automation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlugDevice {
    pub tuya_device_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub online: Option<bool>,
}

/// sensor -> plug automation rule, keyed by sensor_mac
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    #[serde(default)]
    pub user_id: Option<String>,
    pub sensor_mac: String,
    pub tuya_device_id: String,
    #[serde(default = "default_enabled", deserialize_with = "null_as_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<i64>,
}

/// a downloaded csv file
#[derive(Debug, Clone)]
pub struct CsvExport {
    pub filename: String,
    pub content: Bytes,
}

// ==============================================================================
// response envelopes
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct DeviceList {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub count: Option<usize>,
    pub devices: Vec<Device>,
}

#[derive(Debug, Deserialize)]
pub struct MappingList {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub count: Option<usize>,
    pub mappings: Vec<Mapping>,
}

#[derive(Debug, Deserialize)]
pub struct PlugList {
    #[serde(default)]
    pub space_id: Option<String>,
    pub devices: Vec<PlugDevice>,
}

#[derive(Debug, Deserialize)]
pub struct UpsertResponse {
    #[serde(default)]
    pub mapping: Option<Mapping>,
}

// ==============================================================================
// request bodies
// ==============================================================================

/// body of POST /mapping/sensor-plug (create or update)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingUpsert {
    pub user_id: String,
    pub sensor_mac: String,
    pub tuya_device_id: String,
    pub enabled: bool,
}

/// body of POST /mapping/sensor-plug (delete). the backend has no DELETE verb
/// for mappings; the flag is the delete.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingDelete {
    pub sensor_mac: String,
    pub delete: bool,
}

impl MappingDelete {
    pub fn new(sensor_mac: impl Into<String>) -> Self {
        Self { sensor_mac: sensor_mac.into(), delete: true }
    }
}

// ==============================================================================
// helpers
// ==============================================================================

/// normalize a sensor mac the way the backend keys it: trimmed, no ':' or '-',
/// uppercase. "cc:b5:d1:31:c3:d0" -> "CCB5D131C3D0"
pub fn normalize_sensor_mac(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| *c != ':' && *c != '-')
        .collect::<String>()
        .to_uppercase()
}

/// pull the filename out of a Content-Disposition header value. only the last
/// path component is kept, so the result is always a bare name in the
/// current directory.
pub fn filename_from_disposition(value: &str) -> Option<String> {
    value
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))
        .and_then(|name| bare_file_name(name.trim_matches('"')))
}

/// filename the backend uses for an export when it does not send one.
/// separators in the inputs become '-' so the name never leaves the directory.
pub fn default_export_filename(sensor_mac: &str, start: &str, end: &str) -> String {
    let part = |s: &str| s.replace(['/', '\\'], "-");
    format!("sensor_{}_{}_{}.csv", part(sensor_mac), part(start), part(end))
}

// last component under either separator style; nothing for "", "." or ".."
fn bare_file_name(name: &str) -> Option<String> {
    let last = name.rsplit(['/', '\\']).next()?.trim();
    match last {
        "" | "." | ".." => None,
        name => Some(name.to_string()),
    }
}

fn default_enabled() -> bool {
    true
}

// the backend fills a missing flag with true, but a stored null comes back as null
fn null_as_enabled<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(d)?.unwrap_or(true))
}

// firmware versions show up as either "1.2.3" or a bare number
fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(d)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mapping_defaults_enabled_when_missing_or_null() {
        let m: Mapping = serde_json::from_value(json!({
            "sensor_mac": "AA11",
            "tuya_device_id": "d1"
        }))
        .unwrap();
        assert!(m.enabled);
        assert_eq!(m.user_id, None);

        let m: Mapping = serde_json::from_value(json!({
            "sensor_mac": "AA11",
            "tuya_device_id": "d1",
            "enabled": null,
            "updated_at": 1700000000
        }))
        .unwrap();
        assert!(m.enabled);
        assert_eq!(m.updated_at, Some(1_700_000_000));
    }

    #[test]
    fn mapping_requires_plug_id() {
        let res = serde_json::from_value::<Mapping>(json!({ "sensor_mac": "AA11" }));
        assert!(res.is_err());
    }

    #[test]
    fn device_accepts_numeric_version_and_opaque_product() {
        let d: Device = serde_json::from_value(json!({
            "sensor_mac": "CCB5D131C3D0",
            "device_name": "Office",
            "product": { "id": 1203, "en_name": "Air Monitor Lite" },
            "enabled": false,
            "bound_at": 1712345678,
            "version": 42
        }))
        .unwrap();
        assert!(!d.enabled);
        assert_eq!(d.version.as_deref(), Some("42"));
        assert_eq!(d.product.unwrap()["id"], 1203);
    }

    #[test]
    fn delete_body_has_exactly_two_fields() {
        let body = serde_json::to_value(MappingDelete::new("AA11")).unwrap();
        assert_eq!(body, json!({ "sensor_mac": "AA11", "delete": true }));
    }

    #[test]
    fn normalizes_mac_like_backend() {
        assert_eq!(normalize_sensor_mac(" cc:b5:d1-31:c3:d0 "), "CCB5D131C3D0");
        assert_eq!(normalize_sensor_mac("::"), "");
    }

    #[test]
    fn extracts_disposition_filename() {
        assert_eq!(
            filename_from_disposition(r#"attachment; filename="sensor_AA11_2024-01-01_2024-01-02.csv""#),
            Some("sensor_AA11_2024-01-01_2024-01-02.csv".to_string())
        );
        assert_eq!(filename_from_disposition("attachment"), None);
        assert_eq!(filename_from_disposition(r#"attachment; filename="""#), None);
    }

    #[test]
    fn disposition_filename_stays_in_directory() {
        assert_eq!(
            filename_from_disposition(r#"attachment; filename="../../home/u/.bashrc""#).as_deref(),
            Some(".bashrc")
        );
        assert_eq!(
            filename_from_disposition(r#"attachment; filename="..\..\evil.csv""#).as_deref(),
            Some("evil.csv")
        );
        assert_eq!(filename_from_disposition(r#"attachment; filename="/""#), None);
        assert_eq!(filename_from_disposition(r#"attachment; filename="exports/..""#), None);
    }

    #[test]
    fn default_filename_has_no_separators() {
        assert_eq!(
            default_export_filename("AA11", "2024/01/01", "2024\\01\\02"),
            "sensor_AA11_2024-01-01_2024-01-02.csv"
        );
        assert_eq!(
            default_export_filename("AA11", "2024-01-01", "2024-01-02"),
            "sensor_AA11_2024-01-01_2024-01-02.csv"
        );
    }
}
