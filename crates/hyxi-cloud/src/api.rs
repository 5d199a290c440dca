// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of HYXi Cloud.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Wire types and endpoint paths of the HYXi open API

use crate::device::Device;
use crate::metrics::{MetricValue, MetricsMap};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const TOKEN_PATH: &str = "/api/authorization/v1/token";
pub const PLANT_PAGE_PATH: &str = "/api/plant/v1/page";
pub const DEVICE_PAGE_PATH: &str = "/api/plant/v1/devicePage";
pub const DEVICE_DATA_PATH: &str = "/api/device/v1/queryDeviceData";
pub const DEVICE_INFO_PATH: &str = "/api/device/v1/queryDeviceInfo";

/// Common response envelope: `{success, code, message, data}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default, deserialize_with = "lenient_string")]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl ApiEnvelope {
    /// Provider code signalling rejected credentials.
    pub fn is_auth_code(&self) -> bool {
        matches!(self.code.as_deref(), Some("401" | "403"))
    }

    pub fn message_or_default(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| "no message".to_owned())
    }
}

/// Accept `"401"`, `401` or `null` for string-like identifiers.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    pub grant_type: u8,
}

impl Default for TokenRequest {
    fn default() -> Self {
        Self { grant_type: 1 }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenData {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
}

impl TokenData {
    /// The provider names the field either `token` or `access_token`.
    pub fn into_value(self) -> Option<String> {
        self.token
            .filter(|t| !t.is_empty())
            .or(self.access_token.filter(|t| !t.is_empty()))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlantPageRequest {
    pub page_size: u32,
    pub current_page: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePageRequest<'a> {
    pub plant_id: &'a str,
    pub page_size: u32,
    pub current_page: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlantPage {
    #[serde(default)]
    pub list: Vec<RawPlant>,
    #[serde(default)]
    pub total: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPlant {
    #[serde(default, deserialize_with = "lenient_string")]
    pub plant_id: Option<String>,
}

/// Device listing `data`: either a bare list or `{deviceList, total}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DevicePage {
    List(Vec<RawDevice>),
    Paged {
        #[serde(rename = "deviceList", default)]
        device_list: Vec<RawDevice>,
        #[serde(default)]
        total: Option<u64>,
    },
}

impl DevicePage {
    pub fn into_parts(self) -> (Vec<RawDevice>, Option<u64>) {
        match self {
            Self::List(devices) => (devices, None),
            Self::Paged { device_list, total } => (device_list, total),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDevice {
    #[serde(default, deserialize_with = "lenient_string")]
    pub device_sn: Option<String>,
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub sw_ver: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub hw_ver: Option<String>,
}

impl RawDevice {
    /// `None` for entries without a serial, which cannot be keyed.
    pub fn into_device(self) -> Option<Device> {
        let serial = self.device_sn.filter(|sn| !sn.trim().is_empty())?;
        Some(Device::new(
            serial,
            self.device_type,
            self.device_name,
            self.sw_ver,
            self.hw_ver,
        ))
    }
}

/// Flatten a `[{dataKey, dataValue}, ...]` payload into a metrics map.
///
/// Info responses sometimes come back as a plain object, which is taken as-is.
/// Items without a `dataKey` are skipped.
pub fn parse_data_items(data: Value) -> Option<MetricsMap> {
    match data {
        Value::Array(items) => Some(
            items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(mut fields) => {
                        let key = match fields.remove("dataKey") {
                            Some(Value::String(key)) if !key.is_empty() => key,
                            _ => return None,
                        };
                        let value = fields.remove("dataValue").unwrap_or(Value::Null);
                        Some((key, MetricValue::from(value)))
                    }
                    _ => None,
                })
                .collect(),
        ),
        Value::Object(fields) => Some(
            fields
                .into_iter()
                .map(|(k, v)| (k, MetricValue::from(v)))
                .collect(),
        ),
        Value::Null => Some(MetricsMap::new()),
        Value::Bool(_) | Value::Number(_) | Value::String(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_code_accepts_number_or_string() {
        let numeric: ApiEnvelope =
            serde_json::from_value(json!({"success": false, "code": 403})).unwrap();
        assert!(numeric.is_auth_code());

        let text: ApiEnvelope =
            serde_json::from_value(json!({"success": false, "code": "401"})).unwrap();
        assert!(text.is_auth_code());

        let other: ApiEnvelope =
            serde_json::from_value(json!({"success": false, "code": "A0001"})).unwrap();
        assert!(!other.is_auth_code());

        let missing: ApiEnvelope = serde_json::from_value(json!({})).unwrap();
        assert!(!missing.success);
        assert_eq!(missing.data, Value::Null);
    }

    #[test]
    fn test_token_field_alternatives() {
        let a: TokenData = serde_json::from_value(json!({"token": "t1"})).unwrap();
        assert_eq!(a.into_value().as_deref(), Some("t1"));

        let b: TokenData = serde_json::from_value(json!({"access_token": "t2"})).unwrap();
        assert_eq!(b.into_value().as_deref(), Some("t2"));

        let empty: TokenData = serde_json::from_value(json!({"token": ""})).unwrap();
        assert_eq!(empty.into_value(), None);
    }

    #[test]
    fn test_request_bodies() {
        assert_eq!(
            serde_json::to_value(TokenRequest::default()).unwrap(),
            json!({"grantType": 1})
        );
        assert_eq!(
            serde_json::to_value(DevicePageRequest {
                plant_id: "P1",
                page_size: 50,
                current_page: 1,
            })
            .unwrap(),
            json!({"plantId": "P1", "pageSize": 50, "currentPage": 1})
        );
    }

    #[test]
    fn test_device_page_shapes() {
        let bare: DevicePage =
            serde_json::from_value(json!([{"deviceSn": "SN1", "deviceType": "BATTERY"}]))
                .unwrap();
        let (devices, total) = bare.into_parts();
        assert_eq!(devices.len(), 1);
        assert_eq!(total, None);

        let paged: DevicePage = serde_json::from_value(json!({
            "deviceList": [{"deviceSn": 12345}, {"deviceName": "no serial"}],
            "total": 60
        }))
        .unwrap();
        let (devices, total) = paged.into_parts();
        assert_eq!(total, Some(60));
        let built: Vec<_> = devices.into_iter().filter_map(RawDevice::into_device).collect();
        assert_eq!(built.len(), 1);
        assert_eq!(built[0].serial, "12345");
        assert_eq!(built[0].type_code, "UNKNOWN");
    }

    #[test]
    fn test_parse_data_items() {
        let map = parse_data_items(json!([
            {"dataKey": "batSoc", "dataValue": "81"},
            {"dataKey": "", "dataValue": 1},
            {"dataValue": 2},
            "garbage",
            {"dataKey": "gridP", "dataValue": null}
        ]))
        .unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.number("batSoc"), 81.0);
        assert_eq!(map.get("gridP"), Some(&MetricValue::Null));

        let object = parse_data_items(json!({"swVer": "V1"})).unwrap();
        assert_eq!(object.get("swVer").and_then(MetricValue::as_str), Some("V1"));

        assert!(parse_data_items(json!("oops")).is_none());
    }
}
