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

//! Per-device metrics map and derived power/energy values
//!
//! Raw provider keys are the base of the map. Derived keys are only added
//! when their raw prerequisites are present and never overwrite a raw key.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// Raw provider keys
pub const GRID_POWER_KW: &str = "gridP";
pub const BATTERY_POWER_W: &str = "pbat";
pub const PHASE_LOADS_W: [&str; 3] = ["ph1Loadp", "ph2Loadp", "ph3Loadp"];
pub const BATTERY_CHARGE_TOTAL_KWH: &str = "batCharge";
pub const BATTERY_DISCHARGE_TOTAL_KWH: &str = "batDisCharge";
pub const BATTERY_SOC: &str = "batSoc";
pub const BATTERY_SOH: &str = "batSoh";
pub const BATTERY_CAPACITY: &str = "batCap";

// Derived keys
pub const HOME_LOAD: &str = "home_load";
pub const GRID_IMPORT: &str = "grid_import";
pub const GRID_EXPORT: &str = "grid_export";
pub const BAT_CHARGING: &str = "bat_charging";
pub const BAT_DISCHARGING: &str = "bat_discharging";
pub const BAT_CHARGE_TOTAL: &str = "bat_charge_total";
pub const BAT_DISCHARGE_TOTAL: &str = "bat_discharge_total";
pub const LAST_SEEN: &str = "last_seen";

/// A single metric value as reported by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Null,
    Number(f64),
    Text(String),
}

impl MetricValue {
    /// Numeric view of the value. Numeric strings are parsed, anything else is `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            Self::Null => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Number(_) | Self::Null => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<Value> for MetricValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Number(n) => n.as_f64().map_or(Self::Null, Self::Number),
            Value::String(s) => Self::Text(s),
            Value::Bool(b) => Self::Text(b.to_string()),
            other @ (Value::Array(_) | Value::Object(_)) => Self::Text(other.to_string()),
        }
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

/// Flat `key -> value` map for one device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricsMap(BTreeMap<String, MetricValue>);

impl MetricsMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&MetricValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<MetricValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Insert only if the key is not already present.
    pub fn insert_if_absent(&mut self, key: &str, value: impl Into<MetricValue>) {
        self.0
            .entry(key.to_owned())
            .or_insert_with(|| value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetricValue)> {
        self.0.iter()
    }

    /// Numeric value of `key`, `0.0` when missing, empty or not a number.
    pub fn number(&self, key: &str) -> f64 {
        self.get(key).and_then(MetricValue::as_f64).unwrap_or(0.0)
    }

    /// Overlay raw provider pairs. Raw values replace whatever was there.
    pub fn merge_raw(&mut self, raw: MetricsMap) {
        self.0.extend(raw.0);
    }

    /// Compute derived metrics from the raw keys present in `raw`.
    ///
    /// Values are written with [`MetricsMap::insert_if_absent`], so a raw key
    /// that happens to share a derived name always wins.
    pub fn apply_derived(&mut self, raw: &MetricsMap) {
        if raw.contains_key(GRID_POWER_KW) {
            let grid_w = round2(raw.number(GRID_POWER_KW) * 1000.0);
            let (import, export) = split_signed(grid_w);
            self.insert_if_absent(GRID_IMPORT, import);
            self.insert_if_absent(GRID_EXPORT, export);
        }

        if raw.contains_key(BATTERY_POWER_W) {
            let battery_w = round2(raw.number(BATTERY_POWER_W));
            let (charging, discharging) = split_signed(battery_w);
            self.insert_if_absent(BAT_CHARGING, charging);
            self.insert_if_absent(BAT_DISCHARGING, discharging);
        }

        if PHASE_LOADS_W.iter().any(|key| raw.contains_key(key)) {
            let load: f64 = PHASE_LOADS_W
                .iter()
                .map(|key| round2(raw.number(key)))
                .sum();
            self.insert_if_absent(HOME_LOAD, round2(load));
        }

        if raw.contains_key(BATTERY_CHARGE_TOTAL_KWH) {
            self.insert_if_absent(
                BAT_CHARGE_TOTAL,
                round2(raw.number(BATTERY_CHARGE_TOTAL_KWH)),
            );
        }

        if raw.contains_key(BATTERY_DISCHARGE_TOTAL_KWH) {
            self.insert_if_absent(
                BAT_DISCHARGE_TOTAL,
                round2(raw.number(BATTERY_DISCHARGE_TOTAL_KWH)),
            );
        }
    }
}

impl FromIterator<(String, MetricValue)> for MetricsMap {
    fn from_iter<I: IntoIterator<Item = (String, MetricValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Split a signed power reading into `(negative part, positive part)`, both >= 0.
fn split_signed(value: f64) -> (f64, f64) {
    if value < 0.0 {
        (-value, 0.0)
    } else if value > 0.0 {
        (0.0, value)
    } else {
        (0.0, 0.0)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
