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

//! Snapshot data model and the last-known-good cache

use crate::aggregate::{Aggregate, summarize};
use crate::device::{Device, DeviceKind};
use crate::error::PollError;
use crate::metrics::{LAST_SEEN, MetricValue, MetricsMap};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Static info keys copied verbatim into the metrics map.
const INFO_KEYS: [&str; 5] = [
    "signalIntensity",
    "signalVal",
    "wifiVer",
    "comMode",
    "batCap",
];

/// Firmware version candidates, most specific first.
const SW_VERSION_KEYS: [&str; 3] = ["swVerSys", "swVerMaster", "swVer"];

/// One device in a snapshot: identity plus merged metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEntry {
    #[serde(flatten)]
    pub device: Device,
    pub metrics: MetricsMap,
}

impl DeviceEntry {
    /// Fresh entry whose metrics only hold the `last_seen` timestamp.
    pub fn new(device: Device, seen_at: DateTime<Utc>) -> Self {
        let mut metrics = MetricsMap::new();
        metrics.insert(
            LAST_SEEN,
            MetricValue::Text(seen_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
        );
        Self { device, metrics }
    }

    pub fn serial(&self) -> &str {
        &self.device.serial
    }

    pub fn kind(&self) -> DeviceKind {
        self.device.kind()
    }

    /// Merge raw live telemetry and overlay the derived metrics.
    pub fn apply_metrics(&mut self, raw: MetricsMap) {
        self.metrics.apply_derived(&raw);
        self.metrics.merge_raw(raw);
    }

    /// Merge static device info (firmware, signal, capability limits).
    pub fn apply_info(&mut self, info: &MetricsMap) {
        if let Some(version) = SW_VERSION_KEYS
            .iter()
            .filter_map(|key| info.get(key))
            .find_map(non_empty_text)
        {
            self.device.sw_version = Some(version);
        }

        for key in INFO_KEYS {
            if let Some(value) = info.get(key) {
                self.metrics.insert_if_absent(key, value.clone());
            }
        }

        let shared_limit = info.get("maxChargingDischargingPower");
        for key in ["maxChargePower", "maxDischargePower"] {
            let value = info
                .get(key)
                .filter(|v| !v.is_null())
                .or(shared_limit);
            if let Some(value) = value {
                self.metrics.insert_if_absent(key, value.clone());
            }
        }
    }
}

fn non_empty_text(value: &MetricValue) -> Option<String> {
    match value {
        MetricValue::Text(s) if !s.trim().is_empty() => Some(s.clone()),
        MetricValue::Number(n) => Some(n.to_string()),
        MetricValue::Text(_) | MetricValue::Null => None,
    }
}

/// Complete merged result of one successful poll, keyed by serial.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    devices: BTreeMap<String, DeviceEntry>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, replacing any previous entry with the same serial.
    pub fn insert(&mut self, entry: DeviceEntry) -> Option<DeviceEntry> {
        self.devices.insert(entry.device.serial.clone(), entry)
    }

    pub fn get(&self, serial: &str) -> Option<&DeviceEntry> {
        self.devices.get(serial)
    }

    pub fn devices(&self) -> impl Iterator<Item = &DeviceEntry> {
        self.devices.values()
    }

    pub fn serials(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl FromIterator<DeviceEntry> for Snapshot {
    fn from_iter<I: IntoIterator<Item = DeviceEntry>>(iter: I) -> Self {
        let mut snapshot = Self::new();
        for entry in iter {
            snapshot.insert(entry);
        }
        snapshot
    }
}

/// Provenance of the cached snapshot, kept apart from device data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub cloud_online: bool,
    /// Attempts used by the most recent poll.
    pub last_attempts: u32,
    pub last_success: Option<DateTime<Utc>>,
    /// Credentials were rejected; polling cannot recover without re-entry.
    pub auth_required: bool,
}

/// Last successful snapshot plus health metadata.
#[derive(Debug, Clone, Default)]
pub struct SnapshotCache {
    snapshot: Snapshot,
    health: Health,
}

impl SnapshotCache {
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn health(&self) -> &Health {
        &self.health
    }

    /// Replace the snapshot wholesale after a successful poll.
    pub fn record_success(&mut self, snapshot: Snapshot, attempts: u32, at: DateTime<Utc>) {
        self.snapshot = snapshot;
        self.health.cloud_online = true;
        self.health.last_attempts = attempts;
        self.health.last_success = Some(at);
        self.health.auth_required = false;
    }

    /// Record a failed poll. The previous snapshot and `last_success` stay untouched.
    pub fn record_failure(&mut self, error: &PollError) {
        self.health.last_attempts = error.attempts();
        match error {
            PollError::AuthRejected(_) => self.health.auth_required = true,
            PollError::Unreachable { .. } | PollError::ProviderRejected { .. } => {
                self.health.cloud_online = false;
            }
        }
    }

    /// Fleet battery totals, `None` when no battery-capable device exists.
    pub fn aggregate_summary(&self) -> Option<Aggregate> {
        summarize(&self.snapshot)
    }
}

/// Cheap, cloneable read handle shared with the display layer.
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    inner: Arc<RwLock<SnapshotCache>>,
    aggregate_enabled: bool,
}

impl SnapshotStore {
    pub fn new(aggregate_enabled: bool) -> Self {
        Self {
            inner: Arc::default(),
            aggregate_enabled,
        }
    }

    pub fn current_snapshot(&self) -> Snapshot {
        self.inner.read().snapshot().clone()
    }

    pub fn health(&self) -> Health {
        self.inner.read().health().clone()
    }

    /// `None` when the aggregate view is disabled or there are no batteries.
    pub fn aggregate_summary(&self) -> Option<Aggregate> {
        if !self.aggregate_enabled {
            return None;
        }
        self.inner.read().aggregate_summary()
    }

    pub(crate) fn record_success(&self, snapshot: Snapshot, attempts: u32, at: DateTime<Utc>) {
        self.inner.write().record_success(snapshot, attempts, at);
    }

    pub(crate) fn record_failure(&self, error: &PollError) {
        self.inner.write().record_failure(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics;
    use serde_json::json;

    fn entry(serial: &str, type_code: &str) -> DeviceEntry {
        DeviceEntry::new(
            Device::new(serial, Some(type_code.to_owned()), None, None, None),
            Utc::now(),
        )
    }

    fn info(pairs: serde_json::Value) -> MetricsMap {
        pairs
            .as_object()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), MetricValue::from(v.clone())))
            .collect()
    }

    #[test]
    fn test_new_entry_has_last_seen() {
        let e = entry("SN1", "HYBRID_INVERTER");
        assert!(matches!(e.metrics.get(LAST_SEEN), Some(MetricValue::Text(_))));
        assert_eq!(e.metrics.len(), 1);
    }

    #[test]
    fn test_apply_info_picks_firmware_and_limits() {
        let mut e = entry("SN1", "HYBRID_INVERTER");
        e.apply_info(&info(json!({
            "swVerSys": "",
            "swVerMaster": "M1.02",
            "swVer": "V0.9",
            "signalIntensity": 87,
            "maxChargingDischargingPower": 5000,
            "maxDischargePower": 4600,
            "ignored": "x"
        })));

        assert_eq!(e.device.sw_version.as_deref(), Some("M1.02"));
        assert_eq!(e.metrics.number("signalIntensity"), 87.0);
        assert_eq!(e.metrics.number("maxChargePower"), 5000.0);
        assert_eq!(e.metrics.number("maxDischargePower"), 4600.0);
        assert!(!e.metrics.contains_key("ignored"));
    }

    #[test]
    fn test_apply_metrics_keeps_raw_and_adds_derived() {
        let mut e = entry("SN1", "HYBRID_INVERTER");
        e.apply_metrics(info(json!({"gridP": "-2.5", "pbat": 200, "batSoc": "80"})));

        assert_eq!(
            e.metrics.get("gridP"),
            Some(&MetricValue::Text("-2.5".to_owned()))
        );
        assert_eq!(e.metrics.number(metrics::GRID_IMPORT), 2500.0);
        assert_eq!(e.metrics.number(metrics::BAT_DISCHARGING), 200.0);
        assert!(e.metrics.contains_key(LAST_SEEN));
    }

    #[test]
    fn test_snapshot_keyed_by_serial() {
        let snapshot: Snapshot = vec![
            entry("B", "BATTERY"),
            entry("A", "COLLECTOR"),
            entry("B", "BATTERY"),
        ]
        .into_iter()
        .collect();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.serials().collect::<Vec<_>>(), vec!["A", "B"]);
    }

    #[test]
    fn test_failure_keeps_previous_snapshot() {
        let mut cache = SnapshotCache::default();
        let first: Snapshot = std::iter::once(entry("SN1", "BATTERY")).collect();
        let at = Utc::now();
        cache.record_success(first.clone(), 1, at);

        cache.record_failure(&PollError::Unreachable {
            attempts: 3,
            reason: "timeout".to_owned(),
        });

        assert_eq!(cache.snapshot(), &first);
        assert!(!cache.health().cloud_online);
        assert_eq!(cache.health().last_attempts, 3);
        assert_eq!(cache.health().last_success, Some(at));
    }

    #[test]
    fn test_auth_rejection_does_not_mark_offline() {
        let mut cache = SnapshotCache::default();
        cache.record_success(Snapshot::new(), 2, Utc::now());
        cache.record_failure(&PollError::AuthRejected("bad key".to_owned()));

        assert!(cache.health().cloud_online);
        assert!(cache.health().auth_required);

        cache.record_success(Snapshot::new(), 1, Utc::now());
        assert!(!cache.health().auth_required);
    }

    #[test]
    fn test_store_aggregate_respects_flag() {
        let snapshot: Snapshot = std::iter::once(entry("SN1", "BATTERY")).collect();

        let disabled = SnapshotStore::new(false);
        disabled.record_success(snapshot.clone(), 1, Utc::now());
        assert!(disabled.aggregate_summary().is_none());

        let enabled = SnapshotStore::new(true);
        enabled.record_success(snapshot, 1, Utc::now());
        assert_eq!(enabled.aggregate_summary().map(|a| a.device_count), Some(1));
    }

    #[test]
    fn test_entry_serializes_flat_identity() {
        let e = entry("SN1", "BATTERY");
        let value = serde_json::to_value(&e).unwrap();
        assert_eq!(value["serial"], "SN1");
        assert_eq!(value["model_label"], "Battery");
        assert!(value["metrics"]["last_seen"].is_string());
    }
}
