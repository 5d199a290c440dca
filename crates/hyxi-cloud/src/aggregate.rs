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

//! Fleet-wide battery totals ("virtual battery")

use crate::metrics::{
    BAT_CHARGE_TOTAL, BAT_CHARGING, BAT_DISCHARGE_TOTAL, BAT_DISCHARGING, BATTERY_CAPACITY,
    BATTERY_POWER_W, BATTERY_SOC, BATTERY_SOH, MetricsMap,
};
use crate::snapshot::Snapshot;
use serde::{Deserialize, Serialize};

/// Sums and averages over all battery-capable devices of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub device_count: usize,
    /// Signed battery power (W), negative while charging.
    pub battery_power: f64,
    pub charging_power: f64,
    pub discharging_power: f64,
    /// Lifetime energy totals (kWh).
    pub charge_total: f64,
    pub discharge_total: f64,
    pub capacity: f64,
    /// Percentages averaged over `device_count`.
    pub avg_soc: f64,
    pub avg_soh: f64,
}

#[derive(Default)]
struct Totals {
    count: usize,
    battery_power: f64,
    charging_power: f64,
    discharging_power: f64,
    charge_total: f64,
    discharge_total: f64,
    capacity: f64,
    soc: f64,
    soh: f64,
}

impl Totals {
    fn add(&mut self, metrics: &MetricsMap) {
        self.count += 1;
        self.battery_power += metrics.number(BATTERY_POWER_W);
        self.charging_power += metrics.number(BAT_CHARGING);
        self.discharging_power += metrics.number(BAT_DISCHARGING);
        self.charge_total += metrics.number(BAT_CHARGE_TOTAL);
        self.discharge_total += metrics.number(BAT_DISCHARGE_TOTAL);
        self.capacity += metrics.number(BATTERY_CAPACITY);
        self.soc += metrics.number(BATTERY_SOC);
        self.soh += metrics.number(BATTERY_SOH);
    }
}

/// Aggregate the battery-capable devices of `snapshot`.
///
/// Returns `None` when no device qualifies, so "no batteries" stays distinct
/// from "every battery reports zero".
pub fn summarize(snapshot: &Snapshot) -> Option<Aggregate> {
    let mut totals = Totals::default();
    for entry in snapshot.devices().filter(|e| e.kind().is_battery_capable()) {
        totals.add(&entry.metrics);
    }

    if totals.count == 0 {
        return None;
    }

    #[expect(clippy::cast_precision_loss, reason = "device counts are small")]
    let count = totals.count as f64;

    Some(Aggregate {
        device_count: totals.count,
        battery_power: round1(totals.battery_power),
        charging_power: round1(totals.charging_power),
        discharging_power: round1(totals.discharging_power),
        charge_total: round1(totals.charge_total),
        discharge_total: round1(totals.discharge_total),
        capacity: round1(totals.capacity),
        avg_soc: round1(totals.soc / count),
        avg_soh: round1(totals.soh / count),
    })
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
