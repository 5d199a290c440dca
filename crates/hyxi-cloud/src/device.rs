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

//! Device identity and type classification
//!
//! The provider reports free-form type codes such as `HYBRID_INVERTER`,
//! `ALL_IN_ONE`, `BATTERY` or `COLLECTOR`. [`DeviceKind::classify`] is the one
//! place that turns those codes into a closed set of tags. Rules are checked in
//! order on the upper-cased code:
//!
//! 1. contains `COLLECTOR` or `DATALOGGER` -> [`DeviceKind::Collector`]
//! 2. contains `METER` -> [`DeviceKind::Meter`]
//! 3. contains `HYBRID`, `ALL_IN_ONE` or `ALLINONE` -> [`DeviceKind::Hybrid`]
//! 4. contains `BATTERY`, `EMS` or `STORAGE` -> [`DeviceKind::Battery`]
//! 5. contains `INVERTER` -> [`DeviceKind::Inverter`]
//! 6. anything else -> [`DeviceKind::Unknown`]

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of device classes used for every device-type decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Inverter,
    Battery,
    Hybrid,
    Meter,
    Collector,
    Unknown,
}

impl DeviceKind {
    pub fn classify(type_code: &str) -> Self {
        let code = type_code.trim().to_uppercase();
        let has = |needle: &str| code.contains(needle);

        if has("COLLECTOR") || has("DATALOGGER") {
            Self::Collector
        } else if has("METER") {
            Self::Meter
        } else if has("HYBRID") || has("ALL_IN_ONE") || has("ALLINONE") {
            Self::Hybrid
        } else if has("BATTERY") || has("EMS") || has("STORAGE") {
            Self::Battery
        } else if has("INVERTER") {
            Self::Inverter
        } else {
            Self::Unknown
        }
    }

    /// Passive relays carry no live telemetry, only static info.
    pub fn has_live_metrics(self) -> bool {
        !matches!(self, Self::Collector)
    }

    /// Hardware with a battery behind it (battery, EMS, hybrid, all-in-one).
    pub fn is_battery_capable(self) -> bool {
        matches!(self, Self::Battery | Self::Hybrid)
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Inverter => "Inverter",
            Self::Battery => "Battery",
            Self::Hybrid => "Hybrid Inverter",
            Self::Meter => "Meter",
            Self::Collector => "Data Collector",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// One physical unit, identified by its serial number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub serial: String,
    pub type_code: String,
    pub device_name: String,
    pub model_label: String,
    pub sw_version: Option<String>,
    pub hw_version: Option<String>,
}

impl Device {
    pub const UNKNOWN_TYPE: &'static str = "UNKNOWN";

    /// Build a device from listing fields, filling display fallbacks.
    pub fn new(
        serial: impl Into<String>,
        type_code: Option<String>,
        device_name: Option<String>,
        sw_version: Option<String>,
        hw_version: Option<String>,
    ) -> Self {
        let serial = serial.into();
        let type_code = type_code
            .filter(|code| !code.trim().is_empty())
            .unwrap_or_else(|| Self::UNKNOWN_TYPE.to_owned());
        let model_label = model_label(&type_code);
        let device_name = device_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| format!("{model_label} {serial}"));

        Self {
            serial,
            type_code,
            device_name,
            model_label,
            sw_version,
            hw_version,
        }
    }

    pub fn kind(&self) -> DeviceKind {
        DeviceKind::classify(&self.type_code)
    }
}

/// `HYBRID_INVERTER` -> `Hybrid Inverter`
pub fn model_label(type_code: &str) -> String {
    type_code
        .split(['_', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
