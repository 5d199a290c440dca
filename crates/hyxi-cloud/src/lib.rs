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

//! HYXi Cloud - authenticated polling core for HYXi solar and battery telemetry
//!
//! [`PollingClient`] signs every request, manages the bearer token and fetches
//! plants, devices and per-device metrics into one [`Snapshot`].
//! [`PollCoordinator`] wraps it in a bounded retry loop and keeps the last
//! good snapshot plus [`Health`] for display consumers.

pub mod aggregate;
pub mod api;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod device;
pub mod error;
pub mod fixture;
pub mod metrics;
pub mod retry;
pub mod signer;
pub mod snapshot;
pub mod token;
pub mod traits;

pub use aggregate::Aggregate;
pub use client::PollingClient;
pub use config::HyxiConfig;
pub use coordinator::PollCoordinator;
pub use device::{Device, DeviceKind};
pub use error::{FetchError, PollError, TokenError};
pub use fixture::FixtureSource;
pub use metrics::{MetricValue, MetricsMap};
pub use retry::{PollOutcome, RetryDecision, RetryPolicy, poll_with_retry};
pub use signer::{Credentials, Signer};
pub use snapshot::{DeviceEntry, Health, Snapshot, SnapshotStore};
pub use traits::SnapshotSource;
