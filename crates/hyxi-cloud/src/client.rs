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

//! HYXi cloud client and the snapshot fetch pipeline
//!
//! One pass runs in three stages: list plants, list devices of every plant
//! concurrently, then fetch info and live metrics of every device with a
//! bounded fan-out. Results are merged into the snapshot only after all
//! branches have joined.

use crate::api::{
    ApiEnvelope, DEVICE_DATA_PATH, DEVICE_INFO_PATH, DEVICE_PAGE_PATH, DevicePage,
    DevicePageRequest, PLANT_PAGE_PATH, PlantPage, PlantPageRequest, parse_data_items,
};
use crate::config::HyxiConfig;
use crate::device::Device;
use crate::error::{CallError, FetchError, TokenError};
use crate::metrics::MetricsMap;
use crate::signer::{SignedBody, Signer};
use crate::snapshot::{DeviceEntry, Snapshot};
use crate::token::{Token, TokenManager};
use crate::traits::SnapshotSource;
use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use futures_util::future::join_all;
use futures_util::stream::{self, StreamExt};
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Longest error body kept in a [`CallError::Status`] message.
const MAX_ERROR_BODY: usize = 200;

#[derive(Debug, Clone)]
struct FetchSettings {
    plant_page_size: u32,
    device_page_size: u32,
    max_concurrent_devices: usize,
}

/// Per-device outcome of the detail stage.
struct DeviceDetail {
    entry: DeviceEntry,
    token_refused: bool,
}

/// Owned client holding the connection pool and the token state.
///
/// Build it once and share it by reference; nothing here is global.
#[derive(Debug)]
pub struct PollingClient {
    http: Client,
    base_url: String,
    signer: Signer,
    tokens: TokenManager,
    settings: FetchSettings,
}

impl PollingClient {
    pub fn new(config: &HyxiConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Failed to build HTTP client")?;

        let base_url = config.base_url.trim_end_matches('/').to_owned();
        let signer = Signer::new(config.credentials());
        let tokens = TokenManager::new(
            http.clone(),
            base_url.clone(),
            signer.clone(),
            config.token_validity(),
        );

        info!("HYXi client for {} (access key {})", base_url, signer.access_key());

        Ok(Self {
            http,
            base_url,
            signer,
            tokens,
            settings: FetchSettings {
                plant_page_size: config.plant_page_size,
                device_page_size: config.device_page_size,
                max_concurrent_devices: config.max_concurrent_devices,
            },
        })
    }

    /// Request a fresh token to check the configured credentials.
    pub async fn validate_credentials(&self) -> Result<(), TokenError> {
        self.tokens.validate_credentials().await
    }

    /// Run one full pass of the pipeline.
    pub async fn fetch_snapshot(&self) -> Result<Snapshot, FetchError> {
        let token = self.tokens.ensure_valid_token().await?;

        let plant_ids = match self.list_plants(&token).await {
            Ok(ids) => ids,
            Err(e) => return Err(self.classify_failure(&token, &e).await),
        };
        debug!("Found {} plants", plant_ids.len());

        let devices = self.list_all_devices(&token, &plant_ids).await?;
        let device_count = devices.len();

        let details: Vec<DeviceDetail> = stream::iter(devices.into_values())
            .map(|device| self.fetch_device(&token, device))
            .buffer_unordered(self.settings.max_concurrent_devices)
            .collect()
            .await;

        if details.iter().any(|d| d.token_refused) {
            self.tokens.invalidate(&token).await;
        }

        let snapshot: Snapshot = details.into_iter().map(|d| d.entry).collect();
        info!(
            "Fetched {} devices from {} plants",
            device_count,
            plant_ids.len()
        );
        Ok(snapshot)
    }

    /// Device listings of all plants, de-duplicated by serial.
    ///
    /// A failing plant is logged and skipped. When no plant listing succeeded
    /// the whole pass fails: `Unreachable` if any failure was transport-level,
    /// `ProviderRejected` otherwise.
    async fn list_all_devices(
        &self,
        token: &Token,
        plant_ids: &[String],
    ) -> Result<BTreeMap<String, Device>, FetchError> {
        let listings = join_all(plant_ids.iter().map(|plant_id| async move {
            (plant_id, self.list_devices(token, plant_id).await)
        }))
        .await;

        let mut devices = BTreeMap::new();
        let mut listed = 0;
        let mut unreachable = None;
        let mut rejected = None;
        let mut token_refused = false;

        for (plant_id, result) in listings {
            match result {
                Ok(list) => {
                    listed += 1;
                    for device in list {
                        devices.entry(device.serial.clone()).or_insert(device);
                    }
                }
                Err(e) => {
                    warn!("Skipping plant {}: {}", plant_id, e);
                    token_refused |= e.is_unauthorized();
                    match e.classify() {
                        err @ FetchError::Unreachable(_) => unreachable = Some(err),
                        err => rejected = Some(err),
                    }
                }
            }
        }

        if token_refused {
            self.tokens.invalidate(token).await;
        }

        if listed == 0 && !plant_ids.is_empty() {
            return Err(unreachable.or(rejected).unwrap_or_else(|| {
                FetchError::ProviderRejected("no plant device listing succeeded".to_owned())
            }));
        }

        Ok(devices)
    }

    async fn fetch_device(&self, token: &Token, device: Device) -> DeviceDetail {
        let serial = device.serial.clone();
        let kind = device.kind();

        let live = async {
            if kind.has_live_metrics() {
                Some(self.query_device_data(token, &serial).await)
            } else {
                None
            }
        };
        let (info, live) = tokio::join!(self.query_device_info(token, &serial), live);

        let mut entry = DeviceEntry::new(device, Utc::now());
        let mut token_refused = false;

        match live {
            Some(Ok(raw)) => {
                debug!("Raw metrics for {} ({}): {:?}", serial, kind, raw);
                entry.apply_metrics(raw);
            }
            Some(Err(e)) => {
                token_refused |= e.is_unauthorized();
                warn!("Live metrics unavailable for {}: {}", serial, e);
            }
            None => debug!("{} is a {}, skipping live metrics", serial, kind),
        }

        match info {
            Ok(info) => {
                debug!("Raw info for {}: {:?}", serial, info);
                entry.apply_info(&info);
            }
            Err(e) => {
                token_refused |= e.is_unauthorized();
                warn!("Device info unavailable for {}: {}", serial, e);
            }
        }

        DeviceDetail {
            entry,
            token_refused,
        }
    }

    pub async fn list_plants(&self, token: &Token) -> Result<Vec<String>, CallError> {
        let request = PlantPageRequest {
            page_size: self.settings.plant_page_size,
            current_page: 1,
        };
        let data = self
            .call(Method::POST, PLANT_PAGE_PATH, &[], Some(&request), token)
            .await?;

        let page: PlantPage = match data {
            Value::Null => PlantPage::default(),
            data => serde_json::from_value(data)
                .map_err(|e| CallError::Decode(format!("plant page: {e}")))?,
        };

        warn_if_truncated("plant", page.total, page.list.len());
        Ok(page.list.into_iter().filter_map(|p| p.plant_id).collect())
    }

    pub async fn list_devices(
        &self,
        token: &Token,
        plant_id: &str,
    ) -> Result<Vec<Device>, CallError> {
        let request = DevicePageRequest {
            plant_id,
            page_size: self.settings.device_page_size,
            current_page: 1,
        };
        let data = self
            .call(Method::POST, DEVICE_PAGE_PATH, &[], Some(&request), token)
            .await?;

        let (raw, total) = match data {
            Value::Null => (Vec::new(), None),
            data => serde_json::from_value::<DevicePage>(data)
                .map_err(|e| CallError::Decode(format!("device page of plant {plant_id}: {e}")))?
                .into_parts(),
        };

        warn_if_truncated(&format!("device (plant {plant_id})"), total, raw.len());
        Ok(raw.into_iter().filter_map(|d| d.into_device()).collect())
    }

    /// Live telemetry as raw provider key/value pairs.
    pub async fn query_device_data(
        &self,
        token: &Token,
        serial: &str,
    ) -> Result<MetricsMap, CallError> {
        let data = self
            .call::<()>(Method::GET, DEVICE_DATA_PATH, &[("deviceSn", serial)], None, token)
            .await?;
        parse_data_items(data)
            .ok_or_else(|| CallError::Decode(format!("unexpected metrics payload for {serial}")))
    }

    /// Static device attributes (firmware, signal, limits).
    pub async fn query_device_info(
        &self,
        token: &Token,
        serial: &str,
    ) -> Result<MetricsMap, CallError> {
        let data = self
            .call::<()>(Method::GET, DEVICE_INFO_PATH, &[("deviceSn", serial)], None, token)
            .await?;
        parse_data_items(data)
            .ok_or_else(|| CallError::Decode(format!("unexpected info payload for {serial}")))
    }

    /// One signed exchange. Returns the envelope's `data` on success.
    ///
    /// Only `path` is signed; the query string is not part of the signature.
    async fn call<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
        token: &Token,
    ) -> Result<Value, CallError> {
        let url = format!("{}{}", self.base_url, path);
        let bearer = token.bearer();
        let headers = self
            .signer
            .sign(path, &method, SignedBody::Empty, Some(&bearer));

        let mut request = headers.apply(self.http.request(method, &url));
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(CallError::Unauthorized(status));
        }

        let text = response.text().await?;
        if !status.is_success() {
            return Err(CallError::Status {
                status,
                message: text.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        let envelope: ApiEnvelope = serde_json::from_str(&text)
            .map_err(|e| CallError::Decode(format!("{path}: {e}")))?;

        if !envelope.success {
            if envelope.is_auth_code() {
                return Err(CallError::Unauthorized(StatusCode::UNAUTHORIZED));
            }
            return Err(CallError::Rejected {
                code: envelope.code.clone().unwrap_or_else(|| "none".to_owned()),
                message: envelope.message_or_default(),
            });
        }

        Ok(envelope.data)
    }

    async fn classify_failure(&self, token: &Token, err: &CallError) -> FetchError {
        if err.is_unauthorized() {
            self.tokens.invalidate(token).await;
        }
        err.classify()
    }
}

fn warn_if_truncated(what: &str, total: Option<u64>, returned: usize) {
    if let Some(total) = total
        && total > returned as u64
    {
        warn!(
            "Provider reports {} {} entries but only the first page ({}) is read",
            total, what, returned
        );
    }
}

#[async_trait]
impl SnapshotSource for PollingClient {
    async fn fetch_snapshot(&self) -> Result<Snapshot, FetchError> {
        PollingClient::fetch_snapshot(self).await
    }

    fn name(&self) -> &str {
        "hyxi-cloud"
    }
}
