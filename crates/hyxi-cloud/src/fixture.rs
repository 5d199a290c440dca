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

//! Offline snapshot source backed by a JSON file

use crate::error::FetchError;
use crate::snapshot::Snapshot;
use crate::traits::SnapshotSource;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Serves the snapshot stored in a JSON file instead of calling the cloud.
///
/// The file is re-read on every poll so it can be edited while running.
#[derive(Debug, Clone)]
pub struct FixtureSource {
    path: PathBuf,
    name: String,
}

impl FixtureSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = format!("fixture:{}", path.display());
        Self { path, name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SnapshotSource for FixtureSource {
    async fn fetch_snapshot(&self) -> Result<Snapshot, FetchError> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            FetchError::Unreachable(format!("failed to read {}: {e}", self.path.display()))
        })?;

        let snapshot: Snapshot = serde_json::from_str(&content).map_err(|e| {
            FetchError::ProviderRejected(format!("invalid fixture {}: {e}", self.path.display()))
        })?;

        warn!(
            "Fixture mode active, serving {} devices from {}",
            snapshot.len(),
            self.path.display()
        );
        Ok(snapshot)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
