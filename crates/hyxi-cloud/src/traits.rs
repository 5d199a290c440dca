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

use crate::error::FetchError;
use crate::snapshot::Snapshot;
use async_trait::async_trait;

/// Anything that can produce one complete snapshot per call.
///
/// Implemented by the cloud client and by the offline fixture source.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Run one full fetch pass (no retries)
    async fn fetch_snapshot(&self) -> Result<Snapshot, FetchError>;

    /// Source name for logging
    fn name(&self) -> &str;
}

#[async_trait]
impl<S: SnapshotSource + ?Sized> SnapshotSource for std::sync::Arc<S> {
    async fn fetch_snapshot(&self) -> Result<Snapshot, FetchError> {
        (**self).fetch_snapshot().await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[async_trait]
impl<S: SnapshotSource + ?Sized> SnapshotSource for Box<S> {
    async fn fetch_snapshot(&self) -> Result<Snapshot, FetchError> {
        (**self).fetch_snapshot().await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
