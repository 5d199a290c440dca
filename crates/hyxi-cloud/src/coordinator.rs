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

//! Poll coordinator: retry controller plus snapshot cache

use crate::aggregate::Aggregate;
use crate::error::PollError;
use crate::retry::{PollOutcome, RetryPolicy, poll_with_retry};
use crate::snapshot::{Health, Snapshot, SnapshotStore};
use crate::traits::SnapshotSource;
use chrono::Utc;
use tracing::{error, info, warn};

/// Drives polls against one source and publishes results to a [`SnapshotStore`].
///
/// `refresh` takes `&mut self`, so two polls on the same coordinator can
/// never overlap.
#[derive(Debug)]
pub struct PollCoordinator<S> {
    source: S,
    policy: RetryPolicy,
    store: SnapshotStore,
}

impl<S: SnapshotSource> PollCoordinator<S> {
    pub fn new(source: S, policy: RetryPolicy, enable_virtual_battery: bool) -> Self {
        Self {
            source,
            policy,
            store: SnapshotStore::new(enable_virtual_battery),
        }
    }

    /// Read handle for display consumers.
    pub fn store(&self) -> SnapshotStore {
        self.store.clone()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Poll once (with retries) and update the cache.
    ///
    /// The cache is written only after the poll finished, so cancelling this
    /// future leaves the previous snapshot intact.
    pub async fn refresh(&mut self) -> Result<u32, PollError> {
        match poll_with_retry(&self.source, &self.policy).await {
            Ok(PollOutcome { snapshot, attempts }) => {
                info!(
                    "Poll succeeded: {} devices in {} attempt(s)",
                    snapshot.len(),
                    attempts
                );
                self.store.record_success(snapshot, attempts, Utc::now());
                Ok(attempts)
            }
            Err(e) => {
                self.store.record_failure(&e);
                if e.is_auth_rejected() {
                    error!("Credentials rejected, re-authentication required: {}", e);
                } else {
                    warn!("Poll failed, serving last known snapshot: {}", e);
                }
                Err(e)
            }
        }
    }

    pub fn current_snapshot(&self) -> Snapshot {
        self.store.current_snapshot()
    }

    pub fn health(&self) -> Health {
        self.store.health()
    }

    pub fn aggregate_summary(&self) -> Option<Aggregate> {
        self.store.aggregate_summary()
    }
}
