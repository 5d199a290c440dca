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

//! Bounded retry with linear backoff around one fetch pass

use crate::config::HyxiConfig;
use crate::error::{FetchError, PollError};
use crate::snapshot::Snapshot;
use crate::traits::SnapshotSource;
use std::time::Duration;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    Fatal,
}

/// Retry policy: attempt budget, backoff base and error classifier.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub classify: fn(&FetchError) -> RetryDecision,
}

/// Only transport-level failures are worth another attempt.
pub fn default_classifier(error: &FetchError) -> RetryDecision {
    match error {
        FetchError::Unreachable(_) => RetryDecision::Retry,
        FetchError::AuthRejected(_) | FetchError::ProviderRejected(_) => RetryDecision::Fatal,
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            classify: default_classifier,
        }
    }

    pub fn from_config(config: &HyxiConfig) -> Self {
        Self::new(config.max_attempts, config.retry_base_delay())
    }

    #[must_use]
    pub fn with_classifier(mut self, classify: fn(&FetchError) -> RetryDecision) -> Self {
        self.classify = classify;
        self
    }

    /// Sleep before attempt `attempt + 1`: `attempt * base_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// A successful poll and the number of attempts it took.
#[derive(Debug, Clone)]
pub struct PollOutcome {
    pub snapshot: Snapshot,
    pub attempts: u32,
}

/// Run `source` until it succeeds, fails fatally or runs out of attempts.
///
/// Dropping the returned future cancels the poll, including a pending backoff sleep.
pub async fn poll_with_retry<S>(source: &S, policy: &RetryPolicy) -> Result<PollOutcome, PollError>
where
    S: SnapshotSource + ?Sized,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let err = match source.fetch_snapshot().await {
            Ok(snapshot) => {
                return Ok(PollOutcome {
                    snapshot,
                    attempts: attempt,
                });
            }
            Err(e) => e,
        };

        if (policy.classify)(&err) == RetryDecision::Fatal {
            error!("{} poll failed on attempt {}: {}", source.name(), attempt, err);
            return Err(fatal(err, attempt));
        }

        if attempt >= max_attempts {
            error!(
                "{} unreachable after {} attempts: {}",
                source.name(),
                attempt,
                err
            );
            return Err(PollError::Unreachable {
                attempts: attempt,
                reason: err.to_string(),
            });
        }

        let delay = policy.delay_for(attempt);
        warn!(
            "{} attempt {}/{} failed, retrying in {:?}: {}",
            source.name(),
            attempt,
            max_attempts,
            delay,
            err
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

fn fatal(err: FetchError, attempts: u32) -> PollError {
    match err {
        FetchError::AuthRejected(reason) => PollError::AuthRejected(reason),
        FetchError::ProviderRejected(reason) => PollError::ProviderRejected { attempts, reason },
        FetchError::Unreachable(reason) => PollError::Unreachable { attempts, reason },
    }
}
