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

//! Error types for the HYXi cloud client
//!
//! Errors are layered: a single HTTP exchange fails with [`CallError`], the
//! token layer reports [`TokenError`], one pass of the fetch pipeline reports
//! [`FetchError`] and the retry controller finally reports [`PollError`].

use reqwest::StatusCode;
use thiserror::Error;

/// Failure of the token refresh request.
#[derive(Debug, Clone, Error)]
pub enum TokenError {
    /// The provider rejected the access/secret key pair. Retrying will not help.
    #[error("credentials rejected: {0}")]
    AuthRejected(String),

    /// Timeout, connection error, malformed payload or missing token field.
    #[error("token refresh failed: {0}")]
    TransientFailure(String),
}

/// Failure of one pass of the fetch pipeline.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("credentials rejected: {0}")]
    AuthRejected(String),

    /// Transport-level failure (timeout, refused or reset connection, 5xx).
    #[error("cloud unreachable: {0}")]
    Unreachable(String),

    /// The provider answered with a well-formed negative or unexpected payload.
    #[error("provider rejected request: {0}")]
    ProviderRejected(String),
}

impl From<TokenError> for FetchError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::AuthRejected(msg) => FetchError::AuthRejected(msg),
            TokenError::TransientFailure(msg) => FetchError::Unreachable(msg),
        }
    }
}

/// Outcome of a failed poll after the retry policy has been applied.
#[derive(Debug, Clone, Error)]
pub enum PollError {
    /// Terminal for the current credential set, needs user re-authentication.
    #[error("credentials rejected: {0}")]
    AuthRejected(String),

    #[error("cloud unreachable after {attempts} attempts: {reason}")]
    Unreachable { attempts: u32, reason: String },

    #[error("provider rejected request on attempt {attempts}: {reason}")]
    ProviderRejected { attempts: u32, reason: String },
}

impl PollError {
    /// Number of fetch attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::AuthRejected(_) => 1,
            Self::Unreachable { attempts, .. } | Self::ProviderRejected { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn is_auth_rejected(&self) -> bool {
        matches!(self, Self::AuthRejected(_))
    }
}

/// Failure of a single signed HTTP exchange with the provider.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unauthorized ({0})")]
    Unauthorized(StatusCode),

    #[error("provider returned status {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("undecodable response: {0}")]
    Decode(String),

    #[error("provider reported failure (code {code}): {message}")]
    Rejected { code: String, message: String },
}

impl CallError {
    /// The provider refused the bearer token.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    /// Map a failed call onto the pipeline taxonomy.
    ///
    /// Transport failures, server errors and unauthorized answers on data
    /// calls are retryable. Everything else is a payload mismatch.
    pub fn classify(&self) -> FetchError {
        match self {
            Self::Transport(e) => FetchError::Unreachable(e.to_string()),
            Self::Unauthorized(status) => {
                FetchError::Unreachable(format!("token refused by provider ({status})"))
            }
            Self::Status { status, .. } if status.is_server_error() => {
                FetchError::Unreachable(self.to_string())
            }
            Self::Status { .. } | Self::Decode(_) | Self::Rejected { .. } => {
                FetchError::ProviderRejected(self.to_string())
            }
        }
    }
}
