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

//! Bearer token lifecycle
//!
//! The token is absent until first needed, valid until `expires_at` and then
//! lazily refreshed. Refreshes run under the write half of a [`RwLock`], so
//! callers racing on an expired token wait for one refresh instead of each
//! issuing their own.

use crate::api::{ApiEnvelope, TOKEN_PATH, TokenData, TokenRequest};
use crate::error::TokenError;
use crate::signer::{SignedBody, Signer};
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::{Client, Method, StatusCode};
use std::fmt;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

/// Bearer token with its local expiry (already reduced by the refresh margin).
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    value: String,
    expires_at: DateTime<Utc>,
}

impl Token {
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// Value for the `Authorization` header, also the token part of signatures.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.value)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Owns the bearer token for one credential set.
#[derive(Debug)]
pub struct TokenManager {
    http: Client,
    base_url: String,
    signer: Signer,
    validity: TimeDelta,
    current: RwLock<Option<Token>>,
}

impl TokenManager {
    /// `validity` is the provider lifetime minus the safety margin.
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        signer: Signer,
        validity: TimeDelta,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            signer,
            validity,
            current: RwLock::new(None),
        }
    }

    /// Return a valid token, refreshing it only when absent or expired.
    pub async fn ensure_valid_token(&self) -> Result<Token, TokenError> {
        if let Some(token) = self.cached(Utc::now()).await {
            return Ok(token);
        }

        let mut slot = self.current.write().await;
        // Another caller may have refreshed while we waited for the lock.
        if let Some(token) = slot.as_ref().filter(|t| t.is_valid_at(Utc::now())) {
            return Ok(token.clone());
        }

        let token = self.request_token().await?;
        *slot = Some(token.clone());
        Ok(token)
    }

    /// Request a fresh token regardless of the cached one.
    ///
    /// Used to validate credentials before polling starts.
    pub async fn validate_credentials(&self) -> Result<(), TokenError> {
        let mut slot = self.current.write().await;
        let token = self.request_token().await?;
        *slot = Some(token);
        Ok(())
    }

    /// Drop `stale` so the next caller refreshes. A newer token is left alone.
    pub async fn invalidate(&self, stale: &Token) {
        let mut slot = self.current.write().await;
        if slot.as_ref() == Some(stale) {
            debug!("Invalidating bearer token rejected by the provider");
            *slot = None;
        }
    }

    async fn cached(&self, now: DateTime<Utc>) -> Option<Token> {
        self.current
            .read()
            .await
            .as_ref()
            .filter(|t| t.is_valid_at(now))
            .cloned()
    }

    async fn request_token(&self) -> Result<Token, TokenError> {
        let url = format!("{}{}", self.base_url, TOKEN_PATH);
        debug!("Requesting bearer token from {}", url);

        let headers = self
            .signer
            .sign(TOKEN_PATH, &Method::POST, SignedBody::GrantType, None);
        let response = headers
            .apply(self.http.post(&url))
            .json(&TokenRequest::default())
            .send()
            .await
            .map_err(|e| TokenError::TransientFailure(format!("token request failed: {e}")))?;

        let status = response.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            error!("Token request unauthorized ({})", status);
            return Err(TokenError::AuthRejected(format!(
                "token request returned {status}"
            )));
        }

        let body = response.text().await.map_err(|e| {
            TokenError::TransientFailure(format!("failed to read token response: {e}"))
        })?;
        let envelope: ApiEnvelope = serde_json::from_str(&body).map_err(|e| {
            TokenError::TransientFailure(format!("malformed token response ({status}): {e}"))
        })?;

        if !envelope.success {
            let message = envelope.message_or_default();
            error!(
                "Token request rejected (code {}): {}",
                envelope.code.as_deref().unwrap_or("none"),
                message
            );
            return Err(if envelope.is_auth_code() {
                TokenError::AuthRejected(message)
            } else {
                TokenError::TransientFailure(format!("token request rejected: {message}"))
            });
        }

        let value = serde_json::from_value::<TokenData>(envelope.data)
            .unwrap_or_default()
            .into_value()
            .ok_or_else(|| TokenError::TransientFailure("token missing from response".to_owned()))?;

        let token = Token::new(value, Utc::now() + self.validity);
        info!("Obtained bearer token, valid until {}", token.expires_at());
        Ok(token)
    }

    #[cfg(test)]
    pub(crate) async fn seed(&self, token: Token) {
        *self.current.write().await = Some(token);
    }
}
