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

//! Request signing for the HYXi open API
//!
//! Every request carries `accessKey`, `timestamp`, `nonce` and `sign` headers.
//! The signature is `base64(HMAC-SHA512(secret, access_key + token + timestamp
//! + nonce + path "\n" METHOD "\n" sha512_hex(body) "\n"))`.

use base64::Engine as _;
use hmac::{Hmac, Mac};
use rand_core::{OsRng, RngCore};
use reqwest::{Method, RequestBuilder};
use sha2::{Digest, Sha512};
use std::fmt;

type HmacSha512 = Hmac<Sha512>;

const NONCE_BYTES: usize = 4;

/// Access key / secret key pair issued by the HYXi developer portal.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl Credentials {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Canonical body that gets hashed into the string to sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignedBody {
    /// Data calls hash the empty string.
    Empty,
    /// Token requests hash the literal `grantType:1`.
    GrantType,
}

impl SignedBody {
    fn canonical(self) -> &'static str {
        match self {
            Self::Empty => "",
            Self::GrantType => "grantType:1",
        }
    }

    fn signed_field(self) -> Option<&'static str> {
        match self {
            Self::Empty => None,
            Self::GrantType => Some("grantType"),
        }
    }
}

/// Authentication headers for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub access_key: String,
    pub timestamp: String,
    pub nonce: String,
    pub signature: String,
    /// `sign-headers` marker, only set on token requests.
    pub sign_headers: Option<&'static str>,
    /// Bearer token, only set on data requests once a token exists.
    pub authorization: Option<String>,
}

impl SignedHeaders {
    /// Attach the headers to an outgoing request.
    pub fn apply(self, request: RequestBuilder) -> RequestBuilder {
        let mut request = request
            .header("accessKey", self.access_key)
            .header("timestamp", self.timestamp)
            .header("nonce", self.nonce)
            .header("sign", self.signature)
            .header(reqwest::header::CONTENT_TYPE, "application/json");

        if let Some(field) = self.sign_headers {
            request = request.header("sign-headers", field);
        }
        if let Some(token) = self.authorization {
            request = request.header(reqwest::header::AUTHORIZATION, token);
        }
        request
    }
}

/// Stateless signer bound to one credential set.
#[derive(Debug, Clone)]
pub struct Signer {
    credentials: Credentials,
}

impl Signer {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    pub fn access_key(&self) -> &str {
        &self.credentials.access_key
    }

    /// Sign a request with the current wall clock and a fresh random nonce.
    ///
    /// `bearer` is the full `Authorization` value (`"Bearer <token>"`). It is
    /// ignored for token requests, which must never be signed with a token.
    pub fn sign(
        &self,
        path: &str,
        method: &Method,
        body: SignedBody,
        bearer: Option<&str>,
    ) -> SignedHeaders {
        let timestamp_ms = chrono::Utc::now().timestamp_millis();
        self.sign_at(path, method, body, bearer, timestamp_ms, &generate_nonce())
    }

    /// Deterministic variant of [`Signer::sign`].
    pub fn sign_at(
        &self,
        path: &str,
        method: &Method,
        body: SignedBody,
        bearer: Option<&str>,
        timestamp_ms: i64,
        nonce: &str,
    ) -> SignedHeaders {
        let timestamp = timestamp_ms.to_string();
        let content_digest = format!("{:x}", Sha512::digest(body.canonical().as_bytes()));
        let string_to_sign = format!(
            "{path}\n{}\n{content_digest}\n",
            method.as_str().to_uppercase()
        );

        let token_str = match body {
            SignedBody::GrantType => "",
            SignedBody::Empty => bearer.unwrap_or_default(),
        };

        let sign_string = format!(
            "{}{token_str}{timestamp}{nonce}{string_to_sign}",
            self.credentials.access_key
        );

        // HMAC accepts keys of any length, so this cannot fail.
        let mut mac = HmacSha512::new_from_slice(self.credentials.secret_key.as_bytes())
            .unwrap_or_else(|_| unreachable!("HMAC-SHA512 accepts keys of any length"));
        mac.update(sign_string.as_bytes());
        let signature =
            base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

        SignedHeaders {
            access_key: self.credentials.access_key.clone(),
            timestamp,
            nonce: nonce.to_owned(),
            signature,
            sign_headers: body.signed_field(),
            authorization: (body == SignedBody::Empty && !token_str.is_empty())
                .then(|| token_str.to_owned()),
        }
    }
}

/// Random hex nonce from the OS RNG, safe for concurrent in-flight requests.
pub fn generate_nonce() -> String {
    let mut bytes = [0_u8; NONCE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
