// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token issuance endpoints of the identity provider.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use super::session::TokenTriple;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Tokens returned by a refresh. The issuer may or may not rotate the
/// refresh token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshedTokens {
    pub access_token: String,
    pub id_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: u64,
}

impl RefreshedTokens {
    /// The session after this refresh: new access and id tokens, the rotated
    /// refresh token if one was issued, otherwise the previous one.
    pub fn into_session(self, previous: &TokenTriple) -> TokenTriple {
        TokenTriple {
            access_token: self.access_token,
            id_token: self.id_token,
            refresh_token: self
                .refresh_token
                .filter(|token| !token.is_empty())
                .unwrap_or_else(|| previous.refresh_token.clone()),
            expires_in: self.expires_in,
        }
    }
}

impl std::fmt::Debug for RefreshedTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshedTokens")
            .field("rotated", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("identity provider rejected the credentials")]
    Rejected,

    #[error("identity provider request failed: {0}")]
    Transport(String),

    #[error("identity provider returned HTTP {0}")]
    Status(u16),

    #[error("identity provider response was invalid: {0}")]
    InvalidResponse(String),
}

/// Login, refresh and logout against the identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> Result<TokenTriple, IdentityError>;

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, IdentityError>;

    /// Revoke the session server-side.
    async fn logout(&self, access_token: &str) -> Result<(), IdentityError>;
}

/// JSON identity provider API.
///
/// - `POST {base}/auth/login` `{username, password}` → token triple
/// - `POST {base}/auth/refresh` `{refreshToken}` → refreshed tokens
/// - `POST {base}/auth/logout` with the access token as bearer
#[derive(Debug, Clone)]
pub struct HttpIdentityProvider {
    http: Client,
    base_url: Url,
}

impl HttpIdentityProvider {
    pub fn new(base_url: Url) -> Result<Self, IdentityError> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| IdentityError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url, IdentityError> {
        self.base_url
            .join(path)
            .map_err(|e| IdentityError::Transport(format!("invalid endpoint {path}: {e}")))
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, IdentityError> {
        let response = self
            .http
            .post(self.endpoint(path)?)
            .json(&body)
            .send()
            .await
            .map_err(|e| IdentityError::Transport(e.to_string()))?;

        check_status(response.status())?;

        response
            .json()
            .await
            .map_err(|e| IdentityError::InvalidResponse(e.to_string()))
    }
}

fn check_status(status: StatusCode) -> Result<(), IdentityError> {
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(IdentityError::Rejected)
        }
        s => Err(IdentityError::Status(s.as_u16())),
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn login(&self, username: &str, password: &str) -> Result<TokenTriple, IdentityError> {
        let tokens: TokenTriple = self
            .post("auth/login", json!({ "username": username, "password": password }))
            .await?;
        if !tokens.is_complete() {
            return Err(IdentityError::InvalidResponse(
                "login response is missing a token".to_string(),
            ));
        }
        Ok(tokens)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, IdentityError> {
        let tokens: RefreshedTokens = self
            .post("auth/refresh", json!({ "refreshToken": refresh_token }))
            .await?;
        if tokens.access_token.is_empty() || tokens.id_token.is_empty() {
            return Err(IdentityError::InvalidResponse(
                "refresh response is missing a token".to_string(),
            ));
        }
        Ok(tokens)
    }

    async fn logout(&self, access_token: &str) -> Result<(), IdentityError> {
        let response = self
            .http
            .post(self.endpoint("auth/logout")?)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| IdentityError::Transport(e.to_string()))?;
        check_status(response.status())
    }
}
