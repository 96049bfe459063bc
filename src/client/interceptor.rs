// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Outbound HTTP calls carrying the session's access token.
//!
//! A `401 Unauthorized` response triggers the [`RefreshCoordinator`] and one
//! replay of the call with the new token. A call is never replayed twice.
//! Other statuses, `403` included, are returned to the caller untouched.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{
    header::{HeaderValue, AUTHORIZATION},
    Client, Method, Request, RequestBuilder, Response, StatusCode,
};
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use super::coordinator::{RefreshCoordinator, RefreshError, RequestId};
use super::identity::IdentityError;
use super::session::{SessionStore, SessionStoreError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The server answered `401`. `refresh` holds the reason the session
    /// could not be refreshed, when that is why the call gave up.
    #[error("request was rejected as unauthorized")]
    Unauthorized {
        #[source]
        refresh: Option<RefreshError>,
    },

    #[error("request body cannot be replayed after a refresh")]
    NotReplayable,

    #[error("access token is not a valid header value")]
    InvalidToken,

    #[error("invalid request URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("login failed: {0}")]
    Login(#[from] IdentityError),

    #[error(transparent)]
    Session(#[from] SessionStoreError),
}

impl ClientError {
    /// The caller should send the user back to login.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Unauthorized { .. } | ClientError::NotReplayable)
    }

    pub fn refresh_error(&self) -> Option<&RefreshError> {
        match self {
            ClientError::Unauthorized { refresh } => refresh.as_ref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    First,
    Replayed,
}

/// HTTP client for the protected API.
pub struct ApiClient {
    http: Client,
    base_url: Url,
    session: Arc<dyn SessionStore>,
    coordinator: Arc<RefreshCoordinator>,
}

impl ApiClient {
    pub fn new(
        base_url: Url,
        session: Arc<dyn SessionStore>,
        coordinator: Arc<RefreshCoordinator>,
    ) -> Result<Self, ClientError> {
        let http = Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url,
            session,
            coordinator,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Start a request to `path`, relative to the base URL.
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        Ok(self.http.request(method, self.base_url.join(path)?))
    }

    pub async fn get(&self, path: &str) -> Result<Response, ClientError> {
        self.execute(self.request(Method::GET, path)?).await
    }

    pub async fn post_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Response, ClientError> {
        self.execute(self.request(Method::POST, path)?.json(body)).await
    }

    pub async fn execute(&self, builder: RequestBuilder) -> Result<Response, ClientError> {
        self.send(builder.build()?).await
    }

    /// Send `request` with the current access token, refreshing and
    /// replaying once on `401`.
    pub async fn send(&self, request: Request) -> Result<Response, ClientError> {
        let id = RequestId::new();
        let mut replay = request.try_clone();
        let mut next = request;
        let mut token = self.session.get().map(|tokens| tokens.access_token);
        let mut attempt = Attempt::First;

        loop {
            let outbound = with_bearer(next, token.as_deref())?;
            let method = outbound.method().clone();
            let url = outbound.url().clone();
            let response = self.http.execute(outbound).await?;

            if response.status() != StatusCode::UNAUTHORIZED {
                return Ok(response);
            }

            match attempt {
                Attempt::Replayed => {
                    warn!(request = %id, %method, %url, "request rejected again after refresh");
                    return Err(ClientError::Unauthorized { refresh: None });
                }
                Attempt::First => {
                    debug!(request = %id, %method, %url, "request unauthorized, refreshing session");
                    let refreshed = self
                        .coordinator
                        .refresh(id, token.as_deref())
                        .await
                        .map_err(|e| ClientError::Unauthorized { refresh: Some(e) })?;
                    next = replay.take().ok_or(ClientError::NotReplayable)?;
                    token = Some(refreshed);
                    attempt = Attempt::Replayed;
                }
            }
        }
    }
}

fn with_bearer(mut request: Request, token: Option<&str>) -> Result<Request, ClientError> {
    match token {
        Some(token) => {
            let value =
                HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| ClientError::InvalidToken)?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        None => {
            request.headers_mut().remove(AUTHORIZATION);
        }
    }
    Ok(request)
}
