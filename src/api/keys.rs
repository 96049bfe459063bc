// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signing key cache administration. Routed behind the `keys.manage` policy.

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    auth::Access,
    error::{ApiError, ErrorBody},
    state::AppState,
};

/// Snapshot of the signing key cache.
#[derive(Debug, Serialize, ToSchema)]
pub struct KeyCacheResponse {
    /// Cached key ids, sorted.
    pub key_ids: Vec<String>,
}

#[utoipa::path(
    get,
    path = "/v1/admin/keys",
    tag = "Admin",
    responses(
        (status = 200, description = "Cached signing keys", body = KeyCacheResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 403, description = "Admin role required", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_keys(State(state): State<AppState>) -> Json<KeyCacheResponse> {
    Json(KeyCacheResponse {
        key_ids: state.keys().cached_key_ids().await,
    })
}

/// Fetch the key set again and replace the cache with it. A failed fetch
/// leaves the cache as it was.
#[utoipa::path(
    post,
    path = "/v1/admin/keys/reload",
    tag = "Admin",
    responses(
        (status = 200, description = "Key set reloaded", body = KeyCacheResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 403, description = "Admin role required", body = ErrorBody),
        (status = 502, description = "Key set endpoint unavailable", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn reload_keys(
    State(state): State<AppState>,
    Access(claims): Access,
) -> Result<Json<KeyCacheResponse>, ApiError> {
    tracing::info!(subject = %claims.subject, "signing key cache reload requested");
    state.keys().reload().await?;
    Ok(Json(KeyCacheResponse {
        key_ids: state.keys().cached_key_ids().await,
    }))
}
