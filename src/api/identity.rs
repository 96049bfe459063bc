// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Caller identity and forward-auth endpoints.
//!
//! A reverse proxy can call `GET /v1/authorize/{policy}` with the original
//! request's `Authorization` header and forward the request only on 200.
//! The verified identity is returned in the body and in `x-auth-*` headers.

use axum::{
    extract::{Path, State},
    http::{HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    auth::{authorize, Access, RoutePolicy, VerifiedClaims},
    error::{ApiError, ErrorBody},
    state::AppState,
};

pub const SUBJECT_HEADER: HeaderName = HeaderName::from_static("x-auth-subject");
pub const ROLE_HEADER: HeaderName = HeaderName::from_static("x-auth-role");
pub const EMPLOYEE_ID_HEADER: HeaderName = HeaderName::from_static("x-auth-employee-id");

/// The verified caller.
#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    /// Token subject (user id).
    pub subject: String,
    /// Role claim, verbatim.
    pub role: Option<String>,
    pub employee_id: Option<String>,
    pub issuer: String,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl From<VerifiedClaims> for MeResponse {
    fn from(claims: VerifiedClaims) -> Self {
        Self {
            subject: claims.subject,
            role: claims.role,
            employee_id: claims.employee_id,
            issuer: claims.issuer,
            issued_at: claims.issued_at,
            expires_at: claims.expires_at,
        }
    }
}

/// Outcome of a successful policy check.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthorizeResponse {
    pub policy: String,
    pub subject: String,
    /// The role that satisfied the policy.
    pub role: String,
    pub employee_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PolicyListResponse {
    pub policies: Vec<RoutePolicy>,
}

/// Return the verified identity of the caller.
#[utoipa::path(
    get,
    path = "/v1/me",
    tag = "Identity",
    responses(
        (status = 200, description = "Verified caller", body = MeResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn me(Access(claims): Access) -> Json<MeResponse> {
    Json(claims.into())
}

/// Evaluate a named policy for the caller.
#[utoipa::path(
    get,
    path = "/v1/authorize/{policy}",
    tag = "Identity",
    params(("policy" = String, Path, description = "Policy name, e.g. products.write")),
    responses(
        (status = 200, description = "Caller satisfies the policy", body = AuthorizeResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 403, description = "Role does not satisfy the policy", body = ErrorBody),
        (status = 404, description = "Unknown policy", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn authorize_policy(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Access(claims): Access,
) -> Response {
    let Some(policy) = state.policies.get(&name) else {
        return ApiError::not_found(format!("Unknown policy {name}")).into_response();
    };

    let role = match authorize(&claims, &policy.requirement) {
        Ok(role) => role,
        Err(e) => {
            tracing::warn!(
                subject = %claims.subject,
                policy = %policy.name,
                reason = e.error_code(),
                "policy denied"
            );
            return e.into_response();
        }
    };

    tracing::debug!(subject = %claims.subject, policy = %policy.name, %role, "policy allowed");

    let mut headers = vec![
        (SUBJECT_HEADER, header_value(&claims.subject)),
        (ROLE_HEADER, header_value(role.as_str())),
    ];
    if let Some(ref employee_id) = claims.employee_id {
        headers.push((EMPLOYEE_ID_HEADER, header_value(employee_id)));
    }

    let body = Json(AuthorizeResponse {
        policy: policy.name.clone(),
        subject: claims.subject.clone(),
        role: role.to_string(),
        employee_id: claims.employee_id.clone(),
    });

    let mut response = body.into_response();
    for (name, value) in headers.into_iter().filter_map(|(n, v)| v.map(|v| (n, v))) {
        response.headers_mut().insert(name, value);
    }
    response
}

/// Claim values that are not valid header text are left out of the headers.
fn header_value(value: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(value).ok()
}

/// List the declared policies.
#[utoipa::path(
    get,
    path = "/v1/policies",
    tag = "Identity",
    responses(
        (status = 200, description = "Declared policies", body = PolicyListResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_policies(State(state): State<AppState>, Access(_claims): Access) -> Json<PolicyListResponse> {
    Json(PolicyListResponse {
        policies: state.policies.all().to_vec(),
    })
}
