// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request authentication and role checks for Axum.
//!
//! Use the `Access` extractor in handlers that only need a verified caller:
//!
//! ```rust,ignore
//! async fn my_handler(Access(claims): Access) -> impl IntoResponse {
//!     // claims is VerifiedClaims
//! }
//! ```
//!
//! Route groups guarded by a role requirement stack two middlewares:
//! `authenticate` (verifies and stores the claims in request extensions)
//! and `enforce` (checks the requirement against those claims).

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::{AuthError, Role, RoleRequirement, TokenVerifier, VerifiedClaims};
use crate::state::AppState;

/// Extract the token from `Authorization: Bearer <token>`.
///
/// The header must be exactly two space-separated parts, the first being
/// `Bearer`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Ok(token),
        _ => Err(AuthError::InvalidAuthHeader),
    }
}

/// Decide whether `claims` satisfy `requirement`.
///
/// Returns the caller's role on success. Stateless: evaluate on every request.
pub fn authorize(claims: &VerifiedClaims, requirement: &RoleRequirement) -> Result<Role, AuthError> {
    let raw = claims.role.as_deref().ok_or(AuthError::NoRole)?;
    let role = Role::parse(raw).ok_or_else(|| AuthError::RoleMismatch {
        role: raw.to_string(),
    })?;

    if requirement.admits(role) {
        Ok(role)
    } else {
        Err(AuthError::RoleMismatch {
            role: role.to_string(),
        })
    }
}

/// Verify the bearer token carried by `headers`.
pub async fn verify_headers(
    headers: &HeaderMap,
    verifier: &TokenVerifier,
) -> Result<VerifiedClaims, AuthError> {
    let result = match bearer_token(headers) {
        Ok(token) => verifier.verify(token).await,
        Err(e) => Err(e),
    };

    if let Err(ref e) = result {
        tracing::warn!(reason = e.error_code(), error = %e, "request authentication failed");
    }
    result
}

/// Extractor for a verified caller.
pub struct Access(pub VerifiedClaims);

impl FromRequestParts<AppState> for Access {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        // Reuse the claims if `authenticate` already ran.
        if let Some(claims) = parts.extensions.get::<VerifiedClaims>().cloned() {
            return Ok(Access(claims));
        }

        let claims = verify_headers(&parts.headers, &state.verifier).await?;
        Ok(Access(claims))
    }
}

/// Authentication middleware: verifies the bearer token and stores the
/// claims in request extensions.
pub async fn authenticate(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    match verify_headers(request.headers(), &state.verifier).await {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Role middleware. Must run after [`authenticate`].
///
/// ```rust,ignore
/// let requirement = RoleRequirement::Single(Role::Admin);
/// router.route_layer(axum::middleware::from_fn(move |req, next| {
///     enforce(requirement.clone(), req, next)
/// }))
/// ```
pub async fn enforce(requirement: RoleRequirement, request: Request, next: Next) -> Response {
    let Some(claims) = request.extensions().get::<VerifiedClaims>() else {
        return AuthError::MissingAuthHeader.into_response();
    };

    match authorize(claims, &requirement) {
        Ok(role) => {
            tracing::debug!(subject = %claims.subject, %role, "request authorized");
            next.run(request).await
        }
        Err(e) => {
            tracing::warn!(
                subject = %claims.subject,
                reason = e.error_code(),
                error = %e,
                "request forbidden"
            );
            e.into_response()
        }
    }
}
