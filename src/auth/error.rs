// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication and authorization errors.
//!
//! The variants keep the precise failure reason for logs. The HTTP response
//! deliberately collapses every token verification failure into a single
//! `invalid_token` code, and both role failures into `insufficient_permissions`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Authentication error type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No authorization header present
    #[error("Authorization header is required")]
    MissingAuthHeader,
    /// Header is not exactly `Bearer <token>`
    #[error("Invalid authorization header format (expected 'Bearer <token>')")]
    InvalidAuthHeader,
    /// Token or its header could not be parsed, or a required claim is missing
    #[error("Token is malformed: {0}")]
    Malformed(String),
    /// Header declares an algorithm other than the allow-listed one
    #[error("Token algorithm {0} is not allowed")]
    DisallowedAlgorithm(String),
    /// Signing key could not be resolved
    #[error("No signing key available for kid {kid}")]
    UnknownKey { kid: String },
    /// Token signature is invalid
    #[error("Token signature is invalid")]
    SignatureInvalid,
    /// Token has expired
    #[error("Token has expired")]
    Expired,
    /// Token `nbf` lies in the future
    #[error("Token is not yet valid")]
    NotYetValid,
    /// Issuer or audience did not match the configured values
    #[error("Token {claim} does not match the expected value")]
    IssuerMismatch { claim: &'static str },
    /// Verified token carries no role claim
    #[error("Token carries no role")]
    NoRole,
    /// Role is present but not acceptable for the route
    #[error("Role {role} is not permitted for this operation")]
    RoleMismatch { role: String },
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Precise reason, for logs and metrics.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::Malformed(_) => "malformed_token",
            AuthError::DisallowedAlgorithm(_) => "disallowed_algorithm",
            AuthError::UnknownKey { .. } => "unknown_key",
            AuthError::SignatureInvalid => "invalid_signature",
            AuthError::Expired => "token_expired",
            AuthError::NotYetValid => "token_not_yet_valid",
            AuthError::IssuerMismatch { .. } => "issuer_mismatch",
            AuthError::NoRole => "no_role",
            AuthError::RoleMismatch { .. } => "role_mismatch",
        }
    }

    /// Whether this is a token verification failure (as opposed to a header
    /// or role problem).
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            AuthError::Malformed(_)
                | AuthError::DisallowedAlgorithm(_)
                | AuthError::UnknownKey { .. }
                | AuthError::SignatureInvalid
                | AuthError::Expired
                | AuthError::NotYetValid
                | AuthError::IssuerMismatch { .. }
        )
    }

    /// Code exposed to callers. Verification reasons are not disclosed.
    pub fn public_code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::NoRole | AuthError::RoleMismatch { .. } => "insufficient_permissions",
            _ => "invalid_token",
        }
    }

    fn public_message(&self) -> String {
        match self {
            AuthError::MissingAuthHeader | AuthError::InvalidAuthHeader => self.to_string(),
            AuthError::NoRole | AuthError::RoleMismatch { .. } => {
                "Insufficient permissions for this operation".to_string()
            }
            _ => "Token is invalid or expired".to_string(),
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::NoRole | AuthError::RoleMismatch { .. } => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.public_message(),
            error_code: self.public_code().to_string(),
        });
        (status, body).into_response()
    }
}
