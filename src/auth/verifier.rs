// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Access token verification.
//!
//! ## Order of checks
//!
//! 1. Header is decoded without touching the signature (`Malformed`)
//! 2. Algorithm must be RS256 (`DisallowedAlgorithm`); no key lookup before this
//! 3. Key is resolved by `kid` (`UnknownKey`)
//! 4. Signature is verified (`SignatureInvalid`)
//! 5. `exp`/`nbf` (`Expired`/`NotYetValid`), then `iss`/`aud` (`IssuerMismatch`)

use std::sync::Arc;

use jsonwebtoken::{decode, decode_header, errors::ErrorKind, Algorithm, Validation};
use serde_json::{Map, Value};

use super::claims::{ClaimNames, VerifiedClaims};
use super::keys::KeyResolver;
use super::AuthError;

/// The only accepted signing algorithm.
pub const ALLOWED_ALGORITHM: Algorithm = Algorithm::RS256;

/// Expected issuer/audience and claim layout.
#[derive(Debug, Clone)]
pub struct VerifierSettings {
    pub issuer: String,
    pub audience: String,
    /// Clock skew tolerance for `exp`/`nbf`, in seconds
    pub leeway_secs: u64,
    pub claim_names: ClaimNames,
}

impl VerifierSettings {
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            leeway_secs: 0,
            claim_names: ClaimNames::default(),
        }
    }

    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway_secs = leeway_secs;
        self
    }

    pub fn with_claim_names(mut self, claim_names: ClaimNames) -> Self {
        self.claim_names = claim_names;
        self
    }
}

/// Verifies bearer tokens against keys from a [`KeyResolver`].
pub struct TokenVerifier {
    keys: Arc<KeyResolver>,
    settings: VerifierSettings,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(keys: Arc<KeyResolver>, settings: VerifierSettings) -> Self {
        let mut validation = Validation::new(ALLOWED_ALGORITHM);
        validation.leeway = settings.leeway_secs;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_issuer(&[&settings.issuer]);
        validation.set_audience(&[&settings.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        Self {
            keys,
            settings,
            validation,
        }
    }

    pub fn keys(&self) -> &Arc<KeyResolver> {
        &self.keys
    }

    pub fn settings(&self) -> &VerifierSettings {
        &self.settings
    }

    /// Verify `token` and return its normalized claims.
    pub async fn verify(&self, token: &str) -> Result<VerifiedClaims, AuthError> {
        let header =
            decode_header(token).map_err(|e| AuthError::Malformed(format!("header: {e}")))?;

        if header.alg != ALLOWED_ALGORITHM {
            return Err(AuthError::DisallowedAlgorithm(format!("{:?}", header.alg)));
        }

        let kid = header
            .kid
            .filter(|kid| !kid.is_empty())
            .ok_or_else(|| AuthError::Malformed("header has no kid".into()))?;

        let key = self.keys.resolve(&kid).await.map_err(|e| {
            tracing::debug!(error = %e, "signing key resolution failed");
            AuthError::UnknownKey { kid: kid.clone() }
        })?;

        let data = decode::<Map<String, Value>>(token, key.material(), &self.validation)
            .map_err(|e| map_jwt_error(e.kind()))?;

        VerifiedClaims::from_raw(data.claims, &self.settings.claim_names, &self.settings.audience)
    }
}

fn map_jwt_error(kind: &ErrorKind) -> AuthError {
    match kind {
        ErrorKind::InvalidSignature => AuthError::SignatureInvalid,
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::ImmatureSignature => AuthError::NotYetValid,
        ErrorKind::InvalidIssuer => AuthError::IssuerMismatch { claim: "iss" },
        ErrorKind::InvalidAudience => AuthError::IssuerMismatch { claim: "aud" },
        ErrorKind::InvalidAlgorithm => AuthError::DisallowedAlgorithm("mismatched key".into()),
        ErrorKind::MissingRequiredClaim(claim) => {
            AuthError::Malformed(format!("missing claim {claim}"))
        }
        other => AuthError::Malformed(format!("{other:?}")),
    }
}
