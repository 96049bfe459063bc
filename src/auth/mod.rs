// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Server-side verification of bearer tokens issued by the identity provider,
//! and role-based authorization of the verified caller.
//!
//! ## Auth Flow
//!
//! 1. Client sends `Authorization: Bearer <access token>`
//! 2. Server:
//!    - Rejects anything but RS256 before touching key material
//!    - Resolves the signing key by `kid` (cached JWKS, fetched on miss)
//!    - Verifies signature, expiry, issuer, audience
//!    - Extracts:
//!      - `sub` → subject
//!      - role claim and employee id claim (configurable names)
//! 3. Route policy decides whether the role may proceed
//!
//! ## Security
//!
//! - Verification failures share one public error code; logs keep the reason
//! - Symmetric algorithms and `none` are never accepted
//! - A failed JWKS fetch never evicts already cached keys

pub mod claims;
pub mod error;
pub mod gate;
pub mod keys;
pub mod policy;
pub mod roles;
pub mod verifier;

pub use claims::{ClaimNames, VerifiedClaims};
pub use error::AuthError;
pub use gate::{authenticate, authorize, bearer_token, enforce, Access};
pub use keys::{HttpKeySource, KeyResolver, KeySource, SigningKey};
pub use policy::{PolicyTable, RoutePolicy};
pub use roles::{Role, RoleRequirement};
pub use verifier::{TokenVerifier, VerifierSettings};
