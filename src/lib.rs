// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! authgate - Bearer Token Verification & Client Session Lifecycle
//!
//! Server side, requests carry RS256 access tokens issued by an external
//! identity provider; they are verified against the provider's rotating key
//! set and checked against role-based route policies. Client side, a session
//! store and HTTP client keep the access token fresh, with at most one
//! refresh in flight however many requests fail at once.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum): forward-auth, identity, health
//! - `auth` - Key resolution, token verification, authorization
//! - `client` - Session store, refresh coordinator, request interceptor
//! - `config` - Environment configuration

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod state;

#[cfg(test)]
pub(crate) mod testutil;
