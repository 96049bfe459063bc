// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::{KeyResolver, PolicyTable, TokenVerifier};

#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<TokenVerifier>,
    pub policies: Arc<PolicyTable>,
}

impl AppState {
    pub fn new(verifier: TokenVerifier, policies: PolicyTable) -> Self {
        Self {
            verifier: Arc::new(verifier),
            policies: Arc::new(policies),
        }
    }

    pub fn keys(&self) -> &Arc<KeyResolver> {
        self.verifier.keys()
    }
}
