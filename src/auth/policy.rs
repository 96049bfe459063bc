// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Declarative route policies.
//!
//! Each policy names a route family and the roles allowed to call it. The
//! table is plain data so it can be listed, documented and loaded from JSON.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::roles::{Role, RoleRequirement};

/// Policy guarding the signing key administration routes.
pub const KEYS_MANAGE: &str = "keys.manage";

/// A named role requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RoutePolicy {
    /// Policy name, e.g. `products.write`
    pub name: String,
    /// What the guarded routes do
    #[serde(default)]
    pub description: String,
    pub requirement: RoleRequirement,
}

impl RoutePolicy {
    pub fn new(name: &str, description: &str, requirement: RoleRequirement) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            requirement,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("policy document is invalid: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("policy {0} is declared more than once")]
    Duplicate(String),
}

/// The set of declared policies.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    policies: Vec<RoutePolicy>,
}

impl PolicyTable {
    pub fn new(policies: Vec<RoutePolicy>) -> Result<Self, PolicyError> {
        let mut seen = HashSet::new();
        for policy in &policies {
            if !seen.insert(policy.name.as_str()) {
                return Err(PolicyError::Duplicate(policy.name.clone()));
            }
        }
        Ok(Self { policies })
    }

    /// Load a JSON array of policies.
    pub fn from_json(document: &str) -> Result<Self, PolicyError> {
        Self::new(serde_json::from_str(document)?)
    }

    /// Built-in policies for the inventory API.
    pub fn standard() -> Self {
        use Role::*;

        Self {
            policies: vec![
                RoutePolicy::new(
                    "products.read",
                    "List and view products",
                    RoleRequirement::any_of([Admin, Manager, Employee]),
                ),
                RoutePolicy::new(
                    "products.write",
                    "Create and update products",
                    RoleRequirement::any_of([Admin, Manager]),
                ),
                RoutePolicy::new(
                    "products.delete",
                    "Delete products",
                    RoleRequirement::Single(Admin),
                ),
                RoutePolicy::new(
                    "transactions.read",
                    "View sales transactions",
                    RoleRequirement::any_of([Admin, Manager]),
                ),
                RoutePolicy::new(
                    "transactions.write",
                    "Record sales transactions",
                    RoleRequirement::any_of([Admin, Manager, Employee]),
                ),
                RoutePolicy::new("users.manage", "Manage user accounts", RoleRequirement::Single(Admin)),
                RoutePolicy::new(
                    KEYS_MANAGE,
                    "Inspect and reset the signing key cache",
                    RoleRequirement::Single(Admin),
                ),
            ],
        }
    }

    pub fn get(&self, name: &str) -> Option<&RoutePolicy> {
        self.policies.iter().find(|policy| policy.name == name)
    }

    pub fn all(&self) -> &[RoutePolicy] {
        &self.policies
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::standard()
    }
}
