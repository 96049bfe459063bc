// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User roles and role requirements.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// User roles for authorization.
///
/// - `Admin` - Store administration, user and key management
/// - `Manager` - Catalogue and transaction management
/// - `Employee` - Day-to-day sales and stock lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Employee,
}

impl Role {
    /// Every role, in declaration order.
    pub const ALL: [Role; 3] = [Role::Admin, Role::Manager, Role::Employee];

    /// Parse a role claim. Only the exact lowercase names are recognised.
    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "admin" => Some(Role::Admin),
            "manager" => Some(Role::Manager),
            "employee" => Some(Role::Employee),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Employee => "employee",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Roles a route accepts.
///
/// Serializes as `{"role": "admin"}` or `{"any_of": ["admin", "manager"]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoleRequirement {
    /// Exactly this role
    #[serde(rename = "role")]
    Single(Role),
    /// Any role in the set
    AnyOf(Vec<Role>),
}

impl RoleRequirement {
    pub fn any_of(roles: impl IntoIterator<Item = Role>) -> Self {
        RoleRequirement::AnyOf(roles.into_iter().collect())
    }

    /// Whether `role` satisfies this requirement.
    pub fn admits(&self, role: Role) -> bool {
        match self {
            RoleRequirement::Single(required) => *required == role,
            RoleRequirement::AnyOf(accepted) => accepted.contains(&role),
        }
    }

    /// Roles this requirement accepts.
    pub fn accepted(&self) -> Vec<Role> {
        Role::ALL.into_iter().filter(|role| self.admits(*role)).collect()
    }
}
