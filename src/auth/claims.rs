// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Verified token claims.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use super::AuthError;

/// Default name of the custom role claim.
pub const DEFAULT_ROLE_CLAIM: &str = "custom:role";

/// Default name of the custom employee identifier claim.
pub const DEFAULT_EMPLOYEE_ID_CLAIM: &str = "custom:employee_id";

/// Names of the issuer-specific custom claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimNames {
    pub role: String,
    pub employee_id: String,
}

impl Default for ClaimNames {
    fn default() -> Self {
        Self {
            role: DEFAULT_ROLE_CLAIM.to_string(),
            employee_id: DEFAULT_EMPLOYEE_ID_CLAIM.to_string(),
        }
    }
}

/// Claims of a token whose signature, expiry, issuer and audience have been
/// checked. Lives for one request.
#[derive(Debug, Clone, Serialize)]
pub struct VerifiedClaims {
    /// Canonical user ID (`sub`)
    pub subject: String,
    /// Raw role claim, if the token carries one
    pub role: Option<String>,
    /// Custom employee identifier, if present
    pub employee_id: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub issuer: String,
    pub audience: String,
    /// Full claim set as received
    #[serde(skip)]
    pub raw_claims: Map<String, Value>,
}

impl VerifiedClaims {
    /// Normalize a raw claim set.
    ///
    /// `expected_audience` picks the matching entry when `aud` is an array.
    pub fn from_raw(
        raw: Map<String, Value>,
        names: &ClaimNames,
        expected_audience: &str,
    ) -> Result<Self, AuthError> {
        let subject = required_str(&raw, "sub")?;
        let issuer = required_str(&raw, "iss")?;
        let expires_at = timestamp(&raw, "exp")?
            .ok_or_else(|| AuthError::Malformed("missing claim exp".into()))?;
        let issued_at = timestamp(&raw, "iat")?;
        let audience = match raw.get("aud") {
            Some(Value::String(aud)) => aud.clone(),
            Some(Value::Array(values)) => values
                .iter()
                .filter_map(Value::as_str)
                .find(|aud| *aud == expected_audience)
                .or_else(|| values.iter().find_map(Value::as_str))
                .map(str::to_string)
                .ok_or_else(|| AuthError::Malformed("empty aud claim".into()))?,
            _ => return Err(AuthError::Malformed("missing claim aud".into())),
        };

        Ok(Self {
            subject,
            role: optional_str(&raw, &names.role),
            employee_id: optional_str(&raw, &names.employee_id),
            issued_at,
            expires_at,
            issuer,
            audience,
            raw_claims: raw,
        })
    }

    /// Look up any claim by name.
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.raw_claims.get(name)
    }
}

fn required_str(raw: &Map<String, Value>, name: &str) -> Result<String, AuthError> {
    raw.get(name)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AuthError::Malformed(format!("missing claim {name}")))
}

/// String claims are taken as-is; numeric identifiers are stringified.
fn optional_str(raw: &Map<String, Value>, name: &str) -> Option<String> {
    match raw.get(name)? {
        Value::String(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    }
}

fn timestamp(raw: &Map<String, Value>, name: &str) -> Result<Option<DateTime<Utc>>, AuthError> {
    let Some(value) = raw.get(name) else {
        return Ok(None);
    };
    let seconds = value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
        .ok_or_else(|| AuthError::Malformed(format!("claim {name} is not a timestamp")))?;
    DateTime::from_timestamp(seconds, 0)
        .map(Some)
        .ok_or_else(|| AuthError::Malformed(format!("claim {name} is out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn sample() -> Map<String, Value> {
        raw(json!({
            "sub": "user_123",
            "iss": "https://issuer.example.com",
            "aud": "inventory-api",
            "iat": 1_700_000_000,
            "exp": 1_700_003_600,
            "custom:role": "admin",
            "custom:employee_id": "E-42"
        }))
    }

    #[test]
    fn from_raw_extracts_fields() {
        let claims = VerifiedClaims::from_raw(sample(), &ClaimNames::default(), "inventory-api").unwrap();
        assert_eq!(claims.subject, "user_123");
        assert_eq!(claims.role.as_deref(), Some("admin"));
        assert_eq!(claims.employee_id.as_deref(), Some("E-42"));
        assert_eq!(claims.expires_at.timestamp(), 1_700_003_600);
        assert_eq!(claims.issued_at.unwrap().timestamp(), 1_700_000_000);
        assert_eq!(claims.audience, "inventory-api");
        assert_eq!(claims.claim("custom:role"), Some(&json!("admin")));
    }

    #[test]
    fn role_claim_name_is_configurable() {
        let mut map = sample();
        map.insert("groups_role".into(), json!("manager"));
        let names = ClaimNames {
            role: "groups_role".into(),
            ..ClaimNames::default()
        };
        let claims = VerifiedClaims::from_raw(map, &names, "inventory-api").unwrap();
        assert_eq!(claims.role.as_deref(), Some("manager"));
    }

    #[test]
    fn blank_role_is_absent() {
        let mut map = sample();
        map.insert("custom:role".into(), json!("  "));
        let claims = VerifiedClaims::from_raw(map, &ClaimNames::default(), "inventory-api").unwrap();
        assert!(claims.role.is_none());
    }

    #[test]
    fn array_audience_picks_expected_entry() {
        let mut map = sample();
        map.insert("aud".into(), json!(["other", "inventory-api"]));
        let claims = VerifiedClaims::from_raw(map, &ClaimNames::default(), "inventory-api").unwrap();
        assert_eq!(claims.audience, "inventory-api");
    }

    #[test]
    fn missing_subject_is_malformed() {
        let mut map = sample();
        map.remove("sub");
        let err = VerifiedClaims::from_raw(map, &ClaimNames::default(), "inventory-api").unwrap_err();
        assert!(matches!(err, AuthError::Malformed(_)));
    }

    #[test]
    fn non_numeric_expiry_is_malformed() {
        let mut map = sample();
        map.insert("exp".into(), json!("tomorrow"));
        let err = VerifiedClaims::from_raw(map, &ClaimNames::default(), "inventory-api").unwrap_err();
        assert!(matches!(err, AuthError::Malformed(_)));
    }
}
