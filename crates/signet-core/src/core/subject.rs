// crates/signet-core/src/core/subject.rs
// ============================================================================
// Module: Authenticated Subject
// Description: Subject returned by a successful provider flow.
// Purpose: Carry the authenticated identity between providers and token minting.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A [`Subject`] is what a provider hands back after validating a login: a
//! subject type plus an opaque claims bag. The authorization engine embeds
//! both into issued tokens and the account session.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Subject
// ============================================================================

/// Subject category embedded into access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    /// Interactive end user.
    User,
    /// Non-standard subject type supplied by a custom provider.
    #[serde(untagged)]
    Custom(String),
}

impl SubjectType {
    /// Returns the wire label for this subject type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::User => "user",
            Self::Custom(label) => label.as_str(),
        }
    }
}

/// Authenticated subject produced by a provider success hook.
///
/// # Invariants
/// - `properties` is an opaque JSON object; the issuer only inspects
///   well-known keys (`id`, `email`) and otherwise passes it through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Subject category.
    #[serde(rename = "type")]
    pub subject_type: SubjectType,
    /// Opaque claims bag.
    pub properties: Value,
}

impl Subject {
    /// Creates a user subject with the given claims bag.
    #[must_use]
    pub fn user(properties: Value) -> Self {
        Self {
            subject_type: SubjectType::User,
            properties,
        }
    }

    /// Returns the `id` property when present.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.properties.get("id").and_then(Value::as_str)
    }

    /// Returns the `email` property when present.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.properties.get("email").and_then(Value::as_str)
    }
}
