//! Deterministic keys for the external query cache.

use candid::Principal;
use serde_json::Value;
use std::fmt;

///
/// RequestKey
///
/// Identifies one query by canister, method and display-shaped arguments.
/// Narrower constructors leave trailing components unset, which makes the
/// key a prefix pattern for [`RequestKey::covers`]-based invalidation.
///

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RequestKey {
    canister: String,
    method: Option<String>,
    args: Option<String>,
}

impl RequestKey {
    /// Pattern covering every method of `canister_id`.
    #[must_use]
    pub fn canister(canister_id: &Principal) -> Self {
        Self {
            canister: canister_id.to_text(),
            method: None,
            args: None,
        }
    }

    /// Pattern covering every argument list of one method.
    #[must_use]
    pub fn method(canister_id: &Principal, method: impl Into<String>) -> Self {
        Self {
            canister: canister_id.to_text(),
            method: Some(method.into()),
            args: None,
        }
    }

    /// Exact key for one call. Arguments are fingerprinted through their
    /// compact JSON form; display values keep big integers as strings, so
    /// the fingerprint is total.
    #[must_use]
    pub fn call(canister_id: &Principal, method: impl Into<String>, args: &[Value]) -> Self {
        Self {
            canister: canister_id.to_text(),
            method: Some(method.into()),
            args: Some(Value::Array(args.to_vec()).to_string()),
        }
    }

    /// Whether `self`, read as a prefix pattern, covers `other`.
    #[must_use]
    pub fn covers(&self, other: &Self) -> bool {
        self.canister == other.canister
            && component_covers(self.method.as_deref(), other.method.as_deref())
            && component_covers(self.args.as_deref(), other.args.as_deref())
    }

    #[must_use]
    pub fn canister_text(&self) -> &str {
        &self.canister
    }

    #[must_use]
    pub fn method_name(&self) -> Option<&str> {
        self.method.as_deref()
    }

    #[must_use]
    pub fn args_fingerprint(&self) -> Option<&str> {
        self.args.as_deref()
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canister)?;
        if let Some(method) = &self.method {
            write!(f, "::{method}")?;
        }
        if let Some(args) = &self.args {
            write!(f, "{args}")?;
        }
        Ok(())
    }
}

fn component_covers(pattern: Option<&str>, actual: Option<&str>) -> bool {
    pattern.is_none_or(|pattern| actual == Some(pattern))
}

///
/// TESTS
///
