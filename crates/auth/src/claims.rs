//! Validated claim sets (transport-agnostic).
//!
//! A `ClaimSet` is what credential verification hands back: an ordered list of
//! `(name, value)` pairs. Multi-valued JSON claims become repeated entries.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Well-known claim names probed by the principal resolver.
pub mod names {
    /// Okta user id.
    pub const OKTA_UID: &str = "uid";
    pub const SUBJECT: &str = "sub";
    /// Microsoft object id (short form).
    pub const OBJECT_ID: &str = "oid";
    pub const OBJECT_ID_URI: &str = "http://schemas.microsoft.com/identity/claims/objectidentifier";
    pub const NAME_IDENTIFIER: &str =
        "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/nameidentifier";
    pub const EMAIL: &str = "email";
    pub const EMAIL_URI: &str = "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/emailaddress";
    pub const NAME: &str = "name";
    pub const PREFERRED_USERNAME: &str = "preferred_username";
    pub const ISSUER: &str = "iss";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimSet {
    entries: Vec<(String, String)>,
}

impl ClaimSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Flatten a decoded JWT payload. Keys come out in `serde_json::Map`
    /// iteration order, not payload order; values of one array keep their
    /// order. Nested objects are kept as compact JSON text.
    pub fn from_json(payload: &JsonValue) -> Self {
        let mut set = Self::new();
        if let JsonValue::Object(map) = payload {
            for (name, value) in map {
                match value {
                    JsonValue::Array(items) => {
                        for item in items {
                            if let Some(v) = scalar_text(item) {
                                set.push(name.clone(), v);
                            }
                        }
                    }
                    other => {
                        if let Some(v) = scalar_text(other) {
                            set.push(name.clone(), v);
                        }
                    }
                }
            }
        }
        set
    }

    /// First value recorded under `name`, if any.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Distinct claim names, in first-seen order. Values are never exposed here
    /// so the list is safe to log.
    pub fn names(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for (n, _) in &self.entries {
            if !out.iter().any(|seen| seen == n) {
                out.push(n.clone());
            }
        }
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn scalar_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}
