//! Scope sets and the narrowing policy
//!
//! A scope string is parsed into an ordered, duplicate-free set; canonical
//! order (first occurrence wins) is preserved through intersection and
//! serialization so `scope` echoes back in the order the client sent it.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{OAuthError, OAuthResult};

/// How requested scopes outside the client allowlist are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScopePolicy {
    /// Any scope outside `client.scopes` fails with `invalid_scope`
    #[default]
    Strict,
    /// Silently narrow to `requested ∩ client.scopes`
    Permissive,
}

/// An ordered distinct set of scope tokens.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScopeSet {
    entries: Vec<String>,
}

/// RFC 6749 scope-token charset: `%x21 / %x23-5B / %x5D-7E`.
fn valid_scope_char(c: char) -> bool {
    matches!(c, '\x21' | '\x23'..='\x5b' | '\x5d'..='\x7e')
}

impl ScopeSet {
    /// Parse a space-separated scope string, deduplicating while keeping
    /// first-occurrence order.
    pub fn parse(input: &str) -> OAuthResult<Self> {
        let mut entries: Vec<String> = Vec::new();
        for token in input.split(' ').filter(|t| !t.is_empty()) {
            if !token.chars().all(valid_scope_char) {
                return Err(OAuthError::invalid_scope(format!(
                    "Scope token \"{token}\" contains characters outside the allowed set."
                )));
            }
            if !entries.iter().any(|e| e == token) {
                entries.push(token.to_string());
            }
        }
        Ok(Self { entries })
    }

    /// Build from pre-validated tokens (registration, configuration).
    #[must_use]
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut entries: Vec<String> = Vec::new();
        for token in tokens {
            let token = token.into();
            if !token.is_empty() && !entries.iter().any(|e| *e == token) {
                entries.push(token);
            }
        }
        Self { entries }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn contains(&self, token: &str) -> bool {
        self.entries.iter().any(|e| e == token)
    }

    /// `true` when every token of `other` is present.
    #[must_use]
    pub fn contains_all(&self, other: &ScopeSet) -> bool {
        other.entries.iter().all(|t| self.contains(t))
    }

    /// Whether the `openid` scope is present (OIDC request marker).
    #[must_use]
    pub fn has_openid(&self) -> bool {
        self.contains("openid")
    }

    /// `self ∩ other`, keeping the order of `self`.
    #[must_use]
    pub fn intersect(&self, other: &ScopeSet) -> ScopeSet {
        ScopeSet {
            entries: self
                .entries
                .iter()
                .filter(|t| other.contains(t))
                .cloned()
                .collect(),
        }
    }

    /// Tokens of `self` missing from `other`.
    #[must_use]
    pub fn difference(&self, other: &ScopeSet) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|t| !other.contains(t))
            .map(String::as_str)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// Apply the narrowing policy against a client allowlist.
    ///
    /// Strict: any token outside `allowed` is `invalid_scope`.
    /// Permissive: the result is silently narrowed.
    pub fn allowed_for(&self, allowed: &ScopeSet, policy: ScopePolicy) -> OAuthResult<ScopeSet> {
        match policy {
            ScopePolicy::Strict => {
                let rejected = self.difference(allowed);
                if rejected.is_empty() {
                    Ok(self.clone())
                } else {
                    Err(OAuthError::invalid_scope(format!(
                        "Scope \"{}\" is not allowed for this client.",
                        rejected.join(" ")
                    )))
                }
            }
            ScopePolicy::Permissive => Ok(self.intersect(allowed)),
        }
    }
}

impl std::fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.entries.join(" "))
    }
}

impl<S: Into<String>> FromIterator<S> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::from_tokens(iter)
    }
}

impl Serialize for ScopeSet {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ScopeSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ScopeSet::parse(&raw).map_err(serde::de::Error::custom)
    }
}
