use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest localpart or domainpart accepted, in bytes.
const MAX_PART_LEN: usize = 1023;

/// Characters that may never appear in a localpart.
const LOCALPART_FORBIDDEN: &[char] = &['"', '&', '\'', '/', ':', '<', '>', '@'];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("identity is empty")]
    Empty,

    #[error("identity '{0}' has no domain")]
    MissingDomain(String),

    #[error("invalid localpart '{0}'")]
    InvalidLocalpart(String),

    #[error("invalid domain '{0}'")]
    InvalidDomain(String),
}

/// A bare network address of the form `localpart@domain`.
///
/// Both parts are lowercased on construction so that two spellings of the
/// same address compare equal. Resources (`/...`) are not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity {
    local: String,
    domain: String,
}

impl Identity {
    pub fn new(local: &str, domain: &str) -> Result<Self, IdentityError> {
        let local = local.trim().to_lowercase();
        let domain = domain.trim().to_lowercase();

        if local.is_empty()
            || local.len() > MAX_PART_LEN
            || local
                .chars()
                .any(|c| c.is_whitespace() || c.is_control() || LOCALPART_FORBIDDEN.contains(&c))
        {
            return Err(IdentityError::InvalidLocalpart(local));
        }

        if domain.is_empty()
            || domain.len() > MAX_PART_LEN
            || domain.starts_with('.')
            || domain.ends_with('.')
            || domain.contains("..")
            || domain
                .chars()
                .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '@' | '/' | '<' | '>' | '"' | '\''))
        {
            return Err(IdentityError::InvalidDomain(domain));
        }

        Ok(Self { local, domain })
    }

    /// Full identity for a verified username on the configured domain.
    pub fn from_username(username: &str, domain: &str) -> Result<Self, IdentityError> {
        Self::new(username, domain)
    }

    pub fn local(&self) -> &str {
        &self.local
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }
}

impl FromStr for Identity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(IdentityError::Empty);
        }
        let (local, domain) = s
            .split_once('@')
            .ok_or_else(|| IdentityError::MissingDomain(s.to_string()))?;
        Self::new(local, domain)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

impl TryFrom<String> for Identity {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_identity() {
        let id: Identity = "bob@example.com".parse().unwrap();
        assert_eq!(id.local(), "bob");
        assert_eq!(id.domain(), "example.com");
        assert_eq!(id.to_string(), "bob@example.com");
    }

    #[test]
    fn normalizes_case() {
        let a: Identity = "Bob@Example.COM".parse().unwrap();
        let b = Identity::from_username("bob", "example.com").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_missing_domain() {
        assert_eq!(
            "bob".parse::<Identity>(),
            Err(IdentityError::MissingDomain("bob".into()))
        );
        assert!(matches!("bob@".parse::<Identity>(), Err(IdentityError::InvalidDomain(_))));
    }

    #[test]
    fn rejects_empty() {
        assert_eq!("  ".parse::<Identity>(), Err(IdentityError::Empty));
    }

    #[test]
    fn rejects_forbidden_localpart_chars() {
        assert!("a b@example.com".parse::<Identity>().is_err());
        assert!("a<b@example.com".parse::<Identity>().is_err());
        assert!("a@b@example.com".parse::<Identity>().is_err());
        assert!(Identity::from_username("", "example.com").is_err());
    }

    #[test]
    fn rejects_resource() {
        assert!("bob@example.com/phone".parse::<Identity>().is_err());
    }

    #[test]
    fn serde_uses_string_form() {
        let id: Identity = "alice@example.com".parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"alice@example.com\"");
        let back: Identity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<Identity>("\"nope\"").is_err());
    }
}
