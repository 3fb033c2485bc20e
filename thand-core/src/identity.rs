//! Unified identity subjects
//!
//! An `Identity` is the provider-agnostic subject record produced by
//! synchronization: exactly one of a user or a group, plus the map of
//! provider instances it was observed in. Identities are created by sync
//! and mutated only by replacement, never patched in place.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ProviderKind;

/// A user sourced from a provider catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct User {
    /// Stable provider-side identifier
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    /// Whether the provider has verified this account
    #[serde(default)]
    pub verified: bool,
    /// Provider instance this record came from
    #[serde(default)]
    pub source: String,
    /// Group names or ids this user belongs to
    #[serde(default)]
    pub groups: Vec<String>,
}

impl User {
    /// The key used to correlate this user across providers: email first,
    /// then username, then id, then the snake-cased display name.
    pub fn correlation_key(&self) -> String {
        if !self.email.is_empty() {
            self.email.clone()
        } else if !self.username.is_empty() {
            self.username.clone()
        } else if !self.id.is_empty() {
            self.id.clone()
        } else {
            snake_case(&self.name)
        }
    }

    /// Domain part of the email, if any.
    pub fn email_domain(&self) -> Option<&str> {
        self.email.rsplit_once('@').map(|(_, domain)| domain)
    }
}

/// A group sourced from a provider catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Group {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

/// Whether an identity wraps a user or a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    User,
    Group,
}

/// Unified user-or-group subject.
///
/// Exactly one of `user` / `group` is present; the constructors enforce
/// this, so prefer them over struct literals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Identity {
    /// Stable key, typically an email or group name (lowercased on lookup)
    pub id: String,
    /// Human-readable label
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<Group>,
    /// Provider-instance-name -> provider kind this subject was seen in
    #[serde(default)]
    pub providers: HashMap<String, ProviderKind>,
}

impl Identity {
    /// Wrap a user. The id is the user's correlation key.
    pub fn from_user(user: User) -> Self {
        Self {
            id: user.correlation_key(),
            label: if user.name.is_empty() {
                user.correlation_key()
            } else {
                user.name.clone()
            },
            user: Some(user),
            group: None,
            providers: HashMap::new(),
        }
    }

    /// Wrap a group. The id is the group name, falling back to the id.
    pub fn from_group(group: Group) -> Self {
        let id = if group.name.is_empty() {
            group.id.clone()
        } else {
            group.name.clone()
        };
        Self {
            id: id.clone(),
            label: id,
            user: None,
            group: Some(group),
            providers: HashMap::new(),
        }
    }

    /// Record the provider instance this identity was observed in.
    pub fn with_provider(mut self, name: impl Into<String>, kind: ProviderKind) -> Self {
        self.providers.insert(name.into(), kind);
        self
    }

    pub fn kind(&self) -> IdentityKind {
        if self.user.is_some() {
            IdentityKind::User
        } else {
            IdentityKind::Group
        }
    }

    /// Every lowercased key this identity is reachable under: id, label,
    /// user email, group name, and group email.
    pub fn index_keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(4);
        let mut push = |key: &str| {
            if !key.is_empty() {
                let key = key.to_lowercase();
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        };
        push(&self.id);
        push(&self.label);
        if let Some(user) = &self.user {
            push(&user.email);
        }
        if let Some(group) = &self.group {
            push(&group.name);
            push(&group.email);
        }
        keys
    }
}

/// Lowercase and replace whitespace runs with underscores.
pub(crate) fn snake_case(input: &str) -> String {
    input
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: "00u1".to_string(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            name: "Alice Adams".to_string(),
            verified: true,
            source: "okta-prod".to_string(),
            groups: vec!["dev".to_string()],
        }
    }

    #[test]
    fn test_correlation_key_prefers_email() {
        let mut user = sample_user();
        assert_eq!(user.correlation_key(), "alice@example.com");

        user.email.clear();
        assert_eq!(user.correlation_key(), "alice");

        user.username.clear();
        assert_eq!(user.correlation_key(), "00u1");

        user.id.clear();
        assert_eq!(user.correlation_key(), "alice_adams");
    }

    #[test]
    fn test_email_domain() {
        assert_eq!(sample_user().email_domain(), Some("example.com"));
        assert_eq!(User::default().email_domain(), None);
    }

    #[test]
    fn test_identity_exactly_one_variant() {
        let id = Identity::from_user(sample_user());
        assert_eq!(id.kind(), IdentityKind::User);
        assert!(id.user.is_some());
        assert!(id.group.is_none());

        let id = Identity::from_group(Group {
            id: "g1".to_string(),
            name: "Dev".to_string(),
            email: "dev@example.com".to_string(),
        });
        assert_eq!(id.kind(), IdentityKind::Group);
        assert!(id.user.is_none());
    }

    #[test]
    fn test_index_keys_lowercased() {
        let keys = Identity::from_group(Group {
            id: "g1".to_string(),
            name: "Dev Team".to_string(),
            email: "Dev@Example.com".to_string(),
        })
        .index_keys();
        assert!(keys.contains(&"dev team".to_string()));
        assert!(keys.contains(&"dev@example.com".to_string()));
        // id and label collapse into one key after lowercasing
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("Alice  Adams"), "alice_adams");
        assert_eq!(snake_case(" Bob "), "bob");
    }
}
