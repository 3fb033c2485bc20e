//! Role templates and request scopes

use serde::{Deserialize, Serialize};

use crate::identity::User;

/// Allow/deny lists for one binding dimension of a role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RoleBindings {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

impl RoleBindings {
    pub fn is_empty(&self) -> bool {
        self.allow.is_empty() && self.deny.is_empty()
    }
}

/// Restricts who may request a role. Matching is case-insensitive and a
/// user is admitted by satisfying at least one populated section; empty
/// scopes admit everyone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RoleScopes {
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub domains: Vec<String>,
}

impl RoleScopes {
    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.groups.is_empty() && self.domains.is_empty()
    }

    /// Whether the user satisfies at least one populated section: their
    /// username/id/email in `users`, any of their groups in `groups`, or
    /// their email domain in `domains`.
    pub fn matches_user(&self, user: &User) -> bool {
        if self.is_empty() {
            return true;
        }

        let contains = |haystack: &[String], needle: &str| {
            !needle.is_empty() && haystack.iter().any(|entry| entry.eq_ignore_ascii_case(needle))
        };

        if contains(&self.users, &user.username)
            || contains(&self.users, &user.id)
            || contains(&self.users, &user.email)
        {
            return true;
        }

        if user.groups.iter().any(|group| contains(&self.groups, group)) {
            return true;
        }

        if let Some(domain) = user.email_domain() {
            if contains(&self.domains, domain) {
                return true;
            }
        }

        false
    }
}

/// A declarative role template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Role {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Authenticator names allowed to approve this role
    #[serde(default)]
    pub authenticators: Vec<String>,
    /// Workflow names that drive this role's elevation
    #[serde(default)]
    pub workflows: Vec<String>,
    /// Other roles this template composes; entries prefixed
    /// `<provider-name>:` reference provider-native roles
    #[serde(default)]
    pub inherits: Vec<String>,
    #[serde(default)]
    pub groups: RoleBindings,
    #[serde(default)]
    pub permissions: RoleBindings,
    #[serde(default)]
    pub resources: RoleBindings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<RoleScopes>,
    /// Provider instances this role can be granted on
    #[serde(default)]
    pub providers: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

pub(crate) fn default_enabled() -> bool {
    true
}

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            ..Default::default()
        }
    }

    /// A role is empty when permissions, resources, groups, and inherits
    /// are all empty; empty roles cannot be granted.
    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
            && self.resources.is_empty()
            && self.groups.is_empty()
            && self.inherits.is_empty()
    }

    /// Whether the user may request this role under its scopes.
    pub fn in_scope(&self, user: &User) -> bool {
        match &self.scopes {
            None => true,
            Some(scopes) => scopes.matches_user(user),
        }
    }

    /// True when the role grants nothing beyond inherited roles.
    pub fn is_purely_inheriting(&self) -> bool {
        !self.inherits.is_empty()
            && self.permissions.is_empty()
            && self.resources.is_empty()
            && self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> User {
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
    fn test_empty_scopes_allow() {
        assert!(RoleScopes::default().matches_user(&alice()));
        let role = Role::new("reader");
        assert!(role.in_scope(&alice()));
    }

    #[test]
    fn test_scope_by_domain() {
        let scopes = RoleScopes {
            domains: vec!["example.com".to_string()],
            ..Default::default()
        };
        assert!(scopes.matches_user(&alice()));

        let scopes = RoleScopes {
            domains: vec!["other.com".to_string()],
            ..Default::default()
        };
        assert!(!scopes.matches_user(&alice()));
    }

    #[test]
    fn test_scope_by_user_case_insensitive() {
        let scopes = RoleScopes {
            users: vec!["ALICE".to_string()],
            ..Default::default()
        };
        assert!(scopes.matches_user(&alice()));
    }

    #[test]
    fn test_scope_sections_are_alternatives() {
        // A populated section that misses does not veto another that hits.
        let scopes = RoleScopes {
            users: vec!["bob".to_string()],
            groups: vec!["DEV".to_string()],
            ..Default::default()
        };
        assert!(scopes.matches_user(&alice()));

        // All populated sections missing -> denied.
        let scopes = RoleScopes {
            users: vec!["bob".to_string()],
            domains: vec!["other.com".to_string()],
            ..Default::default()
        };
        assert!(!scopes.matches_user(&alice()));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// The scope decision is exactly: empty scopes admit, or any
            /// populated section matches case-insensitively.
            #[test]
            fn prop_scope_matching(
                username in "[a-z]{3,8}",
                scope_user in "[a-zA-Z]{3,8}",
                domain in prop_oneof![Just("example.com"), Just("other.net")],
                scope_domain in prop_oneof![Just("EXAMPLE.COM"), Just("corp.io")],
            ) {
                let user = User {
                    id: format!("id-{username}"),
                    username: username.clone(),
                    email: format!("{username}@{domain}"),
                    ..Default::default()
                };
                let scopes = RoleScopes {
                    users: vec![scope_user.clone()],
                    domains: vec![scope_domain.to_string()],
                    ..Default::default()
                };

                let expected = scope_user.eq_ignore_ascii_case(&username)
                    || scope_user.eq_ignore_ascii_case(&user.id)
                    || scope_user.eq_ignore_ascii_case(&user.email)
                    || scope_domain.eq_ignore_ascii_case(domain);
                prop_assert_eq!(scopes.matches_user(&user), expected);

                // Empty scopes always admit.
                prop_assert!(RoleScopes::default().matches_user(&user));
            }
        }
    }

    #[test]
    fn test_role_is_empty() {
        let mut role = Role::new("shell");
        assert!(role.is_empty());

        role.inherits.push("okta-prod:admin".to_string());
        assert!(!role.is_empty());
        assert!(role.is_purely_inheriting());

        role.permissions.allow.push("iam:list".to_string());
        assert!(!role.is_purely_inheriting());
    }
}
