//! Thand Test Utilities
//!
//! Centralized test infrastructure for the Thand workspace:
//! - fixtures for users, groups, roles, and provider catalogs
//! - a seeded memory provider ready for RBAC round trips
//! - a scripted provider serving a fixed pagination script
//! - proptest generators for scope matching

// Re-export the memory back-end for convenience
pub use thand_providers::providers::memory::{MemoryProvider, MemorySeed};

// Re-export core types test code reaches for constantly
pub use thand_core::{
    Capability, Group, Identity, Paged, Pagination, ProviderDefinition, ProviderKind, Role,
    RoleScopes, SynchronizeCapability, ThandResult, User,
};

use async_trait::async_trait;
use std::collections::HashSet;

use thand_providers::{BaseProvider, Provider};

// ============================================================================
// FIXTURES
// ============================================================================

/// `count` users named user0..userN at example.com.
pub fn sample_users(count: usize) -> Vec<User> {
    (0..count)
        .map(|n| User {
            id: format!("u{n}"),
            username: format!("user{n}"),
            email: format!("user{n}@example.com"),
            name: format!("User {n}"),
            verified: true,
            source: "fixture".to_string(),
            groups: vec!["dev".to_string()],
        })
        .collect()
}

pub fn sample_groups() -> Vec<Group> {
    vec![Group {
        id: "g1".to_string(),
        name: "dev".to_string(),
        email: "dev@example.com".to_string(),
    }]
}

/// A role granting group membership, an inherited provider role, and an
/// application binding; the usual elevation round-trip shape.
pub fn sample_role(provider_name: &str) -> Role {
    let mut role = Role::new("incident-response");
    role.description = "Break-glass access for incident response".to_string();
    role.groups.allow = vec!["dev".to_string()];
    role.inherits = vec![format!("{provider_name}:admin")];
    role.resources.allow = vec!["application:appA".to_string()];
    role
}

/// Definition config seeding a memory provider with the standard
/// fixture catalog.
pub fn memory_seed_config(user_count: usize, page_size: usize) -> serde_json::Value {
    serde_json::json!({
        "page_size": page_size,
        "users": sample_users(user_count),
        "groups": sample_groups(),
        "roles": [
            {"id": "r1", "name": "admin", "description": "native admin"}
        ],
        "permissions": [
            {"name": "iam:list"},
            {"name": "iam:get"},
            {"name": "s3:get"}
        ],
        "resources": [
            {"id": "appA", "name": "App A", "type": "application"}
        ]
    })
}

/// A fully initialized memory provider backed by the fixture catalog.
pub async fn seeded_memory_provider(name: &str, user_count: usize, page_size: usize) -> MemoryProvider {
    let provider = MemoryProvider::new();
    let definition = ProviderDefinition {
        name: name.to_string(),
        description: "seeded fixture provider".to_string(),
        provider: ProviderKind::Memory,
        config: serde_json::from_value(memory_seed_config(user_count, page_size))
            .expect("fixture config is valid"),
        role: None,
        enabled: true,
    };
    provider
        .initialize(name, definition)
        .await
        .expect("fixture provider initializes");
    provider
}

// ============================================================================
// SCRIPTED PROVIDER
// ============================================================================

/// A provider serving a fixed pagination script, for exercising the
/// streamer and orchestrator: users arrive in the given pages, groups in
/// one page, and any other declared capability hits the default
/// `NotImplemented` path.
pub struct ScriptedProvider {
    base: BaseProvider,
    user_pages: Vec<Vec<User>>,
    group_pages: Vec<Vec<Group>>,
    declares: HashSet<SynchronizeCapability>,
}

impl ScriptedProvider {
    pub fn new(
        user_pages: Vec<Vec<User>>,
        group_pages: Vec<Vec<Group>>,
        declares: impl IntoIterator<Item = SynchronizeCapability>,
    ) -> Self {
        Self {
            base: BaseProvider::new(vec![Capability::Identities, Capability::Rbac]),
            user_pages,
            group_pages,
            declares: declares.into_iter().collect(),
        }
    }

    fn page<T: Clone>(pages: &[Vec<T>], cursor: &Pagination) -> Paged<T> {
        let offset: usize = cursor
            .token
            .as_deref()
            .and_then(|token| token.parse().ok())
            .unwrap_or(0);
        let items = pages.get(offset).cloned().unwrap_or_default();
        if offset + 1 < pages.len() {
            Paged::continued(
                items,
                Pagination {
                    page: None,
                    page_size: None,
                    token: Some((offset + 1).to_string()),
                },
            )
        } else {
            Paged::last(items)
        }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn base(&self) -> &BaseProvider {
        &self.base
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Memory
    }

    fn can_synchronize(&self, capability: SynchronizeCapability) -> bool {
        self.declares.contains(&capability)
    }

    async fn sync_users(&self, page: Pagination) -> ThandResult<Paged<User>> {
        Ok(Self::page(&self.user_pages, &page))
    }

    async fn sync_groups(&self, page: Pagination) -> ThandResult<Paged<Group>> {
        Ok(Self::page(&self.group_pages, &page))
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use proptest::prelude::*;

    /// Users with plausible identifiers and domains.
    pub fn user_strategy() -> impl Strategy<Value = User> {
        (
            "[a-z]{3,8}",
            "[a-z]{3,8}",
            prop_oneof![Just("example.com"), Just("corp.example.org")],
        )
            .prop_map(|(id, username, domain)| User {
                id: id.clone(),
                username: username.clone(),
                email: format!("{username}@{domain}"),
                name: username.to_uppercase(),
                verified: true,
                source: "proptest".to_string(),
                groups: vec!["dev".to_string()],
            })
    }

    /// Scope sections drawn from a small universe so hits and misses
    /// both occur.
    pub fn scopes_strategy() -> impl Strategy<Value = RoleScopes> {
        (
            proptest::collection::vec("[a-z]{3,8}", 0..3),
            proptest::collection::vec(prop_oneof![Just("dev"), Just("ops")], 0..2),
            proptest::collection::vec(
                prop_oneof![Just("example.com"), Just("other.net")],
                0..2,
            ),
        )
            .prop_map(|(users, groups, domains)| RoleScopes {
                users,
                groups: groups.into_iter().map(str::to_string).collect(),
                domains: domains.into_iter().map(str::to_string).collect(),
            })
    }
}
