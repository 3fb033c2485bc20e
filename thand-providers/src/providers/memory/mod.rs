//! Config-seeded in-memory back-end
//!
//! Serves a directory declared in the provider definition's config. The
//! paginated sync endpoints, RBAC primitives, sessions, and notifications
//! all work against that in-process state, which makes this back-end the
//! reference implementation for the contract and the workhorse of the
//! test suite.

mod directory;

pub use directory::{MemoryDirectory, MemorySeed, ALREADY_ASSIGNED};

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use thand_core::{
    Capability, Group, Paged, Pagination, ProviderDefinition, ProviderError, ProviderKind,
    ProviderPermission, ProviderResource, ProviderRole, Role, Session, SynchronizeCapability,
    ThandResult, User, ValidationError,
};

use crate::base::BaseProvider;
use crate::contract::{Notification, Provider};
use crate::rbac::TypedResource;

/// Lifetime of sessions issued by this back-end.
const SESSION_TTL_HOURS: i64 = 1;

pub struct MemoryProvider {
    base: BaseProvider,
    directory: RwLock<MemoryDirectory>,
    page_size: RwLock<usize>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self {
            base: BaseProvider::new(vec![
                Capability::Rbac,
                Capability::Identities,
                Capability::Authorizer,
                Capability::Notifier,
            ]),
            directory: RwLock::new(MemoryDirectory::default()),
            page_size: RwLock::new(directory_page_size(&MemorySeed::default())),
        }
    }

    /// Peek at the directory state; test assertions live on this.
    pub fn with_directory<R>(&self, f: impl FnOnce(&MemoryDirectory) -> R) -> R {
        f(&self.directory.read().unwrap())
    }

    fn page<T: Clone>(&self, items: &[T], page: &Pagination) -> Paged<T> {
        let page_size = *self.page_size.read().unwrap();
        let offset: usize = page
            .token
            .as_deref()
            .and_then(|token| token.parse().ok())
            .unwrap_or(0);
        let end = (offset + page_size).min(items.len());
        let out = items.get(offset..end).map(<[T]>::to_vec).unwrap_or_default();
        if end < items.len() {
            Paged::continued(
                out,
                Pagination {
                    page: None,
                    page_size: Some(page_size as u32),
                    token: Some(end.to_string()),
                },
            )
        } else {
            Paged::last(out)
        }
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn directory_page_size(seed: &MemorySeed) -> usize {
    seed.page_size.max(1)
}

#[async_trait]
impl Provider for MemoryProvider {
    fn base(&self) -> &BaseProvider {
        &self.base
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Memory
    }

    async fn initialize(&self, identifier: &str, definition: ProviderDefinition) -> ThandResult<()> {
        let seed: MemorySeed = serde_json::to_value(&definition.config)
            .and_then(serde_json::from_value)
            .map_err(|err| ProviderError::Misconfigured {
                provider: identifier.to_string(),
                reason: format!("invalid seed catalog: {err}"),
            })?;
        self.base().initialize(identifier, definition)?;
        *self.page_size.write().unwrap() = directory_page_size(&seed);
        *self.directory.write().unwrap() = MemoryDirectory::seeded(&self.name(), seed);
        Ok(())
    }

    fn can_synchronize(&self, capability: SynchronizeCapability) -> bool {
        matches!(
            capability,
            SynchronizeCapability::Users
                | SynchronizeCapability::Groups
                | SynchronizeCapability::Roles
                | SynchronizeCapability::Permissions
                | SynchronizeCapability::Resources
        )
    }

    async fn sync_users(&self, page: Pagination) -> ThandResult<Paged<User>> {
        let directory = self.directory.read().unwrap();
        Ok(self.page(&directory.users, &page))
    }

    async fn sync_groups(&self, page: Pagination) -> ThandResult<Paged<Group>> {
        let directory = self.directory.read().unwrap();
        Ok(self.page(&directory.groups, &page))
    }

    async fn sync_roles(&self, page: Pagination) -> ThandResult<Paged<ProviderRole>> {
        let directory = self.directory.read().unwrap();
        Ok(self.page(&directory.roles, &page))
    }

    async fn sync_permissions(&self, page: Pagination) -> ThandResult<Paged<ProviderPermission>> {
        let directory = self.directory.read().unwrap();
        Ok(self.page(&directory.permissions, &page))
    }

    async fn sync_resources(&self, page: Pagination) -> ThandResult<Paged<ProviderResource>> {
        let directory = self.directory.read().unwrap();
        Ok(self.page(&directory.resources, &page))
    }

    // === RBAC primitives against the directory ===

    async fn resolve_user(&self, email: &str) -> ThandResult<User> {
        self.directory.read().unwrap().user_by_email(email)
    }

    async fn add_user_to_group(&self, user_id: &str, group_id: &str) -> ThandResult<()> {
        self.directory.write().unwrap().add_member(user_id, group_id)
    }

    async fn remove_user_from_group(&self, user_id: &str, group_id: &str) -> ThandResult<()> {
        self.directory
            .write()
            .unwrap()
            .remove_member(user_id, group_id)
    }

    async fn assign_role(&self, user_id: &str, role_id: &str) -> ThandResult<()> {
        self.directory.write().unwrap().assign_role(user_id, role_id)
    }

    async fn unassign_role(&self, user_id: &str, role_id: &str) -> ThandResult<()> {
        self.directory
            .write()
            .unwrap()
            .unassign_role(user_id, role_id)
    }

    async fn ensure_custom_role(
        &self,
        label: &str,
        permissions: &[String],
    ) -> ThandResult<ProviderRole> {
        Ok(self
            .directory
            .write()
            .unwrap()
            .ensure_custom_role(label, permissions))
    }

    async fn delete_custom_role(&self, role_id: &str) -> ThandResult<()> {
        self.directory.write().unwrap().delete_custom_role(role_id)
    }

    async fn assign_resource(&self, user_id: &str, resource: &TypedResource) -> ThandResult<()> {
        self.directory
            .write()
            .unwrap()
            .assign_resource(user_id, &resource.as_entry())
    }

    async fn unassign_resource(&self, user_id: &str, resource: &TypedResource) -> ThandResult<()> {
        self.directory
            .write()
            .unwrap()
            .unassign_resource(user_id, &resource.as_entry())
    }

    async fn get_authorized_access_url(&self, role: &Role, _user: &User) -> ThandResult<String> {
        match self.base().config_str("console_url") {
            Some(console_url) => Ok(format!(
                "{}/roles/{}",
                console_url.trim_end_matches('/'),
                role.name
            )),
            None => Err(ProviderError::NotImplemented.into()),
        }
    }

    // === Sessions ===

    async fn create_session(&self, user: &User) -> ThandResult<Session> {
        Ok(Session::new(
            user.clone(),
            Uuid::new_v4().to_string(),
            Utc::now() + Duration::hours(SESSION_TTL_HOURS),
        ))
    }

    async fn validate_session(&self, session: &Session) -> ThandResult<()> {
        if session.is_expired() {
            return Err(ValidationError::SessionExpired {
                uuid: session.uuid.to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn authorize_session(&self, session: &Session) -> ThandResult<Session> {
        self.validate_session(session).await?;
        Ok(session.clone())
    }

    async fn renew_session(&self, session: &Session) -> ThandResult<Session> {
        let mut renewed = session.clone();
        renewed.expiry = Utc::now() + Duration::hours(SESSION_TTL_HOURS);
        Ok(renewed)
    }

    // === Notifications ===

    async fn send_notification(&self, notification: &Notification) -> ThandResult<()> {
        self.directory
            .write()
            .unwrap()
            .notifications
            .push(notification.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use thand_core::{AuthorizeRoleRequest, RevokeRoleRequest};

    async fn seeded_provider() -> MemoryProvider {
        let provider = MemoryProvider::new();
        let config: HashMap<String, serde_json::Value> = serde_json::from_value(serde_json::json!({
            "page_size": 2,
            "users": [
                {"id": "u1", "username": "alice", "email": "alice@example.com", "name": "Alice Adams"},
                {"id": "u2", "username": "bob", "email": "bob@example.com", "name": "Bob Brown"},
                {"id": "u3", "username": "carol", "email": "carol@example.com", "name": "Carol Clark"},
                {"id": "u4", "username": "dave", "email": "dave@example.com", "name": "Dave Dunn"},
                {"id": "u5", "username": "erin", "email": "erin@example.com", "name": "Erin Egan"},
                {"id": "u6", "username": "frank", "email": "frank@example.com", "name": "Frank Fox"}
            ],
            "groups": [
                {"id": "g1", "name": "dev", "email": "dev@example.com"}
            ],
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
        }))
        .expect("config");

        let definition = ProviderDefinition {
            name: "mem".to_string(),
            description: "memory fixture".to_string(),
            provider: ProviderKind::Memory,
            config,
            role: None,
            enabled: true,
        };

        provider.initialize("mem", definition).await.expect("initialize");
        provider
    }

    #[tokio::test]
    async fn test_paginated_user_sync() {
        let provider = seeded_provider().await;
        let first = provider.sync_users(Pagination::first()).await.expect("page 1");
        assert_eq!(first.items.len(), 2);
        assert!(!first.is_last_page());

        let mut page = first.pagination.expect("cursor");
        let mut total = 2;
        loop {
            let next = provider.sync_users(page.clone()).await.expect("page");
            total += next.items.len();
            if next.is_last_page() {
                break;
            }
            page = next.pagination.expect("cursor");
        }
        assert_eq!(total, 6);
    }

    #[tokio::test]
    async fn test_sync_identities_stays_unimplemented() {
        let provider = seeded_provider().await;
        assert!(!provider.can_synchronize(SynchronizeCapability::Identities));
        let err = provider
            .sync_identities(Pagination::first())
            .await
            .expect_err("sentinel");
        assert!(err.is_not_implemented());
    }

    #[tokio::test]
    async fn test_authorize_then_revoke_round_trip() {
        let provider = seeded_provider().await;
        // Catalogs normally fill during sync; stage what authorize reads.
        provider
            .base()
            .add_groups(provider.with_directory(|d| d.groups.clone()))
            .expect("identities");
        provider
            .base()
            .set_roles(provider.with_directory(|d| d.roles.clone()))
            .expect("roles");

        let user = provider.resolve_user("alice@example.com").await.expect("user");
        let mut role = Role::new("incident-response");
        role.groups.allow = vec!["dev".to_string()];
        role.inherits = vec!["mem:admin".to_string()];
        role.resources.allow = vec!["application:appA".to_string()];

        let request = AuthorizeRoleRequest {
            user: Some(user.clone()),
            role: Some(role.clone()),
            duration: None,
        };
        let ledger = provider.authorize_role(&request).await.expect("authorize");

        assert_eq!(ledger.groups, vec!["g1"]);
        assert_eq!(ledger.roles, vec!["r1"]);
        assert_eq!(ledger.resources, vec!["application:appA"]);
        provider.with_directory(|d| {
            assert!(d.is_member("u1", "g1"));
            assert!(d.assigned_roles("u1").contains("r1"));
            assert!(d.assigned_resources("u1").contains("application:appA"));
        });

        let revoke = RevokeRoleRequest {
            user: Some(user),
            role: Some(role),
            authorize_role_response: Some(ledger),
        };
        provider.revoke_role(&revoke).await.expect("revoke");
        provider.with_directory(|d| {
            assert!(!d.is_member("u1", "g1"));
            assert!(d.assigned_roles("u1").is_empty());
            assert!(d.assigned_resources("u1").is_empty());
        });
    }

    #[tokio::test]
    async fn test_conflict_is_success_but_off_ledger() {
        let provider = seeded_provider().await;
        provider
            .base()
            .set_roles(provider.with_directory(|d| d.roles.clone()))
            .expect("roles");

        // Standing grant made outside the engine.
        provider.assign_role("u1", "r1").await.expect("pre-assign");

        let user = provider.resolve_user("alice@example.com").await.expect("user");
        let mut role = Role::new("inherit-only");
        role.inherits = vec!["mem:admin".to_string()];

        let ledger = provider
            .authorize_role(&AuthorizeRoleRequest {
                user: Some(user.clone()),
                role: Some(role.clone()),
                duration: None,
            })
            .await
            .expect("authorize succeeds through the conflict");
        assert!(ledger.roles.is_empty());

        // Revoking this grant must leave the standing assignment alone.
        provider
            .revoke_role(&RevokeRoleRequest {
                user: Some(user),
                role: Some(role),
                authorize_role_response: Some(ledger),
            })
            .await
            .expect("revoke");
        provider.with_directory(|d| assert!(d.assigned_roles("u1").contains("r1")));
    }

    #[tokio::test]
    async fn test_custom_role_created_and_deleted() {
        let provider = seeded_provider().await;
        let user = provider.resolve_user("bob@example.com").await.expect("user");
        let mut role = Role::new("auditor");
        role.permissions.allow = vec!["iam:list".to_string(), "iam:get".to_string()];

        let ledger = provider
            .authorize_role(&AuthorizeRoleRequest {
                user: Some(user.clone()),
                role: Some(role.clone()),
                duration: None,
            })
            .await
            .expect("authorize");
        assert_eq!(ledger.roles.len(), 1);
        assert_eq!(ledger.permissions, role.permissions.allow);
        provider.with_directory(|d| assert_eq!(d.custom_role_count(), 1));

        // Idempotent lookup-or-create on the label.
        let again = provider
            .ensure_custom_role("thand-auditor", &role.permissions.allow)
            .await
            .expect("ensure");
        assert_eq!(again.id, ledger.roles[0]);

        provider
            .revoke_role(&RevokeRoleRequest {
                user: Some(user),
                role: Some(role),
                authorize_role_response: Some(ledger),
            })
            .await
            .expect("revoke");
        provider.with_directory(|d| assert_eq!(d.custom_role_count(), 0));
    }

    #[tokio::test]
    async fn test_unknown_resource_type_skipped() {
        let provider = seeded_provider().await;
        let user = provider.resolve_user("carol@example.com").await.expect("user");
        let mut role = Role::new("mixed");
        role.resources.allow = vec![
            "application:appA".to_string(),
            "spaceship:enterprise".to_string(),
        ];

        let ledger = provider
            .authorize_role(&AuthorizeRoleRequest {
                user: Some(user),
                role: Some(role),
                duration: None,
            })
            .await
            .expect("authorize");
        assert_eq!(ledger.resources, vec!["application:appA"]);
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let provider = seeded_provider().await;
        let user = provider.resolve_user("erin@example.com").await.expect("user");
        let session = provider.create_session(&user).await.expect("create");
        provider.validate_session(&session).await.expect("valid");

        let mut expired = session.clone();
        expired.expiry = Utc::now() - Duration::seconds(5);
        assert!(provider.validate_session(&expired).await.is_err());

        let renewed = provider.renew_session(&expired).await.expect("renew");
        provider.validate_session(&renewed).await.expect("valid again");
    }

    #[tokio::test]
    async fn test_notifications_captured() {
        let provider = seeded_provider().await;
        provider
            .send_notification(&Notification {
                recipient: "alice@example.com".to_string(),
                subject: "access granted".to_string(),
                body: "role incident-response is active".to_string(),
            })
            .await
            .expect("send");
        provider.with_directory(|d| assert_eq!(d.notifications.len(), 1));
    }
}
