//! Generic JSON directory back-end
//!
//! Talks to any directory that exposes the paged `/users`, `/groups`,
//! `/roles`, `/permissions`, `/resources`, and `/identities` collections
//! plus membership/assignment endpoints. Cloud-specific back-ends differ
//! only in wiring; this one is the reference for the HTTP shape.

mod client;
mod types;

pub use client::RestClient;

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use thand_core::{
    Capability, Group, Identity, Paged, Pagination, ProviderDefinition, ProviderError,
    ProviderKind, ProviderPermission, ProviderResource, ProviderRole, Role, SynchronizeCapability,
    ThandResult, User,
};

use crate::base::BaseProvider;
use crate::contract::Provider;
use crate::rbac::TypedResource;

use types::{CreateRoleBody, MemberBody, RoleAssignmentBody};

/// Default request throttle when the definition does not set one.
const DEFAULT_REQUESTS_PER_MINUTE: u32 = 120;

pub struct RestProvider {
    base: BaseProvider,
    client: RwLock<Option<Arc<RestClient>>>,
}

impl RestProvider {
    pub fn new() -> Self {
        Self {
            base: BaseProvider::new(vec![Capability::Rbac, Capability::Identities]),
            client: RwLock::new(None),
        }
    }

    fn client(&self) -> ThandResult<Arc<RestClient>> {
        self.client.read().unwrap().clone().ok_or_else(|| {
            ProviderError::Misconfigured {
                provider: self.name(),
                reason: "provider not initialized".to_string(),
            }
            .into()
        })
    }

    fn page_query(page: &Pagination) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Some(token) = &page.token {
            if !token.is_empty() {
                query.push(("token", token.clone()));
            }
        }
        if let Some(page_size) = page.page_size {
            query.push(("page_size", page_size.to_string()));
        }
        query
    }
}

impl Default for RestProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for RestProvider {
    fn base(&self) -> &BaseProvider {
        &self.base
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Rest
    }

    async fn initialize(&self, identifier: &str, definition: ProviderDefinition) -> ThandResult<()> {
        self.base().initialize(identifier, definition)?;
        let base_url = self.base().require_config_str("base_url")?;
        let api_token = self.base().config_str("api_token").unwrap_or_default();
        let requests_per_minute = self
            .base()
            .config_str("requests_per_minute")
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_REQUESTS_PER_MINUTE);
        *self.client.write().unwrap() = Some(Arc::new(RestClient::new(
            identifier,
            base_url,
            api_token,
            requests_per_minute,
        )));
        Ok(())
    }

    fn can_synchronize(&self, capability: SynchronizeCapability) -> bool {
        // The directory serves every collection, unified identities
        // included.
        matches!(
            capability,
            SynchronizeCapability::Identities
                | SynchronizeCapability::Users
                | SynchronizeCapability::Groups
                | SynchronizeCapability::Roles
                | SynchronizeCapability::Permissions
                | SynchronizeCapability::Resources
        )
    }

    async fn sync_identities(&self, page: Pagination) -> ThandResult<Paged<Identity>> {
        self.client()?
            .get("/identities", &Self::page_query(&page))
            .await
    }

    async fn sync_users(&self, page: Pagination) -> ThandResult<Paged<User>> {
        self.client()?.get("/users", &Self::page_query(&page)).await
    }

    async fn sync_groups(&self, page: Pagination) -> ThandResult<Paged<Group>> {
        self.client()?.get("/groups", &Self::page_query(&page)).await
    }

    async fn sync_roles(&self, page: Pagination) -> ThandResult<Paged<ProviderRole>> {
        self.client()?.get("/roles", &Self::page_query(&page)).await
    }

    async fn sync_permissions(&self, page: Pagination) -> ThandResult<Paged<ProviderPermission>> {
        self.client()?
            .get("/permissions", &Self::page_query(&page))
            .await
    }

    async fn sync_resources(&self, page: Pagination) -> ThandResult<Paged<ProviderResource>> {
        self.client()?
            .get("/resources", &Self::page_query(&page))
            .await
    }

    async fn resolve_user(&self, email: &str) -> ThandResult<User> {
        self.client()?
            .get("/users/lookup", &[("email", email.to_string())])
            .await
    }

    async fn add_user_to_group(&self, user_id: &str, group_id: &str) -> ThandResult<()> {
        let _: serde_json::Value = self
            .client()?
            .post(
                &format!("/groups/{group_id}/members"),
                &MemberBody {
                    user_id: user_id.to_string(),
                },
            )
            .await?;
        Ok(())
    }

    async fn remove_user_from_group(&self, user_id: &str, group_id: &str) -> ThandResult<()> {
        self.client()?
            .delete(&format!("/groups/{group_id}/members/{user_id}"))
            .await
    }

    async fn assign_role(&self, user_id: &str, role_id: &str) -> ThandResult<()> {
        let _: serde_json::Value = self
            .client()?
            .post(
                &format!("/users/{user_id}/roles"),
                &RoleAssignmentBody {
                    role_id: role_id.to_string(),
                },
            )
            .await?;
        Ok(())
    }

    async fn unassign_role(&self, user_id: &str, role_id: &str) -> ThandResult<()> {
        self.client()?
            .delete(&format!("/users/{user_id}/roles/{role_id}"))
            .await
    }

    async fn ensure_custom_role(
        &self,
        label: &str,
        permissions: &[String],
    ) -> ThandResult<ProviderRole> {
        let client = self.client()?;
        let existing: Paged<ProviderRole> = client
            .get("/roles", &[("name", label.to_string())])
            .await?;
        if let Some(role) = existing.items.into_iter().next() {
            return Ok(role);
        }
        client
            .post(
                "/roles",
                &CreateRoleBody {
                    name: label.to_string(),
                    permissions: permissions.to_vec(),
                },
            )
            .await
    }

    async fn delete_custom_role(&self, role_id: &str) -> ThandResult<()> {
        self.client()?.delete(&format!("/roles/{role_id}")).await
    }

    async fn assign_resource(&self, user_id: &str, resource: &TypedResource) -> ThandResult<()> {
        let _: serde_json::Value = self
            .client()?
            .post(
                &format!(
                    "/resources/{}/{}/assignments",
                    resource.resource_type, resource.id
                ),
                &MemberBody {
                    user_id: user_id.to_string(),
                },
            )
            .await?;
        Ok(())
    }

    async fn unassign_resource(&self, user_id: &str, resource: &TypedResource) -> ThandResult<()> {
        self.client()?
            .delete(&format!(
                "/resources/{}/{}/assignments/{}",
                resource.resource_type, resource.id, user_id
            ))
            .await
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
}
