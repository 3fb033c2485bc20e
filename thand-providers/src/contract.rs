//! The provider contract
//!
//! Every identity-provider back-end implements [`Provider`]. Metadata and
//! catalog reads are provided methods over the shared [`BaseProvider`];
//! capability-gated operations default to the `NotImplemented` sentinel
//! so the engine can distinguish "unsupported" from "failed" at every
//! boundary. Back-ends declare which catalog slices they can stream via
//! [`Provider::can_synchronize`] instead of the engine probing whether a
//! default method was overridden.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use thand_core::{
    AuthorizeRoleRequest, AuthorizeRoleResponse, Capability, Group, Identity, Paged, Pagination,
    ProviderDefinition, ProviderError, ProviderKind, ProviderPermission, ProviderResource,
    ProviderRole, RevokeRoleRequest, Role, SearchRequest, SearchResult, Session,
    SynchronizeCapability, ThandResult, User,
};

use crate::base::BaseProvider;
use crate::rbac;

/// An outbound message sent through a Notifier-capable provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Uniform contract over heterogeneous identity-provider back-ends.
#[async_trait]
pub trait Provider: Send + Sync {
    // === Required surface ===

    /// Shared state: definition, capabilities, catalogs.
    fn base(&self) -> &BaseProvider;

    /// Back-end kind tag.
    fn kind(&self) -> ProviderKind;

    // === Metadata (provided) ===

    fn identifier(&self) -> String {
        self.base().identifier()
    }

    fn name(&self) -> String {
        self.base().name()
    }

    fn description(&self) -> String {
        self.base().description()
    }

    fn capabilities(&self) -> &[Capability] {
        self.base().capabilities()
    }

    fn has_capability(&self, capability: Capability) -> bool {
        self.base().has_capability(capability)
    }

    fn has_any_capability(&self, capabilities: &[Capability]) -> bool {
        capabilities
            .iter()
            .any(|capability| self.has_capability(*capability))
    }

    // === Lifecycle ===

    /// Wire the instance name and its (already interpolated) definition.
    /// Back-ends that need connections or seeding override this and call
    /// through to the base.
    async fn initialize(&self, identifier: &str, definition: ProviderDefinition) -> ThandResult<()> {
        self.base().initialize(identifier, definition)
    }

    // === Catalog reads (provided, capability-gated through the base) ===

    fn get_permission(&self, name: &str) -> ThandResult<ProviderPermission> {
        self.base().rbac()?.permissions.get(name)
    }

    fn list_permissions(
        &self,
        search: Option<&SearchRequest>,
    ) -> ThandResult<Vec<SearchResult<ProviderPermission>>> {
        Ok(self.base().rbac()?.permissions.list(search))
    }

    fn get_role(&self, name: &str) -> ThandResult<ProviderRole> {
        self.base().rbac()?.roles.get(name)
    }

    fn list_roles(
        &self,
        search: Option<&SearchRequest>,
    ) -> ThandResult<Vec<SearchResult<ProviderRole>>> {
        Ok(self.base().rbac()?.roles.list(search))
    }

    fn get_resource(&self, key: &str) -> ThandResult<ProviderResource> {
        self.base().rbac()?.resources.get(key)
    }

    fn list_resources(
        &self,
        search: Option<&SearchRequest>,
    ) -> ThandResult<Vec<SearchResult<ProviderResource>>> {
        Ok(self.base().rbac()?.resources.list(search))
    }

    fn get_identity(&self, key: &str) -> ThandResult<Identity> {
        self.base().identity()?.identities.get(key)
    }

    fn list_identities(
        &self,
        search: Option<&SearchRequest>,
    ) -> ThandResult<Vec<SearchResult<Identity>>> {
        Ok(self.base().identity()?.identities.list(search))
    }

    // === Synchronization (capability = Identities / Rbac) ===

    /// Whether the back-end streams this catalog slice. The orchestrator
    /// computes its default request set from these flags; `sync_*`
    /// methods left at their defaults must report `false` here.
    fn can_synchronize(&self, _capability: SynchronizeCapability) -> bool {
        false
    }

    async fn sync_identities(&self, _page: Pagination) -> ThandResult<Paged<Identity>> {
        Err(ProviderError::NotImplemented.into())
    }

    async fn sync_users(&self, _page: Pagination) -> ThandResult<Paged<User>> {
        Err(ProviderError::NotImplemented.into())
    }

    async fn sync_groups(&self, _page: Pagination) -> ThandResult<Paged<Group>> {
        Err(ProviderError::NotImplemented.into())
    }

    async fn sync_roles(&self, _page: Pagination) -> ThandResult<Paged<ProviderRole>> {
        Err(ProviderError::NotImplemented.into())
    }

    async fn sync_permissions(&self, _page: Pagination) -> ThandResult<Paged<ProviderPermission>> {
        Err(ProviderError::NotImplemented.into())
    }

    async fn sync_resources(&self, _page: Pagination) -> ThandResult<Paged<ProviderResource>> {
        Err(ProviderError::NotImplemented.into())
    }

    // === RBAC side-effect primitives (capability = Rbac) ===

    async fn resolve_user(&self, _email: &str) -> ThandResult<User> {
        Err(ProviderError::NotImplemented.into())
    }

    async fn add_user_to_group(&self, _user_id: &str, _group_id: &str) -> ThandResult<()> {
        Err(ProviderError::NotImplemented.into())
    }

    async fn remove_user_from_group(&self, _user_id: &str, _group_id: &str) -> ThandResult<()> {
        Err(ProviderError::NotImplemented.into())
    }

    async fn assign_role(&self, _user_id: &str, _role_id: &str) -> ThandResult<()> {
        Err(ProviderError::NotImplemented.into())
    }

    async fn unassign_role(&self, _user_id: &str, _role_id: &str) -> ThandResult<()> {
        Err(ProviderError::NotImplemented.into())
    }

    /// Look up or create a custom admin role carrying exactly the given
    /// permissions. Idempotent on the label.
    async fn ensure_custom_role(
        &self,
        _label: &str,
        _permissions: &[String],
    ) -> ThandResult<ProviderRole> {
        Err(ProviderError::NotImplemented.into())
    }

    async fn delete_custom_role(&self, _role_id: &str) -> ThandResult<()> {
        Err(ProviderError::NotImplemented.into())
    }

    async fn assign_resource(
        &self,
        _user_id: &str,
        _resource: &rbac::TypedResource,
    ) -> ThandResult<()> {
        Err(ProviderError::NotImplemented.into())
    }

    async fn unassign_resource(
        &self,
        _user_id: &str,
        _resource: &rbac::TypedResource,
    ) -> ThandResult<()> {
        Err(ProviderError::NotImplemented.into())
    }

    // === RBAC operations (capability = Rbac) ===

    /// Provider-side role validation. The default is the sentinel; the
    /// engine falls back to the catalog-driven algorithm in
    /// [`crate::validator`].
    async fn validate_role(&self, _user: Option<&User>, _role: &Role) -> ThandResult<Role> {
        Err(ProviderError::NotImplemented.into())
    }

    /// Grant a validated role and return the ledger of everything that
    /// was assigned. The provided implementation orchestrates the
    /// side-effect primitives; back-ends with a native grant API may
    /// override it wholesale.
    async fn authorize_role(
        &self,
        request: &AuthorizeRoleRequest,
    ) -> ThandResult<AuthorizeRoleResponse> {
        rbac::authorize(self, request).await
    }

    /// Undo exactly what the matching authorize recorded.
    async fn revoke_role(&self, request: &RevokeRoleRequest) -> ThandResult<()> {
        rbac::revoke(self, request).await
    }

    /// Console deep-link for an active grant.
    async fn get_authorized_access_url(&self, _role: &Role, _user: &User) -> ThandResult<String> {
        Err(ProviderError::NotImplemented.into())
    }

    // === Sessions (capability = Authorizer) ===

    async fn authorize_session(&self, _session: &Session) -> ThandResult<Session> {
        Err(ProviderError::NotImplemented.into())
    }

    async fn create_session(&self, _user: &User) -> ThandResult<Session> {
        Err(ProviderError::NotImplemented.into())
    }

    async fn validate_session(&self, _session: &Session) -> ThandResult<()> {
        Err(ProviderError::NotImplemented.into())
    }

    async fn renew_session(&self, _session: &Session) -> ThandResult<Session> {
        Err(ProviderError::NotImplemented.into())
    }

    // === Notifications (capability = Notifier) ===

    async fn send_notification(&self, _notification: &Notification) -> ThandResult<()> {
        Err(ProviderError::NotImplemented.into())
    }
}

impl std::fmt::Debug for dyn Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("identifier", &self.identifier())
            .field("kind", &self.kind())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bare provider exercising nothing but the defaults.
    struct Bare {
        base: BaseProvider,
    }

    impl Provider for Bare {
        fn base(&self) -> &BaseProvider {
            &self.base
        }

        fn kind(&self) -> ProviderKind {
            ProviderKind::Memory
        }
    }

    fn bare() -> Bare {
        Bare {
            base: BaseProvider::new(vec![Capability::Identities]),
        }
    }

    #[tokio::test]
    async fn test_defaults_are_not_implemented() {
        let provider = bare();
        let err = provider.sync_users(Pagination::first()).await.expect_err("default");
        assert!(err.is_not_implemented());
        let err = provider.resolve_user("a@b.c").await.expect_err("default");
        assert!(err.is_not_implemented());
        assert!(!provider.can_synchronize(SynchronizeCapability::Users));
    }

    #[test]
    fn test_capability_introspection() {
        let provider = bare();
        assert!(provider.has_capability(Capability::Identities));
        assert!(!provider.has_capability(Capability::Rbac));
        assert!(provider.has_any_capability(&[Capability::Rbac, Capability::Identities]));
        assert!(!provider.has_any_capability(&[Capability::Notifier]));
    }

    #[test]
    fn test_catalog_reads_gated_by_capability() {
        let provider = bare();
        // Identity catalog exists, RBAC catalog does not.
        assert!(provider.list_identities(None).is_ok());
        let err = provider.get_role("admin").expect_err("no rbac capability");
        assert!(matches!(
            err,
            thand_core::ThandError::Provider(ProviderError::MissingCapability { .. })
        ));
    }
}
