//! Shared provider state
//!
//! Every back-end embeds a [`BaseProvider`]: the declared capability set,
//! the (interpolated) definition it was initialized from, and the
//! capability-gated catalog substructures. Catalog writes publish new
//! generations; index rebuilds run detached, so readers never block on
//! indexing.

use std::collections::HashMap;
use std::sync::RwLock;

use thand_core::{
    Capability, Group, Identity, ProviderDefinition, ProviderError, ProviderPermission,
    ProviderResource, ProviderRole, ThandResult, User,
};

use thand_catalog::CatalogStore;

/// Identity-side catalog: unified subjects under all their keys.
#[derive(Debug, Default)]
pub struct IdentityCatalog {
    pub identities: CatalogStore<Identity>,
}

/// RBAC-side catalogs plus the side table of opaque back-end handles.
/// Handles never travel with the serializable records; they are looked
/// up by resource id when a back-end needs its native object back.
#[derive(Debug, Default)]
pub struct RbacCatalog {
    pub permissions: CatalogStore<ProviderPermission>,
    pub roles: CatalogStore<ProviderRole>,
    pub resources: CatalogStore<ProviderResource>,
    handles: RwLock<HashMap<String, serde_json::Value>>,
}

impl RbacCatalog {
    /// Retain a native handle alongside a catalog resource.
    pub fn put_handle(&self, resource_id: impl Into<String>, handle: serde_json::Value) {
        self.handles
            .write()
            .unwrap()
            .insert(resource_id.into(), handle);
    }

    pub fn handle(&self, resource_id: &str) -> Option<serde_json::Value> {
        self.handles.read().unwrap().get(resource_id).cloned()
    }
}

#[derive(Debug, Default)]
struct ProviderState {
    identifier: String,
    definition: Option<ProviderDefinition>,
}

/// Shared state owned by every provider instance.
#[derive(Debug)]
pub struct BaseProvider {
    capabilities: Vec<Capability>,
    state: RwLock<ProviderState>,
    identity: Option<IdentityCatalog>,
    rbac: Option<RbacCatalog>,
}

impl BaseProvider {
    /// Allocate state for the declared capabilities. Catalog
    /// substructures exist only for the capabilities that need them.
    pub fn new(capabilities: Vec<Capability>) -> Self {
        let identity = capabilities
            .contains(&Capability::Identities)
            .then(IdentityCatalog::default);
        let rbac = capabilities
            .contains(&Capability::Rbac)
            .then(RbacCatalog::default);
        Self {
            capabilities,
            state: RwLock::new(ProviderState::default()),
            identity,
            rbac,
        }
    }

    /// Store the instance identifier and definition.
    pub fn initialize(&self, identifier: &str, definition: ProviderDefinition) -> ThandResult<()> {
        let mut state = self.state.write().unwrap();
        state.identifier = identifier.to_string();
        state.definition = Some(definition);
        Ok(())
    }

    pub fn identifier(&self) -> String {
        self.state.read().unwrap().identifier.clone()
    }

    /// Instance name from the definition, falling back to the identifier.
    pub fn name(&self) -> String {
        let state = self.state.read().unwrap();
        state
            .definition
            .as_ref()
            .map(|definition| definition.name.clone())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| state.identifier.clone())
    }

    pub fn description(&self) -> String {
        self.state
            .read()
            .unwrap()
            .definition
            .as_ref()
            .map(|definition| definition.description.clone())
            .unwrap_or_default()
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Resolved configuration value by key.
    pub fn config_value(&self, key: &str) -> Option<serde_json::Value> {
        self.state
            .read()
            .unwrap()
            .definition
            .as_ref()
            .and_then(|definition| definition.config.get(key).cloned())
    }

    pub fn config_str(&self, key: &str) -> Option<String> {
        match self.config_value(key)? {
            serde_json::Value::String(text) => Some(text),
            other => Some(other.to_string()),
        }
    }

    /// A config value the back-end cannot run without.
    pub fn require_config_str(&self, key: &str) -> ThandResult<String> {
        self.config_str(key).ok_or_else(|| {
            ProviderError::Misconfigured {
                provider: self.name(),
                reason: format!("missing required config key `{key}`"),
            }
            .into()
        })
    }

    /// The identity catalog, or a MissingCapability error.
    pub fn identity(&self) -> ThandResult<&IdentityCatalog> {
        self.identity.as_ref().ok_or_else(|| {
            ProviderError::MissingCapability {
                provider: self.name(),
                capability: Capability::Identities.to_string(),
            }
            .into()
        })
    }

    /// The RBAC catalogs, or a MissingCapability error.
    pub fn rbac(&self) -> ThandResult<&RbacCatalog> {
        self.rbac.as_ref().ok_or_else(|| {
            ProviderError::MissingCapability {
                provider: self.name(),
                capability: Capability::Rbac.to_string(),
            }
            .into()
        })
    }

    // === Catalog writes ===

    pub fn set_identities(&self, identities: Vec<Identity>) -> ThandResult<()> {
        self.identity()?.identities.set(identities);
        Ok(())
    }

    pub fn add_identities(&self, identities: Vec<Identity>) -> ThandResult<()> {
        self.identity()?.identities.add(identities);
        Ok(())
    }

    /// Fold raw users into the identity catalog.
    pub fn add_users(&self, users: Vec<User>) -> ThandResult<()> {
        self.add_identities(users.into_iter().map(Identity::from_user).collect())
    }

    /// Fold raw groups into the identity catalog.
    pub fn add_groups(&self, groups: Vec<Group>) -> ThandResult<()> {
        self.add_identities(groups.into_iter().map(Identity::from_group).collect())
    }

    pub fn set_permissions(&self, permissions: Vec<ProviderPermission>) -> ThandResult<()> {
        self.rbac()?.permissions.set(permissions);
        Ok(())
    }

    pub fn add_permissions(&self, permissions: Vec<ProviderPermission>) -> ThandResult<()> {
        self.rbac()?.permissions.add(permissions);
        Ok(())
    }

    pub fn set_roles(&self, roles: Vec<ProviderRole>) -> ThandResult<()> {
        self.rbac()?.roles.set(roles);
        Ok(())
    }

    pub fn add_roles(&self, roles: Vec<ProviderRole>) -> ThandResult<()> {
        self.rbac()?.roles.add(roles);
        Ok(())
    }

    pub fn set_resources(&self, resources: Vec<ProviderResource>) -> ThandResult<()> {
        self.rbac()?.resources.set(resources);
        Ok(())
    }

    pub fn add_resources(&self, resources: Vec<ProviderResource>) -> ThandResult<()> {
        self.rbac()?.resources.add(resources);
        Ok(())
    }
}
