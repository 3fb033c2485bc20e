//! The simulated remote directory behind the memory back-end

use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use thand_core::{
    CatalogError, CatalogKind, Group, ProviderError, ProviderPermission, ProviderResource,
    ProviderRole, ThandResult, User,
};

use crate::contract::Notification;

/// Conflict code the memory directory reports for repeated assignments.
pub const ALREADY_ASSIGNED: &str = "already_assigned";

/// Seed catalog parsed from the provider definition's config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemorySeed {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub roles: Vec<ProviderRole>,
    #[serde(default)]
    pub permissions: Vec<ProviderPermission>,
    #[serde(default)]
    pub resources: Vec<ProviderResource>,
    /// Page size served by the paginated sync endpoints.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page_size() -> usize {
    100
}

/// Mutable directory state: what the "remote IAM" would hold.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    pub users: Vec<User>,
    pub groups: Vec<Group>,
    pub roles: Vec<ProviderRole>,
    pub permissions: Vec<ProviderPermission>,
    pub resources: Vec<ProviderResource>,

    /// group id -> member user ids
    memberships: HashMap<String, HashSet<String>>,
    /// user id -> assigned role ids
    assignments: HashMap<String, HashSet<String>>,
    /// label -> created custom role
    custom_roles: HashMap<String, ProviderRole>,
    /// user id -> typed resource entries
    resource_assignments: HashMap<String, HashSet<String>>,
    /// captured outbound notifications
    pub notifications: Vec<Notification>,

    next_custom_role: u64,
    provider_name: String,
}

impl MemoryDirectory {
    pub fn seeded(provider_name: &str, seed: MemorySeed) -> Self {
        Self {
            users: seed.users,
            groups: seed.groups,
            roles: seed.roles,
            permissions: seed.permissions,
            resources: seed.resources,
            provider_name: provider_name.to_string(),
            ..Default::default()
        }
    }

    fn not_found(kind: CatalogKind, key: &str) -> thand_core::ThandError {
        CatalogError::NotFound {
            kind,
            key: key.to_string(),
        }
        .into()
    }

    fn conflict(&self) -> thand_core::ThandError {
        ProviderError::AlreadyAssigned {
            provider: self.provider_name.clone(),
            code: ALREADY_ASSIGNED.to_string(),
        }
        .into()
    }

    pub fn user_by_email(&self, email: &str) -> ThandResult<User> {
        self.users
            .iter()
            .find(|user| user.email.eq_ignore_ascii_case(email))
            .cloned()
            .ok_or_else(|| Self::not_found(CatalogKind::Identity, email))
    }

    pub fn add_member(&mut self, user_id: &str, group_id: &str) -> ThandResult<()> {
        if !self.groups.iter().any(|group| group.id == group_id) {
            return Err(Self::not_found(CatalogKind::Identity, group_id));
        }
        let members = self.memberships.entry(group_id.to_string()).or_default();
        if !members.insert(user_id.to_string()) {
            return Err(self.conflict());
        }
        Ok(())
    }

    pub fn remove_member(&mut self, user_id: &str, group_id: &str) -> ThandResult<()> {
        let removed = self
            .memberships
            .get_mut(group_id)
            .map(|members| members.remove(user_id))
            .unwrap_or(false);
        if removed {
            Ok(())
        } else {
            Err(Self::not_found(CatalogKind::Identity, group_id))
        }
    }

    pub fn is_member(&self, user_id: &str, group_id: &str) -> bool {
        self.memberships
            .get(group_id)
            .map(|members| members.contains(user_id))
            .unwrap_or(false)
    }

    fn role_exists(&self, role_id: &str) -> bool {
        self.roles.iter().any(|role| role.id == role_id)
            || self.custom_roles.values().any(|role| role.id == role_id)
    }

    pub fn assign_role(&mut self, user_id: &str, role_id: &str) -> ThandResult<()> {
        if !self.role_exists(role_id) {
            return Err(Self::not_found(CatalogKind::Role, role_id));
        }
        let assigned = self.assignments.entry(user_id.to_string()).or_default();
        if !assigned.insert(role_id.to_string()) {
            return Err(self.conflict());
        }
        Ok(())
    }

    pub fn unassign_role(&mut self, user_id: &str, role_id: &str) -> ThandResult<()> {
        let removed = self
            .assignments
            .get_mut(user_id)
            .map(|assigned| assigned.remove(role_id))
            .unwrap_or(false);
        if removed {
            Ok(())
        } else {
            Err(Self::not_found(CatalogKind::Role, role_id))
        }
    }

    pub fn assigned_roles(&self, user_id: &str) -> HashSet<String> {
        self.assignments.get(user_id).cloned().unwrap_or_default()
    }

    pub fn ensure_custom_role(&mut self, label: &str, _permissions: &[String]) -> ProviderRole {
        if let Some(existing) = self.custom_roles.get(label) {
            return existing.clone();
        }
        self.next_custom_role += 1;
        let role = ProviderRole {
            id: format!("crole-{}", self.next_custom_role),
            name: label.to_string(),
            description: "managed custom role".to_string(),
        };
        self.custom_roles.insert(label.to_string(), role.clone());
        role
    }

    pub fn delete_custom_role(&mut self, role_id: &str) -> ThandResult<()> {
        let label = self
            .custom_roles
            .iter()
            .find(|(_, role)| role.id == role_id)
            .map(|(label, _)| label.clone());
        match label {
            Some(label) => {
                self.custom_roles.remove(&label);
                Ok(())
            }
            None => Err(Self::not_found(CatalogKind::Role, role_id)),
        }
    }

    pub fn custom_role_count(&self) -> usize {
        self.custom_roles.len()
    }

    pub fn assign_resource(&mut self, user_id: &str, entry: &str) -> ThandResult<()> {
        let id = entry.split_once(':').map(|(_, id)| id).unwrap_or(entry);
        if !self.resources.iter().any(|resource| resource.id == id) {
            return Err(Self::not_found(CatalogKind::Resource, entry));
        }
        let assigned = self
            .resource_assignments
            .entry(user_id.to_string())
            .or_default();
        if !assigned.insert(entry.to_string()) {
            return Err(self.conflict());
        }
        Ok(())
    }

    pub fn unassign_resource(&mut self, user_id: &str, entry: &str) -> ThandResult<()> {
        let removed = self
            .resource_assignments
            .get_mut(user_id)
            .map(|assigned| assigned.remove(entry))
            .unwrap_or(false);
        if removed {
            Ok(())
        } else {
            Err(Self::not_found(CatalogKind::Resource, entry))
        }
    }

    pub fn assigned_resources(&self, user_id: &str) -> HashSet<String> {
        self.resource_assignments
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }
}
