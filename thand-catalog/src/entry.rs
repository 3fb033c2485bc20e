//! Key extraction for catalog entries

use thand_core::{CatalogKind, Identity, ProviderPermission, ProviderResource, ProviderRole};

/// A record the catalog can store, look up, and index.
pub trait CatalogEntry: Clone + Send + Sync + 'static {
    /// Which catalog this entry belongs to, for error reporting.
    const KIND: CatalogKind;

    /// Lowercased keys this entry is reachable under. The same entry may
    /// surface several keys (an identity answers to its id, label, and
    /// addresses).
    fn lookup_keys(&self) -> Vec<String>;

    /// Text fed to the full-text index and the substring fallback.
    fn search_text(&self) -> Vec<String>;

    /// Identifier reported in search results.
    fn result_id(&self) -> String;
}

impl CatalogEntry for Identity {
    const KIND: CatalogKind = CatalogKind::Identity;

    fn lookup_keys(&self) -> Vec<String> {
        self.index_keys()
    }

    fn search_text(&self) -> Vec<String> {
        let mut text = vec![self.id.clone(), self.label.clone()];
        if let Some(user) = &self.user {
            text.push(user.email.clone());
            text.push(user.name.clone());
        }
        if let Some(group) = &self.group {
            text.push(group.name.clone());
            text.push(group.email.clone());
        }
        text.retain(|entry| !entry.is_empty());
        text
    }

    fn result_id(&self) -> String {
        self.id.clone()
    }
}

impl CatalogEntry for ProviderPermission {
    const KIND: CatalogKind = CatalogKind::Permission;

    fn lookup_keys(&self) -> Vec<String> {
        vec![self.name.to_lowercase()]
    }

    fn search_text(&self) -> Vec<String> {
        vec![self.name.clone(), self.title.clone(), self.description.clone()]
    }

    fn result_id(&self) -> String {
        self.name.clone()
    }
}

impl CatalogEntry for ProviderRole {
    const KIND: CatalogKind = CatalogKind::Role;

    fn lookup_keys(&self) -> Vec<String> {
        vec![self.name.to_lowercase()]
    }

    fn search_text(&self) -> Vec<String> {
        vec![self.name.clone(), self.description.clone()]
    }

    fn result_id(&self) -> String {
        self.id.clone()
    }
}

impl CatalogEntry for ProviderResource {
    const KIND: CatalogKind = CatalogKind::Resource;

    fn lookup_keys(&self) -> Vec<String> {
        // Resources answer to both their name and their id.
        let mut keys = vec![self.name.to_lowercase()];
        let id = self.id.to_lowercase();
        if !id.is_empty() && !keys.contains(&id) {
            keys.push(id);
        }
        keys
    }

    fn search_text(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.description.clone(),
            self.resource_type.clone(),
        ]
    }

    fn result_id(&self) -> String {
        self.id.clone()
    }
}
