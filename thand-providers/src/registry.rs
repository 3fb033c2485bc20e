//! Provider registry
//!
//! Built once from a definition file and read-only at steady state. Each
//! enabled definition gets its config interpolated against env + input,
//! a back-end instantiated for its kind, and `initialize` called with
//! the instance name as its identifier.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use thand_core::{
    interpolate_config, ConfigError, ProviderDefinitionFile, ProviderError, ProviderKind,
    ThandResult,
};

use crate::contract::Provider;
use crate::providers::{memory::MemoryProvider, rest::RestProvider};

/// Instantiate a back-end for a kind tag. Cloud kinds without compiled
/// SDK wiring are rejected here rather than failing at first use.
pub fn instantiate(kind: ProviderKind) -> ThandResult<Arc<dyn Provider>> {
    match kind {
        ProviderKind::Memory => Ok(Arc::new(MemoryProvider::new())),
        ProviderKind::Rest => Ok(Arc::new(RestProvider::new())),
        other => Err(ConfigError::UnknownProviderKind {
            kind: other.to_string(),
        }
        .into()),
    }
}

/// Name -> provider instance map.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// Build the registry from a parsed definition file. Disabled
    /// definitions are skipped; everything else is interpolated,
    /// instantiated, and initialized before the registry is returned.
    pub async fn from_definitions(
        file: &ProviderDefinitionFile,
        input: &HashMap<String, serde_json::Value>,
    ) -> ThandResult<Self> {
        let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();

        for (name, definition) in file.enabled_providers() {
            let mut definition = definition.clone();
            definition.config = interpolate_config(&definition.config, input)?;

            let provider = instantiate(definition.provider)?;
            provider.initialize(name, definition).await?;
            info!(provider = %name, kind = %provider.kind(), "registered provider");
            providers.insert(name.clone(), provider);
        }

        Ok(Self { providers })
    }

    /// Register a pre-built instance (used by tests and embedders).
    pub fn insert(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    pub fn get(&self, name: &str) -> ThandResult<Arc<dyn Provider>> {
        self.providers.get(name).cloned().ok_or_else(|| {
            ProviderError::NotRegistered {
                provider: name.to_string(),
            }
            .into()
        })
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<dyn Provider>)> {
        self.providers.iter()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}
