//! Provider catalog records
//!
//! Serializable snapshots of what a provider exposes. Opaque back-end
//! handles are intentionally not part of these records; back-ends keep
//! those in an in-memory side table keyed by id.

use serde::{Deserialize, Serialize};

/// A permission as exposed by a provider.
///
/// Names are matched case-insensitively. `x:*` / `x.*` expand to every
/// permission with prefix `x`; the condensed form `r:a,b,c` expands to
/// `r:a`, `r:b`, `r:c` (split on the last colon only).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ProviderPermission {
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Opaque provider-side payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub permission: Option<serde_json::Value>,
}

impl ProviderPermission {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// A provider-native role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ProviderRole {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// A provider-native resource (application, project, account, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ProviderResource {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "type")]
    pub resource_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_type_serde_name() {
        let resource = ProviderResource {
            id: "appA".to_string(),
            name: "App A".to_string(),
            description: String::new(),
            resource_type: "application".to_string(),
        };
        let json = serde_json::to_value(&resource).expect("serialize");
        assert_eq!(json["type"], "application");
    }

    #[test]
    fn test_permission_payload_omitted_when_absent() {
        let json = serde_json::to_string(&ProviderPermission::named("iam:list")).expect("serialize");
        assert!(!json.contains("permission"));
    }
}
