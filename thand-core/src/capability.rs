//! Capability and provider-kind enums

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ConfigError;

/// A declared sub-contract a provider supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Roles, permissions, resources, authorize/revoke
    Rbac,
    /// Users, groups, unified identities
    Identities,
    /// Session issuance and validation
    Authorizer,
    /// Outbound notification delivery
    Notifier,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Rbac => "rbac",
            Capability::Identities => "identities",
            Capability::Authorizer => "authorizer",
            Capability::Notifier => "notifier",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One synchronizable catalog slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum SynchronizeCapability {
    Identities,
    Users,
    Groups,
    Roles,
    Permissions,
    Resources,
}

impl SynchronizeCapability {
    /// Every catalog slice, in the order the orchestrator probes them.
    pub const ALL: [SynchronizeCapability; 6] = [
        SynchronizeCapability::Identities,
        SynchronizeCapability::Users,
        SynchronizeCapability::Groups,
        SynchronizeCapability::Roles,
        SynchronizeCapability::Permissions,
        SynchronizeCapability::Resources,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SynchronizeCapability::Identities => "identities",
            SynchronizeCapability::Users => "users",
            SynchronizeCapability::Groups => "groups",
            SynchronizeCapability::Roles => "roles",
            SynchronizeCapability::Permissions => "permissions",
            SynchronizeCapability::Resources => "resources",
        }
    }

    /// Activity method name for durable-mode registration.
    pub fn activity_name(&self) -> &'static str {
        match self {
            SynchronizeCapability::Identities => "SynchronizeIdentities",
            SynchronizeCapability::Users => "SynchronizeUsers",
            SynchronizeCapability::Groups => "SynchronizeGroups",
            SynchronizeCapability::Roles => "SynchronizeRoles",
            SynchronizeCapability::Permissions => "SynchronizePermissions",
            SynchronizeCapability::Resources => "SynchronizeResources",
        }
    }
}

impl fmt::Display for SynchronizeCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of identity provider backing an instance.
///
/// The kind is a routing tag for instantiation; concrete SDK wiring lives
/// in the back-end modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Okta,
    GoogleWorkspace,
    Aws,
    Gcp,
    Azure,
    /// Generic JSON directory API
    Rest,
    /// Config-seeded in-memory back-end
    Memory,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Okta => "okta",
            ProviderKind::GoogleWorkspace => "google_workspace",
            ProviderKind::Aws => "aws",
            ProviderKind::Gcp => "gcp",
            ProviderKind::Azure => "azure",
            ProviderKind::Rest => "rest",
            ProviderKind::Memory => "memory",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "okta" => Ok(ProviderKind::Okta),
            "google_workspace" | "google" => Ok(ProviderKind::GoogleWorkspace),
            "aws" => Ok(ProviderKind::Aws),
            "gcp" => Ok(ProviderKind::Gcp),
            "azure" => Ok(ProviderKind::Azure),
            "rest" => Ok(ProviderKind::Rest),
            "memory" => Ok(ProviderKind::Memory),
            other => Err(ConfigError::UnknownProviderKind {
                kind: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_roundtrip() {
        let json = serde_json::to_string(&Capability::Rbac).expect("serialize");
        assert_eq!(json, "\"rbac\"");
        let back: Capability = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, Capability::Rbac);
    }

    #[test]
    fn test_provider_kind_from_str() {
        assert_eq!("okta".parse::<ProviderKind>().unwrap(), ProviderKind::Okta);
        assert_eq!(
            "google".parse::<ProviderKind>().unwrap(),
            ProviderKind::GoogleWorkspace
        );
        assert!("smoke_signals".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_all_sync_capabilities() {
        assert_eq!(SynchronizeCapability::ALL.len(), 6);
        assert_eq!(
            SynchronizeCapability::Users.activity_name(),
            "SynchronizeUsers"
        );
    }
}
