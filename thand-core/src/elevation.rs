//! Elevation requests and the authorization ledger

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{identity::User, role::Role, session::Session, Timestamp};

/// The authoritative record of a grant-in-flight.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ElevateRequest {
    pub role: Role,
    /// Provider instance names the grant targets
    #[serde(default)]
    pub providers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<String>,
    #[serde(default)]
    pub reason: String,
    /// Requested duration, opaque to the engine (e.g. "PT4H")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    /// Identity keys affected by this elevation
    #[serde(default)]
    pub identities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub authorized_at: Option<Timestamp>,
}

impl ElevateRequest {
    pub fn new(role: Role, reason: impl Into<String>) -> Self {
        Self {
            role,
            reason: reason.into(),
            ..Default::default()
        }
    }

    /// Stamp the moment every provider reported success.
    pub fn mark_authorized(&mut self, at: Timestamp) {
        self.authorized_at = Some(at);
    }

    pub fn is_authorized(&self) -> bool {
        self.authorized_at.is_some()
    }
}

/// Input to a provider's authorize operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AuthorizeRoleRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Requested duration, opaque to the engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

/// Input to a provider's revoke operation: the original request plus the
/// ledger the matching authorize returned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RevokeRoleRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorize_role_response: Option<AuthorizeRoleResponse>,
}

/// The ledger: exactly what a grant assigned, consumed on revoke.
///
/// Writes always use the plural keys. Decoding also accepts the legacy
/// singular `role_id`, which is folded into `roles`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(from = "AuthorizeRoleResponseWire")]
pub struct AuthorizeRoleResponse {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AuthorizeRoleResponse {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    /// Whether the grant assigned anything that revoke would need to undo.
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
            && self.permissions.is_empty()
            && self.groups.is_empty()
            && self.resources.is_empty()
    }
}

/// Wire-compatible decode shape accepting both ledger key generations.
#[derive(Deserialize)]
struct AuthorizeRoleResponseWire {
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    roles: Vec<String>,
    /// Legacy plural spelling
    #[serde(default)]
    role_ids: Vec<String>,
    /// Legacy singular spelling
    #[serde(default)]
    role_id: Option<String>,
    #[serde(default)]
    permissions: Vec<String>,
    #[serde(default)]
    groups: Vec<String>,
    #[serde(default)]
    resources: Vec<String>,
    #[serde(default)]
    metadata: HashMap<String, serde_json::Value>,
}

impl From<AuthorizeRoleResponseWire> for AuthorizeRoleResponse {
    fn from(wire: AuthorizeRoleResponseWire) -> Self {
        let mut roles = wire.roles;
        for role in wire.role_ids {
            if !roles.contains(&role) {
                roles.push(role);
            }
        }
        if let Some(role) = wire.role_id {
            if !role.is_empty() && !roles.contains(&role) {
                roles.push(role);
            }
        }
        Self {
            user_id: wire.user_id,
            roles,
            permissions: wire.permissions,
            groups: wire.groups,
            resources: wire.resources,
            metadata: wire.metadata,
        }
    }
}
