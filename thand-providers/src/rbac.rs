//! Authorize / revoke orchestration
//!
//! The provided implementations of `authorize_role` and `revoke_role`
//! drive a back-end's side-effect primitives and keep the ledger honest:
//! authorize records exactly what it assigned (conflicts with standing
//! grants are success but stay off the ledger), revoke undoes exactly
//! what the ledger lists and never stops early.

use std::collections::HashSet;

use tracing::{debug, warn};

use thand_core::{
    AuthorizeRoleRequest, AuthorizeRoleResponse, ProviderError, RevokeRoleRequest, Role,
    ThandResult, User, ValidationError,
};

use crate::contract::Provider;

/// Resource entry types the engine knows how to bind.
const KNOWN_RESOURCE_TYPES: &[&str] = &["application"];

/// Metadata key listing custom roles created by authorize, so revoke
/// knows which role ids it may delete after unassignment.
const CUSTOM_ROLES_KEY: &str = "custom_roles";

/// A resource entry with a typed prefix, e.g. `application:appA`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedResource {
    pub resource_type: String,
    pub id: String,
}

impl TypedResource {
    /// Split `type:id`; entries without a prefix are untyped.
    pub fn parse(entry: &str) -> Option<Self> {
        let (resource_type, id) = entry.split_once(':')?;
        if resource_type.is_empty() || id.is_empty() {
            return None;
        }
        Some(Self {
            resource_type: resource_type.to_string(),
            id: id.to_string(),
        })
    }

    pub fn as_entry(&self) -> String {
        format!("{}:{}", self.resource_type, self.id)
    }
}

fn required<'a, T>(value: Option<&'a T>, field: &str) -> ThandResult<&'a T> {
    value.ok_or_else(|| {
        ValidationError::RequiredFieldMissing {
            field: field.to_string(),
        }
        .into()
    })
}

/// Grant a role through a back-end's primitives; see the contract docs
/// for the step order. Stops at the first fatal error so the ledger only
/// ever reflects completed side effects.
pub async fn authorize<P: Provider + ?Sized>(
    provider: &P,
    request: &AuthorizeRoleRequest,
) -> ThandResult<AuthorizeRoleResponse> {
    let user = required(request.user.as_ref(), "user")?;
    let role = required(request.role.as_ref(), "role")?;

    let provider_user = provider.resolve_user(&user.email).await?;
    let mut response = AuthorizeRoleResponse::for_user(&provider_user.id);
    response.metadata.insert(
        "provider".to_string(),
        serde_json::Value::String(provider.name()),
    );
    response.metadata.insert(
        "role".to_string(),
        serde_json::Value::String(role.name.clone()),
    );

    authorize_groups(provider, role, &provider_user, &mut response).await?;
    authorize_inherited_roles(provider, role, &provider_user, &mut response).await?;
    authorize_permissions(provider, role, &provider_user, &mut response).await?;
    authorize_resources(provider, role, &provider_user, &mut response).await?;

    debug!(
        user = %provider_user.id,
        role = %role.name,
        roles = response.roles.len(),
        groups = response.groups.len(),
        resources = response.resources.len(),
        "authorized role"
    );
    Ok(response)
}

async fn authorize_groups<P: Provider + ?Sized>(
    provider: &P,
    role: &Role,
    user: &User,
    response: &mut AuthorizeRoleResponse,
) -> ThandResult<()> {
    for group_key in &role.groups.allow {
        let identity = provider.get_identity(group_key)?;
        let group = identity.group.as_ref().ok_or_else(|| {
            ProviderError::Misconfigured {
                provider: provider.name(),
                reason: format!("identity `{group_key}` is not a group"),
            }
        })?;
        match provider.add_user_to_group(&user.id, &group.id).await {
            Ok(()) => response.groups.push(group.id.clone()),
            Err(err) if err.is_conflict() => {
                warn!(group = %group.id, "user already in group, keeping standing membership");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

async fn authorize_inherited_roles<P: Provider + ?Sized>(
    provider: &P,
    role: &Role,
    user: &User,
    response: &mut AuthorizeRoleResponse,
) -> ThandResult<()> {
    let provider_name = provider.name();
    for inherited in &role.inherits {
        // Only entries addressed to this provider are assignable here;
        // other prefixes belong to their own providers and bare names
        // are local templates.
        let name = match inherited.split_once(':') {
            Some((prefix, rest)) if prefix == provider_name => rest,
            Some(_) => continue,
            None => inherited.as_str(),
        };
        let provider_role = match provider.get_role(name) {
            Ok(provider_role) => provider_role,
            Err(_) if !inherited.contains(':') => continue,
            Err(err) => return Err(err),
        };
        match provider.assign_role(&user.id, &provider_role.id).await {
            Ok(()) => response.roles.push(provider_role.id),
            Err(err) if err.is_conflict() => {
                // A standing grant: success, but revoking it later would
                // take away access we never gave.
                warn!(role = %provider_role.id, "role already assigned, omitting from ledger");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

async fn authorize_permissions<P: Provider + ?Sized>(
    provider: &P,
    role: &Role,
    user: &User,
    response: &mut AuthorizeRoleResponse,
) -> ThandResult<()> {
    if role.permissions.allow.is_empty() || role.is_purely_inheriting() {
        return Ok(());
    }

    let label = format!("thand-{}", role.name);
    let custom = provider
        .ensure_custom_role(&label, &role.permissions.allow)
        .await?;
    match provider.assign_role(&user.id, &custom.id).await {
        Ok(()) => {}
        Err(err) if err.is_conflict() => {
            warn!(role = %custom.id, "custom role already assigned");
        }
        Err(err) => return Err(err),
    }
    response.roles.push(custom.id.clone());
    response.permissions = role.permissions.allow.clone();
    response.metadata.insert(
        CUSTOM_ROLES_KEY.to_string(),
        serde_json::json!([custom.id]),
    );
    Ok(())
}

async fn authorize_resources<P: Provider + ?Sized>(
    provider: &P,
    role: &Role,
    user: &User,
    response: &mut AuthorizeRoleResponse,
) -> ThandResult<()> {
    for entry in &role.resources.allow {
        match TypedResource::parse(entry) {
            Some(resource) if KNOWN_RESOURCE_TYPES.contains(&resource.resource_type.as_str()) => {
                provider.assign_resource(&user.id, &resource).await?;
                response.resources.push(entry.clone());
            }
            Some(resource) => {
                warn!(
                    resource = %entry,
                    resource_type = %resource.resource_type,
                    "unknown resource type, skipping"
                );
            }
            None => {
                warn!(resource = %entry, "resource entry has no type prefix, skipping");
            }
        }
    }
    Ok(())
}

/// Undo everything the ledger lists. Never stops early: failures are
/// collected per item and returned together as a retryable error, and
/// lookups that miss (already gone) are logged and swallowed so retries
/// stay idempotent.
pub async fn revoke<P: Provider + ?Sized>(
    provider: &P,
    request: &RevokeRoleRequest,
) -> ThandResult<()> {
    let ledger = required(request.authorize_role_response.as_ref(), "authorize_role_response")?;

    let user_id = if !ledger.user_id.is_empty() {
        ledger.user_id.clone()
    } else {
        let user = required(request.user.as_ref(), "user")?;
        provider.resolve_user(&user.email).await?.id
    };

    let custom_roles: HashSet<String> = ledger
        .metadata
        .get(CUSTOM_ROLES_KEY)
        .and_then(|value| serde_json::from_value(value.clone()).ok())
        .unwrap_or_default();

    let mut failures = Vec::new();

    for role_id in &ledger.roles {
        match provider.unassign_role(&user_id, role_id).await {
            Ok(()) => {
                if custom_roles.contains(role_id) {
                    if let Err(err) = provider.delete_custom_role(role_id).await {
                        warn!(role = %role_id, %err, "failed to delete custom role");
                    }
                }
            }
            Err(err) if err.is_not_found() => {
                debug!(role = %role_id, "role assignment already gone");
            }
            Err(err) => failures.push(format!("role {role_id}: {err}")),
        }
    }

    for group_id in &ledger.groups {
        match provider.remove_user_from_group(&user_id, group_id).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                debug!(group = %group_id, "group membership already gone");
            }
            Err(err) => failures.push(format!("group {group_id}: {err}")),
        }
    }

    for entry in &ledger.resources {
        let Some(resource) = TypedResource::parse(entry) else {
            warn!(resource = %entry, "ledger resource entry has no type prefix, skipping");
            continue;
        };
        match provider.unassign_resource(&user_id, &resource).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                debug!(resource = %entry, "resource assignment already gone");
            }
            Err(err) => failures.push(format!("resource {entry}: {err}")),
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(ProviderError::RevocationIncomplete { failures }.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_resource_parse() {
        let resource = TypedResource::parse("application:appA").expect("parse");
        assert_eq!(resource.resource_type, "application");
        assert_eq!(resource.id, "appA");
        assert_eq!(resource.as_entry(), "application:appA");

        assert!(TypedResource::parse("untyped").is_none());
        assert!(TypedResource::parse(":empty").is_none());
        assert!(TypedResource::parse("empty:").is_none());
    }
}
