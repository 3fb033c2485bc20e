//! Role validation and permission expansion
//!
//! Expands wildcard and condensed permission entries against a provider's
//! catalog, verifies provider-prefixed inherits, and rewrites the role's
//! allow/deny lists with the expanded forms. The provider's own
//! `validate_role` is consulted first; the sentinel falls back here, any
//! other error is fatal.

use tracing::debug;

use thand_core::{ProviderPermission, Role, ThandResult, User, ValidationError};

use crate::contract::Provider;

/// Validate a role against a provider, preferring the provider's native
/// validation when it has one.
pub async fn validate(
    provider: &dyn Provider,
    user: Option<&User>,
    role: &Role,
) -> ThandResult<Role> {
    match provider.validate_role(user, role).await {
        Ok(validated) => Ok(validated),
        Err(err) if err.is_not_implemented() => validate_local(provider, user, role),
        Err(err) => Err(err),
    }
}

/// Catalog-driven validation used when the back-end has no native
/// validator.
pub fn validate_local(
    provider: &dyn Provider,
    user: Option<&User>,
    role: &Role,
) -> ThandResult<Role> {
    if role.is_empty() {
        return Err(ValidationError::EmptyRole {
            role: role.name.clone(),
        }
        .into());
    }

    if let Some(user) = user {
        if !role.in_scope(user) {
            return Err(ValidationError::ScopeDenied {
                user: user.correlation_key(),
                role: role.name.clone(),
            }
            .into());
        }
    }

    // Inherits entries carrying this provider's prefix must name real
    // provider roles; anything else is a local template reference.
    let prefix = format!("{}:", provider.name());
    for inherited in &role.inherits {
        if let Some(provider_role) = inherited.strip_prefix(&prefix) {
            if provider.get_role(provider_role).is_err() {
                return Err(ValidationError::UnknownInheritedRole {
                    role: role.name.clone(),
                    inherited: inherited.clone(),
                }
                .into());
            }
        }
    }

    let catalog: Vec<ProviderPermission> = provider
        .list_permissions(None)?
        .into_iter()
        .map(|result| result.item)
        .collect();

    let mut validated = role.clone();
    validated.permissions.allow = expand_permissions(&catalog, &role.permissions.allow)?;
    validated.permissions.deny = expand_permissions(&catalog, &role.permissions.deny)?;
    debug!(
        role = %role.name,
        allow = validated.permissions.allow.len(),
        deny = validated.permissions.deny.len(),
        "expanded role permissions"
    );
    Ok(validated)
}

/// Expand one allow/deny list against the permission catalog.
///
/// Order-preserving; duplicates are allowed (downstream is tolerant).
/// A trailing `:*` / `.*` emits every catalog name under the prefix. A
/// last-colon split that yields at least one action emits the condensed
/// expansion unconditionally, so a single-action name like
/// `resource:name` passes through without a catalog lookup; only names
/// with no colon at all must match the catalog exactly.
pub fn expand_permissions(
    catalog: &[ProviderPermission],
    requested: &[String],
) -> ThandResult<Vec<String>> {
    let mut expanded = Vec::with_capacity(requested.len());

    for entry in requested {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }

        if let Some(prefix) = entry
            .strip_suffix(":*")
            .or_else(|| entry.strip_suffix(".*"))
        {
            let needle = prefix.to_lowercase();
            for permission in catalog {
                if permission.name.to_lowercase().starts_with(&needle) {
                    expanded.push(permission.name.clone());
                }
            }
            continue;
        }

        if let Some((resource, action_list)) = entry.rsplit_once(':') {
            let actions: Vec<&str> = action_list
                .split(',')
                .map(str::trim)
                .filter(|action| !action.is_empty())
                .collect();
            if !actions.is_empty() {
                for action in actions {
                    expanded.push(format!("{resource}:{action}"));
                }
                continue;
            }
        }

        match catalog
            .iter()
            .find(|permission| permission.name.eq_ignore_ascii_case(entry))
        {
            Some(permission) => expanded.push(permission.name.clone()),
            None => {
                return Err(ValidationError::PermissionNotFound {
                    permission: entry.to_string(),
                }
                .into());
            }
        }
    }

    Ok(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use thand_core::{Capability, ProviderKind, ProviderRole};

    use crate::base::BaseProvider;

    struct Fixture {
        base: BaseProvider,
    }

    #[async_trait]
    impl Provider for Fixture {
        fn base(&self) -> &BaseProvider {
            &self.base
        }

        fn kind(&self) -> ProviderKind {
            ProviderKind::Memory
        }
    }

    fn provider() -> Fixture {
        let base = BaseProvider::new(vec![Capability::Rbac]);
        base.initialize(
            "okta-prod",
            thand_core::ProviderDefinition {
                name: "okta-prod".to_string(),
                description: String::new(),
                provider: ProviderKind::Okta,
                config: Default::default(),
                role: None,
                enabled: true,
            },
        )
        .expect("init");
        base.set_permissions(vec![
            ProviderPermission::named("iam:list"),
            ProviderPermission::named("iam:get"),
            ProviderPermission::named("s3:get"),
            ProviderPermission::named("standalone"),
        ])
        .expect("permissions");
        base.set_roles(vec![ProviderRole {
            id: "r-admin".to_string(),
            name: "admin".to_string(),
            description: String::new(),
        }])
        .expect("roles");
        Fixture { base }
    }

    fn catalog(provider: &Fixture) -> Vec<ProviderPermission> {
        provider
            .list_permissions(None)
            .expect("catalog")
            .into_iter()
            .map(|result| result.item)
            .collect()
    }

    #[test]
    fn test_wildcard_expansion_preserves_order() {
        let expanded =
            expand_permissions(&catalog(&provider()), &["iam:*".to_string()]).expect("expand");
        assert_eq!(expanded, vec!["iam:list", "iam:get"]);

        let expanded =
            expand_permissions(&catalog(&provider()), &["iam.*".to_string()]).expect("expand");
        assert_eq!(expanded, vec!["iam:list", "iam:get"]);
    }

    #[test]
    fn test_condensed_expansion_splits_last_colon() {
        let expanded = expand_permissions(
            &[],
            &["k8s:pods:get,list,watch".to_string()],
        )
        .expect("expand");
        assert_eq!(expanded, vec!["k8s:pods:get", "k8s:pods:list", "k8s:pods:watch"]);
    }

    #[test]
    fn test_exact_match_emits_canonical_name() {
        let expanded =
            expand_permissions(&catalog(&provider()), &["STANDALONE".to_string()]).expect("expand");
        assert_eq!(expanded, vec!["standalone"]);
    }

    #[test]
    fn test_single_action_passes_without_lookup() {
        // The condensed branch fires for any name with a colon, so an
        // unknown `resource:name` survives expansion unchanged.
        let expanded =
            expand_permissions(&[], &["ghost:permission".to_string()]).expect("expand");
        assert_eq!(expanded, vec!["ghost:permission"]);
    }

    #[test]
    fn test_unknown_bare_name_fails() {
        let err = expand_permissions(&catalog(&provider()), &["ghost".to_string()])
            .expect_err("must fail");
        assert!(err.to_string().contains("requested permission not found"));
    }

    #[test]
    fn test_identity_on_exact_permissions() {
        let names = vec!["iam:list".to_string()];
        let expanded = expand_permissions(&catalog(&provider()), &names).expect("expand");
        assert_eq!(expanded, names);
    }

    #[tokio::test]
    async fn test_validate_expands_role() {
        let provider = provider();
        let mut role = Role::new("reader");
        role.permissions.allow = vec!["iam:*".to_string()];
        let validated = validate(&provider, None, &role).await.expect("validate");
        assert_eq!(validated.permissions.allow, vec!["iam:list", "iam:get"]);
    }

    #[tokio::test]
    async fn test_validate_rejects_empty_role() {
        let provider = provider();
        let err = validate(&provider, None, &Role::new("shell"))
            .await
            .expect_err("must fail");
        assert!(err.to_string().contains("has no permissions"));
    }

    #[tokio::test]
    async fn test_inheritance_miss() {
        let provider = provider();
        let mut role = Role::new("elevated");
        role.inherits = vec!["okta-prod:ghost_role".to_string()];
        let err = validate(&provider, None, &role).await.expect_err("must fail");
        assert!(err
            .to_string()
            .contains("inherits from non-existent role okta-prod:ghost_role"));
    }

    #[tokio::test]
    async fn test_inheritance_hit_and_local_skip() {
        let provider = provider();
        let mut role = Role::new("elevated");
        role.inherits = vec![
            "okta-prod:admin".to_string(),
            // No provider prefix: treated as local, skipped.
            "base-template".to_string(),
            // Another provider's prefix: not ours to check.
            "aws-dev:poweruser".to_string(),
        ];
        assert!(validate(&provider, None, &role).await.is_ok());
    }

    #[tokio::test]
    async fn test_scope_denied_when_user_out_of_scope() {
        let provider = provider();
        let mut role = Role::new("restricted");
        role.permissions.allow = vec!["iam:get".to_string()];
        role.scopes = Some(thand_core::RoleScopes {
            domains: vec!["other.com".to_string()],
            ..Default::default()
        });
        let user = User {
            email: "alice@example.com".to_string(),
            ..Default::default()
        };
        let err = validate(&provider, Some(&user), &role)
            .await
            .expect_err("must fail");
        assert!(err.to_string().contains("not in scope"));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Exact catalog names always expand to themselves.
            #[test]
            fn prop_exact_names_are_fixed_points(name in "[a-z]{1,8}") {
                let catalog = vec![ProviderPermission::named(name.clone())];
                let expanded =
                    expand_permissions(&catalog, &[name.clone()]).expect("expand");
                prop_assert_eq!(expanded, vec![name]);
            }

            /// Wildcards emit exactly the catalog names under the prefix.
            #[test]
            fn prop_wildcard_matches_prefix_filter(
                prefix in "[a-z]{1,4}",
                suffixes in proptest::collection::vec("[a-z]{1,4}", 0..6),
            ) {
                let catalog: Vec<ProviderPermission> = suffixes
                    .iter()
                    .map(|suffix| ProviderPermission::named(format!("{prefix}:{suffix}")))
                    .chain(std::iter::once(ProviderPermission::named("zz-other")))
                    .collect();
                let expanded =
                    expand_permissions(&catalog, &[format!("{prefix}:*")]).expect("expand");
                let expected: Vec<String> = catalog
                    .iter()
                    .map(|permission| permission.name.clone())
                    .filter(|name| name.starts_with(&prefix))
                    .collect();
                prop_assert_eq!(expanded, expected);
            }

            /// Condensed lists expand pairwise on the last colon.
            #[test]
            fn prop_condensed_expansion(
                resource in "[a-z]{1,6}(:[a-z]{1,6})?",
                actions in proptest::collection::vec("[a-z]{1,6}", 1..5),
            ) {
                let entry = format!("{resource}:{}", actions.join(","));
                let expanded = expand_permissions(&[], &[entry]).expect("expand");
                let expected: Vec<String> = actions
                    .iter()
                    .map(|action| format!("{resource}:{action}"))
                    .collect();
                prop_assert_eq!(expanded, expected);
            }
        }
    }
}
