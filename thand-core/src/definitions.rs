//! Definition files
//!
//! Roles, workflows, and provider instances are declared in YAML or JSON
//! files. YAML is a superset of JSON, so one parser covers both wire
//! forms. Unknown fields are ignored for forward compatibility, and the
//! `version` field tolerates strings, floats, and integers, normalizing
//! them all to semver.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::{role::default_enabled, ConfigError, ProviderKind, Role, ThandResult};

/// A definition-file version tag normalized to semver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[cfg_attr(feature = "openapi", schema(value_type = String))]
#[serde(into = "String")]
pub struct VersionTag(pub semver::Version);

impl VersionTag {
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let trimmed = input.trim().trim_start_matches('v');
        if trimmed.is_empty() {
            return Err(ConfigError::UnsupportedVersion {
                version: input.to_string(),
            });
        }
        // Pad "1" and "1.0" out to full semver.
        let mut candidate = trimmed.to_string();
        let segments = trimmed.split('.').count();
        for _ in segments..3 {
            candidate.push_str(".0");
        }
        semver::Version::parse(&candidate)
            .map(VersionTag)
            .map_err(|_| ConfigError::UnsupportedVersion {
                version: input.to_string(),
            })
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for VersionTag {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<VersionTag> for String {
    fn from(tag: VersionTag) -> Self {
        tag.0.to_string()
    }
}

impl<'de> Deserialize<'de> for VersionTag {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawVersion {
            Text(String),
            Number(f64),
        }

        let raw = RawVersion::deserialize(deserializer)?;
        let text = match raw {
            RawVersion::Text(text) => text,
            // 1 and 1.0 both arrive as 1.0; minor precision is preserved
            // for tags like 1.2.
            RawVersion::Number(number) => {
                if number.fract() == 0.0 {
                    format!("{}", number as i64)
                } else {
                    format!("{}", number)
                }
            }
        };
        VersionTag::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// One provider instance declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ProviderDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Back-end kind to instantiate
    pub provider: ProviderKind,
    /// Back-end configuration; string values may embed `${ … }`
    /// expressions resolved at instantiation
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub config: HashMap<String, serde_json::Value>,
    /// Default role template granted through this provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// `providers:` definition file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ProviderDefinitionFile {
    pub version: VersionTag,
    #[serde(default)]
    pub providers: HashMap<String, ProviderDefinition>,
}

/// `roles:` definition file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RoleDefinitionFile {
    pub version: VersionTag,
    #[serde(default)]
    pub roles: HashMap<String, Role>,
}

/// One workflow declaration; the body is opaque to the engine and
/// handed to the task interpreter as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub workflow: serde_json::Value,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// `workflows:` definition file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct WorkflowDefinitionFile {
    pub version: VersionTag,
    #[serde(default)]
    pub workflows: HashMap<String, WorkflowDefinition>,
}

fn parse_definition<T: serde::de::DeserializeOwned>(input: &str) -> ThandResult<T> {
    serde_yaml::from_str(input)
        .map_err(|err| {
            ConfigError::ParseFailed {
                reason: err.to_string(),
            }
            .into()
        })
}

impl ProviderDefinitionFile {
    /// Parse from YAML or JSON text.
    pub fn from_str(input: &str) -> ThandResult<Self> {
        parse_definition(input)
    }

    /// Enabled definitions, keyed by instance name. The map key wins over
    /// an inline `name` when the two disagree.
    pub fn enabled_providers(&self) -> impl Iterator<Item = (&String, &ProviderDefinition)> {
        self.providers.iter().filter(|(_, def)| def.enabled)
    }
}

impl RoleDefinitionFile {
    pub fn from_str(input: &str) -> ThandResult<Self> {
        parse_definition(input)
    }
}

impl WorkflowDefinitionFile {
    pub fn from_str(input: &str) -> ThandResult<Self> {
        parse_definition(input)
    }
}
