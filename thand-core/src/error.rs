//! Error types for Thand operations

use thiserror::Error;

/// Provider back-end errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Sentinel for operations a back-end does not support. Suppressed
    /// during synchronization, surfaced everywhere a default is not
    /// acceptable.
    #[error("operation not implemented by provider")]
    NotImplemented,

    #[error("provider {provider} does not declare the {capability} capability")]
    MissingCapability { provider: String, capability: String },

    #[error("provider {provider} is not registered")]
    NotRegistered { provider: String },

    #[error("request to {provider} failed with status {status}: {message}")]
    RequestFailed {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("rate limited by {provider}")]
    RateLimited { provider: String },

    #[error("{provider} reports the assignment already exists ({code})")]
    AlreadyAssigned { provider: String, code: String },

    #[error("{provider} returned not found for {path}")]
    EndpointNotFound { provider: String, path: String },

    #[error("provider {provider} is misconfigured: {reason}")]
    Misconfigured { provider: String, reason: String },

    /// Revocation kept going across categories; everything that stayed
    /// in place is listed so a retry can re-attempt exact items.
    #[error("revocation left {} item(s) in place: {}", failures.len(), failures.join("; "))]
    RevocationIncomplete { failures: Vec<String> },
}

/// Role and request validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("role {role} has no permissions")]
    EmptyRole { role: String },

    #[error("role {role} is disabled")]
    DisabledRole { role: String },

    #[error("requested permission not found: {permission}")]
    PermissionNotFound { permission: String },

    #[error("role {role} inherits from non-existent role {inherited}")]
    UnknownInheritedRole { role: String, inherited: String },

    #[error("user {user} is not in scope for role {role}")]
    ScopeDenied { user: String, role: String },

    #[error("session {uuid} has expired")]
    SessionExpired { uuid: String },
}

/// Catalog lookup errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("{kind:?} not found: {key}")]
    NotFound { kind: CatalogKind, key: String },
}

/// Which catalog a lookup failed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogKind {
    Identity,
    Permission,
    Role,
    Resource,
}

/// Synchronization errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// One or more capability loops failed. Successful loops are not
    /// rolled back; the catalog keeps whatever was accumulated.
    #[error("synchronization completed with {} error(s): {}", errors.len(), errors.join("; "))]
    Aggregate { errors: Vec<String> },

    #[error("synchronization deadline of {seconds}s exceeded")]
    DeadlineExceeded { seconds: u64 },

    #[error("failed to start workflow {workflow}: {reason}")]
    WorkflowStart { workflow: String, reason: String },

    #[error("workflow {workflow} failed: {reason}")]
    WorkflowFailed { workflow: String, reason: String },

    #[error("activity {activity} failed: {reason}")]
    ActivityFailed { activity: String, reason: String },

    #[error("upstream {operation} failed: {reason}")]
    UpstreamFailed { operation: String, reason: String },

    #[error("chunk channel closed before commit")]
    ChannelClosed,
}

/// Envelope codec errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("invalid session type: expected {expected}, found {found}")]
    KindMismatch { expected: String, found: String },

    #[error("JSON codec failed: {reason}")]
    Json { reason: String },

    #[error("deflate failed: {reason}")]
    Deflate { reason: String },

    #[error("base64 decode failed: {reason}")]
    Base64 { reason: String },

    #[error("encryption stage failed: {reason}")]
    Encryption { reason: String },
}

/// Configuration and definition file errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("unsupported definition version: {version}")]
    UnsupportedVersion { version: String },

    #[error("failed to parse definition file: {reason}")]
    ParseFailed { reason: String },

    #[error("expression `{expression}` failed to resolve: {reason}")]
    Interpolation { expression: String, reason: String },

    #[error("provider kind not supported: {kind}")]
    UnknownProviderKind { kind: String },
}

/// Master error type for all Thand operations.
#[derive(Debug, Clone, Error)]
pub enum ThandError {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for Thand operations.
pub type ThandResult<T> = Result<T, ThandError>;

impl ThandError {
    /// True for the NotImplemented sentinel. Sync loops suppress it,
    /// revocation propagates it only when no fallback path exists.
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, ThandError::Provider(ProviderError::NotImplemented))
    }

    /// True when the underlying IAM reports the grant already exists.
    /// Treated as success by authorize, but excluded from the revoke
    /// ledger so a standing grant is never removed.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            ThandError::Provider(ProviderError::AlreadyAssigned { .. })
        )
    }

    /// True for failures worth retrying with backoff (rate limits and
    /// server-side faults).
    pub fn is_transient(&self) -> bool {
        match self {
            ThandError::Provider(ProviderError::RateLimited { .. }) => true,
            ThandError::Provider(ProviderError::RequestFailed { status, .. }) => {
                *status == 429 || *status >= 500
            }
            ThandError::Provider(ProviderError::RevocationIncomplete { .. }) => true,
            _ => false,
        }
    }

    /// True for lookup misses against a catalog or provider.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ThandError::Catalog(CatalogError::NotFound { .. })
                | ThandError::Provider(ProviderError::EndpointNotFound { .. })
        )
    }
}
