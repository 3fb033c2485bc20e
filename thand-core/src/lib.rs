//! Thand Core - Entity Types
//!
//! Pure data structures shared by every crate in the workspace: identities,
//! role templates, provider catalog records, sessions, elevation requests,
//! definition files, and the envelope codec. No provider logic lives here.

// Core modules
mod capability;
mod definitions;
mod elevation;
mod encoding;
mod error;
mod identity;
mod interpolate;
mod pagination;
mod rbac;
mod role;
mod search;
mod session;

// Re-export capability enums
pub use capability::*;

// Re-export definition file types
pub use definitions::*;

// Re-export elevation types
pub use elevation::*;

// Re-export the envelope codec
pub use encoding::*;

// Re-export error types
pub use error::*;

// Re-export identity types
pub use identity::*;

// Re-export config interpolation
pub use interpolate::*;

// Re-export pagination types
pub use pagination::*;

// Re-export provider catalog records
pub use rbac::*;

// Re-export role template types
pub use role::*;

// Re-export search types
pub use search::*;

// Re-export session types
pub use session::*;

/// Timestamp type using UTC timezone.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
