//! Thand Providers - Capability-Gated Provider Surface
//!
//! The uniform contract every identity-provider back-end implements,
//! the shared base state behind it, and the engine-side RBAC logic:
//! - [`Provider`] contract with default `NotImplemented` operations
//! - [`BaseProvider`] owning the capability-gated catalogs
//! - role validation with wildcard/condensed permission expansion
//! - authorize/revoke orchestration over back-end primitives
//! - the build-once [`ProviderRegistry`]
//! - memory and REST back-ends

mod base;
mod contract;
pub mod providers;
mod registry;

pub mod rbac;
pub mod validator;

pub use base::{BaseProvider, IdentityCatalog, RbacCatalog};
pub use contract::{Notification, Provider};
pub use rbac::TypedResource;
pub use registry::{instantiate, ProviderRegistry};
