//! Wire types for the REST directory API

use serde::{Deserialize, Serialize};

/// Error envelope returned by the directory API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub error: ApiErrorDetail,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// Membership and assignment bodies.
#[derive(Debug, Clone, Serialize)]
pub struct MemberBody {
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoleAssignmentBody {
    pub role_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateRoleBody {
    pub name: String,
    pub permissions: Vec<String>,
}
