//! Session types

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{identity::User, Timestamp};

/// An authenticated session held by the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Session {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub uuid: Uuid,
    pub user: User,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub expiry: Timestamp,
}

impl Session {
    pub fn new(user: User, access_token: impl Into<String>, expiry: Timestamp) -> Self {
        Self {
            uuid: Uuid::now_v7(),
            user,
            access_token: access_token.into(),
            refresh_token: None,
            expiry,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn is_expired(&self) -> bool {
        self.expiry <= Utc::now()
    }
}

/// The exportable, expiring envelope stored client-side. Travels inside
/// an [`EncodingWrapper`](crate::EncodingWrapper) with the
/// `session_local` kind tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LocalSession {
    pub session: Session,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub issued_at: Timestamp,
}

impl LocalSession {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            issued_at: Utc::now(),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.session.is_expired()
    }
}
