use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionType {
    /// Short-lived code, regenerated by the display when it runs out
    Rotating,
    /// Long-lived code meant to stay up unattended
    Static,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrSession {
    pub session_id: String,
    pub session_type: SessionType,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub is_active: bool,
    pub created_by: u64,
}

impl QrSession {
    /// Usable sessions are active and not yet past `expires_at`.
    pub fn is_usable_at(&self, now: NaiveDateTime) -> bool {
        self.is_active && !self.is_expired_at(now)
    }

    pub fn is_expired_at(&self, now: NaiveDateTime) -> bool {
        self.expires_at <= now
    }

    pub fn lifetime(&self) -> Duration {
        self.expires_at - self.created_at
    }
}

/// Why a session cannot be used for a check-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SessionRejection {
    NotFound,
    Inactive,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionValidation {
    Valid(QrSession),
    Rejected(SessionRejection),
}

/// Wire shape of a session, with the QR image rendered on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "session_id": "0b7f9a3c-5a43-4c1e-9d1e-3c2f6f0d8a11",
    "type": "rotating",
    "issued_at": "2026-01-05T09:00:00",
    "expires_at": "2026-01-05T09:01:00",
    "imageDataUrl": "data:image/png;base64,iVBORw0KGgo..."
}))]
pub struct SessionView {
    pub session_id: String,
    #[serde(rename = "type")]
    pub session_type: SessionType,
    #[schema(value_type = String, format = "date-time")]
    pub issued_at: NaiveDateTime,
    #[schema(value_type = String, format = "date-time")]
    pub expires_at: NaiveDateTime,
    #[serde(rename = "imageDataUrl")]
    pub image_data_url: String,
}

impl SessionView {
    pub fn new(session: &QrSession, image_data_url: String) -> Self {
        Self {
            session_id: session.session_id.clone(),
            session_type: session.session_type,
            issued_at: session.created_at,
            expires_at: session.expires_at,
            image_data_url,
        }
    }

    pub fn lifetime(&self) -> Duration {
        self.expires_at - self.issued_at
    }

    /// Time until expiry as of `now`, zero once it has passed.
    pub fn remaining(&self, now: NaiveDateTime) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }
}
