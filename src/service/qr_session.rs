use std::sync::Arc;

use chrono::Duration;
use derive_more::Display;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::model::qr_session::{
    QrSession, SessionRejection, SessionType, SessionValidation, SessionView,
};
use crate::qr::render::{self, RenderError};
use crate::service::clock::Clock;
use crate::store::{QrSessionStore, StoreError};

pub const MAX_ROTATING_MINUTES: u32 = 60;
pub const MAX_STATIC_HOURS: u32 = 24 * 365;

/// Lifetime defaults applied when a generate call names no duration.
#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    pub rotating_default_minutes: u32,
    pub static_default_hours: u32,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            rotating_default_minutes: 1,
            static_default_hours: 24,
        }
    }
}

impl SessionPolicy {
    /// Rotating durations are minutes, static ones hours.
    pub fn lifetime(
        &self,
        session_type: SessionType,
        requested: Option<u32>,
    ) -> Result<Duration, SessionError> {
        match session_type {
            SessionType::Rotating => {
                let minutes = requested.unwrap_or(self.rotating_default_minutes);
                if minutes == 0 || minutes > MAX_ROTATING_MINUTES {
                    return Err(SessionError::Validation(format!(
                        "duration_minutes must be between 1 and {}",
                        MAX_ROTATING_MINUTES
                    )));
                }
                Ok(Duration::minutes(minutes.into()))
            }
            SessionType::Static => {
                let hours = requested.unwrap_or(self.static_default_hours);
                if hours == 0 || hours > MAX_STATIC_HOURS {
                    return Err(SessionError::Validation(format!(
                        "duration_hours must be between 1 and {}",
                        MAX_STATIC_HOURS
                    )));
                }
                Ok(Duration::hours(hours.into()))
            }
        }
    }
}

#[derive(Debug, Display)]
pub enum SessionError {
    #[display(fmt = "{}", _0)]
    Validation(String),
    #[display(fmt = "{}", _0)]
    Storage(StoreError),
    #[display(fmt = "{}", _0)]
    Render(RenderError),
}

impl std::error::Error for SessionError {}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        SessionError::Storage(e)
    }
}

impl From<RenderError> for SessionError {
    fn from(e: RenderError) -> Self {
        SessionError::Render(e)
    }
}

pub struct QrSessionManager {
    store: Arc<dyn QrSessionStore>,
    clock: Arc<dyn Clock>,
    policy: SessionPolicy,
}

impl QrSessionManager {
    pub fn new(store: Arc<dyn QrSessionStore>, clock: Arc<dyn Clock>, policy: SessionPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    /// Issues a new session and retires every other one, whatever its type.
    #[instrument(name = "qr_generate", skip(self))]
    pub async fn generate(
        &self,
        session_type: SessionType,
        requested: Option<u32>,
        created_by: u64,
    ) -> Result<SessionView, SessionError> {
        let lifetime = self.policy.lifetime(session_type, requested)?;
        let now = self.clock.now();

        let session = QrSession {
            session_id: Uuid::new_v4().to_string(),
            session_type,
            created_at: now,
            expires_at: now + lifetime,
            is_active: true,
            created_by,
        };

        self.store.replace_active(&session).await?;

        info!(
            session_id = %session.session_id,
            expires_at = %session.expires_at,
            "QR session issued"
        );

        Ok(SessionView::new(&session, render::png_data_url(&session.session_id)?))
    }

    /// The newest usable session, or `None` when nothing is on display.
    pub async fn current(&self) -> Result<Option<SessionView>, SessionError> {
        let now = self.clock.now();
        let newest = self.store.list_active(now).await?.into_iter().next();

        match newest {
            Some(session) => {
                let image = render::png_data_url(&session.session_id)?;
                Ok(Some(SessionView::new(&session, image)))
            }
            None => Ok(None),
        }
    }

    #[instrument(name = "qr_revoke", skip(self))]
    pub async fn revoke(&self) -> Result<u64, StoreError> {
        let count = self.store.deactivate_all().await?;
        info!(revoked = count, "QR sessions revoked");
        Ok(count)
    }

    /// Checks run in a fixed order: existence, active flag, expiry.
    pub async fn validate_for_use(&self, session_id: &str) -> Result<SessionValidation, StoreError> {
        let Some(session) = self.store.fetch(session_id).await? else {
            return Ok(SessionValidation::Rejected(SessionRejection::NotFound));
        };

        if !session.is_active {
            return Ok(SessionValidation::Rejected(SessionRejection::Inactive));
        }

        if session.is_expired_at(self.clock.now()) {
            return Ok(SessionValidation::Rejected(SessionRejection::Expired));
        }

        Ok(SessionValidation::Valid(session))
    }

    pub async fn sweep_expired(&self) -> Result<u64, StoreError> {
        self.store.deactivate_expired(self.clock.now()).await
    }
}

/// Periodically retires sessions whose lifetime has passed.
pub fn spawn_expiry_sweep(
    manager: Arc<QrSessionManager>,
    every: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    actix_web::rt::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match manager.sweep_expired().await {
                Ok(0) => debug!("QR expiry sweep: nothing to retire"),
                Ok(count) => info!(count, "QR expiry sweep retired sessions"),
                Err(e) => error!(error = %e, "QR expiry sweep failed"),
            }
        }
    })
}
