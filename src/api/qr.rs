use crate::{
    auth::auth::AuthUser,
    error::AppError,
    model::qr_session::{SessionType, SessionView},
    service::qr_session::QrSessionManager,
};
use actix_web::{HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct GenerateQr {
    #[serde(rename = "type")]
    #[schema(example = "rotating")]
    pub session_type: SessionType,
    /// Lifetime of a rotating code, defaults to 1 minute
    #[schema(example = 1)]
    pub duration_minutes: Option<u32>,
    /// Lifetime of a static code, defaults to 24 hours
    #[schema(example = 24)]
    pub duration_hours: Option<u32>,
}

impl GenerateQr {
    /// The duration field that applies to the requested type.
    fn requested_duration(&self) -> Option<u32> {
        match self.session_type {
            SessionType::Rotating => self.duration_minutes,
            SessionType::Static => self.duration_hours,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    pub session: SessionView,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RevokeResponse {
    #[serde(rename = "revokedCount")]
    #[schema(example = 1)]
    pub revoked_count: u64,
}

/// Issue a new QR session, retiring whichever one is active
#[utoipa::path(
    post,
    path = "/api/qr/generate",
    request_body = GenerateQr,
    responses(
        (status = 200, description = "Session issued", body = SessionResponse),
        (status = 400, description = "Invalid duration", body = Object, example = json!({
            "error": "validation_error",
            "message": "duration_minutes must be between 1 and 60"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "QR"
)]
pub async fn generate(
    auth: AuthUser,
    sessions: web::Data<QrSessionManager>,
    payload: web::Json<GenerateQr>,
) -> Result<impl Responder, AppError> {
    auth.require_hr_or_admin()?;

    let session = sessions
        .generate(
            payload.session_type,
            payload.requested_duration(),
            auth.user_id,
        )
        .await?;

    info!(user_id = auth.user_id, session_type = %session.session_type, "QR generated");

    Ok(HttpResponse::Ok().json(SessionResponse { session }))
}

/// Fetch the session currently on display
#[utoipa::path(
    get,
    path = "/api/qr/current",
    responses(
        (status = 200, description = "Active session", body = SessionResponse),
        (status = 404, description = "No active session", body = Object, example = json!({
            "error": "no_active_session",
            "message": "No active QR session"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "QR"
)]
pub async fn current(
    auth: AuthUser,
    sessions: web::Data<QrSessionManager>,
) -> Result<impl Responder, AppError> {
    auth.require_hr_or_admin()?;

    match sessions.current().await? {
        Some(session) => Ok(HttpResponse::Ok().json(SessionResponse { session })),
        None => Ok(HttpResponse::NotFound().json(json!({
            "error": "no_active_session",
            "message": "No active QR session"
        }))),
    }
}

/// Deactivate every active session
#[utoipa::path(
    post,
    path = "/api/qr/revoke",
    responses(
        (status = 200, description = "Sessions revoked", body = RevokeResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "QR"
)]
pub async fn revoke(
    auth: AuthUser,
    sessions: web::Data<QrSessionManager>,
) -> Result<impl Responder, AppError> {
    auth.require_hr_or_admin()?;

    let revoked_count = sessions.revoke().await?;

    Ok(HttpResponse::Ok().json(RevokeResponse { revoked_count }))
}
