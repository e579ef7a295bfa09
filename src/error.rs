use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use derive_more::Display;
use serde_json::{Value, json};
use tracing::error;

use crate::model::attendance::AttendanceRecord;
use crate::model::qr_session::SessionRejection;
use crate::service::attendance::{CheckinRejection, MutationRejection};
use crate::service::qr_session::SessionError;
use crate::store::StoreError;

/// Everything a handler can answer with besides success. Business conditions
/// carry a stable `code` the client maps to a message; storage failures are
/// logged and answered with a generic body.
#[derive(Debug, Display)]
pub enum AppError {
    #[display(fmt = "{}", _0)]
    Validation(String),
    #[display(fmt = "{}", message)]
    NotFound { code: &'static str, message: String },
    #[display(fmt = "{}", message)]
    Conflict {
        code: &'static str,
        message: String,
        record: Option<Value>,
    },
    #[display(fmt = "{}", message)]
    Gone { code: &'static str, message: String },
    #[display(fmt = "{}", _0)]
    Forbidden(String),
    #[display(fmt = "Internal Server Error")]
    Storage,
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::NotFound { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::Gone { code, .. } => *code,
            AppError::Forbidden(_) => "forbidden",
            AppError::Storage => "internal_error",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::Gone { .. } => StatusCode::GONE,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Storage => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut body = json!({
            "error": self.code(),
            "message": self.to_string(),
        });
        if let AppError::Conflict {
            record: Some(record),
            ..
        } = self
        {
            body["record"] = record.clone();
        }
        HttpResponse::build(self.status_code()).json(body)
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        error!(error = %e, "Storage failure");
        AppError::Storage
    }
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Validation(msg) => AppError::Validation(msg),
            SessionError::Storage(e) => e.into(),
            SessionError::Render(e) => {
                error!(error = %e, "QR rendering failed");
                AppError::Storage
            }
        }
    }
}

impl From<CheckinRejection> for AppError {
    fn from(reason: CheckinRejection) -> Self {
        let code = reason.code();
        match reason {
            CheckinRejection::EmployeeNotFound => AppError::NotFound {
                code,
                message: "No active employee matches that identifier".into(),
            },
            CheckinRejection::Session(SessionRejection::NotFound) => {
                AppError::NotFound {
                    code,
                    message: "Unknown QR code, scan the code currently on display".into(),
                }
            }
            CheckinRejection::Session(SessionRejection::Inactive) => {
                AppError::Conflict {
                    code,
                    message: "This QR code is no longer active, ask HR to regenerate".into(),
                    record: None,
                }
            }
            CheckinRejection::Session(SessionRejection::Expired) => {
                AppError::Gone {
                    code,
                    message: "Session expired, ask HR to regenerate".into(),
                }
            }
            CheckinRejection::AlreadyCheckedIn(existing) => AppError::Conflict {
                code,
                message: "Already checked in today".into(),
                record: Some(checkin_json(&existing)),
            },
        }
    }
}

impl From<MutationRejection> for AppError {
    fn from(reason: MutationRejection) -> Self {
        let message = match reason {
            MutationRejection::NoOpenRecord => "No open attendance record for today",
            MutationRejection::BreakNotStarted => "No break in progress",
        };
        let code: &'static str = reason.into();
        AppError::Conflict {
            code,
            message: message.into(),
            record: None,
        }
    }
}

fn checkin_json(record: &AttendanceRecord) -> Value {
    serde_json::to_value(record.normalized()).unwrap_or(Value::Null)
}
