use crate::{
    auth::auth::AuthUser,
    error::AppError,
    model::{
        attendance::{AttendanceOverride, AttendanceRecord, AttendanceStatus, CheckinView},
        employee::EmployeeIdentifier,
    },
    service::attendance::{AttendanceService, BreakAction, CheckinOutcome, MutationOutcome},
};
use actix_web::{HttpResponse, Responder, web};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckinRequest {
    #[schema(example = "0b7f9a3c-5a43-4c1e-9d1e-3c2f6f0d8a11")]
    pub session_id: String,
    /// Numeric employee id, or an email / employee code / username
    pub employee_id: EmployeeIdentifier,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CheckinResponse {
    pub record: CheckinView,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub employee_id: EmployeeIdentifier,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BreakRequest {
    pub employee_id: EmployeeIdentifier,
    #[schema(example = "in")]
    pub action: BreakAction,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OverrideRequest {
    pub employee_id: EmployeeIdentifier,
    #[schema(example = "2026-01-05", value_type = String, format = "date")]
    pub date: NaiveDate,
    #[schema(example = "present")]
    pub status: AttendanceStatus,
    /// Defaults to midnight when the employee never arrived
    #[schema(example = "09:00:00", value_type = Option<String>)]
    pub time_in: Option<NaiveTime>,
    #[schema(example = "17:30:00", value_type = Option<String>)]
    pub time_out: Option<NaiveTime>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RecordResponse {
    pub record: AttendanceRecord,
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct AttendanceQuery {
    /// Day to list, defaults to today
    #[schema(example = "2026-01-05", value_type = Option<String>, format = "date")]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AttendanceListResponse {
    #[schema(example = "2026-01-05", value_type = String, format = "date")]
    pub date: NaiveDate,
    pub data: Vec<AttendanceRecord>,
}

async fn resolve(
    service: &AttendanceService,
    ident: EmployeeIdentifier,
) -> Result<u64, AppError> {
    service
        .resolve_employee(ident)
        .await?
        .ok_or_else(|| AppError::NotFound {
            code: "employee_not_found",
            message: "No active employee matches that identifier".into(),
        })
}

/// Resolves the target of a self-service call. Employees get the same 403 for
/// someone else's identifier and for one that matches nobody.
async fn resolve_own(
    auth: &AuthUser,
    service: &AttendanceService,
    ident: EmployeeIdentifier,
) -> Result<u64, AppError> {
    if auth.is_hr_or_admin() {
        return resolve(service, ident).await;
    }
    let employee_id = service
        .resolve_employee(ident)
        .await?
        .ok_or_else(AuthUser::not_own_attendance)?;
    auth.require_self_or_hr(employee_id)?;
    Ok(employee_id)
}

fn updated(outcome: MutationOutcome) -> Result<HttpResponse, AppError> {
    match outcome {
        MutationOutcome::Updated(record) => Ok(HttpResponse::Ok().json(RecordResponse { record })),
        MutationOutcome::Rejected(reason) => Err(reason.into()),
    }
}

/// Scan-based check-in against the QR session on display
#[utoipa::path(
    post,
    path = "/api/attendance/checkin",
    request_body = CheckinRequest,
    responses(
        (status = 200, description = "Checked in", body = CheckinResponse),
        (status = 404, description = "Unknown employee or QR code", body = Object, example = json!({
            "error": "session_not_found",
            "message": "Unknown QR code, scan the code currently on display"
        })),
        (status = 409, description = "Already checked in today, or code no longer active", body = Object, example = json!({
            "error": "already_checked_in",
            "message": "Already checked in today",
            "record": {"timestamp": "2026-01-05T09:02:11", "status": "present", "employee_id": 42}
        })),
        (status = 410, description = "QR code expired", body = Object, example = json!({
            "error": "session_expired",
            "message": "Session expired, ask HR to regenerate"
        })),
        (status = 429, description = "Too many requests"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Attendance"
)]
pub async fn check_in(
    service: web::Data<AttendanceService>,
    payload: web::Json<CheckinRequest>,
) -> Result<impl Responder, AppError> {
    let CheckinRequest {
        session_id,
        employee_id,
    } = payload.into_inner();

    let session_id = session_id.trim();
    if session_id.is_empty() {
        return Err(AppError::Validation("session_id must not be empty".into()));
    }

    match service.checkin(session_id, employee_id).await? {
        CheckinOutcome::CheckedIn(record) => Ok(HttpResponse::Ok().json(CheckinResponse {
            record: record.normalized(),
        })),
        CheckinOutcome::Rejected(reason) => Err(reason.into()),
    }
}

/// End of day check-out
#[utoipa::path(
    post,
    path = "/api/attendance/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Checked out", body = RecordResponse),
        (status = 409, description = "No open record for today", body = Object, example = json!({
            "error": "no_open_record",
            "message": "No open attendance record for today"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn check_out(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    payload: web::Json<CheckoutRequest>,
) -> Result<impl Responder, AppError> {
    let employee_id = resolve_own(&auth, &service, payload.into_inner().employee_id).await?;

    updated(service.checkout(employee_id).await?)
}

/// Start (`in`) or end (`out`) a break
#[utoipa::path(
    post,
    path = "/api/attendance/break",
    request_body = BreakRequest,
    responses(
        (status = 200, description = "Break updated", body = RecordResponse),
        (status = 409, description = "No record today, or no break in progress", body = Object, example = json!({
            "error": "break_not_started",
            "message": "No break in progress"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn toggle_break(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    payload: web::Json<BreakRequest>,
) -> Result<impl Responder, AppError> {
    let BreakRequest {
        employee_id,
        action,
    } = payload.into_inner();
    let employee_id = resolve_own(&auth, &service, employee_id).await?;

    debug!(employee_id, action = %action, "Break request");
    updated(service.toggle_break(employee_id, action).await?)
}

/// HR correction of a day's record
#[utoipa::path(
    post,
    path = "/api/attendance/override",
    request_body = OverrideRequest,
    responses(
        (status = 200, description = "Record written", body = RecordResponse),
        (status = 400, description = "Invalid times"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Employee not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn override_record(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    payload: web::Json<OverrideRequest>,
) -> Result<impl Responder, AppError> {
    auth.require_hr_or_admin()?;

    let req = payload.into_inner();
    let time_in = req.time_in.unwrap_or(NaiveTime::MIN);
    if matches!(req.time_out, Some(out) if out < time_in) {
        return Err(AppError::Validation(
            "time_out cannot be before time_in".into(),
        ));
    }

    let employee_id = resolve(&service, req.employee_id).await?;
    let record = service
        .override_record(AttendanceOverride {
            employee_id,
            date: req.date,
            time_in,
            time_out: req.time_out,
            status: req.status,
        })
        .await?;

    info!(user_id = auth.user_id, employee_id, date = %record.date, "Override applied");
    Ok(HttpResponse::Ok().json(RecordResponse { record }))
}

/// Records for one day, for the HR dashboard
#[utoipa::path(
    get,
    path = "/api/attendance",
    params(AttendanceQuery),
    responses(
        (status = 200, description = "Attendance for the day", body = AttendanceListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn list_attendance(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    query: web::Query<AttendanceQuery>,
) -> Result<impl Responder, AppError> {
    auth.require_hr_or_admin()?;

    let date = query.date.unwrap_or_else(|| service.today());
    let data = service.list(date).await?;

    Ok(HttpResponse::Ok().json(AttendanceListResponse { date, data }))
}
