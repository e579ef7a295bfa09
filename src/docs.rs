use crate::api::attendance::{
    AttendanceListResponse, AttendanceQuery, BreakRequest, CheckinRequest, CheckinResponse,
    CheckoutRequest, OverrideRequest, RecordResponse,
};
use crate::api::qr::{GenerateQr, RevokeResponse, SessionResponse};
use crate::model::attendance::{AttendanceRecord, AttendanceStatus, CheckinMethod, CheckinView};
use crate::model::employee::EmployeeIdentifier;
use crate::model::qr_session::{SessionType, SessionView};
use crate::service::attendance::BreakAction;
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "HRM Attendance API",
        version = "1.0.0",
        description = r#"
## QR Attendance

HR puts a QR code on a kiosk display; employees scan it to record the day's arrival.

### 🔹 Key Features
- **QR Sessions**
  - Rotating codes that live for minutes, or static codes that live for hours
  - Exactly one code is active at a time; issuing a new one retires the old
- **Check-in**
  - One record per employee per day, classified `present` or `late` against the employee's schedule
- **Day tracking**
  - Check-out, breaks, and HR overrides

### 🔐 Security
Check-in is public and rate limited. Everything else requires a **JWT Bearer** token;
QR management and overrides are limited to **Admin** and **HR**.

### 📦 Errors
Every error body is `{"error": "<code>", "message": "..."}`.
"#,
    ),
    paths(
        crate::api::qr::generate,
        crate::api::qr::current,
        crate::api::qr::revoke,

        crate::api::attendance::check_in,
        crate::api::attendance::check_out,
        crate::api::attendance::toggle_break,
        crate::api::attendance::override_record,
        crate::api::attendance::list_attendance
    ),
    components(
        schemas(
            GenerateQr,
            SessionResponse,
            RevokeResponse,
            SessionView,
            SessionType,
            CheckinRequest,
            CheckinResponse,
            CheckinView,
            CheckoutRequest,
            BreakRequest,
            BreakAction,
            OverrideRequest,
            RecordResponse,
            AttendanceQuery,
            AttendanceListResponse,
            AttendanceRecord,
            AttendanceStatus,
            CheckinMethod,
            EmployeeIdentifier
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "QR", description = "QR session management APIs"),
        (name = "Attendance", description = "Attendance check-in and day tracking APIs"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
