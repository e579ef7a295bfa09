use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Late,
    Absent,
    HalfDay,
    OnLeave,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CheckinMethod {
    QrScan,
    Manual,
    Override,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AttendanceRecord {
    pub id: u64,
    pub employee_id: u64,
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    #[schema(value_type = String, example = "09:02:11")]
    pub time_in: NaiveTime,
    #[schema(value_type = Option<String>)]
    pub time_out: Option<NaiveTime>,
    #[schema(value_type = Option<String>)]
    pub break_start: Option<NaiveTime>,
    #[schema(value_type = Option<String>)]
    pub break_end: Option<NaiveTime>,
    pub break_minutes: u32,
    pub method: CheckinMethod,
    pub status: AttendanceStatus,
    pub session_id: Option<String>,
}

impl AttendanceRecord {
    pub fn timestamp(&self) -> NaiveDateTime {
        self.date.and_time(self.time_in)
    }

    pub fn has_open_break(&self) -> bool {
        self.break_start.is_some() && self.break_end.is_none()
    }

    pub fn normalized(&self) -> CheckinView {
        CheckinView {
            timestamp: self.timestamp(),
            status: self.status,
            employee_id: self.employee_id,
        }
    }
}

/// Values for a fresh ledger row; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewAttendance {
    pub employee_id: u64,
    pub date: NaiveDate,
    pub time_in: NaiveTime,
    pub method: CheckinMethod,
    pub status: AttendanceStatus,
    pub session_id: Option<String>,
}

/// Privileged replacement of a day's record.
#[derive(Debug, Clone)]
pub struct AttendanceOverride {
    pub employee_id: u64,
    pub date: NaiveDate,
    pub time_in: NaiveTime,
    pub time_out: Option<NaiveTime>,
    pub status: AttendanceStatus,
}

/// The shape the dashboard renders after a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "timestamp": "2026-01-05T09:02:11",
    "status": "present",
    "employee_id": 42
}))]
pub struct CheckinView {
    #[schema(value_type = String, format = "date-time")]
    pub timestamp: NaiveDateTime,
    pub status: AttendanceStatus,
    pub employee_id: u64,
}
