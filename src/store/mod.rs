//! Persistence seams for QR sessions, the attendance ledger and the employee
//! directory. `mysql` is the production backend; `memory` backs the tests.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use derive_more::Display;

use crate::model::{
    attendance::{AttendanceOverride, AttendanceRecord, NewAttendance},
    employee::{EmployeeIdentifier, EmployeeSchedule},
    qr_session::QrSession,
};

#[cfg(test)]
pub mod memory;
pub mod mysql;

#[derive(Debug, Display)]
pub enum StoreError {
    #[display(fmt = "database error: {}", _0)]
    Database(sqlx::Error),
    #[display(fmt = "unreadable row in {}: {}", table, detail)]
    Corrupt { table: &'static str, detail: String },
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e)
    }
}

/// Result of inserting a ledger row under the (employee, date) uniqueness rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(AttendanceRecord),
    Duplicate,
}

#[async_trait]
pub trait QrSessionStore: Send + Sync {
    /// Deactivates every active session and inserts `session` as one unit.
    async fn replace_active(&self, session: &QrSession) -> Result<(), StoreError>;

    async fn fetch(&self, session_id: &str) -> Result<Option<QrSession>, StoreError>;

    /// Active, unexpired sessions, newest first.
    async fn list_active(&self, now: NaiveDateTime) -> Result<Vec<QrSession>, StoreError>;

    async fn deactivate_all(&self) -> Result<u64, StoreError>;

    async fn deactivate_expired(&self, now: NaiveDateTime) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait AttendanceLedger: Send + Sync {
    async fn fetch(
        &self,
        employee_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError>;

    async fn insert(&self, row: &NewAttendance) -> Result<InsertOutcome, StoreError>;

    /// Sets `time_out` only while it is still empty. Returns whether a row changed.
    async fn close_day(
        &self,
        employee_id: u64,
        date: NaiveDate,
        at: NaiveTime,
    ) -> Result<bool, StoreError>;

    async fn open_break(
        &self,
        employee_id: u64,
        date: NaiveDate,
        at: NaiveTime,
    ) -> Result<bool, StoreError>;

    /// Closes the break that started at `started`, adding `minutes` to the
    /// running total. No-op when the break was already closed or restarted.
    async fn close_break(
        &self,
        employee_id: u64,
        date: NaiveDate,
        started: NaiveTime,
        at: NaiveTime,
        minutes: u32,
    ) -> Result<bool, StoreError>;

    async fn upsert_override(&self, row: &AttendanceOverride) -> Result<(), StoreError>;

    async fn list_for_date(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, StoreError>;
}

#[async_trait]
pub trait EmployeeDirectory: Send + Sync {
    /// Canonical id of an active employee, if the identifier names one.
    async fn resolve(&self, ident: &EmployeeIdentifier) -> Result<Option<u64>, StoreError>;

    async fn schedule(&self, employee_id: u64) -> Result<Option<EmployeeSchedule>, StoreError>;
}
