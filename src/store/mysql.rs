use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sqlx::{FromRow, MySqlPool};
use tracing::{debug, warn};

use super::{AttendanceLedger, EmployeeDirectory, InsertOutcome, QrSessionStore, StoreError};
use crate::model::{
    attendance::{AttendanceOverride, AttendanceRecord, CheckinMethod, NewAttendance},
    employee::{EmployeeIdentifier, EmployeeSchedule},
    qr_session::QrSession,
};

const SESSION_COLUMNS: &str =
    "session_id, session_type, created_at, expires_at, is_active, created_by";

const ATTENDANCE_COLUMNS: &str = "id, employee_id, date, time_in, time_out, break_start, \
     break_end, break_minutes, method, status, session_id";

/// MySQL-backed implementation of every store trait. Cloning shares the pool.
#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Deactivates whatever is live and inserts `session` in one transaction.
    async fn swap_active(&self, session: &QrSession) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let deactivated = sqlx::query("UPDATE qr_sessions SET is_active = 0 WHERE is_active = 1")
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query(
            r#"
            INSERT INTO qr_sessions
                (session_id, session_type, created_at, expires_at, is_active, created_by)
            VALUES (?, ?, ?, ?, 1, ?)
            "#,
        )
        .bind(&session.session_id)
        .bind(session.session_type.to_string())
        .bind(session.created_at)
        .bind(session.expires_at)
        .bind(session.created_by)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            session_id = %session.session_id,
            deactivated,
            "Replaced active QR session"
        );
        Ok(())
    }
}

/// Two generates racing: an InnoDB deadlock (SQLSTATE 40001) or the second
/// insert hitting the single active slot.
fn is_contention(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => {
            db.is_unique_violation() || db.code().as_deref() == Some("40001")
        }
        _ => false,
    }
}

#[derive(FromRow)]
struct QrSessionRow {
    session_id: String,
    session_type: String,
    created_at: NaiveDateTime,
    expires_at: NaiveDateTime,
    is_active: bool,
    created_by: u64,
}

impl TryFrom<QrSessionRow> for QrSession {
    type Error = StoreError;

    fn try_from(row: QrSessionRow) -> Result<Self, Self::Error> {
        let session_type = row.session_type.parse().map_err(|_| StoreError::Corrupt {
            table: "qr_sessions",
            detail: format!("unknown session_type '{}'", row.session_type),
        })?;

        Ok(QrSession {
            session_id: row.session_id,
            session_type,
            created_at: row.created_at,
            expires_at: row.expires_at,
            is_active: row.is_active,
            created_by: row.created_by,
        })
    }
}

#[derive(FromRow)]
struct AttendanceRow {
    id: u64,
    employee_id: u64,
    date: NaiveDate,
    time_in: NaiveTime,
    time_out: Option<NaiveTime>,
    break_start: Option<NaiveTime>,
    break_end: Option<NaiveTime>,
    break_minutes: u32,
    method: String,
    status: String,
    session_id: Option<String>,
}

impl TryFrom<AttendanceRow> for AttendanceRecord {
    type Error = StoreError;

    fn try_from(row: AttendanceRow) -> Result<Self, Self::Error> {
        let corrupt = |column: &str, value: &str| StoreError::Corrupt {
            table: "attendance",
            detail: format!("unknown {} '{}'", column, value),
        };
        let method = row.method.parse().map_err(|_| corrupt("method", &row.method))?;
        let status = row.status.parse().map_err(|_| corrupt("status", &row.status))?;

        Ok(AttendanceRecord {
            id: row.id,
            employee_id: row.employee_id,
            date: row.date,
            time_in: row.time_in,
            time_out: row.time_out,
            break_start: row.break_start,
            break_end: row.break_end,
            break_minutes: row.break_minutes,
            method,
            status,
            session_id: row.session_id,
        })
    }
}

#[async_trait]
impl QrSessionStore for MySqlStore {
    async fn replace_active(&self, session: &QrSession) -> Result<(), StoreError> {
        match self.swap_active(session).await {
            Err(StoreError::Database(e)) if is_contention(&e) => {
                warn!(
                    error = %e,
                    session_id = %session.session_id,
                    "Concurrent QR generate collided, retrying"
                );
                self.swap_active(session).await
            }
            other => other,
        }
    }

    async fn fetch(&self, session_id: &str) -> Result<Option<QrSession>, StoreError> {
        let sql = format!("SELECT {} FROM qr_sessions WHERE session_id = ?", SESSION_COLUMNS);

        sqlx::query_as::<_, QrSessionRow>(&sql)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?
            .map(QrSession::try_from)
            .transpose()
    }

    async fn list_active(&self, now: NaiveDateTime) -> Result<Vec<QrSession>, StoreError> {
        let sql = format!(
            "SELECT {} FROM qr_sessions WHERE is_active = 1 AND expires_at > ? \
             ORDER BY created_at DESC",
            SESSION_COLUMNS
        );

        sqlx::query_as::<_, QrSessionRow>(&sql)
            .bind(now)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(QrSession::try_from)
            .collect()
    }

    async fn deactivate_all(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE qr_sessions SET is_active = 0 WHERE is_active = 1")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn deactivate_expired(&self, now: NaiveDateTime) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE qr_sessions SET is_active = 0 WHERE is_active = 1 AND expires_at <= ?",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl AttendanceLedger for MySqlStore {
    async fn fetch(
        &self,
        employee_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        let sql = format!(
            "SELECT {} FROM attendance WHERE employee_id = ? AND date = ?",
            ATTENDANCE_COLUMNS
        );

        sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(employee_id)
            .bind(date)
            .fetch_optional(&self.pool)
            .await?
            .map(AttendanceRecord::try_from)
            .transpose()
    }

    async fn insert(&self, row: &NewAttendance) -> Result<InsertOutcome, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO attendance
                (employee_id, date, time_in, method, status, session_id)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(row.employee_id)
        .bind(row.date)
        .bind(row.time_in)
        .bind(row.method.to_string())
        .bind(row.status.to_string())
        .bind(&row.session_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(InsertOutcome::Inserted(AttendanceRecord {
                id: done.last_insert_id(),
                employee_id: row.employee_id,
                date: row.date,
                time_in: row.time_in,
                time_out: None,
                break_start: None,
                break_end: None,
                break_minutes: 0,
                method: row.method,
                status: row.status,
                session_id: row.session_id.clone(),
            })),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                warn!(
                    employee_id = row.employee_id,
                    date = %row.date,
                    "Duplicate attendance insert rejected by unique key"
                );
                Ok(InsertOutcome::Duplicate)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn close_day(
        &self,
        employee_id: u64,
        date: NaiveDate,
        at: NaiveTime,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE attendance
            SET time_out = ?
            WHERE employee_id = ?
            AND date = ?
            AND time_out IS NULL
            "#,
        )
        .bind(at)
        .bind(employee_id)
        .bind(date)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn open_break(
        &self,
        employee_id: u64,
        date: NaiveDate,
        at: NaiveTime,
    ) -> Result<bool, StoreError> {
        // MySQL reports 0 affected rows when the values did not change, so a
        // matching row counts as success even then.
        sqlx::query(
            r#"
            UPDATE attendance
            SET break_start = ?, break_end = NULL
            WHERE employee_id = ?
            AND date = ?
            "#,
        )
        .bind(at)
        .bind(employee_id)
        .bind(date)
        .execute(&self.pool)
        .await?;

        Ok(AttendanceLedger::fetch(self, employee_id, date).await?.is_some())
    }

    async fn close_break(
        &self,
        employee_id: u64,
        date: NaiveDate,
        started: NaiveTime,
        at: NaiveTime,
        minutes: u32,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE attendance
            SET break_end = ?, break_minutes = break_minutes + ?
            WHERE employee_id = ?
            AND date = ?
            AND break_start = ?
            AND break_end IS NULL
            "#,
        )
        .bind(at)
        .bind(minutes)
        .bind(employee_id)
        .bind(date)
        .bind(started)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn upsert_override(&self, row: &AttendanceOverride) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO attendance
                (employee_id, date, time_in, time_out, method, status)
            VALUES (?, ?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                time_in = VALUES(time_in),
                time_out = VALUES(time_out),
                method = VALUES(method),
                status = VALUES(status)
            "#,
        )
        .bind(row.employee_id)
        .bind(row.date)
        .bind(row.time_in)
        .bind(row.time_out)
        .bind(CheckinMethod::Override.to_string())
        .bind(row.status.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_date(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, StoreError> {
        let sql = format!(
            "SELECT {} FROM attendance WHERE date = ? ORDER BY time_in, id",
            ATTENDANCE_COLUMNS
        );

        sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(date)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(AttendanceRecord::try_from)
            .collect()
    }
}

#[async_trait]
impl EmployeeDirectory for MySqlStore {
    async fn resolve(&self, ident: &EmployeeIdentifier) -> Result<Option<u64>, StoreError> {
        let found = match ident {
            EmployeeIdentifier::Id(id) => {
                sqlx::query_scalar::<_, u64>(
                    "SELECT id FROM employees WHERE id = ? AND status = 'active'",
                )
                .bind(*id)
                .fetch_optional(&self.pool)
                .await?
            }
            EmployeeIdentifier::Handle(handle) => {
                sqlx::query_scalar::<_, u64>(
                    r#"
                    SELECT e.id
                    FROM employees e
                    LEFT JOIN users u ON u.employee_id = e.id
                    WHERE e.status = 'active'
                    AND (e.email = ? OR e.employee_code = ? OR u.username = ?)
                    ORDER BY e.id
                    LIMIT 1
                    "#,
                )
                .bind(handle)
                .bind(handle)
                .bind(handle)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        Ok(found)
    }

    async fn schedule(&self, employee_id: u64) -> Result<Option<EmployeeSchedule>, StoreError> {
        let schedule = sqlx::query_as::<_, EmployeeSchedule>(
            "SELECT id, schedule_start_time FROM employees WHERE id = ?",
        )
        .bind(employee_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(schedule)
    }
}
