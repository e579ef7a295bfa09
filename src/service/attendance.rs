use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, IntoStaticStr};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use crate::model::{
    attendance::{AttendanceOverride, AttendanceRecord, CheckinMethod, NewAttendance},
    employee::EmployeeIdentifier,
    qr_session::{SessionRejection, SessionValidation},
};
use crate::service::{clock::Clock, qr_session::QrSessionManager, schedule::ScheduleResolver};
use crate::store::{AttendanceLedger, EmployeeDirectory, InsertOutcome, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckinRejection {
    EmployeeNotFound,
    Session(SessionRejection),
    /// Carries the record that already exists for today.
    AlreadyCheckedIn(AttendanceRecord),
}

impl CheckinRejection {
    pub fn code(&self) -> &'static str {
        match self {
            CheckinRejection::EmployeeNotFound => "employee_not_found",
            CheckinRejection::Session(SessionRejection::NotFound) => "session_not_found",
            CheckinRejection::Session(SessionRejection::Inactive) => "session_inactive",
            CheckinRejection::Session(SessionRejection::Expired) => "session_expired",
            CheckinRejection::AlreadyCheckedIn(_) => "already_checked_in",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckinOutcome {
    CheckedIn(AttendanceRecord),
    Rejected(CheckinRejection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum MutationRejection {
    NoOpenRecord,
    BreakNotStarted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    Updated(AttendanceRecord),
    Rejected(MutationRejection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BreakAction {
    In,
    Out,
}

/// Whole minutes between two instants, rounded to nearest and never negative.
pub fn elapsed_minutes(from: NaiveDateTime, to: NaiveDateTime) -> u32 {
    let secs = (to - from).num_seconds().max(0);
    ((secs + 30) / 60) as u32
}

pub struct AttendanceService {
    sessions: Arc<QrSessionManager>,
    ledger: Arc<dyn AttendanceLedger>,
    directory: Arc<dyn EmployeeDirectory>,
    schedule: ScheduleResolver,
    clock: Arc<dyn Clock>,
}

impl AttendanceService {
    pub fn new(
        sessions: Arc<QrSessionManager>,
        ledger: Arc<dyn AttendanceLedger>,
        directory: Arc<dyn EmployeeDirectory>,
        schedule: ScheduleResolver,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sessions,
            ledger,
            directory,
            schedule,
            clock,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.now().date()
    }

    pub async fn resolve_employee(
        &self,
        ident: EmployeeIdentifier,
    ) -> Result<Option<u64>, StoreError> {
        let ident = ident.normalize();
        if ident.is_blank() {
            return Ok(None);
        }
        self.directory.resolve(&ident).await
    }

    /// Scan-based check-in. The first failing step decides the outcome.
    #[instrument(name = "attendance_checkin", skip(self, ident))]
    pub async fn checkin(
        &self,
        session_id: &str,
        ident: EmployeeIdentifier,
    ) -> Result<CheckinOutcome, StoreError> {
        let Some(employee_id) = self.resolve_employee(ident).await? else {
            info!("Check-in rejected: unknown employee");
            return Ok(CheckinOutcome::Rejected(CheckinRejection::EmployeeNotFound));
        };

        let session = match self.sessions.validate_for_use(session_id).await? {
            SessionValidation::Valid(session) => session,
            SessionValidation::Rejected(reason) => {
                info!(employee_id, reason = %reason, "Check-in rejected: session unusable");
                return Ok(CheckinOutcome::Rejected(CheckinRejection::Session(reason)));
            }
        };

        let now = self.clock.now();
        let today = now.date();

        if let Some(existing) = self.ledger.fetch(employee_id, today).await? {
            info!(employee_id, "Check-in rejected: already checked in");
            return Ok(CheckinOutcome::Rejected(CheckinRejection::AlreadyCheckedIn(existing)));
        }

        let status = self.schedule.classify(employee_id, now).await?;

        let row = NewAttendance {
            employee_id,
            date: today,
            time_in: now.time(),
            method: CheckinMethod::QrScan,
            status,
            session_id: Some(session.session_id),
        };

        match self.ledger.insert(&row).await? {
            InsertOutcome::Inserted(record) => {
                info!(employee_id, status = %record.status, "Checked in");
                Ok(CheckinOutcome::CheckedIn(record))
            }
            InsertOutcome::Duplicate => {
                // lost a race against a concurrent scan for the same employee
                warn!(employee_id, "Concurrent check-in detected");
                let existing = self.ledger.fetch(employee_id, today).await?.ok_or_else(|| {
                    StoreError::Corrupt {
                        table: "attendance",
                        detail: format!("duplicate key for employee {} but no row", employee_id),
                    }
                })?;
                Ok(CheckinOutcome::Rejected(CheckinRejection::AlreadyCheckedIn(existing)))
            }
        }
    }

    #[instrument(name = "attendance_checkout", skip(self))]
    pub async fn checkout(&self, employee_id: u64) -> Result<MutationOutcome, StoreError> {
        let now = self.clock.now();
        let today = now.date();

        if !self.ledger.close_day(employee_id, today, now.time()).await? {
            return Ok(MutationOutcome::Rejected(MutationRejection::NoOpenRecord));
        }

        self.reload(employee_id, today).await
    }

    #[instrument(name = "attendance_break", skip(self))]
    pub async fn toggle_break(
        &self,
        employee_id: u64,
        action: BreakAction,
    ) -> Result<MutationOutcome, StoreError> {
        let now = self.clock.now();
        let today = now.date();

        let Some(record) = self.ledger.fetch(employee_id, today).await? else {
            return Ok(MutationOutcome::Rejected(MutationRejection::NoOpenRecord));
        };

        match action {
            BreakAction::In => {
                if !self.ledger.open_break(employee_id, today, now.time()).await? {
                    return Ok(MutationOutcome::Rejected(MutationRejection::NoOpenRecord));
                }
            }
            BreakAction::Out => {
                let started = match (record.break_start, record.break_end) {
                    (Some(start), None) => start,
                    _ => return Ok(MutationOutcome::Rejected(MutationRejection::BreakNotStarted)),
                };
                let minutes = elapsed_minutes(today.and_time(started), now);

                // keyed on the observed start, so a concurrent close counts once
                if !self
                    .ledger
                    .close_break(employee_id, today, started, now.time(), minutes)
                    .await?
                {
                    return Ok(MutationOutcome::Rejected(MutationRejection::BreakNotStarted));
                }
                info!(employee_id, minutes, "Break closed");
            }
        }

        self.reload(employee_id, today).await
    }

    /// HR correction path; bypasses the check-in protocol entirely.
    #[instrument(name = "attendance_override", skip(self, row), fields(employee_id = row.employee_id, date = %row.date))]
    pub async fn override_record(
        &self,
        row: AttendanceOverride,
    ) -> Result<AttendanceRecord, StoreError> {
        self.ledger.upsert_override(&row).await?;
        info!(status = %row.status, "Attendance overridden");

        self.ledger
            .fetch(row.employee_id, row.date)
            .await?
            .ok_or_else(|| StoreError::Corrupt {
                table: "attendance",
                detail: format!("override for employee {} left no row", row.employee_id),
            })
    }

    pub async fn list(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, StoreError> {
        self.ledger.list_for_date(date).await
    }

    async fn reload(&self, employee_id: u64, date: NaiveDate) -> Result<MutationOutcome, StoreError> {
        Ok(match self.ledger.fetch(employee_id, date).await? {
            Some(record) => MutationOutcome::Updated(record),
            None => MutationOutcome::Rejected(MutationRejection::NoOpenRecord),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::attendance::AttendanceStatus;
    use crate::model::qr_session::SessionType;
    use crate::service::clock::ManualClock;
    use crate::service::qr_session::SessionPolicy;
    use crate::store::memory::{MemoryEmployee, MemoryStore};
    use async_trait::async_trait;
    use chrono::{Duration, NaiveTime};

    struct Fixture {
        service: Arc<AttendanceService>,
        sessions: Arc<QrSessionManager>,
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 5)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn fixture() -> Fixture {
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let store = Arc::new(MemoryStore::with_employees(vec![
            MemoryEmployee::new(1, "ana@corp.test")
                .starting_at(nine)
                .with_username("ana"),
            MemoryEmployee::new(2, "bo@corp.test"),
            MemoryEmployee::new(3, "gone@corp.test").inactive(),
        ]));
        let clock = Arc::new(ManualClock::at(at(8, 50, 0)));
        let sessions = Arc::new(QrSessionManager::new(
            store.clone(),
            clock.clone(),
            SessionPolicy::default(),
        ));
        let schedule = ScheduleResolver::new(store.clone(), Duration::minutes(5));
        let service = Arc::new(AttendanceService::new(
            sessions.clone(),
            store.clone(),
            store.clone(),
            schedule,
            clock.clone(),
        ));
        Fixture {
            service,
            sessions,
            store,
            clock,
        }
    }

    async fn static_code(f: &Fixture) -> String {
        f.sessions
            .generate(SessionType::Static, Some(24), 99)
            .await
            .unwrap()
            .session_id
    }

    fn checked_in(outcome: CheckinOutcome) -> AttendanceRecord {
        match outcome {
            CheckinOutcome::CheckedIn(r) => r,
            other => panic!("expected check-in, got {:?}", other),
        }
    }

    fn updated(outcome: MutationOutcome) -> AttendanceRecord {
        match outcome {
            MutationOutcome::Updated(r) => r,
            other => panic!("expected update, got {:?}", other),
        }
    }

    #[actix_web::test]
    async fn late_and_present_around_grace() {
        let f = fixture();
        let code = static_code(&f).await;

        f.clock.set(at(9, 6, 0));
        let late = checked_in(f.service.checkin(&code, EmployeeIdentifier::Id(1)).await.unwrap());
        assert_eq!(late.status, AttendanceStatus::Late);
        assert_eq!(late.method, CheckinMethod::QrScan);
        assert_eq!(late.session_id.as_deref(), Some(code.as_str()));

        let f = fixture();
        let code = static_code(&f).await;
        f.clock.set(at(9, 4, 0));
        let on_time = checked_in(
            f.service
                .checkin(&code, EmployeeIdentifier::Handle("ana".into()))
                .await
                .unwrap(),
        );
        assert_eq!(on_time.status, AttendanceStatus::Present);
        assert_eq!(on_time.normalized().timestamp, at(9, 4, 0));
        assert_eq!(on_time.normalized().employee_id, 1);
    }

    #[actix_web::test]
    async fn unscheduled_employee_is_present_even_late_in_the_day() {
        let f = fixture();
        let code = static_code(&f).await;
        f.clock.set(at(15, 45, 0));

        let record = checked_in(
            f.service
                .checkin(&code, EmployeeIdentifier::Handle("bo@corp.test".into()))
                .await
                .unwrap(),
        );
        assert_eq!(record.status, AttendanceStatus::Present);
    }

    #[actix_web::test]
    async fn employee_is_resolved_before_session() {
        let f = fixture();

        for ident in [
            EmployeeIdentifier::Id(404),
            EmployeeIdentifier::Id(3),
            EmployeeIdentifier::Handle("".into()),
        ] {
            let outcome = f.service.checkin("no-such-session", ident).await.unwrap();
            assert_eq!(
                outcome,
                CheckinOutcome::Rejected(CheckinRejection::EmployeeNotFound)
            );
        }

        let outcome = f
            .service
            .checkin("no-such-session", EmployeeIdentifier::Id(1))
            .await
            .unwrap();
        let CheckinOutcome::Rejected(reason) = outcome else {
            panic!("expected rejection");
        };
        assert_eq!(reason.code(), "session_not_found");
    }

    #[actix_web::test]
    async fn second_checkin_returns_existing_record() {
        let f = fixture();
        let code = static_code(&f).await;

        let first = checked_in(f.service.checkin(&code, EmployeeIdentifier::Id(2)).await.unwrap());

        for minutes in [1, 30, 240] {
            f.clock.advance(Duration::minutes(minutes));
            let again = f.service.checkin(&code, EmployeeIdentifier::Id(2)).await.unwrap();
            assert_eq!(
                again,
                CheckinOutcome::Rejected(CheckinRejection::AlreadyCheckedIn(first.clone()))
            );
        }
        assert_eq!(f.store.attendance_count(), 1);
    }

    /// The memory ledger serializes these two calls; the interleaved race is
    /// covered by `BlindLedger` below.
    #[actix_web::test]
    async fn same_employee_under_two_identifiers_inserts_once() {
        let f = fixture();
        let code = static_code(&f).await;

        let (a, b) = tokio::join!(
            f.service.checkin(&code, EmployeeIdentifier::Id(2)),
            f.service.checkin(&code, EmployeeIdentifier::Handle("bo@corp.test".into())),
        );
        let outcomes = [a.unwrap(), b.unwrap()];

        let inserted = outcomes
            .iter()
            .filter(|o| matches!(o, CheckinOutcome::CheckedIn(_)))
            .count();
        let conflicts = outcomes
            .iter()
            .filter(|o| matches!(o, CheckinOutcome::Rejected(CheckinRejection::AlreadyCheckedIn(_))))
            .count();
        assert_eq!((inserted, conflicts), (1, 1));
        assert_eq!(f.store.attendance_count(), 1);
    }

    /// Ledger that never sees today's row before inserting, the way two
    /// scans interleave when both pass the lookup before either writes.
    struct BlindLedger(Arc<MemoryStore>);

    #[async_trait]
    impl AttendanceLedger for BlindLedger {
        async fn fetch(
            &self,
            employee_id: u64,
            date: NaiveDate,
        ) -> Result<Option<AttendanceRecord>, StoreError> {
            if self.0.attendance_count() == 0 {
                return Ok(None);
            }
            AttendanceLedger::fetch(self.0.as_ref(), employee_id, date).await
        }

        async fn insert(&self, row: &NewAttendance) -> Result<InsertOutcome, StoreError> {
            // the other scan wins the unique key first
            let winner = NewAttendance {
                status: AttendanceStatus::Present,
                ..row.clone()
            };
            let _ = self.0.insert(&winner).await?;
            self.0.insert(row).await
        }

        async fn close_day(&self, e: u64, d: NaiveDate, t: NaiveTime) -> Result<bool, StoreError> {
            self.0.close_day(e, d, t).await
        }

        async fn open_break(&self, e: u64, d: NaiveDate, t: NaiveTime) -> Result<bool, StoreError> {
            self.0.open_break(e, d, t).await
        }

        async fn close_break(
            &self,
            e: u64,
            d: NaiveDate,
            s: NaiveTime,
            t: NaiveTime,
            m: u32,
        ) -> Result<bool, StoreError> {
            self.0.close_break(e, d, s, t, m).await
        }

        async fn upsert_override(&self, row: &AttendanceOverride) -> Result<(), StoreError> {
            self.0.upsert_override(row).await
        }

        async fn list_for_date(&self, d: NaiveDate) -> Result<Vec<AttendanceRecord>, StoreError> {
            self.0.list_for_date(d).await
        }
    }

    #[actix_web::test]
    async fn unique_key_violation_becomes_already_checked_in() {
        let f = fixture();
        let code = static_code(&f).await;
        let service = AttendanceService::new(
            f.sessions.clone(),
            Arc::new(BlindLedger(f.store.clone())),
            f.store.clone(),
            ScheduleResolver::new(f.store.clone(), Duration::minutes(5)),
            f.clock.clone(),
        );

        let outcome = service.checkin(&code, EmployeeIdentifier::Id(2)).await.unwrap();
        let CheckinOutcome::Rejected(CheckinRejection::AlreadyCheckedIn(existing)) = outcome else {
            panic!("expected conflict, got {:?}", outcome);
        };
        assert_eq!(existing.employee_id, 2);
        assert_eq!(f.store.attendance_count(), 1);
    }

    #[actix_web::test]
    async fn revoked_static_code_is_inactive() {
        let f = fixture();
        let code = static_code(&f).await;
        f.sessions.revoke().await.unwrap();

        assert!(f.sessions.current().await.unwrap().is_none());
        let outcome = f.service.checkin(&code, EmployeeIdentifier::Id(1)).await.unwrap();
        assert_eq!(
            outcome,
            CheckinOutcome::Rejected(CheckinRejection::Session(SessionRejection::Inactive))
        );
    }

    #[actix_web::test]
    async fn expired_rotating_code_is_rejected() {
        let f = fixture();
        let code = f
            .sessions
            .generate(SessionType::Rotating, None, 99)
            .await
            .unwrap()
            .session_id;
        f.clock.advance(Duration::seconds(61));

        let outcome = f.service.checkin(&code, EmployeeIdentifier::Id(1)).await.unwrap();
        let CheckinOutcome::Rejected(reason) = outcome else {
            panic!("expected rejection");
        };
        assert_eq!(reason.code(), "session_expired");
        assert_eq!(f.store.attendance_count(), 0);
    }

    #[actix_web::test]
    async fn checkout_closes_the_day_once() {
        let f = fixture();
        let code = static_code(&f).await;

        assert_eq!(
            f.service.checkout(2).await.unwrap(),
            MutationOutcome::Rejected(MutationRejection::NoOpenRecord)
        );

        f.service.checkin(&code, EmployeeIdentifier::Id(2)).await.unwrap();
        f.clock.set(at(17, 30, 0));
        let closed = updated(f.service.checkout(2).await.unwrap());
        assert_eq!(closed.time_out, Some(NaiveTime::from_hms_opt(17, 30, 0).unwrap()));

        f.clock.set(at(17, 45, 0));
        assert_eq!(
            f.service.checkout(2).await.unwrap(),
            MutationOutcome::Rejected(MutationRejection::NoOpenRecord)
        );
    }

    #[actix_web::test]
    async fn break_accumulates_rounded_minutes() {
        let f = fixture();
        let code = static_code(&f).await;
        f.service.checkin(&code, EmployeeIdentifier::Id(2)).await.unwrap();

        f.clock.set(at(12, 0, 0));
        let opened = updated(f.service.toggle_break(2, BreakAction::In).await.unwrap());
        assert_eq!(opened.break_start, Some(NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
        assert!(opened.has_open_break());

        f.clock.set(at(12, 12, 0));
        let closed = updated(f.service.toggle_break(2, BreakAction::Out).await.unwrap());
        assert_eq!(closed.break_minutes, 12);
        assert_eq!(closed.break_end, Some(NaiveTime::from_hms_opt(12, 12, 0).unwrap()));

        assert_eq!(
            f.service.toggle_break(2, BreakAction::Out).await.unwrap(),
            MutationOutcome::Rejected(MutationRejection::BreakNotStarted)
        );

        // a second break adds to the total; 4m40s rounds up to 5
        f.clock.set(at(15, 0, 0));
        f.service.toggle_break(2, BreakAction::In).await.unwrap();
        f.clock.set(at(15, 4, 40));
        let second = updated(f.service.toggle_break(2, BreakAction::Out).await.unwrap());
        assert_eq!(second.break_minutes, 17);
    }

    #[actix_web::test]
    async fn break_requires_todays_record() {
        let f = fixture();
        assert_eq!(
            f.service.toggle_break(1, BreakAction::In).await.unwrap(),
            MutationOutcome::Rejected(MutationRejection::NoOpenRecord)
        );
        assert_eq!(
            f.service.toggle_break(1, BreakAction::Out).await.unwrap(),
            MutationOutcome::Rejected(MutationRejection::NoOpenRecord)
        );
    }

    #[test]
    fn elapsed_minutes_rounds_and_clamps() {
        assert_eq!(elapsed_minutes(at(12, 0, 0), at(12, 12, 0)), 12);
        assert_eq!(elapsed_minutes(at(12, 0, 0), at(12, 0, 29)), 0);
        assert_eq!(elapsed_minutes(at(12, 0, 0), at(12, 0, 30)), 1);
        assert_eq!(elapsed_minutes(at(12, 10, 0), at(12, 0, 0)), 0);
    }

    #[actix_web::test]
    async fn override_replaces_checkin_and_lists_by_date() {
        let f = fixture();
        let code = static_code(&f).await;
        f.clock.set(at(9, 30, 0));
        f.service.checkin(&code, EmployeeIdentifier::Id(1)).await.unwrap();

        let fixed = f
            .service
            .override_record(AttendanceOverride {
                employee_id: 1,
                date: at(0, 0, 0).date(),
                time_in: NaiveTime::from_hms_opt(8, 55, 0).unwrap(),
                time_out: None,
                status: AttendanceStatus::Present,
            })
            .await
            .unwrap();
        assert_eq!(fixed.method, CheckinMethod::Override);
        assert_eq!(fixed.status, AttendanceStatus::Present);

        f.service
            .override_record(AttendanceOverride {
                employee_id: 2,
                date: at(0, 0, 0).date(),
                time_in: NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
                time_out: None,
                status: AttendanceStatus::OnLeave,
            })
            .await
            .unwrap();

        let day = f.service.list(f.service.today()).await.unwrap();
        assert_eq!(day.len(), 2);
        assert_eq!(day[0].employee_id, 2);
        assert_eq!(day[1].employee_id, 1);
    }
}
