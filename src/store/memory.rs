//! In-process store with the same contracts as the MySQL backend, used by the
//! test suite. Every operation takes the lock once, so "deactivate then
//! insert" and "check then insert" are atomic just like their SQL versions.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use super::{AttendanceLedger, EmployeeDirectory, InsertOutcome, QrSessionStore, StoreError};
use crate::model::{
    attendance::{AttendanceOverride, AttendanceRecord, CheckinMethod, NewAttendance},
    employee::{EmployeeIdentifier, EmployeeSchedule},
    qr_session::QrSession,
};

#[derive(Debug, Clone)]
pub struct MemoryEmployee {
    pub id: u64,
    pub email: String,
    pub username: Option<String>,
    pub active: bool,
    pub schedule_start_time: Option<NaiveTime>,
}

impl MemoryEmployee {
    pub fn new(id: u64, email: &str) -> Self {
        Self {
            id,
            email: email.to_string(),
            username: None,
            active: true,
            schedule_start_time: None,
        }
    }

    pub fn starting_at(mut self, start: NaiveTime) -> Self {
        self.schedule_start_time = Some(start);
        self
    }

    pub fn with_username(mut self, username: &str) -> Self {
        self.username = Some(username.to_string());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

#[derive(Default)]
struct Inner {
    sessions: Vec<QrSession>,
    attendance: HashMap<(u64, NaiveDate), AttendanceRecord>,
    employees: Vec<MemoryEmployee>,
    next_id: u64,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_employees(employees: Vec<MemoryEmployee>) -> Self {
        let store = Self::default();
        store.inner.lock().unwrap().employees = employees;
        store
    }

    pub fn sessions(&self) -> Vec<QrSession> {
        self.inner.lock().unwrap().sessions.clone()
    }

    pub fn active_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap()
            .sessions
            .iter()
            .filter(|s| s.is_active)
            .count()
    }

    pub fn attendance_count(&self) -> usize {
        self.inner.lock().unwrap().attendance.len()
    }
}

#[async_trait]
impl QrSessionStore for MemoryStore {
    async fn replace_active(&self, session: &QrSession) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        for s in inner.sessions.iter_mut() {
            s.is_active = false;
        }
        let mut session = session.clone();
        session.is_active = true;
        inner.sessions.push(session);
        Ok(())
    }

    async fn fetch(&self, session_id: &str) -> Result<Option<QrSession>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .sessions
            .iter()
            .find(|s| s.session_id == session_id)
            .cloned())
    }

    async fn list_active(&self, now: NaiveDateTime) -> Result<Vec<QrSession>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut active: Vec<_> = inner
            .sessions
            .iter()
            .filter(|s| s.is_usable_at(now))
            .cloned()
            .collect();
        active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(active)
    }

    async fn deactivate_all(&self) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let mut count = 0;
        for s in inner.sessions.iter_mut().filter(|s| s.is_active) {
            s.is_active = false;
            count += 1;
        }
        Ok(count)
    }

    async fn deactivate_expired(&self, now: NaiveDateTime) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let mut count = 0;
        for s in inner
            .sessions
            .iter_mut()
            .filter(|s| s.is_active && s.is_expired_at(now))
        {
            s.is_active = false;
            count += 1;
        }
        Ok(count)
    }
}

#[async_trait]
impl AttendanceLedger for MemoryStore {
    async fn fetch(
        &self,
        employee_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.attendance.get(&(employee_id, date)).cloned())
    }

    async fn insert(&self, row: &NewAttendance) -> Result<InsertOutcome, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let key = (row.employee_id, row.date);
        if inner.attendance.contains_key(&key) {
            return Ok(InsertOutcome::Duplicate);
        }
        inner.next_id += 1;
        let record = AttendanceRecord {
            id: inner.next_id,
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
        };
        inner.attendance.insert(key, record.clone());
        Ok(InsertOutcome::Inserted(record))
    }

    async fn close_day(
        &self,
        employee_id: u64,
        date: NaiveDate,
        at: NaiveTime,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.attendance.get_mut(&(employee_id, date)) {
            Some(r) if r.time_out.is_none() => {
                r.time_out = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn open_break(
        &self,
        employee_id: u64,
        date: NaiveDate,
        at: NaiveTime,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.attendance.get_mut(&(employee_id, date)) {
            Some(r) => {
                r.break_start = Some(at);
                r.break_end = None;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn close_break(
        &self,
        employee_id: u64,
        date: NaiveDate,
        started: NaiveTime,
        at: NaiveTime,
        minutes: u32,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.attendance.get_mut(&(employee_id, date)) {
            Some(r) if r.break_start == Some(started) && r.break_end.is_none() => {
                r.break_end = Some(at);
                r.break_minutes += minutes;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn upsert_override(&self, row: &AttendanceOverride) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let key = (row.employee_id, row.date);
        if let Some(existing) = inner.attendance.get_mut(&key) {
            existing.time_in = row.time_in;
            existing.time_out = row.time_out;
            existing.method = CheckinMethod::Override;
            existing.status = row.status;
            return Ok(());
        }
        inner.next_id += 1;
        let record = AttendanceRecord {
            id: inner.next_id,
            employee_id: row.employee_id,
            date: row.date,
            time_in: row.time_in,
            time_out: row.time_out,
            break_start: None,
            break_end: None,
            break_minutes: 0,
            method: CheckinMethod::Override,
            status: row.status,
            session_id: None,
        };
        inner.attendance.insert(key, record);
        Ok(())
    }

    async fn list_for_date(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<_> = inner
            .attendance
            .values()
            .filter(|r| r.date == date)
            .cloned()
            .collect();
        rows.sort_by_key(|r| (r.time_in, r.id));
        Ok(rows)
    }
}

#[async_trait]
impl EmployeeDirectory for MemoryStore {
    async fn resolve(&self, ident: &EmployeeIdentifier) -> Result<Option<u64>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let found = inner.employees.iter().filter(|e| e.active).find(|e| match ident {
            EmployeeIdentifier::Id(id) => e.id == *id,
            EmployeeIdentifier::Handle(h) => {
                e.email == *h || e.username.as_deref() == Some(h.as_str())
            }
        });
        Ok(found.map(|e| e.id))
    }

    async fn schedule(&self, employee_id: u64) -> Result<Option<EmployeeSchedule>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .employees
            .iter()
            .find(|e| e.id == employee_id)
            .map(|e| EmployeeSchedule {
                id: e.id,
                schedule_start_time: e.schedule_start_time,
            }))
    }
}
