use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::model::attendance::AttendanceStatus;
use crate::store::{EmployeeDirectory, StoreError};

/// Present when no start is scheduled, late only strictly after start + grace.
pub fn classify_arrival(
    expected_start: Option<NaiveDateTime>,
    grace: Duration,
    arrived_at: NaiveDateTime,
) -> AttendanceStatus {
    match expected_start {
        Some(start) if arrived_at > start + grace => AttendanceStatus::Late,
        _ => AttendanceStatus::Present,
    }
}

/// Resolves an employee's expected start time and classifies arrivals.
pub struct ScheduleResolver {
    directory: Arc<dyn EmployeeDirectory>,
    grace: Duration,
}

impl ScheduleResolver {
    pub fn new(directory: Arc<dyn EmployeeDirectory>, grace: Duration) -> Self {
        Self { directory, grace }
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    pub async fn expected_start(
        &self,
        employee_id: u64,
        date: NaiveDate,
    ) -> Result<Option<NaiveDateTime>, StoreError> {
        let schedule = self.directory.schedule(employee_id).await?;

        Ok(schedule
            .and_then(|s| s.schedule_start_time)
            .map(|start| date.and_time(start)))
    }

    pub async fn classify(
        &self,
        employee_id: u64,
        arrived_at: NaiveDateTime,
    ) -> Result<AttendanceStatus, StoreError> {
        let expected = self.expected_start(employee_id, arrived_at.date()).await?;
        Ok(classify_arrival(expected, self.grace, arrived_at))
    }
}
