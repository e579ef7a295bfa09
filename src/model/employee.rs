use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// How a scanning device names the employee: a numeric id, or a handle that
/// may be an email, an employee code or a login username.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
#[schema(example = json!(42))]
pub enum EmployeeIdentifier {
    Id(u64),
    Handle(String),
}

impl EmployeeIdentifier {
    /// Numeric strings are ids; anything else is kept as a trimmed handle.
    pub fn normalize(self) -> Self {
        match self {
            EmployeeIdentifier::Handle(h) => {
                let h = h.trim();
                match h.parse::<u64>() {
                    Ok(id) => EmployeeIdentifier::Id(id),
                    Err(_) => EmployeeIdentifier::Handle(h.to_string()),
                }
            }
            id => id,
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, EmployeeIdentifier::Handle(h) if h.trim().is_empty())
    }
}

/// The slice of the employee entity used for lateness evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct EmployeeSchedule {
    pub id: u64,
    pub schedule_start_time: Option<NaiveTime>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_handles_become_ids() {
        let ident: EmployeeIdentifier = serde_json::from_str("\" 17 \"").unwrap();
        assert_eq!(ident.normalize(), EmployeeIdentifier::Id(17));

        let ident: EmployeeIdentifier = serde_json::from_str("17").unwrap();
        assert_eq!(ident.normalize(), EmployeeIdentifier::Id(17));
    }

    #[test]
    fn text_handles_are_trimmed() {
        let ident: EmployeeIdentifier = serde_json::from_str("\" jane@corp.test \"").unwrap();
        assert_eq!(
            ident.normalize(),
            EmployeeIdentifier::Handle("jane@corp.test".into())
        );
        assert!(EmployeeIdentifier::Handle("   ".into()).is_blank());
    }
}
