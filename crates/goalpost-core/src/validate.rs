use thiserror::Error;

use crate::task::{DateParts, Task, parse_part};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("title field is required")]
    MissingTitle,

    #[error("invalid day input for {field} date: {value}")]
    InvalidDay { field: &'static str, value: i64 },

    #[error("invalid month input for {field} date: {value}")]
    InvalidMonth { field: &'static str, value: i64 },
}

/// Save-time checks for a task about to be written.
///
/// Day and month are only range-checked when they parse; empty or
/// non-numeric parts pass and are treated as missing later.
pub fn validate_task(task: &Task) -> Result<(), ValidationError> {
    if task.title.trim().is_empty() {
        return Err(ValidationError::MissingTitle);
    }
    check_date("start", &task.start_date)?;
    check_date("due", &task.due_date)?;
    Ok(())
}

fn check_date(field: &'static str, date: &DateParts) -> Result<(), ValidationError> {
    if let Some(day) = parse_part(&date.day)
        && !(1..=31).contains(&day)
    {
        return Err(ValidationError::InvalidDay { field, value: day });
    }
    if let Some(month) = parse_part(&date.month)
        && !(1..=12).contains(&month)
    {
        return Err(ValidationError::InvalidMonth {
            field,
            value: month,
        });
    }
    Ok(())
}
