use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::datetime::format_local_timestamp;
use crate::task::{Action, Activity, Task};

pub const UNKNOWN_TASK: &str = "(unknown task)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub action: Action,
    pub task_id: String,
    pub title: Option<String>,
    pub time: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn title_or_unknown(&self) -> &str {
        self.title.as_deref().unwrap_or(UNKNOWN_TASK)
    }

    /// `ACTION title - <local date and time>`
    pub fn line(&self) -> String {
        format!(
            "{} {} - {}",
            self.action,
            self.title_or_unknown(),
            format_local_timestamp(self.time)
        )
    }
}

/// Pairs every activity with the current title of its task, keeping log order.
pub fn history(tasks: &[Task], activities: &[Activity]) -> Vec<HistoryEntry> {
    let titles: HashMap<&str, &str> = tasks
        .iter()
        .map(|task| (task.id.as_str(), task.title.as_str()))
        .collect();

    activities
        .iter()
        .map(|activity| HistoryEntry {
            action: activity.action,
            task_id: activity.task_id.clone(),
            title: titles
                .get(activity.task_id.as_str())
                .map(|title| title.to_string()),
            time: activity.time,
        })
        .collect()
}
