use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Tag {
    pub text: String,
    #[serde(default)]
    pub selected: bool,
}

impl Tag {
    pub fn selected(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            selected: true,
        }
    }

    pub fn unselected(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            selected: false,
        }
    }
}

/// Calendar date kept as the three free-text fields the editor collects.
///
/// Any part may be empty or garbage; consumers treat such dates as missing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DateParts {
    #[serde(default)]
    pub day: String,
    #[serde(default)]
    pub month: String,
    #[serde(default)]
    pub year: String,
}

impl DateParts {
    pub fn new(day: impl Into<String>, month: impl Into<String>, year: impl Into<String>) -> Self {
        Self {
            day: day.into(),
            month: month.into(),
            year: year.into(),
        }
    }

    pub fn from_date(date: chrono::NaiveDate) -> Self {
        use chrono::Datelike;
        Self::new(
            format!("{:02}", date.day()),
            format!("{:02}", date.month()),
            date.year().to_string(),
        )
    }

    /// `(year, month, day)` when all three parts parse as integers.
    pub fn sort_key(&self) -> Option<(i64, i64, i64)> {
        let day = parse_part(&self.day)?;
        let month = parse_part(&self.month)?;
        let year = parse_part(&self.year)?;
        Some((year, month, day))
    }

    /// Real calendar date, if the parts name one.
    pub fn to_naive_date(&self) -> Option<chrono::NaiveDate> {
        let (year, month, day) = self.sort_key()?;
        chrono::NaiveDate::from_ymd_opt(
            i32::try_from(year).ok()?,
            u32::try_from(month).ok()?,
            u32::try_from(day).ok()?,
        )
    }
}

pub(crate) fn parse_part(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<i64>().ok()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,

    pub title: String,

    #[serde(default)]
    pub note: String,

    #[serde(default)]
    pub parent_task_id: Option<String>,

    #[serde(default)]
    pub selected_tags: Vec<Tag>,

    #[serde(default)]
    pub start_date: DateParts,

    #[serde(default)]
    pub due_date: DateParts,

    #[serde(default)]
    pub expected_time: String,

    #[serde(default)]
    pub unit: String,
}

impl Task {
    pub fn new(title: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), title)
    }

    pub fn with_id(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            note: String::new(),
            parent_task_id: None,
            selected_tags: vec![],
            start_date: DateParts::default(),
            due_date: DateParts::default(),
            expected_time: String::new(),
            unit: String::new(),
        }
    }

    pub fn has_selected_tag(&self, text: &str) -> bool {
        self.selected_tags
            .iter()
            .any(|tag| tag.selected && tag.text == text)
    }

    pub fn first_selected_tag(&self) -> Option<&str> {
        self.selected_tags
            .iter()
            .find(|tag| tag.selected)
            .map(|tag| tag.text.as_str())
    }

    pub fn expected_effort(&self) -> String {
        format!("{} {}", self.expected_time, self.unit)
            .trim()
            .to_string()
    }
}

impl AsRef<Task> for Task {
    fn as_ref(&self) -> &Task {
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Add,
    Edit,
    Delete,
    Complete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::Edit => "EDIT",
            Self::Delete => "DELETE",
            Self::Complete => "COMPLETE",
        }
    }

    /// DELETE and COMPLETE take a task off the visible list.
    pub fn retires_task(&self) -> bool {
        matches!(self, Self::Delete | Self::Complete)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub action: Action,
    pub task_id: String,
    pub time: DateTime<Utc>,
}

impl Activity {
    pub fn record(action: Action, task_id: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            action,
            task_id: task_id.into(),
            time,
        }
    }
}
