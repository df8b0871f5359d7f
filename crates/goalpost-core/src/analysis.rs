use std::collections::{BTreeMap, HashSet};

use chrono::{Datelike, NaiveDate, Timelike};
use chrono_tz::Tz;
use tracing::{debug, error, instrument};

use crate::datetime::month_name;
use crate::task::{Action, Activity, Task};

pub const NO_DATA: &str = "No data available";

/// COMPLETE counts for the reference day, month and year.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeriodCounts {
    pub day: usize,
    pub month: usize,
    pub year: usize,
}

/// Busiest buckets. Ties resolve to the smallest hour, day or month.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProductiveTimes {
    pub hour: Option<u32>,
    pub day: Option<NaiveDate>,
    pub month: Option<u32>,
}

impl ProductiveTimes {
    pub fn hour_label(&self) -> String {
        self.hour
            .map(|hour| format!("{hour}:00"))
            .unwrap_or_else(|| NO_DATA.to_string())
    }

    pub fn day_label(&self) -> String {
        self.day
            .map(|day| format!("{}/{}/{}", day.month(), day.day(), day.year()))
            .unwrap_or_else(|| NO_DATA.to_string())
    }

    pub fn month_label(&self) -> String {
        self.month
            .and_then(month_name)
            .unwrap_or(NO_DATA)
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSummary {
    pub tag: String,
    pub completed_count: usize,
    pub incomplete_count: usize,
}

/// A `None` section means its source collection could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisReport {
    pub reference_date: NaiveDate,
    pub completed: Option<PeriodCounts>,
    pub productive: Option<ProductiveTimes>,
    pub categories: Option<Vec<TagSummary>>,
}

#[instrument(skip(tasks, activities, tz), fields(tasks = tasks.len(), activities = activities.len()))]
pub fn aggregate(
    tasks: &[Task],
    activities: &[Activity],
    reference_date: NaiveDate,
    tz: &Tz,
) -> AnalysisReport {
    let (completed, productive) = completion_periods(activities, reference_date, tz);
    AnalysisReport {
        reference_date,
        completed: Some(completed),
        productive: Some(productive),
        categories: Some(categorize_by_tag(tasks, activities)),
    }
}

/// Same as [`aggregate`], but takes the raw load results.
///
/// A failed activity load drops every section; a failed task load drops
/// only the tag categories. Failures are logged, not returned.
#[instrument(skip(tasks, activities, tz))]
pub fn analyze_sources(
    tasks: anyhow::Result<Vec<Task>>,
    activities: anyhow::Result<Vec<Activity>>,
    reference_date: NaiveDate,
    tz: &Tz,
) -> AnalysisReport {
    let activities = match activities {
        Ok(activities) => activities,
        Err(err) => {
            error!(error = %format!("{err:#}"), "failed loading activity collection");
            return AnalysisReport {
                reference_date,
                completed: None,
                productive: None,
                categories: None,
            };
        }
    };

    let (completed, productive) = completion_periods(&activities, reference_date, tz);
    let categories = match tasks {
        Ok(tasks) => Some(categorize_by_tag(&tasks, &activities)),
        Err(err) => {
            error!(error = %format!("{err:#}"), "failed loading task collection");
            None
        }
    };

    AnalysisReport {
        reference_date,
        completed: Some(completed),
        productive: Some(productive),
        categories,
    }
}

pub fn completion_periods(
    activities: &[Activity],
    reference_date: NaiveDate,
    tz: &Tz,
) -> (PeriodCounts, ProductiveTimes) {
    let mut counts = PeriodCounts::default();
    let mut hours: BTreeMap<u32, usize> = BTreeMap::new();
    let mut days: BTreeMap<u32, usize> = BTreeMap::new();
    let mut months: BTreeMap<u32, usize> = BTreeMap::new();

    for activity in activities {
        if activity.action != Action::Complete {
            continue;
        }
        let local = activity.time.with_timezone(tz);
        if local.year() != reference_date.year() {
            continue;
        }

        counts.year += 1;
        *months.entry(local.month()).or_default() += 1;

        if local.month() != reference_date.month() {
            continue;
        }
        counts.month += 1;
        *days.entry(local.day()).or_default() += 1;

        if local.day() != reference_date.day() {
            continue;
        }
        counts.day += 1;
        *hours.entry(local.hour()).or_default() += 1;
    }

    let productive = ProductiveTimes {
        hour: busiest(&hours),
        day: busiest(&days).and_then(|day| {
            NaiveDate::from_ymd_opt(reference_date.year(), reference_date.month(), day)
        }),
        month: busiest(&months),
    };

    debug!(
        day = counts.day,
        month = counts.month,
        year = counts.year,
        "counted completions"
    );
    (counts, productive)
}

fn busiest(buckets: &BTreeMap<u32, usize>) -> Option<u32> {
    let mut best: Option<(u32, usize)> = None;
    for (&key, &count) in buckets {
        if best.is_none_or(|(_, top)| count > top) {
            best = Some((key, count));
        }
    }
    best.map(|(key, _)| key)
}

/// One row per selected tag, in first-seen order.
///
/// A task with several selected tags is counted under the first one, so
/// every tagged task lands in exactly one row. Its other tags still get a
/// row, which stays at zero unless another task leads with that tag.
pub fn categorize_by_tag(tasks: &[Task], activities: &[Activity]) -> Vec<TagSummary> {
    let completed: HashSet<&str> = activities
        .iter()
        .filter(|activity| activity.action == Action::Complete)
        .map(|activity| activity.task_id.as_str())
        .collect();

    let mut rows: Vec<TagSummary> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for task in tasks {
        if !seen.insert(task.id.as_str()) {
            continue;
        }

        for tag in task.selected_tags.iter().filter(|tag| tag.selected) {
            if !rows.iter().any(|row| row.tag == tag.text) {
                rows.push(TagSummary {
                    tag: tag.text.clone(),
                    completed_count: 0,
                    incomplete_count: 0,
                });
            }
        }

        let Some(lead) = task.first_selected_tag() else {
            continue;
        };
        if let Some(row) = rows.iter_mut().find(|row| row.tag == lead) {
            if completed.contains(task.id.as_str()) {
                row.completed_count += 1;
            } else {
                row.incomplete_count += 1;
            }
        }
    }
    rows
}
