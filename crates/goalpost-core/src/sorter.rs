use std::cmp::Ordering;

use tracing::debug;

use crate::task::Task;

pub const DUE_DATE_CRITERION: &str = "Due Date";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortCriterion {
    DueDate,
    Tag(String),
}

impl SortCriterion {
    pub fn parse(raw: &str) -> Self {
        if raw == DUE_DATE_CRITERION {
            Self::DueDate
        } else {
            Self::Tag(raw.to_string())
        }
    }
}

impl std::fmt::Display for SortCriterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DueDate => f.write_str(DUE_DATE_CRITERION),
            Self::Tag(tag) => f.write_str(tag),
        }
    }
}

/// Returns a reordered copy of `tasks`; the input is left untouched.
///
/// Both modes use a stable sort, so ties keep their input order.
#[tracing::instrument(skip(tasks), fields(count = tasks.len()))]
pub fn sort_by_tag<T>(tasks: &[T], criterion: &SortCriterion) -> Vec<T>
where
    T: AsRef<Task> + Clone,
{
    let mut out = tasks.to_vec();
    match criterion {
        SortCriterion::DueDate => {
            out.sort_by(|a, b| compare_due(a.as_ref(), b.as_ref()));
        }
        SortCriterion::Tag(tag) => {
            // false < true, so negate to put tagged tasks first
            out.sort_by_key(|task| !task.as_ref().has_selected_tag(tag));
        }
    }
    debug!(criterion = %criterion, "sorted tasks");
    out
}

pub fn compare_due(a: &Task, b: &Task) -> Ordering {
    match (a.due_date.sort_key(), b.due_date.sort_key()) {
        (Some(left), Some(right)) => left.cmp(&right),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
