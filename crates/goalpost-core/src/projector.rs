use std::collections::HashSet;

use tracing::debug;

use crate::task::{Activity, Task};

/// A visible task together with its visible subtasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectedTask {
    pub task: Task,
    pub subtasks: Vec<Task>,
}

impl AsRef<Task> for ProjectedTask {
    fn as_ref(&self) -> &Task {
        &self.task
    }
}

/// Ids of tasks that a DELETE or COMPLETE record has taken off the list.
pub fn retired_task_ids(activities: &[Activity]) -> HashSet<&str> {
    activities
        .iter()
        .filter(|activity| activity.action.retires_task())
        .map(|activity| activity.task_id.as_str())
        .collect()
}

pub fn is_active(task: &Task, activities: &[Activity]) -> bool {
    !activities
        .iter()
        .any(|activity| activity.action.retires_task() && activity.task_id == task.id)
}

/// Builds the visible task list.
///
/// Surviving tasks keep their input order. Subtasks are attached by
/// `parent_task_id`; a retired subtask is not attached, and a subtask still
/// appears in the list in its own right.
#[tracing::instrument(skip_all, fields(tasks = tasks.len(), activities = activities.len()))]
pub fn project(tasks: &[Task], activities: &[Activity]) -> Vec<ProjectedTask> {
    let retired = retired_task_ids(activities);
    let visible: Vec<&Task> = tasks
        .iter()
        .filter(|task| !retired.contains(task.id.as_str()))
        .collect();

    let projected: Vec<ProjectedTask> = visible
        .iter()
        .map(|task| ProjectedTask {
            task: (*task).clone(),
            subtasks: visible
                .iter()
                .filter(|candidate| {
                    candidate.id != task.id
                        && candidate.parent_task_id.as_deref() == Some(task.id.as_str())
                })
                .map(|candidate| (*candidate).clone())
                .collect(),
        })
        .collect();

    debug!(
        retired = retired.len(),
        visible = projected.len(),
        "projected task list"
    );
    projected
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::project;
    use crate::task::{Action, Activity, Task};

    fn activity(action: Action, task_id: &str) -> Activity {
        let at = Utc
            .with_ymd_and_hms(2024, 3, 15, 10, 0, 0)
            .single()
            .expect("valid time");
        Activity::record(action, task_id, at)
    }

    #[test]
    fn deleted_task_is_hidden() {
        let tasks = vec![Task::with_id("x", "X")];
        let activities = vec![activity(Action::Delete, "x")];
        assert!(project(&tasks, &activities).is_empty());
    }

    #[test]
    fn completed_hidden_and_edits_keep_visible() {
        let tasks = vec![
            Task::with_id("a", "A"),
            Task::with_id("b", "B"),
            Task::with_id("c", "C"),
        ];
        let activities = vec![
            activity(Action::Add, "a"),
            activity(Action::Edit, "a"),
            activity(Action::Complete, "b"),
            activity(Action::Add, "c"),
        ];
        let ids: Vec<String> = project(&tasks, &activities)
            .into_iter()
            .map(|p| p.task.id)
            .collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn subtasks_attach_by_parent_id() {
        let parent = Task::with_id("p", "Same title");
        let twin = Task::with_id("q", "Same title");
        let mut child = Task::with_id("c", "Child");
        child.parent_task_id = Some("p".to_string());
        let mut gone = Task::with_id("g", "Gone child");
        gone.parent_task_id = Some("p".to_string());

        let tasks = vec![parent, twin, child, gone];
        let activities = vec![activity(Action::Complete, "g")];
        let projected = project(&tasks, &activities);

        assert_eq!(projected.len(), 3);
        let subtask_ids: Vec<&str> = projected[0]
            .subtasks
            .iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(subtask_ids, vec!["c"]);
        assert!(projected[1].subtasks.is_empty());
        assert_eq!(projected[2].task.id, "c");
    }

    #[test]
    fn every_active_task_appears_once() {
        let tasks: Vec<Task> = (0..20)
            .map(|i| Task::with_id(format!("t{i}"), format!("Task {i}")))
            .collect();
        let activities: Vec<Activity> = (0..20)
            .filter(|i| i % 3 == 0)
            .map(|i| {
                let action = if i % 2 == 0 {
                    Action::Delete
                } else {
                    Action::Complete
                };
                activity(action, &format!("t{i}"))
            })
            .collect();

        let projected = project(&tasks, &activities);
        for task in &tasks {
            let hits = projected.iter().filter(|p| p.task.id == task.id).count();
            let retired = activities.iter().any(|a| a.task_id == task.id);
            assert_eq!(hits, usize::from(!retired), "task {}", task.id);
        }
    }

    #[test]
    fn empty_inputs_project_to_empty_list() {
        assert!(project(&[], &[]).is_empty());
        let tasks = vec![Task::with_id("a", "A")];
        assert_eq!(project(&tasks, &[]).len(), 1);
    }
}
