use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::projector::is_active;
use crate::task::{Action, Activity, Task};
use crate::validate::validate_task;

/// Local stand-in for the remote Task and Activity collections.
#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
    pub activity_path: PathBuf,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let tasks_path = data_dir.join("tasks.data");
        let activity_path = data_dir.join("activity.data");

        if !tasks_path.exists() {
            fs::write(&tasks_path, "")?;
        }
        if !activity_path.exists() {
            fs::write(&activity_path, "")?;
        }

        info!(
            data_dir = %data_dir.display(),
            tasks = %tasks_path.display(),
            activity = %activity_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            tasks_path,
            activity_path,
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load_tasks(&self) -> anyhow::Result<Vec<Task>> {
        load_jsonl(&self.tasks_path).context("failed to load tasks.data")
    }

    #[tracing::instrument(skip(self))]
    pub fn load_activities(&self) -> anyhow::Result<Vec<Activity>> {
        load_jsonl(&self.activity_path).context("failed to load activity.data")
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn save_tasks(&self, tasks: &[Task]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.tasks_path, tasks).context("failed to save tasks.data")
    }

    #[tracing::instrument(skip(self, activity), fields(action = %activity.action, task = %activity.task_id))]
    pub fn append_activity(&self, activity: &Activity) -> anyhow::Result<()> {
        let serialized = serde_json::to_string(activity)?;
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.activity_path)
            .with_context(|| format!("failed to open {}", self.activity_path.display()))?;
        writeln!(file, "{serialized}")
            .with_context(|| format!("failed to append {}", self.activity_path.display()))?;
        Ok(())
    }

    /// Creates the task when `existing_id` is `None` (logging ADD), otherwise
    /// overwrites that task in place (logging EDIT). Returns the stored task.
    #[tracing::instrument(skip(self, task, now), fields(existing = ?existing_id))]
    pub fn save_task(
        &self,
        mut task: Task,
        existing_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Task> {
        validate_task(&task)?;
        let previous = self.load_tasks()?;
        let mut tasks = previous.clone();

        let action = match existing_id {
            None => {
                task.id = Uuid::new_v4().to_string();
                check_parent(&tasks, &task)?;
                tasks.push(task.clone());
                Action::Add
            }
            Some(id) => {
                let slot = tasks
                    .iter()
                    .position(|t| t.id == id)
                    .ok_or_else(|| anyhow!("task not found: {id}"))?;
                task.id = id.to_string();
                check_parent(&tasks, &task)?;
                tasks[slot] = task.clone();
                Action::Edit
            }
        };

        self.save_tasks(&tasks)?;
        // tasks.data never keeps a change that has no activity record.
        if let Err(err) = self.append_activity(&Activity::record(action, task.id.clone(), now)) {
            if let Err(restore) = self.save_tasks(&previous) {
                error!(error = %restore, "failed to restore tasks.data");
            }
            return Err(err.context(format!("{action} for {} was not recorded", task.id)));
        }
        debug!(id = %task.id, %action, "task saved");
        Ok(task)
    }

    /// Appends a DELETE or COMPLETE record for an active task.
    #[tracing::instrument(skip(self, now))]
    pub fn retire_task(
        &self,
        task_id: &str,
        action: Action,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Activity> {
        if !action.retires_task() {
            return Err(anyhow!("{action} does not retire a task"));
        }

        let tasks = self.load_tasks()?;
        let activities = self.load_activities()?;
        let task = tasks
            .iter()
            .find(|t| t.id == task_id)
            .ok_or_else(|| anyhow!("task not found: {task_id}"))?;
        if !is_active(task, &activities) {
            return Err(anyhow!(
                "task {} is already completed or deleted",
                task.title
            ));
        }

        let activity = Activity::record(action, task_id, now);
        self.append_activity(&activity)?;
        Ok(activity)
    }

    /// Resolves a full id or a unique id prefix.
    pub fn resolve_task_id(&self, prefix: &str) -> anyhow::Result<String> {
        let tasks = self.load_tasks()?;
        resolve_prefix(&tasks, prefix)
    }
}

pub(crate) fn resolve_prefix(tasks: &[Task], prefix: &str) -> anyhow::Result<String> {
    let prefix = prefix.trim();
    if prefix.is_empty() {
        return Err(anyhow!("task id is required"));
    }
    if let Some(task) = tasks.iter().find(|t| t.id == prefix) {
        return Ok(task.id.clone());
    }

    let mut matches = tasks.iter().filter(|t| t.id.starts_with(prefix));
    let first = matches
        .next()
        .ok_or_else(|| anyhow!("no task matches id {prefix}"))?;
    if matches.next().is_some() {
        return Err(anyhow!("task id {prefix} is ambiguous"));
    }
    Ok(first.id.clone())
}

fn check_parent(tasks: &[Task], task: &Task) -> anyhow::Result<()> {
    let Some(parent) = task.parent_task_id.as_deref() else {
        return Ok(());
    };
    if parent == task.id {
        return Err(anyhow!("a task cannot be its own parent"));
    }
    if !tasks.iter().any(|t| t.id == parent) {
        return Err(anyhow!("parent task not found: {parent}"));
    }
    Ok(())
}

#[tracing::instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let record: T = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(record);
    }

    debug!(count = out.len(), "loaded records from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, records))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, records: &[T]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = records.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for record in records {
        let serialized = serde_json::to_string(record)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tempfile::tempdir;

    use super::{DataStore, resolve_prefix};
    use crate::task::Task;

    #[test]
    fn failed_activity_append_undoes_the_task_write() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open datastore");
        let kept = store
            .save_task(Task::new("Kept"), None, Utc::now())
            .expect("first save");

        std::fs::remove_file(&store.activity_path).expect("remove activity log");
        std::fs::create_dir(&store.activity_path).expect("block activity log");

        let err = store
            .save_task(Task::new("Lost"), None, Utc::now())
            .expect_err("append fails");
        assert!(format!("{err:#}").contains("was not recorded"));

        let tasks = store.load_tasks().expect("load tasks");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, kept.id);
    }

    #[test]
    fn prefix_resolution_requires_uniqueness() {
        let tasks = vec![
            Task::with_id("abc123", "A"),
            Task::with_id("abd456", "B"),
        ];
        assert_eq!(resolve_prefix(&tasks, "abc").expect("unique"), "abc123");
        assert!(resolve_prefix(&tasks, "ab").is_err());
        assert!(resolve_prefix(&tasks, "zz").is_err());
        assert!(resolve_prefix(&tasks, " ").is_err());
    }
}
