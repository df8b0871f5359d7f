use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::task::Task;

/// Something that can arrange a reminder for a task at a given instant.
pub trait NotificationScheduler {
    fn schedule_notification(&self, task: &Task, when: DateTime<Utc>) -> anyhow::Result<()>;
}

#[derive(Debug, Serialize)]
struct ReminderPayload<'a> {
    task: &'a Task,
    when: DateTime<Utc>,
}

/// Hands reminders to executable `on-remind.*` scripts in `<data>/hooks`.
#[derive(Debug, Clone)]
pub struct HookScheduler {
    enabled: bool,
    hooks_dir: PathBuf,
}

impl HookScheduler {
    pub fn new(cfg: &Config, data_dir: &Path) -> Self {
        let enabled = cfg.hooks_enabled();
        let hooks_dir = data_dir.join("hooks");
        debug!(
            enabled,
            hooks_dir = %hooks_dir.display(),
            "initialized reminder hooks"
        );
        Self { enabled, hooks_dir }
    }

    #[instrument(skip(self))]
    fn list_scripts(&self, event: &str) -> anyhow::Result<Vec<PathBuf>> {
        if !self.hooks_dir.exists() {
            return Ok(Vec::new());
        }

        let mut scripts = Vec::new();
        for entry in fs::read_dir(&self.hooks_dir)
            .with_context(|| format!("failed to read hooks dir {}", self.hooks_dir.display()))?
        {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if !name.starts_with(&format!("{event}.")) {
                continue;
            }

            if !is_executable(&path)? {
                debug!(path = %path.display(), "skipping non-executable hook");
                continue;
            }

            scripts.push(path);
        }

        scripts.sort();
        Ok(scripts)
    }
}

impl NotificationScheduler for HookScheduler {
    #[instrument(skip(self, task), fields(task = %task.id))]
    fn schedule_notification(&self, task: &Task, when: DateTime<Utc>) -> anyhow::Result<()> {
        if !self.enabled {
            warn!("hooks disabled; reminder not scheduled");
            return Ok(());
        }

        let scripts = self.list_scripts("on-remind")?;
        if scripts.is_empty() {
            warn!(hooks_dir = %self.hooks_dir.display(), "no on-remind hooks installed");
            return Ok(());
        }

        let payload = serde_json::to_string(&ReminderPayload { task, when })?;
        for script in scripts {
            run_hook(&script, &payload)?;
        }
        Ok(())
    }
}

fn run_hook(path: &Path, payload: &str) -> anyhow::Result<()> {
    info!(hook = %path.display(), "running hook");
    let mut child = Command::new(path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to run hook {}", path.display()))?;

    if let Some(mut stdin) = child.stdin.take() {
        writeln!(stdin, "{payload}")?;
    }

    let output = child
        .wait_with_output()
        .with_context(|| format!("failed to wait for hook {}", path.display()))?;

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if !output.status.success() {
        if !stderr.is_empty() {
            warn!(hook = %path.display(), stderr = %stderr, "hook failed");
        }
        return Err(anyhow!(
            "Hook Error: script {} failed with status {}",
            path.display(),
            output
                .status
                .code()
                .map(|code| code.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        ));
    }

    if !stderr.is_empty() {
        warn!(hook = %path.display(), stderr = %stderr, "hook wrote stderr");
    }
    Ok(())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> anyhow::Result<bool> {
    use std::os::unix::fs::PermissionsExt;

    let mode = fs::metadata(path)?.permissions().mode();
    Ok(mode & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> anyhow::Result<bool> {
    Ok(path.is_file())
}
