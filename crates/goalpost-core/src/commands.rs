use std::collections::BTreeMap;

use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use tracing::{debug, info, instrument, warn};

use crate::analysis::analyze_sources;
use crate::cli::Invocation;
use crate::config::Config;
use crate::datastore::{DataStore, resolve_prefix};
use crate::datetime::{local_timezone, parse_date, to_local_date};
use crate::history::history;
use crate::notify::NotificationScheduler;
use crate::projector::{project, retired_task_ids};
use crate::render::{Renderer, short_id};
use crate::sorter::{SortCriterion, sort_by_tag};
use crate::task::{Action, DateParts, Tag, Task};

const REMINDER_HOUR: u32 = 9;

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "add", "edit", "list", "done", "delete", "history", "analysis", "tags", "remind", "show",
        "help", "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(store, cfg, renderer, scheduler, inv))]
pub fn dispatch(
    store: &mut DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    scheduler: &dyn NotificationScheduler,
    inv: Invocation,
) -> anyhow::Result<()> {
    let now = Utc::now();
    let today = to_local_date(now);
    let command = inv.command.as_str();
    let args = inv.command_args.as_slice();

    debug!(command, ?args, "dispatching command");

    match command {
        "add" => cmd_add(store, args, now, today),
        "edit" => cmd_edit(store, args, now, today),
        "list" => cmd_list(store, cfg, renderer, args, today),
        "done" => cmd_retire(store, args, Action::Complete, now),
        "delete" => cmd_retire(store, args, Action::Delete, now),
        "history" => cmd_history(store, renderer),
        "analysis" => cmd_analysis(store, renderer, args, today),
        "tags" => cmd_tags(store),
        "remind" => cmd_remind(store, scheduler, args, today),
        "show" => cmd_show(cfg),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mod {
    TagSelect(String),
    TagAdd(String),
    TagRemove(String),
    Note(String),
    Parent(String),
    Start(DateParts),
    Due(DateParts),
    Expected(String),
    Unit(String),
}

#[instrument(skip(args, today))]
fn parse_title_and_mods(args: &[String], today: NaiveDate) -> anyhow::Result<(String, Vec<Mod>)> {
    let mut title_parts = Vec::new();
    let mut mods = Vec::new();

    let mut literal = false;
    for arg in args {
        if arg == "--" {
            literal = true;
            continue;
        }

        if !literal && let Some(one_mod) = parse_one_mod(arg, today)? {
            mods.push(one_mod);
            continue;
        }

        title_parts.push(arg.clone());
    }

    Ok((title_parts.join(" "), mods))
}

fn parse_one_mod(tok: &str, today: NaiveDate) -> anyhow::Result<Option<Mod>> {
    if let Some(tag) = tok.strip_prefix('+').filter(|t| !t.is_empty()) {
        return Ok(Some(Mod::TagSelect(tag.to_string())));
    }
    // `-5` or `--x` is title text; a removed tag starts with a letter.
    if let Some(tag) = tok
        .strip_prefix('-')
        .filter(|t| t.chars().next().is_some_and(char::is_alphabetic))
    {
        return Ok(Some(Mod::TagRemove(tag.to_string())));
    }

    let Some((key, value)) = tok.split_once(':') else {
        return Ok(None);
    };

    match key.to_ascii_lowercase().as_str() {
        "tag" => Ok(Some(Mod::TagAdd(value.to_string()))),
        "note" => Ok(Some(Mod::Note(value.to_string()))),
        "parent" => Ok(Some(Mod::Parent(value.to_string()))),
        "start" => Ok(Some(Mod::Start(parse_date_parts(value, today)?))),
        "due" => Ok(Some(Mod::Due(parse_date_parts(value, today)?))),
        "expected" => Ok(Some(Mod::Expected(value.to_string()))),
        "unit" => Ok(Some(Mod::Unit(value.to_string()))),
        _ => Ok(None),
    }
}

fn parse_date_parts(value: &str, today: NaiveDate) -> anyhow::Result<DateParts> {
    if value.trim().is_empty() {
        return Ok(DateParts::default());
    }
    Ok(DateParts::from_date(parse_date(value, today)?))
}

fn apply_mods(task: &mut Task, mods: &[Mod], tasks: &[Task]) -> anyhow::Result<()> {
    for one_mod in mods {
        match one_mod {
            Mod::TagSelect(text) | Mod::TagAdd(text) => {
                let selected = matches!(one_mod, Mod::TagSelect(_));
                match task.selected_tags.iter_mut().find(|tag| &tag.text == text) {
                    Some(tag) => tag.selected = selected,
                    None => task.selected_tags.push(Tag {
                        text: text.clone(),
                        selected,
                    }),
                }
            }
            Mod::TagRemove(text) => {
                let before = task.selected_tags.len();
                task.selected_tags.retain(|tag| &tag.text != text);
                if task.selected_tags.len() == before {
                    warn!(tag = %text, "task has no such tag; nothing removed");
                }
            }
            Mod::Note(note) => task.note = note.clone(),
            Mod::Parent(raw) => {
                task.parent_task_id = if raw.trim().is_empty() {
                    None
                } else {
                    Some(resolve_prefix(tasks, raw)?)
                };
            }
            Mod::Start(date) => task.start_date = date.clone(),
            Mod::Due(date) => task.due_date = date.clone(),
            Mod::Expected(value) => task.expected_time = value.clone(),
            Mod::Unit(value) => task.unit = value.clone(),
        }
    }
    Ok(())
}

#[instrument(skip(store, args, now, today))]
fn cmd_add(
    store: &mut DataStore,
    args: &[String],
    now: DateTime<Utc>,
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command add");

    let (title, mods) = parse_title_and_mods(args, today)?;
    let tasks = store.load_tasks()?;
    let mut task = Task::new(title);
    apply_mods(&mut task, &mods, &tasks)?;

    let saved = store.save_task(task, None, now)?;
    println!("Created task {} ({}).", short_id(&saved.id), saved.title);
    Ok(())
}

#[instrument(skip(store, args, now, today))]
fn cmd_edit(
    store: &mut DataStore,
    args: &[String],
    now: DateTime<Utc>,
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command edit");

    let (target, rest) = args
        .split_first()
        .ok_or_else(|| anyhow!("edit requires a task id"))?;
    let tasks = store.load_tasks()?;
    let id = resolve_prefix(&tasks, target)?;
    let mut task = tasks
        .iter()
        .find(|t| t.id == id)
        .cloned()
        .ok_or_else(|| anyhow!("task not found: {id}"))?;

    let (title, mods) = parse_title_and_mods(rest, today)?;
    if !title.is_empty() {
        task.title = title;
    }
    if mods.is_empty() && rest.is_empty() {
        warn!(id = %id, "edit without changes still records an EDIT");
    }
    apply_mods(&mut task, &mods, &tasks)?;

    let saved = store.save_task(task, Some(&id), now)?;
    println!("Modified task {} ({}).", short_id(&saved.id), saved.title);
    Ok(())
}

#[instrument(skip(store, args, now))]
fn cmd_retire(
    store: &mut DataStore,
    args: &[String],
    action: Action,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!(%action, "command retire");

    if args.is_empty() {
        return Err(anyhow!("{} requires at least one task id", action.as_str().to_lowercase()));
    }

    let mut retired = 0_u64;
    for raw in args {
        let id = store.resolve_task_id(raw)?;
        store.retire_task(&id, action, now)?;
        retired += 1;
    }

    let verb = match action {
        Action::Complete => "Completed",
        _ => "Deleted",
    };
    println!("{verb} {retired} task(s).");
    Ok(())
}

#[instrument(skip(store, cfg, renderer, args, today))]
fn cmd_list(
    store: &mut DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    args: &[String],
    today: NaiveDate,
) -> anyhow::Result<()> {
    let tasks = store.load_tasks()?;
    let activities = store.load_activities()?;
    let visible = project(&tasks, &activities);

    let criterion = if args.is_empty() {
        cfg.default_sort()
    } else {
        Some(SortCriterion::parse(&args.join(" ")))
    };
    let ordered = match &criterion {
        Some(criterion) => sort_by_tag(&visible, criterion),
        None => visible,
    };

    debug!(count = ordered.len(), sort = ?criterion, "listing tasks");
    if ordered.is_empty() {
        println!("No tasks.");
        return Ok(());
    }
    renderer.print_task_list(&ordered, today)
}

#[instrument(skip(store, renderer))]
fn cmd_history(store: &mut DataStore, renderer: &mut Renderer) -> anyhow::Result<()> {
    let tasks = store.load_tasks()?;
    let activities = store.load_activities()?;
    let entries = history(&tasks, &activities);
    if entries.is_empty() {
        println!("No activity.");
        return Ok(());
    }
    renderer.print_history(&entries)
}

#[instrument(skip(store, renderer, args, today))]
fn cmd_analysis(
    store: &mut DataStore,
    renderer: &mut Renderer,
    args: &[String],
    today: NaiveDate,
) -> anyhow::Result<()> {
    let reference_date = if args.is_empty() {
        today
    } else {
        parse_date(&args.join(" "), today)?
    };

    let report = analyze_sources(
        store.load_tasks(),
        store.load_activities(),
        reference_date,
        local_timezone(),
    );
    renderer.print_report(&report)
}

#[instrument(skip(store))]
fn cmd_tags(store: &mut DataStore) -> anyhow::Result<()> {
    let tasks = store.load_tasks()?;
    let activities = store.load_activities()?;
    let retired = retired_task_ids(&activities);

    let mut counts: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for task in tasks.iter().filter(|t| !retired.contains(t.id.as_str())) {
        for tag in &task.selected_tags {
            let entry = counts.entry(tag.text.as_str()).or_default();
            entry.0 += 1;
            if tag.selected {
                entry.1 += 1;
            }
        }
    }

    for (tag, (total, selected)) in counts {
        println!("{tag} {total} ({selected} selected)");
    }
    Ok(())
}

#[instrument(skip(store, scheduler, args, today))]
fn cmd_remind(
    store: &mut DataStore,
    scheduler: &dyn NotificationScheduler,
    args: &[String],
    today: NaiveDate,
) -> anyhow::Result<()> {
    let (target, rest) = args
        .split_first()
        .ok_or_else(|| anyhow!("remind requires a task id and a date"))?;
    if rest.is_empty() {
        return Err(anyhow!("remind requires a date"));
    }

    let tasks = store.load_tasks()?;
    let id = resolve_prefix(&tasks, target)?;
    let task = tasks
        .iter()
        .find(|t| t.id == id)
        .ok_or_else(|| anyhow!("task not found: {id}"))?;

    let date = parse_date(&rest.join(" "), today)?;
    let when = reminder_instant(date)?;
    scheduler.schedule_notification(task, when)?;
    println!("Reminder set for {} on {}.", task.title, date.format("%Y-%m-%d"));
    Ok(())
}

fn reminder_instant(date: NaiveDate) -> anyhow::Result<DateTime<Utc>> {
    let local = date
        .and_hms_opt(REMINDER_HOUR, 0, 0)
        .ok_or_else(|| anyhow!("failed to construct reminder time"))?;
    local_timezone()
        .from_local_datetime(&local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| anyhow!("reminder time does not exist locally: {local}"))
}

fn cmd_show(cfg: &Config) -> anyhow::Result<()> {
    for (key, value) in cfg.iter() {
        println!("{key}={value}");
    }
    for file in &cfg.loaded_files {
        println!("# loaded {}", file.display());
    }
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!(
        "goalpost commands:
  list [Due Date|<tag>]          visible tasks, optionally sorted
  add <title> [mods]             create a task
  edit <id> [title] [mods]       change a task
  done <id>..                    mark tasks complete
  delete <id>..                  delete tasks
  history                        activity log
  analysis [date]                productivity report
  tags                           tags on visible tasks
  remind <id> <date>             schedule a reminder
  show                           effective configuration

mods: +tag -tag tag:<name> note:<text> parent:<id>
      start:<date> due:<date> expected:<n> unit:<unit>"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{Mod, apply_mods, expand_command_abbrev, known_command_names, parse_title_and_mods};
    use crate::task::{DateParts, Tag, Task};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).expect("valid date")
    }

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn abbreviations_must_be_unique() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("an", &known), Some("analysis"));
        assert_eq!(expand_command_abbrev("list", &known), Some("list"));
        assert_eq!(expand_command_abbrev("de", &known), Some("delete"));
        assert_eq!(expand_command_abbrev("d", &known), None);
    }

    #[test]
    fn title_words_and_modifiers_split() {
        let (title, mods) = parse_title_and_mods(
            &strings(&["Write", "report", "+work", "due:tomorrow", "--", "+literal"]),
            today(),
        )
        .expect("parse");
        assert_eq!(title, "Write report +literal");
        assert_eq!(
            mods,
            vec![
                Mod::TagSelect("work".to_string()),
                Mod::Due(DateParts::new("16", "03", "2024")),
            ]
        );
    }

    #[test]
    fn negative_numbers_stay_in_the_title() {
        let (title, mods) =
            parse_title_and_mods(&strings(&["Lower", "temp", "-5", "degrees"]), today())
                .expect("parse");
        assert_eq!(title, "Lower temp -5 degrees");
        assert!(mods.is_empty());

        let (title, mods) = parse_title_and_mods(&strings(&["Tidy", "-home"]), today()).expect("parse");
        assert_eq!(title, "Tidy");
        assert_eq!(mods, vec![Mod::TagRemove("home".to_string())]);
    }

    #[test]
    fn modifiers_update_tags_and_parent() {
        let parent = Task::with_id("parent-1", "Parent");
        let mut task = Task::with_id("child-1", "Child");
        task.selected_tags = vec![Tag::selected("old"), Tag::unselected("home")];

        let mods = vec![
            Mod::TagRemove("old".to_string()),
            Mod::TagSelect("home".to_string()),
            Mod::TagAdd("later".to_string()),
            Mod::Parent("parent".to_string()),
            Mod::Expected("2".to_string()),
            Mod::Unit("hours".to_string()),
        ];
        apply_mods(&mut task, &mods, &[parent]).expect("apply");

        assert_eq!(
            task.selected_tags,
            vec![Tag::selected("home"), Tag::unselected("later")]
        );
        assert_eq!(task.parent_task_id.as_deref(), Some("parent-1"));
        assert_eq!(task.expected_effort(), "2 hours");
    }

    #[test]
    fn bad_date_modifier_is_an_error() {
        assert!(parse_title_and_mods(&strings(&["x", "due:whenever"]), today()).is_err());
    }
}
