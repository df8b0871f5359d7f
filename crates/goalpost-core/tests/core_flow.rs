use chrono::{NaiveDate, TimeZone, Utc};
use goalpost_core::analysis::analyze_sources;
use goalpost_core::datastore::DataStore;
use goalpost_core::history::history;
use goalpost_core::projector::project;
use goalpost_core::sorter::{SortCriterion, sort_by_tag};
use goalpost_core::task::{Action, DateParts, Tag, Task};
use goalpost_core::validate::ValidationError;
use tempfile::tempdir;

#[test]
fn datastore_roundtrip_projection_and_analysis() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    let now = Utc
        .with_ymd_and_hms(2024, 3, 15, 10, 0, 0)
        .single()
        .expect("valid time");

    let mut parent = Task::new("Ship release");
    parent.selected_tags = vec![Tag::selected("work")];
    parent.due_date = DateParts::new("20", "03", "2024");
    let parent = store.save_task(parent, None, now).expect("add parent");

    let mut child = Task::new("Write changelog");
    child.parent_task_id = Some(parent.id.clone());
    child.selected_tags = vec![Tag::selected("work")];
    let child = store.save_task(child, None, now).expect("add child");

    let mut chore = Task::new("Water plants");
    chore.selected_tags = vec![Tag::selected("home")];
    chore.due_date = DateParts::new("16", "03", "2024");
    let chore = store.save_task(chore, None, now).expect("add chore");

    let mut renamed = chore.clone();
    renamed.title = "Water the plants".to_string();
    store
        .save_task(renamed, Some(&chore.id), now)
        .expect("edit chore");

    let tasks = store.load_tasks().expect("load tasks");
    assert_eq!(tasks.len(), 3);
    assert_eq!(tasks[2].title, "Water the plants");

    let visible = project(&tasks, &store.load_activities().expect("load activity"));
    assert_eq!(visible.len(), 3);
    assert_eq!(visible[0].subtasks.len(), 1);
    assert_eq!(visible[0].subtasks[0].id, child.id);

    let by_due = sort_by_tag(&visible, &SortCriterion::DueDate);
    let titles: Vec<&str> = by_due.iter().map(|p| p.task.title.as_str()).collect();
    assert_eq!(titles, vec!["Water the plants", "Ship release", "Write changelog"]);

    let by_home = sort_by_tag(&visible, &SortCriterion::parse("home"));
    assert_eq!(by_home[0].task.id, chore.id);

    store
        .retire_task(&child.id, Action::Complete, now)
        .expect("complete child");
    store
        .retire_task(&chore.id, Action::Delete, now)
        .expect("delete chore");
    assert!(
        store
            .retire_task(&chore.id, Action::Complete, now)
            .is_err()
    );

    let tasks = store.load_tasks().expect("reload tasks");
    let activities = store.load_activities().expect("reload activity");
    assert_eq!(activities.len(), 6);

    let visible = project(&tasks, &activities);
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].task.id, parent.id);
    assert!(visible[0].subtasks.is_empty());

    let feed = history(&tasks, &activities);
    assert_eq!(feed[3].action, Action::Edit);
    assert_eq!(feed[3].title.as_deref(), Some("Water the plants"));

    let report = analyze_sources(
        store.load_tasks(),
        store.load_activities(),
        NaiveDate::from_ymd_opt(2024, 3, 15).expect("date"),
        &chrono_tz::UTC,
    );
    let completed = report.completed.expect("period counts");
    assert_eq!((completed.day, completed.month, completed.year), (1, 1, 1));
    assert_eq!(report.productive.expect("productive").hour_label(), "10:00");

    let categories = report.categories.expect("categories");
    assert_eq!(categories.len(), 2);
    assert_eq!(categories[0].tag, "work");
    assert_eq!(
        (categories[0].completed_count, categories[0].incomplete_count),
        (1, 1)
    );
    assert_eq!(categories[1].tag, "home");
    assert_eq!(
        (categories[1].completed_count, categories[1].incomplete_count),
        (0, 1)
    );
}

#[test]
fn invalid_drafts_are_not_saved() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    let now = Utc::now();

    let err = store
        .save_task(Task::new("  "), None, now)
        .expect_err("blank title");
    assert_eq!(
        err.downcast_ref::<ValidationError>(),
        Some(&ValidationError::MissingTitle)
    );

    let mut orphan = Task::new("Orphan");
    orphan.parent_task_id = Some("no-such-task".to_string());
    assert!(store.save_task(orphan, None, now).is_err());

    assert!(
        store
            .save_task(Task::new("Ghost"), Some("missing"), now)
            .is_err()
    );

    assert!(store.load_tasks().expect("load tasks").is_empty());
    assert!(store.load_activities().expect("load activity").is_empty());
}

#[test]
fn unreadable_collection_only_hides_its_section() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    std::fs::write(&store.tasks_path, "{not json}\n").expect("corrupt tasks");

    let report = analyze_sources(
        store.load_tasks(),
        store.load_activities(),
        NaiveDate::from_ymd_opt(2024, 3, 15).expect("date"),
        &chrono_tz::UTC,
    );
    assert!(report.categories.is_none());
    assert_eq!(report.completed.map(|c| c.year), Some(0));
}
