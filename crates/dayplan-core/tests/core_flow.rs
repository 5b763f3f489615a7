use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use dayplan_core::pages::{
    CreateTaskPage, DayListPage, FixedAnswer, HomePage, ListKind, Route, SubmitError, TaskForm,
};
use dayplan_core::selected_date::SelectedDateChannel;
use dayplan_core::storage::{FileKv, FileWatcher, Storage, TASKS_KEY};
use dayplan_core::store::TaskStore;
use dayplan_core::task::{Priority, Task};
use tempfile::tempdir;

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("date")
}

fn open(dir: &std::path::Path) -> Storage {
    Storage::new(Arc::new(FileKv::open(dir).expect("open storage")))
}

#[test]
fn created_task_survives_reopen() {
    let temp = tempdir().expect("tempdir");
    let day = ymd(2024, 3, 15);

    let storage = open(temp.path());
    let mut page = CreateTaskPage::load(&storage, day, Duration::ZERO);
    let form = TaskForm {
        name: "Buy milk".to_string(),
        priority: Some(Priority::High),
        ..TaskForm::default()
    };
    let outcome = page.submit(&form, Utc::now()).expect("submit");
    assert_eq!(outcome.redirect.to, Route::Home);

    let reopened = open(temp.path());
    let tasks = TaskStore::new(reopened.clone()).load_all();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].name, "Buy milk");
    assert_eq!(tasks[0].date, day);
    assert!(!tasks[0].completed);

    let home = HomePage::load(&reopened, day);
    assert_eq!(home.view().pending_count, 1);
}

#[test]
fn toggled_task_moves_between_lists() {
    let temp = tempdir().expect("tempdir");
    let storage = open(temp.path());
    let day = ymd(2024, 3, 15);
    TaskStore::new(storage.clone())
        .create(Task::new_pending(
            1,
            "Buy milk".to_string(),
            Priority::Medium,
            day,
            Utc::now(),
        ))
        .expect("create");

    let mut home = HomePage::load(&storage, day);
    home.toggle_task(0).expect("toggle");

    let pending = DayListPage::load(ListKind::Pending, &storage, Some("2024-03-15"), day);
    let completed = DayListPage::load(ListKind::Completed, &storage, Some("2024-03-15"), day);
    assert!(pending.view().tasks.is_empty());
    assert_eq!(completed.view().tasks.len(), 1);
    assert_eq!(completed.view().empty_message, None);
}

#[test]
fn bulk_delete_only_touches_the_selected_day() {
    let temp = tempdir().expect("tempdir");
    let storage = open(temp.path());
    let store = TaskStore::new(storage.clone());
    for (id, date) in [(1, ymd(2024, 3, 15)), (2, ymd(2024, 3, 15)), (3, ymd(2024, 3, 16))] {
        store
            .create(Task::new_pending(
                id,
                format!("task {id}"),
                Priority::Low,
                date,
                Utc::now(),
            ))
            .expect("create");
    }

    let mut home = HomePage::load(&storage, ymd(2024, 3, 15));
    let removed = home.delete_all(&mut FixedAnswer(true)).expect("delete all");
    assert_eq!(removed, Some(2));

    let left = store.load_all();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].id, 3);
}

#[test]
fn list_views_open_on_the_stored_selection() {
    let temp = tempdir().expect("tempdir");
    let storage = open(temp.path());
    SelectedDateChannel::new(storage.clone())
        .set(ymd(2024, 4, 1))
        .expect("select");

    let today = ymd(2024, 3, 15);
    let pending = DayListPage::load(ListKind::Pending, &storage, None, today);
    let completed = DayListPage::load(ListKind::Completed, &storage, None, today);
    assert_eq!(pending.selected_date(), ymd(2024, 4, 1));
    assert_eq!(completed.selected_date(), ymd(2024, 4, 1));

    let from_query = DayListPage::load(ListKind::Pending, &storage, Some("2024-05-02"), today);
    assert_eq!(from_query.selected_date(), ymd(2024, 5, 2));
}

#[test]
fn watcher_sees_writes_from_another_process() {
    let temp = tempdir().expect("tempdir");
    let ours = open(temp.path());
    let theirs = open(temp.path());
    let day = ymd(2024, 3, 15);

    let mut page = DayListPage::load(ListKind::Pending, &ours, Some("2024-03-15"), day);
    let mut watcher = FileWatcher::new(&ours, &[TASKS_KEY]).expect("watcher");
    assert!(watcher.poll().expect("poll").is_empty());

    TaskStore::new(theirs)
        .create(Task::new_pending(
            9,
            "Call plumber".to_string(),
            Priority::High,
            day,
            Utc::now(),
        ))
        .expect("create");

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut changed = Vec::new();
    while changed.is_empty() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
        changed = watcher.poll().expect("poll");
    }
    assert_eq!(changed, vec![TASKS_KEY.to_string()]);
    assert!(page.pump());
    assert_eq!(page.view().tasks[0].name, "Call plumber");
}

#[test]
fn rejected_form_writes_nothing() {
    let temp = tempdir().expect("tempdir");
    let storage = open(temp.path());
    let mut page = CreateTaskPage::load(&storage, ymd(2024, 3, 15), Duration::ZERO);

    let form = TaskForm {
        name: String::new(),
        priority: Some(Priority::Low),
        ..TaskForm::default()
    };
    assert!(matches!(
        page.submit(&form, Utc::now()),
        Err(SubmitError::Invalid(_))
    ));
    assert!(storage.get(TASKS_KEY).expect("get").is_none());
    assert!(std::fs::read_dir(temp.path()).expect("read dir").next().is_none());
}
