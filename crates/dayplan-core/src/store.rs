use anyhow::{Context, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::storage::{Storage, TASKS_KEY};
use crate::task::{Task, TaskSelector};

/// One member of the stored array. Records this version cannot read are
/// carried through every save untouched.
#[derive(Debug, Clone)]
enum Entry {
    Task(Task),
    Unreadable(Value),
}

impl Entry {
    fn decode(index: usize, value: Value) -> Self {
        match serde_json::from_value::<Task>(value.clone()) {
            Ok(task) => Entry::Task(task),
            Err(err) => {
                warn!(index, error = %err, "skipping unreadable task record");
                Entry::Unreadable(value)
            }
        }
    }

    fn task(&self) -> Option<&Task> {
        match self {
            Entry::Task(task) => Some(task),
            Entry::Unreadable(_) => None,
        }
    }

    fn into_value(self) -> anyhow::Result<Value> {
        match self {
            Entry::Task(task) => serde_json::to_value(task).context("failed to serialize task"),
            Entry::Unreadable(value) => Ok(value),
        }
    }
}

/// The task collection persisted under `todoTasks`.
///
/// Nothing is cached: every call re-reads the stored collection, and every
/// mutation writes the whole collection back (last writer wins).
#[derive(Debug, Clone)]
pub struct TaskStore {
    storage: Storage,
}

impl TaskStore {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Readable tasks in stored order. Absent or unreadable storage, or a
    /// value that is not a JSON array, yields an empty collection.
    #[tracing::instrument(skip(self))]
    pub fn load_all(&self) -> Vec<Task> {
        match self.entries() {
            Ok(entries) => {
                let tasks: Vec<Task> = entries.iter().filter_map(Entry::task).cloned().collect();
                debug!(count = tasks.len(), skipped = entries.len() - tasks.len(), "loaded tasks");
                tasks
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "stored tasks unavailable; treating as empty");
                vec![]
            }
        }
    }

    /// Replaces the readable tasks with `tasks`. Records that could not be
    /// read stay in the collection.
    #[tracing::instrument(skip(self, tasks), fields(count = tasks.len()))]
    pub fn save_all(&self, tasks: &[Task]) -> anyhow::Result<()> {
        let mut entries: Vec<Entry> = self
            .entries()?
            .into_iter()
            .filter(|entry| matches!(entry, Entry::Unreadable(_)))
            .collect();
        entries.extend(tasks.iter().cloned().map(Entry::Task));
        self.write(entries)
    }

    /// Epoch milliseconds of `now`, bumped past the largest stored id.
    pub fn next_id(&self, tasks: &[Task], now: DateTime<Utc>) -> u64 {
        let stamp = u64::try_from(now.timestamp_millis()).unwrap_or(0);
        let floor = tasks.iter().map(|t| t.id).max().map_or(0, |max| max + 1);
        stamp.max(floor)
    }

    #[tracing::instrument(skip(self, task), fields(id = task.id, date = %task.date))]
    pub fn create(&self, task: Task) -> anyhow::Result<Task> {
        let mut entries = self.entries()?;
        entries.push(Entry::Task(task.clone()));
        let total = entries.len();
        self.write(entries)?;
        info!(total, "task created");
        Ok(task)
    }

    #[tracing::instrument(skip(self))]
    pub fn toggle_completed(&self, selector: &TaskSelector) -> anyhow::Result<Option<Task>> {
        let mut entries = self.entries()?;
        let found = entries.iter_mut().find_map(|entry| match entry {
            Entry::Task(task) if selector.matches(task) => Some(task),
            _ => None,
        });
        let Some(task) = found else {
            debug!("no task matched for toggle");
            return Ok(None);
        };

        task.completed = !task.completed;
        let updated = task.clone();
        self.write(entries)?;
        info!(id = updated.id, completed = updated.completed, "toggled task");
        Ok(Some(updated))
    }

    #[tracing::instrument(skip(self))]
    pub fn delete_one(&self, selector: &TaskSelector) -> anyhow::Result<Option<Task>> {
        let mut entries = self.entries()?;
        let Some(idx) = entries
            .iter()
            .position(|entry| entry.task().is_some_and(|t| selector.matches(t)))
        else {
            debug!("no task matched for delete");
            return Ok(None);
        };

        let Entry::Task(removed) = entries.remove(idx) else {
            return Ok(None);
        };
        self.write(entries)?;
        info!(id = removed.id, "deleted task");
        Ok(Some(removed))
    }

    #[tracing::instrument(skip(self), fields(date = %date))]
    pub fn delete_all_for_date(&self, date: NaiveDate) -> anyhow::Result<usize> {
        let mut entries = self.entries()?;
        let before = entries.len();
        entries.retain(|entry| entry.task().is_none_or(|t| t.date != date));
        let removed = before - entries.len();
        let after = entries.len();
        self.write(entries)?;
        info!(before, after, "deleted tasks for date");
        Ok(removed)
    }

    /// The stored array, one entry per record. Errors when the stored value
    /// is not an array, so a mutation never overwrites data it could not
    /// parse.
    fn entries(&self) -> anyhow::Result<Vec<Entry>> {
        let Some(raw) = self.storage.get(TASKS_KEY)? else {
            return Ok(vec![]);
        };
        if raw.trim().is_empty() {
            return Ok(vec![]);
        }

        let values: Vec<Value> = serde_json::from_str(&raw).map_err(|err| {
            anyhow!("stored tasks are not a JSON array ({err}); leaving them untouched")
        })?;
        Ok(values
            .into_iter()
            .enumerate()
            .map(|(index, value)| Entry::decode(index, value))
            .collect())
    }

    fn write(&self, entries: Vec<Entry>) -> anyhow::Result<()> {
        let values = entries
            .into_iter()
            .map(Entry::into_value)
            .collect::<anyhow::Result<Vec<Value>>>()?;
        let serialized = serde_json::to_string(&values).context("failed to serialize tasks")?;
        self.storage
            .set(TASKS_KEY, &serialized)
            .context("failed to save tasks")
    }
}

pub fn filter_by_date(tasks: &[Task], date: NaiveDate) -> Vec<Task> {
    tasks.iter().filter(|t| t.date == date).cloned().collect()
}

pub fn filter_pending(tasks: &[Task], date: NaiveDate) -> Vec<Task> {
    tasks
        .iter()
        .filter(|t| t.date == date && !t.completed)
        .cloned()
        .collect()
}

pub fn filter_completed(tasks: &[Task], date: NaiveDate) -> Vec<Task> {
    tasks
        .iter()
        .filter(|t| t.date == date && t.completed)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::task::Priority;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).expect("date")
    }

    fn task(id: u64, name: &str, date: NaiveDate) -> Task {
        Task::new_pending(id, name.to_string(), Priority::Medium, date, Utc::now())
    }

    #[test]
    fn malformed_collection_reads_as_empty_and_is_not_overwritten() {
        let storage = Storage::in_memory();
        storage.set(TASKS_KEY, "{not json").expect("set");
        let store = TaskStore::new(storage.clone());
        assert!(store.load_all().is_empty());

        assert!(store.create(task(1, "a", day(15))).is_err());
        assert!(store.delete_all_for_date(day(15)).is_err());
        assert_eq!(
            storage.get(TASKS_KEY).expect("get").as_deref(),
            Some("{not json")
        );
    }

    #[test]
    fn unreadable_records_survive_mutations() {
        let storage = Storage::in_memory();
        storage
            .set(
                TASKS_KEY,
                r#"[{"id":1,"name":"keep me","priority":"high","date":"2024-03-15"},
                    {"id":2,"name":"odd","priority":"urgent","date":"2024-03-15"}]"#,
            )
            .expect("set");
        let store = TaskStore::new(storage.clone());

        let loaded = store.load_all();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "keep me");

        store.create(task(3, "new", day(15))).expect("create");
        store.delete_all_for_date(day(15)).expect("delete all");

        let raw = storage.get(TASKS_KEY).expect("get").expect("stored");
        let values: Vec<Value> = serde_json::from_str(&raw).expect("array");
        assert_eq!(values.len(), 1);
        assert_eq!(values[0]["priority"], "urgent");
        assert_eq!(values[0]["id"], 2);
    }

    #[test]
    fn save_all_keeps_unreadable_records() {
        let storage = Storage::in_memory();
        storage.set(TASKS_KEY, r#"[{"id":5}]"#).expect("set");
        let store = TaskStore::new(storage.clone());

        store.save_all(&[task(1, "a", day(15))]).expect("save");
        let raw = storage.get(TASKS_KEY).expect("get").expect("stored");
        let values: Vec<Value> = serde_json::from_str(&raw).expect("array");
        assert_eq!(values.len(), 2);
        assert_eq!(values[0], serde_json::json!({ "id": 5 }));
        assert_eq!(store.load_all()[0].id, 1);
    }

    #[test]
    fn filters_split_by_completion() {
        let mut done = task(2, "b", day(15));
        done.completed = true;
        let tasks = vec![task(1, "a", day(15)), done, task(3, "c", day(16))];

        assert_eq!(filter_by_date(&tasks, day(15)).len(), 2);
        assert_eq!(filter_pending(&tasks, day(15))[0].id, 1);
        assert_eq!(filter_completed(&tasks, day(15))[0].id, 2);
        assert!(filter_completed(&tasks, day(16)).is_empty());
    }

    #[test]
    fn toggle_without_match_does_not_write() {
        let storage = Storage::in_memory();
        let store = TaskStore::new(storage.clone());
        assert!(store.toggle_completed(&TaskSelector::Id(9)).expect("toggle").is_none());
        assert!(storage.get(TASKS_KEY).expect("get").is_none());
    }

    #[test]
    fn content_delete_removes_first_match_only() {
        let store = TaskStore::new(Storage::in_memory());
        store.create(task(1, "dup", day(15))).expect("create");
        store.create(task(2, "dup", day(15))).expect("create");

        let selector = TaskSelector::Content {
            date: day(15),
            name: "dup".to_string(),
            priority: Priority::Medium,
        };
        let removed = store.delete_one(&selector).expect("delete").expect("match");
        assert_eq!(removed.id, 1);
        let left = store.load_all();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, 2);
    }

    #[test]
    fn next_id_never_collides() {
        let store = TaskStore::new(Storage::in_memory());
        let now = Utc
            .with_ymd_and_hms(2024, 3, 15, 8, 0, 0)
            .single()
            .expect("now");
        let stamp = now.timestamp_millis() as u64;
        let tasks = vec![task(stamp, "a", day(15))];
        assert_eq!(store.next_id(&[], now), stamp);
        assert_eq!(store.next_id(&tasks, now), stamp + 1);
    }
}
