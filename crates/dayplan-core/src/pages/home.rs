use std::sync::mpsc::Receiver;

use anyhow::anyhow;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use tracing::{debug, info, instrument};

use super::{Confirm, Route, drain};
use crate::calendar::{
    CalendarMode, CalendarView, DayCell, Step, month_label, render_month, render_week,
};
use crate::datetime::{format_clock_date, format_clock_time, format_iso_date};
use crate::messages;
use crate::selected_date::SelectedDateChannel;
use crate::storage::{Storage, StorageChange, TASKS_KEY};
use crate::store::{TaskStore, filter_by_date};
use crate::task::{Task, TaskSelector};

#[derive(Debug, Clone, PartialEq)]
pub struct HomeView {
    pub month: &'static str,
    pub year: i32,
    pub mode: CalendarMode,
    pub cells: Vec<DayCell>,
    pub selected_date: NaiveDate,
    pub tasks: Vec<Task>,
    pub completed_count: usize,
    pub pending_count: usize,
    pub clock_time: Option<String>,
    pub clock_date: Option<String>,
}

/// The dashboard: calendar, the selected day's tasks and counters.
#[derive(Debug)]
pub struct HomePage {
    calendar: CalendarView,
    tasks: TaskStore,
    selection: SelectedDateChannel,
    today: NaiveDate,
    clock: Option<NaiveDateTime>,
    items: Vec<Task>,
    tasks_rx: Receiver<StorageChange>,
}

impl HomePage {
    #[instrument(skip(storage))]
    pub fn load(storage: &Storage, today: NaiveDate) -> Self {
        let tasks_rx = storage.subscribe(TASKS_KEY);
        let mut page = Self {
            calendar: CalendarView::new(today),
            tasks: TaskStore::new(storage.clone()),
            selection: SelectedDateChannel::new(storage.clone()),
            today,
            clock: None,
            items: vec![],
            tasks_rx,
        };
        page.refresh();
        debug!(tasks = page.items.len(), "home ready");
        page
    }

    pub fn selected_date(&self) -> NaiveDate {
        self.calendar.selected_date
    }

    pub fn mode(&self) -> CalendarMode {
        self.calendar.mode
    }

    /// Clock tick. Crossing midnight moves the "today" marker.
    pub fn tick(&mut self, wall: NaiveDateTime) {
        self.clock = Some(wall);
        self.today = wall.date();
    }

    pub fn prev(&mut self) {
        self.calendar.step(Step::Month, -1);
    }

    pub fn next(&mut self) {
        self.calendar.step(Step::Month, 1);
    }

    pub fn toggle_mode(&mut self) {
        self.calendar.toggle_mode();
    }

    /// Selects a day and publishes it for the other pages.
    pub fn pick_day(&mut self, date: NaiveDate) -> anyhow::Result<()> {
        self.calendar.pick(date);
        self.refresh();
        self.selection.set(date)
    }

    /// Flips completion of the listed task at `index`.
    #[instrument(skip(self))]
    pub fn toggle_task(&mut self, index: usize) -> anyhow::Result<Task> {
        let target = self.listed(index)?;
        let updated = self
            .tasks
            .toggle_completed(&TaskSelector::Id(target.id))?
            .ok_or_else(|| anyhow!("task {} no longer exists", target.id))?;
        self.refresh();
        Ok(updated)
    }

    /// Deletes the listed task at `index`, matched by date, name and
    /// priority like the dashboard always has.
    #[instrument(skip(self))]
    pub fn delete_task(&mut self, index: usize) -> anyhow::Result<Option<Task>> {
        let target = self.listed(index)?;
        let removed = self.tasks.delete_one(&TaskSelector::content_of(&target))?;
        self.refresh();
        Ok(removed)
    }

    /// Bulk delete for the selected day behind a confirmation. `None` when
    /// the prompt was declined.
    #[instrument(skip(self, confirm))]
    pub fn delete_all(&mut self, confirm: &mut dyn Confirm) -> anyhow::Result<Option<usize>> {
        let date = self.calendar.selected_date;
        let prompt = messages::confirm_delete_all(&format_iso_date(date));
        if !confirm.confirm(&prompt) {
            info!(%date, "bulk delete declined");
            return Ok(None);
        }

        let removed = self.tasks.delete_all_for_date(date)?;
        self.refresh();
        Ok(Some(removed))
    }

    pub fn open_create(&self) -> Route {
        Route::CreateTask
    }

    /// The pending view opens on the stored selection, not necessarily on
    /// what this page shows.
    pub fn open_pending(&self) -> Route {
        Route::Pending {
            date: Some(self.selection.get().unwrap_or(self.today)),
        }
    }

    pub fn open_completed(&self) -> Route {
        Route::Completed { date: None }
    }

    pub fn pump(&mut self) -> bool {
        if drain(&self.tasks_rx) {
            debug!("tasks changed elsewhere");
            self.refresh();
            return true;
        }
        false
    }

    fn listed(&self, index: usize) -> anyhow::Result<Task> {
        self.items.get(index).cloned().ok_or_else(|| {
            anyhow!(
                "no task #{} on {} ({} listed)",
                index + 1,
                format_iso_date(self.calendar.selected_date),
                self.items.len()
            )
        })
    }

    fn refresh(&mut self) {
        let all = self.tasks.load_all();
        self.items = filter_by_date(&all, self.calendar.selected_date);
    }

    pub fn view(&self) -> HomeView {
        let cells = match self.calendar.mode {
            // The strip follows the selection; month paging only moves the grid.
            CalendarMode::Week => render_week(
                self.calendar.selected_date,
                self.calendar.selected_date,
                self.today,
            ),
            CalendarMode::Month => render_month(
                self.calendar.current_date,
                self.calendar.selected_date,
                self.today,
            ),
        };
        let completed_count = self.items.iter().filter(|t| t.completed).count();

        HomeView {
            month: month_label(self.calendar.current_date),
            year: self.calendar.current_date.year(),
            mode: self.calendar.mode,
            cells,
            selected_date: self.calendar.selected_date,
            tasks: self.items.clone(),
            completed_count,
            pending_count: self.items.len() - completed_count,
            clock_time: self.clock.map(format_clock_time),
            clock_date: self.clock.map(format_clock_date),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::pages::FixedAnswer;
    use crate::task::Priority;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("date")
    }

    fn seed(storage: &Storage, tasks: &[(u64, &str, NaiveDate)]) {
        let store = TaskStore::new(storage.clone());
        for (id, name, date) in tasks {
            store
                .create(Task::new_pending(
                    *id,
                    name.to_string(),
                    Priority::High,
                    *date,
                    Utc::now(),
                ))
                .expect("create");
        }
    }

    #[test]
    fn counters_follow_toggles() {
        let storage = Storage::in_memory();
        let day = ymd(2024, 3, 15);
        seed(&storage, &[(1, "a", day), (2, "b", day), (3, "c", ymd(2024, 3, 16))]);

        let mut home = HomePage::load(&storage, day);
        assert_eq!(home.view().pending_count, 2);

        let toggled = home.toggle_task(1).expect("toggle");
        assert_eq!(toggled.id, 2);
        assert!(toggled.completed);

        let view = home.view();
        assert_eq!(view.completed_count, 1);
        assert_eq!(view.pending_count, 1);
        assert!(home.toggle_task(5).is_err());
    }

    #[test]
    fn declined_bulk_delete_keeps_everything() {
        let storage = Storage::in_memory();
        let day = ymd(2024, 3, 15);
        seed(&storage, &[(1, "a", day)]);

        let mut home = HomePage::load(&storage, day);
        assert_eq!(home.delete_all(&mut FixedAnswer(false)).expect("delete"), None);
        assert_eq!(TaskStore::new(storage).load_all().len(), 1);
    }

    #[test]
    fn month_paging_keeps_selection() {
        let storage = Storage::in_memory();
        let mut home = HomePage::load(&storage, ymd(2024, 1, 31));
        home.toggle_mode();
        home.next();

        let view = home.view();
        assert_eq!(view.month, "February");
        assert_eq!(view.cells.len(), 42);
        assert_eq!(view.selected_date, ymd(2024, 1, 31));
        assert!(view.cells.iter().any(|c| c.is_active && c.other_month));
    }

    #[test]
    fn pending_route_uses_stored_selection() {
        let storage = Storage::in_memory();
        let mut home = HomePage::load(&storage, ymd(2024, 3, 15));
        assert_eq!(
            home.open_pending(),
            Route::Pending {
                date: Some(ymd(2024, 3, 15))
            }
        );
        home.pick_day(ymd(2024, 3, 12)).expect("pick");
        assert_eq!(
            home.open_pending().to_url(),
            "task-pending.html?date=2024-03-12"
        );
    }

    #[test]
    fn clock_strings_appear_after_tick() {
        let storage = Storage::in_memory();
        let mut home = HomePage::load(&storage, ymd(2026, 10, 18));
        assert!(home.view().clock_time.is_none());

        let wall = ymd(2026, 10, 19).and_hms_opt(0, 0, 1).expect("time");
        home.tick(wall);
        let view = home.view();
        assert_eq!(view.clock_time.as_deref(), Some("00:00:01"));
        assert_eq!(view.clock_date.as_deref(), Some("MON OCTOBER 19 2026"));
    }
}
