use std::sync::mpsc::Receiver;

use chrono::NaiveDate;
use tracing::{debug, instrument};

use super::{Route, drain};
use crate::calendar::{CalendarView, DayCell, Step, render_week, short_date_label};
use crate::datetime::format_iso_date;
use crate::messages;
use crate::selected_date::{SelectedDateChannel, resolve_initial_date};
use crate::storage::{Storage, StorageChange, TASKS_KEY};
use crate::store::{TaskStore, filter_completed, filter_pending};
use crate::task::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Pending,
    Completed,
}

impl ListKind {
    pub fn title(&self) -> &'static str {
        match self {
            ListKind::Pending => "Task Pending",
            ListKind::Completed => "Task Complete",
        }
    }

    pub fn empty_message(&self) -> &'static str {
        match self {
            ListKind::Pending => messages::NO_PENDING_TASKS,
            ListKind::Completed => messages::NO_COMPLETED_TASKS,
        }
    }

    fn select(&self, tasks: &[Task], date: NaiveDate) -> Vec<Task> {
        match self {
            ListKind::Pending => filter_pending(tasks, date),
            ListKind::Completed => filter_completed(tasks, date),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayListView {
    pub kind: ListKind,
    pub date_label: String,
    pub selected_date: NaiveDate,
    pub week: Vec<DayCell>,
    pub tasks: Vec<Task>,
    pub empty_message: Option<&'static str>,
}

/// The pending or completed tasks of one day, following the shared
/// selection in both directions.
#[derive(Debug)]
pub struct DayListPage {
    kind: ListKind,
    calendar: CalendarView,
    tasks: TaskStore,
    selection: SelectedDateChannel,
    today: NaiveDate,
    items: Vec<Task>,
    tasks_rx: Receiver<StorageChange>,
    selection_rx: Receiver<StorageChange>,
}

impl DayListPage {
    /// `query` is the raw `date` parameter of the page address, if any.
    #[instrument(skip(storage))]
    pub fn load(kind: ListKind, storage: &Storage, query: Option<&str>, today: NaiveDate) -> Self {
        let tasks = TaskStore::new(storage.clone());
        let selection = SelectedDateChannel::new(storage.clone());
        let initial = resolve_initial_date(query, selection.get(), today);
        let tasks_rx = storage.subscribe(TASKS_KEY);
        let selection_rx = selection.subscribe();
        debug!(%initial, "day list ready");

        let mut page = Self {
            kind,
            calendar: CalendarView::new(initial),
            tasks,
            selection,
            today,
            items: vec![],
            tasks_rx,
            selection_rx,
        };
        page.refresh();
        page
    }

    pub fn load_route(route: &Route, storage: &Storage, today: NaiveDate) -> Option<Self> {
        let (kind, date) = match route {
            Route::Pending { date } => (ListKind::Pending, *date),
            Route::Completed { date } => (ListKind::Completed, *date),
            Route::Home | Route::CreateTask => return None,
        };
        let query = date.map(format_iso_date);
        Some(Self::load(kind, storage, query.as_deref(), today))
    }

    pub fn kind(&self) -> ListKind {
        self.kind
    }

    pub fn selected_date(&self) -> NaiveDate {
        self.calendar.selected_date
    }

    /// Moves the page to `date` and publishes it as the shared selection.
    pub fn set_date(&mut self, date: NaiveDate) -> anyhow::Result<()> {
        self.apply_date(date);
        self.selection.set(date)
    }

    pub fn prev(&mut self) -> anyhow::Result<()> {
        self.step(-1)
    }

    pub fn next(&mut self) -> anyhow::Result<()> {
        self.step(1)
    }

    fn step(&mut self, days: i64) -> anyhow::Result<()> {
        let mut target = self.calendar.clone();
        target.step(Step::Day, days);
        self.set_date(target.current_date)
    }

    pub fn pick_day(&mut self, date: NaiveDate) -> anyhow::Result<()> {
        self.set_date(date)
    }

    fn apply_date(&mut self, date: NaiveDate) {
        self.calendar.pick_week_day(date);
        self.refresh();
    }

    fn refresh(&mut self) {
        let all = self.tasks.load_all();
        self.items = self.kind.select(&all, self.calendar.selected_date);
    }

    /// Applies notifications from other contexts. Returns whether the view
    /// changed.
    #[instrument(skip(self), fields(kind = ?self.kind))]
    pub fn pump(&mut self) -> bool {
        let mut changed = false;

        if drain(&self.tasks_rx) {
            debug!("tasks changed elsewhere");
            self.refresh();
            changed = true;
        }

        if drain(&self.selection_rx)
            && let Some(date) = self.selection.get()
            && date != self.calendar.selected_date
        {
            debug!(%date, "selection changed elsewhere");
            self.apply_date(date);
            changed = true;
        }

        changed
    }

    pub fn view(&self) -> DayListView {
        DayListView {
            kind: self.kind,
            date_label: short_date_label(self.calendar.current_date),
            selected_date: self.calendar.selected_date,
            week: render_week(
                self.calendar.current_date,
                self.calendar.selected_date,
                self.today,
            ),
            tasks: self.items.clone(),
            empty_message: self.items.is_empty().then(|| self.kind.empty_message()),
        }
    }
}
