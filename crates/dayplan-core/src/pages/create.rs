use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, instrument};

use super::Route;
use crate::calendar::{CalendarView, DayCell, Step, render_week, short_date_label};
use crate::messages;
use crate::storage::Storage;
use crate::store::TaskStore;
use crate::task::{Priority, Task};

#[derive(Debug, Clone, Default)]
pub struct TaskForm {
    pub name: String,
    pub description: String,
    pub priority: Option<Priority>,
    pub alert_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FormError {
    #[error("Please enter a task name")]
    MissingName,
    #[error("Please select a priority level")]
    MissingPriority,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Invalid(#[from] FormError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub to: Route,
    pub after: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    pub task: Task,
    pub notice: &'static str,
    pub redirect: Redirect,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTaskView {
    pub date_label: String,
    pub selected_date: NaiveDate,
    pub week: Vec<DayCell>,
}

/// The new-task form. Its day picker is local to the page and never
/// written to the shared selection.
#[derive(Debug)]
pub struct CreateTaskPage {
    calendar: CalendarView,
    tasks: TaskStore,
    today: NaiveDate,
    redirect_after: Duration,
}

impl CreateTaskPage {
    pub fn load(storage: &Storage, today: NaiveDate, redirect_after: Duration) -> Self {
        debug!(%today, "create page ready");
        Self {
            calendar: CalendarView::new(today),
            tasks: TaskStore::new(storage.clone()),
            today,
            redirect_after,
        }
    }

    pub fn selected_date(&self) -> NaiveDate {
        self.calendar.selected_date
    }

    pub fn prev(&mut self) {
        self.shift(-1);
    }

    pub fn next(&mut self) {
        self.shift(1);
    }

    fn shift(&mut self, days: i64) {
        self.calendar.step(Step::Day, days);
        self.calendar.selected_date = self.calendar.current_date;
    }

    pub fn pick_day(&mut self, date: NaiveDate) {
        self.calendar.pick_week_day(date);
    }

    pub fn view(&self) -> CreateTaskView {
        CreateTaskView {
            date_label: short_date_label(self.calendar.current_date),
            selected_date: self.calendar.selected_date,
            week: render_week(
                self.calendar.current_date,
                self.calendar.selected_date,
                self.today,
            ),
        }
    }

    /// Validates and stores the form for the selected day. Nothing is
    /// written when validation fails.
    #[instrument(skip(self, form, now))]
    pub fn submit(
        &mut self,
        form: &TaskForm,
        now: DateTime<Utc>,
    ) -> Result<SubmitOutcome, SubmitError> {
        let name = form.name.trim();
        if name.is_empty() {
            return Err(FormError::MissingName.into());
        }
        let priority = form.priority.ok_or(FormError::MissingPriority)?;

        let existing = self.tasks.load_all();
        let id = self.tasks.next_id(&existing, now);
        let mut task = Task::new_pending(
            id,
            name.to_string(),
            priority,
            self.calendar.selected_date,
            now,
        );
        task.description = form.description.trim().to_string();
        task.alert_enabled = form.alert_enabled;

        let task = self.tasks.create(task)?;
        info!(id = task.id, date = %task.date, "submitted new task");

        Ok(SubmitOutcome {
            task,
            notice: messages::TASK_CREATED,
            redirect: Redirect {
                to: Route::Home,
                after: self.redirect_after,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::TASKS_KEY;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("date")
    }

    #[test]
    fn blank_name_is_rejected_without_writing() {
        let storage = Storage::in_memory();
        let mut page = CreateTaskPage::load(&storage, ymd(2024, 3, 15), Duration::ZERO);

        let form = TaskForm {
            name: "   ".to_string(),
            priority: Some(Priority::High),
            ..TaskForm::default()
        };
        let err = page.submit(&form, Utc::now()).expect_err("must reject");
        assert!(matches!(err, SubmitError::Invalid(FormError::MissingName)));
        assert_eq!(err.to_string(), "Please enter a task name");
        assert!(storage.get(TASKS_KEY).expect("get").is_none());
    }

    #[test]
    fn missing_priority_is_rejected() {
        let storage = Storage::in_memory();
        let mut page = CreateTaskPage::load(&storage, ymd(2024, 3, 15), Duration::ZERO);
        let form = TaskForm {
            name: "Buy milk".to_string(),
            ..TaskForm::default()
        };
        let err = page.submit(&form, Utc::now()).expect_err("must reject");
        assert_eq!(err.to_string(), "Please select a priority level");
        assert!(storage.get(TASKS_KEY).expect("get").is_none());
    }

    #[test]
    fn date_navigation_moves_selection() {
        let storage = Storage::in_memory();
        let mut page = CreateTaskPage::load(&storage, ymd(2024, 3, 15), Duration::ZERO);
        page.next();
        page.next();
        page.prev();
        assert_eq!(page.selected_date(), ymd(2024, 3, 16));
        assert_eq!(page.view().date_label, "16 Mar");
        assert_eq!(storage.keys().expect("keys"), Vec::<String>::new());
    }

    #[test]
    fn successful_submit_redirects_home() {
        let storage = Storage::in_memory();
        let mut page =
            CreateTaskPage::load(&storage, ymd(2024, 3, 15), Duration::from_millis(1500));
        let form = TaskForm {
            name: " Buy milk ".to_string(),
            description: "two litres".to_string(),
            priority: Some(Priority::High),
            alert_enabled: true,
        };
        let outcome = page.submit(&form, Utc::now()).expect("submit");
        assert_eq!(outcome.task.name, "Buy milk");
        assert_eq!(outcome.notice, "Task created successfully!");
        assert_eq!(outcome.redirect.to, Route::Home);
        assert_eq!(outcome.redirect.after, Duration::from_millis(1500));
    }
}
