//! Page controllers.
//!
//! A controller is only reachable through its `load` constructor, which reads
//! persisted state and returns it ready for input. Afterwards it changes only
//! through its input methods, and `view()` re-derives what to show.

use std::sync::mpsc::Receiver;

use chrono::NaiveDate;

use crate::datetime::{format_iso_date, parse_iso_date};
use crate::storage::StorageChange;

mod create;
mod day_list;
mod home;

pub use create::{
    CreateTaskPage, CreateTaskView, FormError, Redirect, SubmitError, SubmitOutcome, TaskForm,
};
pub use day_list::{DayListPage, DayListView, ListKind};
pub use home::{HomePage, HomeView};

/// Gate for destructive actions.
pub trait Confirm {
    fn confirm(&mut self, prompt: &str) -> bool;
}

/// Answers every prompt the same way.
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

impl Confirm for FixedAnswer {
    fn confirm(&mut self, _prompt: &str) -> bool {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    CreateTask,
    Pending { date: Option<NaiveDate> },
    Completed { date: Option<NaiveDate> },
}

impl Route {
    pub fn to_url(&self) -> String {
        match self {
            Route::Home => "homepage.html".to_string(),
            Route::CreateTask => "create-task.html".to_string(),
            Route::Pending { date } => with_date("task-pending.html", *date),
            Route::Completed { date } => with_date("task-complete.html", *date),
        }
    }

    /// Inverse of [`Route::to_url`]. A missing or malformed `date` parameter
    /// leaves the list views to fall back on the stored selection.
    pub fn from_url(url: &str) -> Option<Self> {
        let (path, query) = match url.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (url, None),
        };
        let date = query
            .and_then(query_date)
            .and_then(|raw| parse_iso_date(&raw).ok());

        match path.rsplit('/').next().unwrap_or(path) {
            "homepage.html" | "" => Some(Route::Home),
            "create-task.html" => Some(Route::CreateTask),
            "task-pending.html" => Some(Route::Pending { date }),
            "task-complete.html" => Some(Route::Completed { date }),
            _ => None,
        }
    }
}

fn with_date(page: &str, date: Option<NaiveDate>) -> String {
    match date {
        Some(date) => format!("{page}?date={}", format_iso_date(date)),
        None => page.to_string(),
    }
}

/// Value of the `date` parameter in a query string, with or without the
/// leading `?`.
pub fn query_date(query: &str) -> Option<String> {
    query
        .trim_start_matches('?')
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "date")
        .map(|(_, value)| value.to_string())
}

/// Drains a subscription, reporting whether anything arrived.
pub(crate) fn drain(rx: &Receiver<StorageChange>) -> bool {
    let mut any = false;
    while rx.try_recv().is_ok() {
        any = true;
    }
    any
}
