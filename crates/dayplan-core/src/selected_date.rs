use std::sync::mpsc::Receiver;

use anyhow::Context;
use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::datetime::{format_iso_date, parse_iso_date};
use crate::storage::{SELECTED_DATE_KEY, Storage, StorageChange};

/// The day last picked on any page, persisted under `todoSelectedDate`.
#[derive(Debug, Clone)]
pub struct SelectedDateChannel {
    storage: Storage,
}

impl SelectedDateChannel {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub fn get(&self) -> Option<NaiveDate> {
        let raw = match self.storage.get(SELECTED_DATE_KEY) {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "failed reading selected date");
                return None;
            }
        };

        match parse_iso_date(&raw) {
            Ok(date) => Some(date),
            Err(err) => {
                warn!(raw = %raw.trim(), error = %err, "ignoring malformed selected date");
                None
            }
        }
    }

    #[tracing::instrument(skip(self), fields(date = %date))]
    pub fn set(&self, date: NaiveDate) -> anyhow::Result<()> {
        debug!("persisting selected date");
        self.storage
            .set(SELECTED_DATE_KEY, &format_iso_date(date))
            .context("failed to save selected date")
    }

    pub fn subscribe(&self) -> Receiver<StorageChange> {
        self.storage.subscribe(SELECTED_DATE_KEY)
    }
}

/// Initial day of the pending and completed views: the `date` query
/// parameter when it is a valid ISO date, then the stored selection, then
/// today.
pub fn resolve_initial_date(
    query: Option<&str>,
    stored: Option<NaiveDate>,
    today: NaiveDate,
) -> NaiveDate {
    if let Some(raw) = query.filter(|raw| !raw.trim().is_empty()) {
        match parse_iso_date(raw) {
            Ok(date) => return date,
            Err(err) => warn!(raw, error = %err, "ignoring malformed date parameter"),
        }
    }
    stored.unwrap_or(today)
}
