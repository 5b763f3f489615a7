use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::datetime::iso_date_serde;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Priority {
    #[default]
    Low,
    Medium,
    High,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Medium, Priority::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    /// Uppercased badge text, e.g. `HIGH`.
    pub fn label(&self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(anyhow!("unknown priority: {other}")),
        }
    }
}

impl Serialize for Priority {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: u64,

    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub alert_enabled: bool,

    #[serde(with = "iso_date_serde")]
    pub date: NaiveDate,

    #[serde(default)]
    pub completed: bool,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new_pending(
        id: u64,
        name: String,
        priority: Priority,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            description: String::new(),
            priority,
            alert_enabled: false,
            date,
            completed: false,
            created_at: Some(now),
        }
    }

    pub fn is_pending(&self) -> bool {
        !self.completed
    }
}

/// How a mutation picks its target.
///
/// `Content` is the dashboard's historical key and matches the first task
/// sharing date, name and priority. `Id` is exact.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskSelector {
    Id(u64),
    Content {
        date: NaiveDate,
        name: String,
        priority: Priority,
    },
}

impl TaskSelector {
    pub fn content_of(task: &Task) -> Self {
        TaskSelector::Content {
            date: task.date,
            name: task.name.clone(),
            priority: task.priority,
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        match self {
            TaskSelector::Id(id) => task.id == *id,
            TaskSelector::Content {
                date,
                name,
                priority,
            } => task.date == *date && task.name == *name && task.priority == *priority,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_browser_shaped_records() {
        let raw = r#"{
            "id": 1710489600000,
            "name": "Buy milk",
            "description": "",
            "priority": "High",
            "alertEnabled": true,
            "date": "2024-03-15",
            "completed": false,
            "createdAt": "2024-03-15T08:00:00.000Z"
        }"#;
        let task: Task = serde_json::from_str(raw).expect("parse task");
        assert_eq!(task.priority, Priority::High);
        assert!(task.alert_enabled);
        assert_eq!(task.date.to_string(), "2024-03-15");

        let back = serde_json::to_value(&task).expect("serialize");
        assert_eq!(back["priority"], "high");
        assert_eq!(back["date"], "2024-03-15");
        assert_eq!(back["alertEnabled"], true);
    }

    #[test]
    fn missing_optional_fields_fall_back() {
        let raw = r#"{"id": 7, "name": "x", "date": "2024-03-15"}"#;
        let task: Task = serde_json::from_str(raw).expect("parse task");
        assert_eq!(task.priority, Priority::Low);
        assert!(!task.completed);
        assert!(task.created_at.is_none());
    }

    #[test]
    fn content_selector_ignores_id() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).expect("date");
        let now = Utc::now();
        let a = Task::new_pending(1, "same".to_string(), Priority::High, date, now);
        let b = Task::new_pending(2, "same".to_string(), Priority::High, date, now);

        let by_content = TaskSelector::content_of(&b);
        assert!(by_content.matches(&a));
        assert!(!TaskSelector::Id(2).matches(&a));
    }
}
