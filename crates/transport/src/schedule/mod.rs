//! Schedule registry: transport announcements and their change events.
//!
//! A save commits the row first and only then tells the observers. An
//! observer failure is reported to the caller, but the schedule stays saved.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::db::TransportDb;
use crate::error::{Error, Result, ValidationError};
use crate::notify::MailError;

pub const TITLE_MAX_LEN: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schedule {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    /// Set on every save.
    pub updated_at: DateTime<Utc>,
}

/// The editable fields of a schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleDraft {
    pub title: String,
    pub description: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

/// A submitted schedule form, all text.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScheduleForm {
    pub title: String,
    pub description: String,
    pub date: String,
    pub time: String,
}

impl ScheduleForm {
    pub fn parse(self) -> std::result::Result<ScheduleDraft, ValidationError> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(ValidationError::Required { field: "title" });
        }
        if title.chars().count() > TITLE_MAX_LEN {
            return Err(ValidationError::TooLong {
                field: "title",
                max: TITLE_MAX_LEN,
            });
        }

        let date_text = self.date.trim();
        if date_text.is_empty() {
            return Err(ValidationError::Required { field: "date" });
        }
        let date = NaiveDate::parse_from_str(date_text, "%Y-%m-%d")
            .map_err(|_| ValidationError::InvalidDate(date_text.to_string()))?;

        let time_text = self.time.trim();
        if time_text.is_empty() {
            return Err(ValidationError::Required { field: "time" });
        }
        let time = NaiveTime::parse_from_str(time_text, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(time_text, "%H:%M"))
            .map_err(|_| ValidationError::InvalidTime(time_text.to_string()))?;

        Ok(ScheduleDraft {
            title,
            description: self.description.trim().to_string(),
            date,
            time,
        })
    }
}

/// Emitted after every successful create or update, with the full saved
/// values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleChanged {
    pub schedule: Schedule,
    pub created: bool,
}

/// Something that reacts to schedule saves, on the saving thread.
pub trait ScheduleObserver: Send + Sync {
    fn schedule_changed(&self, event: &ScheduleChanged) -> std::result::Result<(), MailError>;
}

pub struct ScheduleRegistry {
    db: Arc<TransportDb>,
    observers: Vec<Arc<dyn ScheduleObserver>>,
}

impl fmt::Debug for ScheduleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduleRegistry")
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl ScheduleRegistry {
    pub fn new(db: Arc<TransportDb>) -> Self {
        Self {
            db,
            observers: Vec::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ScheduleObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn create(&self, draft: ScheduleDraft) -> Result<Schedule> {
        self.save(None, draft)
    }

    pub fn update(&self, id: i64, draft: ScheduleDraft) -> Result<Schedule> {
        self.save(Some(id), draft)
    }

    /// Inserts (`id == None`) or overwrites a schedule, then notifies every
    /// observer before returning.
    pub fn save(&self, id: Option<i64>, draft: ScheduleDraft) -> Result<Schedule> {
        let schedule = match id {
            None => self.db.insert_schedule(&draft)?,
            Some(id) => self.db.update_schedule(id, &draft)?,
        };
        info!(
            schedule_id = schedule.id,
            created = id.is_none(),
            "Saved schedule {:?}",
            schedule.title
        );

        let event = ScheduleChanged {
            schedule,
            created: id.is_none(),
        };
        for observer in &self.observers {
            if let Err(source) = observer.schedule_changed(&event) {
                warn!(schedule_id = event.schedule.id, "Schedule change notification failed: {source}");
                return Err(Error::Notification {
                    schedule_id: event.schedule.id,
                    source,
                });
            }
        }

        Ok(event.schedule)
    }

    pub fn get(&self, id: i64) -> Result<Schedule> {
        self.db.get_schedule(id)?.ok_or(Error::NotFound {
            entity: "schedule",
            id,
        })
    }

    /// Newest-updated first.
    pub fn list_all(&self) -> Result<Vec<Schedule>> {
        self.db.list_schedules()
    }

    pub fn search(&self, query: &str) -> Result<Vec<Schedule>> {
        if query.trim().is_empty() {
            return self.list_all();
        }
        self.db.search_schedules(query)
    }

    /// Deletes without notifying anyone.
    pub fn delete(&self, id: i64) -> Result<()> {
        if !self.db.delete_schedule(id)? {
            return Err(Error::NotFound {
                entity: "schedule",
                id,
            });
        }
        info!(schedule_id = id, "Deleted schedule");
        Ok(())
    }
}
