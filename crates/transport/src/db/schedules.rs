/// Transport schedule queries
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::types::{schedule_from_row, SCHEDULE_COLUMNS};
use super::TransportDb;
use crate::error::{Error, Result};
use crate::schedule::{Schedule, ScheduleDraft};

impl TransportDb {
    pub fn insert_schedule(&self, draft: &ScheduleDraft) -> Result<Schedule> {
        let db = self.conn();
        db.execute(
            "INSERT INTO schedules (title, description, date, time, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![draft.title, draft.description, draft.date, draft.time, Utc::now()],
        )?;

        let id = db.last_insert_rowid();
        schedule_by_id(&db, id)?.ok_or(Error::NotFound {
            entity: "schedule",
            id,
        })
    }

    /// Overwrites every field of an existing schedule and bumps `updated_at`.
    pub fn update_schedule(&self, id: i64, draft: &ScheduleDraft) -> Result<Schedule> {
        let db = self.conn();
        let changed = db.execute(
            "UPDATE schedules
             SET title = ?2, description = ?3, date = ?4, time = ?5, updated_at = ?6
             WHERE id = ?1",
            params![id, draft.title, draft.description, draft.date, draft.time, Utc::now()],
        )?;
        if changed == 0 {
            return Err(Error::NotFound {
                entity: "schedule",
                id,
            });
        }

        schedule_by_id(&db, id)?.ok_or(Error::NotFound {
            entity: "schedule",
            id,
        })
    }

    pub fn get_schedule(&self, id: i64) -> Result<Option<Schedule>> {
        let db = self.conn();
        schedule_by_id(&db, id)
    }

    /// Most recently touched first.
    pub fn list_schedules(&self) -> Result<Vec<Schedule>> {
        let db = self.conn();
        let mut stmt = db.prepare(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules ORDER BY updated_at DESC, id DESC"
        ))?;
        let schedules = stmt
            .query_map([], schedule_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(schedules)
    }

    /// Substring search over title and date.
    pub fn search_schedules(&self, query: &str) -> Result<Vec<Schedule>> {
        let pattern = format!("%{}%", query.trim());
        let db = self.conn();
        let mut stmt = db.prepare(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules
             WHERE title LIKE ?1 OR date LIKE ?1
             ORDER BY updated_at DESC, id DESC"
        ))?;
        let schedules = stmt
            .query_map([pattern], schedule_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(schedules)
    }

    pub fn delete_schedule(&self, id: i64) -> Result<bool> {
        let db = self.conn();
        let changed = db.execute("DELETE FROM schedules WHERE id = ?1", [id])?;
        Ok(changed > 0)
    }
}

fn schedule_by_id(db: &Connection, id: i64) -> Result<Option<Schedule>> {
    let schedule = db
        .query_row(
            &format!("SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = ?1"),
            [id],
            schedule_from_row,
        )
        .optional()?;
    Ok(schedule)
}
