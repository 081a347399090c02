/// Database row types and query inputs
use rusqlite::Row;

use crate::card::Card;
use crate::identity::{Role, User};
use crate::schedule::Schedule;

/// Column list matching [`user_from_row`].
pub(super) const USER_COLUMNS: &str = "id, email, name, role, id_number, level, term, \
     contact_information, is_active, is_admin, password_hash, date_joined, last_login";

pub(super) const CARD_COLUMNS: &str = "id, user_id, qr_code";

pub(super) const SCHEDULE_COLUMNS: &str = "id, title, description, date, time, updated_at";

/// A user ready to insert. The password is already hashed and the
/// level/term rule already applied.
#[derive(Debug, Clone)]
pub struct NewUserRow {
    pub email: String,
    pub name: String,
    pub role: Role,
    pub id_number: String,
    pub level: Option<String>,
    pub term: Option<String>,
    pub contact_information: String,
    pub is_admin: bool,
    pub password_hash: String,
}

/// Search and filter options for the admin user list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter {
    /// Substring matched against email, name, role, id_number, level and term.
    pub search: Option<String>,
    pub role: Option<Role>,
    pub level: Option<String>,
    pub term: Option<String>,
    pub is_admin: Option<bool>,
}

pub(super) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        role: row.get(3)?,
        id_number: row.get(4)?,
        level: row.get(5)?,
        term: row.get(6)?,
        contact_information: row.get(7)?,
        is_active: row.get(8)?,
        is_admin: row.get(9)?,
        password_hash: row.get(10)?,
        date_joined: row.get(11)?,
        last_login: row.get(12)?,
    })
}

pub(super) fn card_from_row(row: &Row<'_>) -> rusqlite::Result<Card> {
    Ok(Card {
        id: row.get(0)?,
        user_id: row.get(1)?,
        qr_code: row.get(2)?,
    })
}

pub(super) fn schedule_from_row(row: &Row<'_>) -> rusqlite::Result<Schedule> {
    Ok(Schedule {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        date: row.get(3)?,
        time: row.get(4)?,
        updated_at: row.get(5)?,
    })
}
