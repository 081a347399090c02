//! User accounts, roles and the permission model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// What a user is on campus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Student,
    Staff,
    Faculty,
    Admin,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Student, Role::Staff, Role::Faculty, Role::Admin];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Staff => "staff",
            Role::Faculty => "faculty",
            Role::Admin => "admin",
        }
    }

    /// Display label.
    pub fn label(self) -> &'static str {
        match self {
            Role::Student => "Student",
            Role::Staff => "Staff",
            Role::Faculty => "Faculty",
            Role::Admin => "Admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ValidationError::InvalidRole(s.to_string()))
    }
}

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// The only capability there is. Admins hold it; nobody else holds anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    FullAccess,
}

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    /// Primary key, also printed on the card as the serial number.
    pub id: i64,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub id_number: String,
    /// Only set for students.
    pub level: Option<String>,
    /// Only set for students.
    pub term: Option<String>,
    pub contact_information: String,
    pub is_active: bool,
    pub is_admin: bool,
    #[serde(skip)]
    pub password_hash: String,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    pub fn capabilities(&self) -> &'static [Capability] {
        if self.is_admin {
            &[Capability::FullAccess]
        } else {
            &[]
        }
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Any named permission reduces to full access.
    pub fn has_perm(&self, _perm: &str) -> bool {
        self.has_capability(Capability::FullAccess)
    }

    pub fn has_module_perms(&self, _module: &str) -> bool {
        self.has_capability(Capability::FullAccess)
    }

    /// Staff-equivalent for the management surface. Not the same thing as
    /// `role == Staff`.
    pub fn is_staff(&self) -> bool {
        self.has_capability(Capability::FullAccess)
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.email)
    }
}

/// Input to [`IdentityStore::create_user`](super::IdentityStore::create_user).
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub id_number: String,
    pub contact_information: String,
    pub password: String,
    pub role: Role,
    pub level: Option<String>,
    pub term: Option<String>,
}

/// Admin edit of an existing account. `None` leaves a field unchanged;
/// `Some("")` clears level or term.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub role: Option<Role>,
    pub id_number: Option<String>,
    pub level: Option<String>,
    pub term: Option<String>,
    pub contact_information: Option<String>,
    pub is_active: Option<bool>,
    pub is_admin: Option<bool>,
}

/// Trims the address and lowercases the domain. The local part keeps its
/// case since some mail servers treat it as significant.
pub fn normalize_email(email: &str) -> String {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{local}@{}", domain.to_lowercase()),
        None => email.to_string(),
    }
}

/// Level and term only mean something for students; blank values count as
/// missing.
pub(crate) fn student_fields(
    role: Role,
    level: Option<String>,
    term: Option<String>,
) -> (Option<String>, Option<String>) {
    if role != Role::Student {
        return (None, None);
    }
    let clean = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    (clean(level), clean(term))
}
