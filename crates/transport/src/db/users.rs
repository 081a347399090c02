/// User account queries
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension};

use super::types::{user_from_row, NewUserRow, UserFilter, USER_COLUMNS};
use super::TransportDb;
use crate::error::{Error, Result, ValidationError};
use crate::identity::{Role, User};

impl TransportDb {
    /// Inserts a user. Email and ID number collisions come back as
    /// validation errors from the UNIQUE constraints, so two concurrent
    /// registrations cannot both win.
    pub fn insert_user(&self, new_user: &NewUserRow) -> Result<User> {
        let db = self.conn();

        db.execute(
            "INSERT INTO users (
                email, name, role, id_number, level, term, contact_information,
                is_active, is_admin, password_hash, date_joined
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?9, ?10)",
            params![
                new_user.email,
                new_user.name,
                new_user.role,
                new_user.id_number,
                new_user.level,
                new_user.term,
                new_user.contact_information,
                new_user.is_admin,
                new_user.password_hash,
                Utc::now(),
            ],
        )
        .map_err(map_unique_violation)?;

        let id = db.last_insert_rowid();
        user_by_id(&db, id)?.ok_or(Error::NotFound { entity: "user", id })
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        let db = self.conn();
        user_by_id(&db, id)
    }

    pub fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let db = self.conn();
        let user = db
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                [email],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn email_exists(&self, email: &str) -> Result<bool> {
        self.exists("SELECT COUNT(*) FROM users WHERE email = ?1", email)
    }

    pub fn id_number_exists(&self, id_number: &str) -> Result<bool> {
        self.exists("SELECT COUNT(*) FROM users WHERE id_number = ?1", id_number)
    }

    fn exists(&self, sql: &str, value: &str) -> Result<bool> {
        let db = self.conn();
        let count: i64 = db.query_row(sql, [value], |row| row.get(0))?;
        Ok(count > 0)
    }

    /// Lists users ordered by email, narrowed by `filter`.
    pub fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            clauses.push(
                "(email LIKE ? OR name LIKE ? OR role LIKE ? OR id_number LIKE ? \
                 OR level LIKE ? OR term LIKE ?)",
            );
            let pattern = format!("%{search}%");
            values.extend(std::iter::repeat(Value::Text(pattern)).take(6));
        }
        if let Some(role) = filter.role {
            clauses.push("role = ?");
            values.push(Value::Text(role.as_str().to_string()));
        }
        if let Some(level) = &filter.level {
            clauses.push("level = ?");
            values.push(Value::Text(level.clone()));
        }
        if let Some(term) = &filter.term {
            clauses.push("term = ?");
            values.push(Value::Text(term.clone()));
        }
        if let Some(is_admin) = filter.is_admin {
            clauses.push("is_admin = ?");
            values.push(Value::Integer(i64::from(is_admin)));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let db = self.conn();
        let mut stmt = db.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users {where_sql} ORDER BY email"
        ))?;
        let users = stmt
            .query_map(params_from_iter(values.iter()), user_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    /// Users whose role is one of `roles`, ordered by name.
    pub fn users_with_roles(&self, roles: &[Role]) -> Result<Vec<User>> {
        if roles.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; roles.len()].join(", ");
        let db = self.conn();
        let mut stmt = db.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE role IN ({placeholders}) ORDER BY name, id"
        ))?;
        let users = stmt
            .query_map(params_from_iter(roles.iter()), user_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    /// Every registered email address, in registration order.
    pub fn all_user_emails(&self) -> Result<Vec<String>> {
        let db = self.conn();
        let mut stmt = db.prepare("SELECT email FROM users ORDER BY id")?;
        let emails = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(emails)
    }

    /// Writes back the editable columns of `user`.
    pub fn update_user(&self, user: &User) -> Result<()> {
        let db = self.conn();
        let changed = db
            .execute(
                "UPDATE users SET
                    email = ?2, name = ?3, role = ?4, id_number = ?5, level = ?6, term = ?7,
                    contact_information = ?8, is_active = ?9, is_admin = ?10
                 WHERE id = ?1",
                params![
                    user.id,
                    user.email,
                    user.name,
                    user.role,
                    user.id_number,
                    user.level,
                    user.term,
                    user.contact_information,
                    user.is_active,
                    user.is_admin,
                ],
            )
            .map_err(map_unique_violation)?;

        if changed == 0 {
            return Err(Error::NotFound {
                entity: "user",
                id: user.id,
            });
        }
        Ok(())
    }

    pub fn set_password_hash(&self, id: i64, password_hash: &str) -> Result<()> {
        let db = self.conn();
        let changed = db.execute(
            "UPDATE users SET password_hash = ?2 WHERE id = ?1",
            params![id, password_hash],
        )?;
        if changed == 0 {
            return Err(Error::NotFound { entity: "user", id });
        }
        Ok(())
    }

    pub fn touch_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let db = self.conn();
        db.execute(
            "UPDATE users SET last_login = ?2 WHERE id = ?1",
            params![id, at],
        )?;
        Ok(())
    }

    /// Deletes a user; the card row goes with it through the foreign key.
    /// Returns false if there was no such user.
    pub fn delete_user(&self, id: i64) -> Result<bool> {
        let db = self.conn();
        let changed = db.execute("DELETE FROM users WHERE id = ?1", [id])?;
        Ok(changed > 0)
    }
}

fn user_by_id(db: &Connection, id: i64) -> Result<Option<User>> {
    let user = db
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            [id],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

/// Turns SQLite's "UNIQUE constraint failed: users.<column>" into the
/// matching validation error.
fn map_unique_violation(err: rusqlite::Error) -> Error {
    if let rusqlite::Error::SqliteFailure(failure, Some(message)) = &err {
        if failure.code == ErrorCode::ConstraintViolation {
            if message.contains("users.email") {
                return ValidationError::DuplicateEmail.into();
            }
            if message.contains("users.id_number") {
                return ValidationError::DuplicateIdNumber.into();
            }
        }
    }
    err.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(email: &str, id_number: &str, role: Role) -> NewUserRow {
        NewUserRow {
            email: email.to_string(),
            name: format!("User {id_number}"),
            role,
            id_number: id_number.to_string(),
            level: None,
            term: None,
            contact_information: "555-0100".to_string(),
            is_admin: false,
            password_hash: "not-a-real-hash".to_string(),
        }
    }

    #[test]
    fn test_insert_and_fetch_user() {
        let db = TransportDb::open_in_memory().unwrap();
        let user = db.insert_user(&row("a@x.com", "S1", Role::Student)).unwrap();

        assert!(user.id > 0);
        assert!(user.is_active);
        assert!(!user.is_admin);
        assert_eq!(db.get_user(user.id).unwrap().unwrap().email, "a@x.com");
        assert_eq!(db.user_by_email("a@x.com").unwrap().unwrap().id, user.id);
        assert!(db.user_by_email("b@x.com").unwrap().is_none());
    }

    #[test]
    fn test_unique_constraints_map_to_validation_errors() {
        let db = TransportDb::open_in_memory().unwrap();
        db.insert_user(&row("a@x.com", "S1", Role::Student)).unwrap();

        let dup_email = db.insert_user(&row("a@x.com", "S2", Role::Staff));
        assert!(matches!(
            dup_email,
            Err(Error::Validation(ValidationError::DuplicateEmail))
        ));

        let dup_id = db.insert_user(&row("b@x.com", "S1", Role::Staff));
        assert!(matches!(
            dup_id,
            Err(Error::Validation(ValidationError::DuplicateIdNumber))
        ));
    }

    #[test]
    fn test_list_users_filters() {
        let db = TransportDb::open_in_memory().unwrap();
        let mut student = row("carol@x.com", "S1", Role::Student);
        student.level = Some("200".to_string());
        student.term = Some("Fall".to_string());
        db.insert_user(&student).unwrap();
        db.insert_user(&row("alice@x.com", "F1", Role::Faculty)).unwrap();
        let mut admin = row("bob@x.com", "000000", Role::Admin);
        admin.is_admin = true;
        db.insert_user(&admin).unwrap();

        let all = db.list_users(&UserFilter::default()).unwrap();
        let emails: Vec<_> = all.iter().map(|u| u.email.as_str()).collect();
        assert_eq!(emails, ["alice@x.com", "bob@x.com", "carol@x.com"]);

        let admins = db
            .list_users(&UserFilter {
                is_admin: Some(true),
                ..UserFilter::default()
            })
            .unwrap();
        assert_eq!(admins.len(), 1);
        assert_eq!(admins[0].email, "bob@x.com");

        let fall = db
            .list_users(&UserFilter {
                search: Some("fall".to_string()),
                ..UserFilter::default()
            })
            .unwrap();
        assert_eq!(fall.len(), 1);
        assert_eq!(fall[0].id_number, "S1");

        let faculty = db
            .list_users(&UserFilter {
                role: Some(Role::Faculty),
                ..UserFilter::default()
            })
            .unwrap();
        assert_eq!(faculty[0].email, "alice@x.com");
    }

    #[test]
    fn test_users_with_roles_and_emails() {
        let db = TransportDb::open_in_memory().unwrap();
        db.insert_user(&row("s@x.com", "S1", Role::Student)).unwrap();
        db.insert_user(&row("t@x.com", "T1", Role::Staff)).unwrap();
        db.insert_user(&row("f@x.com", "F1", Role::Faculty)).unwrap();

        let staff = db.users_with_roles(&[Role::Staff, Role::Faculty]).unwrap();
        assert_eq!(staff.len(), 2);
        assert!(staff.iter().all(|u| u.role != Role::Student));
        assert!(db.users_with_roles(&[]).unwrap().is_empty());

        assert_eq!(
            db.all_user_emails().unwrap(),
            ["s@x.com", "t@x.com", "f@x.com"]
        );
    }

    #[test]
    fn test_update_and_delete_user() {
        let db = TransportDb::open_in_memory().unwrap();
        let mut user = db.insert_user(&row("a@x.com", "S1", Role::Student)).unwrap();

        user.name = "Renamed".to_string();
        user.is_active = false;
        db.update_user(&user).unwrap();
        let stored = db.get_user(user.id).unwrap().unwrap();
        assert_eq!(stored.name, "Renamed");
        assert!(!stored.is_active);

        assert!(db.delete_user(user.id).unwrap());
        assert!(!db.delete_user(user.id).unwrap());
        assert!(matches!(
            db.update_user(&user),
            Err(Error::NotFound { entity: "user", .. })
        ));
    }
}
