//! Identity store: accounts, credentials and permission checks.

mod password;
mod user;

pub use password::{hash_password, verify_password};
pub use user::{normalize_email, Capability, NewUser, Role, User, UserUpdate};

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info};

use crate::db::{NewUserRow, TransportDb, UserFilter};
use crate::error::{Error, Result, ValidationError};

/// Placeholder ID number given to administrator accounts.
pub const ADMIN_ID_NUMBER: &str = "000000";
const ADMIN_CONTACT: &str = "Admin User";

/// Roles listed on the public staff directory.
const STAFF_DIRECTORY_ROLES: [Role; 2] = [Role::Staff, Role::Faculty];

const NAME_MAX_LEN: usize = 100;
const ID_NUMBER_MAX_LEN: usize = 20;
const LEVEL_MAX_LEN: usize = 50;
const TERM_MAX_LEN: usize = 50;

/// Must parse as a mail address, since schedule mail goes to every stored one.
fn check_email(email: &str) -> std::result::Result<(), ValidationError> {
    if email.is_empty() {
        return Err(ValidationError::EmptyEmail);
    }
    email
        .parse::<lettre::Address>()
        .map(|_| ())
        .map_err(|_| ValidationError::InvalidEmail(email.to_string()))
}

fn check_len(
    field: &'static str,
    value: Option<&str>,
    max: usize,
) -> std::result::Result<(), ValidationError> {
    match value {
        Some(v) if v.chars().count() > max => Err(ValidationError::TooLong { field, max }),
        _ => Ok(()),
    }
}

/// Column limits. The ID number also ends up in the card's file name.
fn check_lengths(
    name: &str,
    id_number: &str,
    level: Option<&str>,
    term: Option<&str>,
) -> std::result::Result<(), ValidationError> {
    check_len("name", Some(name), NAME_MAX_LEN)?;
    check_len("id_number", Some(id_number), ID_NUMBER_MAX_LEN)?;
    check_len("level", level, LEVEL_MAX_LEN)?;
    check_len("term", term, TERM_MAX_LEN)
}

/// A submitted registration form. Every field arrives as text; missing
/// fields deserialize as empty.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub role: String,
    pub password: String,
    pub id_number: String,
    pub level: Option<String>,
    pub term: Option<String>,
    pub contact_information: String,
}

impl Registration {
    /// Checks the form in the order it reports problems: presence, email,
    /// role, student fields, then lengths.
    pub fn validate(self) -> std::result::Result<NewUser, ValidationError> {
        let name = self.name.trim().to_string();
        let email = self.email.trim().to_string();
        let role = self.role.trim().to_string();
        let id_number = self.id_number.trim().to_string();
        let contact_information = self.contact_information.trim().to_string();

        let required = [&name, &email, &role, &self.password, &id_number, &contact_information];
        if required.iter().any(|field| field.is_empty()) {
            return Err(ValidationError::MissingFields);
        }
        check_email(&email)?;

        let role: Role = role.parse()?;
        let (level, term) = user::student_fields(role, self.level, self.term);
        if role == Role::Student && (level.is_none() || term.is_none()) {
            return Err(ValidationError::MissingStudentFields);
        }
        check_lengths(&name, &id_number, level.as_deref(), term.as_deref())?;

        Ok(NewUser {
            email,
            name,
            id_number,
            contact_information,
            password: self.password,
            role,
            level,
            term,
        })
    }
}

#[derive(Debug, Clone)]
pub struct IdentityStore {
    db: Arc<TransportDb>,
}

impl IdentityStore {
    pub fn new(db: Arc<TransportDb>) -> Self {
        Self { db }
    }

    /// Creates an account. The email is normalized, the password hashed, and
    /// level/term dropped unless the role is student.
    pub fn create_user(&self, new_user: NewUser) -> Result<User> {
        self.insert(new_user, false)
    }

    /// Creates an administrator with the placeholder ID number and contact.
    pub fn create_admin(&self, email: &str, name: &str, password: &str) -> Result<User> {
        self.insert(
            NewUser {
                email: email.to_string(),
                name: name.to_string(),
                id_number: ADMIN_ID_NUMBER.to_string(),
                contact_information: ADMIN_CONTACT.to_string(),
                password: password.to_string(),
                role: Role::Admin,
                level: None,
                term: None,
            },
            true,
        )
    }

    fn insert(&self, new_user: NewUser, is_admin: bool) -> Result<User> {
        let email = normalize_email(&new_user.email);
        check_email(&email)?;

        let (level, term) = user::student_fields(new_user.role, new_user.level, new_user.term);
        check_lengths(
            &new_user.name,
            &new_user.id_number,
            level.as_deref(),
            term.as_deref(),
        )?;
        let password_hash = hash_password(&new_user.password)?;

        let user = self.db.insert_user(&NewUserRow {
            email,
            name: new_user.name,
            role: new_user.role,
            id_number: new_user.id_number,
            level,
            term,
            contact_information: new_user.contact_information,
            is_admin,
            password_hash,
        })?;

        info!(user_id = user.id, role = %user.role, is_admin, "Created user {}", user.email);
        Ok(user)
    }

    /// Validates a registration form and creates the account. Duplicate
    /// email and ID number are reported before anything is written; the
    /// UNIQUE constraints still catch a concurrent duplicate.
    pub fn register(&self, registration: Registration) -> Result<User> {
        let new_user = registration.validate()?;

        if self.email_exists(&new_user.email)? {
            return Err(ValidationError::DuplicateEmail.into());
        }
        if self.id_number_exists(&new_user.id_number)? {
            return Err(ValidationError::DuplicateIdNumber.into());
        }

        self.create_user(new_user)
    }

    /// Checks credentials. Every failure, including an inactive account, is
    /// the same [`Error::Authentication`].
    pub fn authenticate(&self, email: &str, password: &str) -> Result<User> {
        let email = normalize_email(email);
        let Some(mut user) = self.db.user_by_email(&email)? else {
            debug!("Login attempt for unknown account");
            return Err(Error::Authentication);
        };

        if !verify_password(password, &user.password_hash) || !user.is_active {
            debug!(user_id = user.id, "Rejected login attempt");
            return Err(Error::Authentication);
        }

        let now = Utc::now();
        self.db.touch_last_login(user.id, now)?;
        user.last_login = Some(now);
        Ok(user)
    }

    pub fn get(&self, id: i64) -> Result<User> {
        self.db
            .get_user(id)?
            .ok_or(Error::NotFound { entity: "user", id })
    }

    pub fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.db.user_by_email(&normalize_email(email))
    }

    pub fn email_exists(&self, email: &str) -> Result<bool> {
        self.db.email_exists(&normalize_email(email))
    }

    pub fn id_number_exists(&self, id_number: &str) -> Result<bool> {
        self.db.id_number_exists(id_number.trim())
    }

    pub fn list(&self, filter: &UserFilter) -> Result<Vec<User>> {
        self.db.list_users(filter)
    }

    /// Staff and faculty, for the public directory.
    pub fn list_staff(&self) -> Result<Vec<User>> {
        self.db.users_with_roles(&STAFF_DIRECTORY_ROLES)
    }

    pub fn all_emails(&self) -> Result<Vec<String>> {
        self.db.all_user_emails()
    }

    /// Applies an admin edit. Moving a user out of the student role clears
    /// level and term.
    pub fn update(&self, id: i64, changes: UserUpdate) -> Result<User> {
        let mut user = self.get(id)?;

        if let Some(name) = changes.name {
            user.name = name.trim().to_string();
        }
        if let Some(role) = changes.role {
            user.role = role;
        }
        if let Some(id_number) = changes.id_number {
            user.id_number = id_number.trim().to_string();
        }
        if let Some(contact) = changes.contact_information {
            user.contact_information = contact.trim().to_string();
        }
        if let Some(is_active) = changes.is_active {
            user.is_active = is_active;
        }
        if let Some(is_admin) = changes.is_admin {
            user.is_admin = is_admin;
        }

        let level = changes.level.or(user.level.take());
        let term = changes.term.or(user.term.take());
        (user.level, user.term) = user::student_fields(user.role, level, term);

        if user.name.is_empty() {
            return Err(ValidationError::Required { field: "name" }.into());
        }
        if user.id_number.is_empty() {
            return Err(ValidationError::Required { field: "id_number" }.into());
        }
        check_lengths(
            &user.name,
            &user.id_number,
            user.level.as_deref(),
            user.term.as_deref(),
        )?;

        self.db.update_user(&user)?;
        info!(user_id = user.id, role = %user.role, "Updated user {}", user.email);
        Ok(user)
    }

    pub fn set_password(&self, id: i64, password: &str) -> Result<()> {
        let password_hash = hash_password(password)?;
        self.db.set_password_hash(id, &password_hash)
    }

    /// Deletes the account and, through the foreign key, its card row.
    pub fn delete(&self, id: i64) -> Result<()> {
        if !self.db.delete_user(id)? {
            return Err(Error::NotFound { entity: "user", id });
        }
        info!(user_id = id, "Deleted user");
        Ok(())
    }
}
