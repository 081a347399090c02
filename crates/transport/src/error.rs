//! Error types for the transport service.

use std::path::PathBuf;

use thiserror::Error;

use crate::notify::MailError;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for transport operations.
#[derive(Debug, Error)]
pub enum Error {
    // === Storage ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    Database(#[from] rusqlite::Error),

    /// The on-disk schema cannot be brought to the current version.
    #[error("database migration failed: {message}")]
    DatabaseMigration { message: String },

    /// Reading or writing a media file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // === Configuration ===
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    #[error("invalid configuration: {message}")]
    ConfigValidation { message: String },

    // === Domain ===
    /// User input was rejected. The message is safe to show to the user.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Bad credentials or an inactive account. Deliberately says nothing
    /// about which part was wrong.
    #[error("Invalid credentials. Please try again.")]
    Authentication,

    /// A card was requested for a user without an ID number.
    #[error("user {user_id} must have an ID number to generate a QR code")]
    MissingIdentifier { user_id: i64 },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// The schedule row was written but the change notification failed.
    #[error("schedule {schedule_id} was saved but the update notification failed: {source}")]
    Notification {
        schedule_id: i64,
        #[source]
        source: MailError,
    },

    #[error("failed to encode QR code: {message}")]
    QrEncode { message: String },

    #[error("failed to hash password: {message}")]
    PasswordHash { message: String },

    /// A blocking worker panicked or was cancelled.
    #[error("background task failed: {message}")]
    Task { message: String },
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

/// Input rejected before any state change.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("All fields are required.")]
    MissingFields,

    #[error("Level and Term are required for students.")]
    MissingStudentFields,

    #[error("Users must have an email address.")]
    EmptyEmail,

    #[error("Enter a valid email address, got {0:?}.")]
    InvalidEmail(String),

    #[error("This email is already registered.")]
    DuplicateEmail,

    #[error("This ID number is already registered.")]
    DuplicateIdNumber,

    #[error("{0:?} is not a valid role.")]
    InvalidRole(String),

    #[error("The {field} field is required.")]
    Required { field: &'static str },

    #[error("The {field} field must be at most {max} characters.")]
    TooLong { field: &'static str, max: usize },

    #[error("Enter a valid date (YYYY-MM-DD), got {0:?}.")]
    InvalidDate(String),

    #[error("Enter a valid time (HH:MM), got {0:?}.")]
    InvalidTime(String),
}

impl Error {
    /// Returns true if the error should be reported back to the user as-is.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, Error::Validation(_) | Error::Authentication)
    }
}
