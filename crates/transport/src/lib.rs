//! `transport` - campus transport service
//!
//! Accounts with QR identity cards, transport schedules and schedule-change
//! emails, served over HTTP.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod card;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod logging;
pub mod notify;
pub mod schedule;
pub mod server;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use types::AppState;
