pub mod account;
pub mod admin;
pub mod card;
pub mod pages;
pub mod schedule;
