//! Core domain + application logic for the coffee/tea tab bot.
//!
//! This crate is intentionally platform-agnostic. Slack and Google Sheets
//! live behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod ledger;
pub mod logging;
pub mod messaging;
pub mod render;
pub mod scheduler;
pub mod service;
pub mod state;
pub mod summary;

#[cfg(test)]
mod testing;

pub use errors::{Error, Result};
