//! bookfriends: a social book-sharing catalog.
//!
//! Users list the books they own, mark them as recommended, wished for or
//! lent out, and befriend each other to browse their friends' shelves.
//!
//! # Features
//!
//! - Friend requests with confirm, reject, withdraw and unfriend
//! - Lending state checked at construction (no wished-and-loaned books)
//! - Books borrowed from, or lent to, people without an account
//! - Loans handed over when a user deletes their account
//! - Accent-aware collated listings with pagination
//! - JSON HTTP API with bearer sessions, plus an admin CLI

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Accounts, sessions and profiles.
pub mod auth;
/// Book listings.
pub mod catalog;
/// Locale-aware string ordering.
pub mod collation;
/// Configuration and CLI.
pub mod config;
/// Database operations.
pub mod db;
/// Error types.
pub mod error;
/// Friendship state machine.
pub mod friends;
/// Books and lending.
pub mod library;
/// HTTP server.
pub mod server;

#[cfg(test)]
mod tests;

pub use collation::Collator;
pub use config::{Cli, Command, Config};
pub use db::Database;
pub use error::{AppError, Result};
pub use server::AppState;
