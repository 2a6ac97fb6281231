//! # chatbridge-store
//!
//! Durable storage of chats and normalized messages, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed helpers for both tables.  All
//! writes are keyed upserts, so redelivering an event never duplicates rows.

pub mod chats;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
