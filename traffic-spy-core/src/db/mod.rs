//! Database layer for traffic-spy
//!
//! This module provides the event store using SQLite with:
//! - Schema migrations
//! - Source and URL registry tables
//! - An append-only `events` table

pub mod repo;
pub mod schema;

pub use repo::Database;
