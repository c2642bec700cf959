//! # traffic-spy-core
//!
//! Core library for traffic-spy - a traffic telemetry recorder.
//!
//! This library provides:
//! - Payload validation for submitted telemetry
//! - An append-only SQLite event store keyed by source and URL
//! - User-agent classification into browser and OS families
//! - Read-time aggregation (response times, rankings, breakdowns)
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Example
//!
//! ```rust,no_run
//! use traffic_spy_core::{Config, Database, TrafficSpy};
//!
//! let config = Config::load().expect("failed to load config");
//! let db = Database::open_with(&config.storage.database_path(), &config.storage)
//!     .expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//!
//! let spy = TrafficSpy::new(db);
//! let summary = spy.source_summary("jumpstartlab").expect("query failed");
//! println!("{} events", summary.event_count);
//! ```

// Re-export commonly used items at the crate root
pub use analytics::{SourceSummary, UrlDetail};
pub use config::Config;
pub use db::Database;
pub use error::{Error, ErrorKind, Result};
pub use registry::SourceRegistry;
pub use service::{IngestOutcome, TrafficSpy};
pub use types::*;
pub use validate::{Validation, ValidationError};

// Public modules
pub mod analytics;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod registry;
pub mod service;
pub mod types;
pub mod user_agent;
pub mod validate;
