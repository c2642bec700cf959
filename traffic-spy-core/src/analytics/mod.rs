//! Analytics for traffic-spy
//!
//! Statistics are computed at read time from the events in the store:
//! - [`aggregate`] holds the pure grouping and extreme-value functions
//! - [`report`] assembles them into per-source and per-URL views
//!
//! ## Usage
//!
//! ```rust,ignore
//! use traffic_spy_core::analytics::{aggregate, SourceSummary};
//!
//! let events = db.events_for("jumpstartlab")?;
//! let avg = aggregate::avg_response_time(&events);
//! let summary = SourceSummary::from_events("jumpstartlab", &events);
//! ```

pub mod aggregate;
pub mod report;

pub use aggregate::Ranking;
pub use report::{ResponseTimeStat, SourceSummary, UrlDetail};
