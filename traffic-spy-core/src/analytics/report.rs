//! Report views built from event sets
//!
//! [`SourceSummary`] and [`UrlDetail`] are recomputed on every request and
//! never stored.

use super::aggregate::{self, Ranking};
use crate::types::{Event, HttpVerb};
use serde::Serialize;

/// One extreme response time and the event it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseTimeStat {
    pub event_id: i64,
    /// Milliseconds
    pub response_time: u64,
}

impl From<&Event> for ResponseTimeStat {
    fn from(event: &Event) -> Self {
        Self {
            event_id: event.id,
            response_time: event.response_time,
        }
    }
}

/// Overview of all traffic for one source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSummary {
    pub identifier: String,
    pub event_count: usize,
    pub url_counts: Ranking<String>,
    pub resolution_counts: Ranking<String>,
    /// Milliseconds; 0.0 when the source has no events
    pub avg_response_time: f64,
    /// Per-URL mean response time, slowest first
    pub url_avg_response_times: Vec<(String, f64)>,
    pub browser_breakdown: Ranking<String>,
    pub os_breakdown: Ranking<String>,
}

impl SourceSummary {
    pub fn from_events(identifier: &str, events: &[Event]) -> Self {
        Self {
            identifier: identifier.to_string(),
            event_count: events.len(),
            url_counts: aggregate::url_request_counts(events),
            resolution_counts: aggregate::screen_resolution_counts(events),
            avg_response_time: aggregate::avg_response_time(events),
            url_avg_response_times: aggregate::url_avg_response_times(events),
            browser_breakdown: aggregate::browser_breakdown(events),
            os_breakdown: aggregate::os_breakdown(events),
        }
    }
}

/// Statistics for one URL of one source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UrlDetail {
    pub identifier: String,
    pub url: String,
    pub event_count: usize,
    pub longest_response_time: Option<ResponseTimeStat>,
    pub shortest_response_time: Option<ResponseTimeStat>,
    pub avg_response_time: f64,
    pub popular_referrers: Ranking<String>,
    pub popular_user_agents: Ranking<String>,
    pub verb_breakdown: Ranking<HttpVerb>,
}

impl UrlDetail {
    pub fn from_events(identifier: &str, url: &str, events: &[Event]) -> Self {
        Self {
            identifier: identifier.to_string(),
            url: url.to_string(),
            event_count: events.len(),
            longest_response_time: aggregate::longest_response_time(events).map(Into::into),
            shortest_response_time: aggregate::shortest_response_time(events).map(Into::into),
            avg_response_time: aggregate::avg_response_time(events),
            popular_referrers: aggregate::popular_referrers(events),
            popular_user_agents: aggregate::popular_user_agents(events),
            verb_breakdown: aggregate::http_verb_breakdown(events),
        }
    }
}
