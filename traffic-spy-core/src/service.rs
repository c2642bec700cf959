//! Boundary operations for the presentation layer
//!
//! [`TrafficSpy`] is what a router or CLI talks to. It composes validation,
//! the source registry, the event store and the analytics views:
//!
//! ```text
//! ingest ──► validate ──► find_root_url ──► classify ──► Database::put
//!
//! source_summary / url_detail ──► Database::events_for* ──► analytics::report
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use traffic_spy_core::{Database, TrafficSpy};
//!
//! let spy = TrafficSpy::new(Database::open_in_memory()?);
//! spy.database().migrate()?;
//! spy.register_source("jumpstartlab", "http://jumpstartlab.com")?;
//! spy.ingest_str("jumpstartlab", payload_json)?;
//! let summary = spy.source_summary("jumpstartlab")?;
//! ```

use crate::analytics::{SourceSummary, UrlDetail};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::registry::SourceRegistry;
use crate::types::{resolve_url, ClientInfo, Source, Url};
use crate::user_agent;
use crate::validate::{self, Validation, ValidationError};
use serde::Serialize;
use serde_json::Value;

/// Result of storing one payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestOutcome {
    pub event_id: i64,
    /// Absolute URL the event was filed under
    pub url: String,
    pub client: ClientInfo,
}

/// Ingestion and reporting service over one event store.
pub struct TrafficSpy {
    db: Database,
}

impl TrafficSpy {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// The underlying store.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Register a source and its root URL.
    ///
    /// Both values are required. A taken identifier yields [`Error::Conflict`].
    pub fn register_source(&self, identifier: &str, root_url: &str) -> Result<Source> {
        let identifier = identifier.trim();
        let root_url = root_url.trim();
        if identifier.is_empty() {
            return Err(ValidationError::MissingField("identifier").into());
        }
        if root_url.is_empty() {
            return Err(ValidationError::MissingField("root_url").into());
        }

        let root_url = resolve_url(root_url, "");
        let source = self.db.insert_source(identifier, &root_url)?;

        tracing::info!(identifier, root_url = %root_url, "Source registered");
        Ok(source)
    }

    /// Validate and store a payload given as JSON text.
    pub fn ingest_str(&self, identifier: &str, raw: &str) -> Result<IngestOutcome> {
        let value: Value = serde_json::from_str(raw).map_err(|e| {
            tracing::warn!(identifier, error = %e, "Rejected malformed payload");
            Error::Validation(ValidationError::Malformed(e.to_string()))
        })?;
        self.ingest(identifier, &value)
    }

    /// Validate and store one payload for a source.
    ///
    /// Nothing is written unless the payload is valid and the source exists.
    pub fn ingest(&self, identifier: &str, raw: &Value) -> Result<IngestOutcome> {
        let payload = match validate::validate(raw) {
            Validation::Valid(payload) => payload,
            Validation::Invalid(reason) => {
                tracing::warn!(identifier, reason = %reason, "Rejected payload");
                return Err(reason.into());
            }
        };

        let root = self.root_url(identifier)?;
        let url = root.join(&payload.url);
        let client = user_agent::classify(&payload.browser);
        let event_id = self.db.put(identifier, &url, &payload, &client, raw)?;

        tracing::debug!(
            identifier,
            event_id,
            url = %url,
            browser = %client.browser_family,
            "Event ingested"
        );

        Ok(IngestOutcome {
            event_id,
            url,
            client,
        })
    }

    /// Aggregate view over every event of a source.
    pub fn source_summary(&self, identifier: &str) -> Result<SourceSummary> {
        self.root_url(identifier)?;
        let events = self.db.events_for(identifier)?;

        tracing::debug!(identifier, events = events.len(), "Computed source summary");
        Ok(SourceSummary::from_events(identifier, &events))
    }

    /// Aggregate view over the events of one URL.
    ///
    /// `url` may be absolute or a path below the source's root URL. Fails with
    /// [`Error::UrlNotFound`] if the source never reported that URL.
    pub fn url_detail(&self, identifier: &str, url: &str) -> Result<UrlDetail> {
        let root = self.root_url(identifier)?;
        let url = root.join(url);

        let not_found = || Error::UrlNotFound {
            identifier: identifier.to_string(),
            url: url.clone(),
        };

        if !self.db.url_exists(&url)? {
            return Err(not_found());
        }
        let events = self.db.events_for_url(identifier, &url)?;
        if events.is_empty() {
            return Err(not_found());
        }

        tracing::debug!(identifier, url = %url, events = events.len(), "Computed URL detail");
        Ok(UrlDetail::from_events(identifier, &url, &events))
    }

    fn root_url(&self, identifier: &str) -> Result<Url> {
        self.db
            .find_root_url(identifier)?
            .ok_or_else(|| Error::SourceNotFound(identifier.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::HttpVerb;
    use serde_json::json;
    use std::time::Duration;

    fn create_test_service() -> TrafficSpy {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        let spy = TrafficSpy::new(db);
        spy.register_source("jumpstartlab", "http://jumpstartlab.com/")
            .unwrap();
        spy
    }

    fn payload(url: &str, response_time: u64, verb: &str) -> Value {
        json!({
            "url": url,
            "response_status": 200,
            "response_time": response_time,
            "request_type": verb,
            "resolution": "1920x1280",
            "browser": "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_8_2) Chrome/24.0.1309.0 Safari/537.17",
            "referrer": "http://jumpstartlab.com"
        })
    }

    #[test]
    fn test_register_requires_both_fields() {
        let spy = create_test_service();
        let err = spy.register_source("", "http://a.com").unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::MissingField("identifier"))
        ));
        let err = spy.register_source("a", "  ").unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::MissingField("root_url"))
        ));
    }

    #[test]
    fn test_register_conflict() {
        let spy = create_test_service();
        let err = spy
            .register_source("jumpstartlab", "http://jumpstartlab.com")
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn test_relative_urls_resolve_against_root() {
        let spy = create_test_service();
        let outcome = spy
            .ingest("jumpstartlab", &payload("/blog", 37, "get"))
            .unwrap();
        assert_eq!(outcome.url, "http://jumpstartlab.com/blog");
        assert_eq!(outcome.client.browser_family, "Chrome");

        let detail = spy.url_detail("jumpstartlab", "blog").unwrap();
        assert_eq!(detail.event_count, 1);
        assert_eq!(detail.verb_breakdown, vec![(HttpVerb::Get, 1)]);
    }

    #[test]
    fn test_invalid_payload_not_persisted() {
        let spy = create_test_service();
        let mut raw = payload("http://jumpstartlab.com/blog", 37, "GET");
        raw.as_object_mut().unwrap().remove("request_type");

        let err = spy.ingest("jumpstartlab", &raw).unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::MissingField("request_type"))
        ));
        assert_eq!(spy.database().count_events("jumpstartlab").unwrap(), 0);
        assert!(!spy
            .database()
            .url_exists("http://jumpstartlab.com/blog")
            .unwrap());
    }

    #[test]
    fn test_malformed_json_rejected() {
        let spy = create_test_service();
        let err = spy.ingest_str("jumpstartlab", "{\"url\":").unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::Malformed(_))
        ));
    }

    #[test]
    fn test_unknown_source() {
        let spy = create_test_service();
        let err = spy
            .ingest("nobody", &payload("http://x.com", 1, "GET"))
            .unwrap_err();
        assert!(matches!(err, Error::SourceNotFound(_)));
        assert!(matches!(
            spy.source_summary("nobody").unwrap_err(),
            Error::SourceNotFound(_)
        ));
    }

    #[test]
    fn test_url_detail_not_found() {
        let spy = create_test_service();
        let err = spy.url_detail("jumpstartlab", "never").unwrap_err();
        assert!(matches!(err, Error::UrlNotFound { .. }));
    }

    #[test]
    fn test_url_seen_only_by_other_source_is_not_found() {
        let spy = create_test_service();
        spy.register_source("other", "http://other.com").unwrap();
        spy.ingest("other", &payload("http://jumpstartlab.com/shared", 5, "GET"))
            .unwrap();

        let err = spy
            .url_detail("jumpstartlab", "http://jumpstartlab.com/shared")
            .unwrap_err();
        assert!(matches!(err, Error::UrlNotFound { .. }));
    }

    #[test]
    fn test_ingest_while_store_locked_is_storage_error() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let spy = TrafficSpy::new(Database::from_connection(conn, Duration::from_millis(20)));
        spy.database().migrate().unwrap();
        spy.register_source("jumpstartlab", "http://jumpstartlab.com")
            .unwrap();

        {
            let _held = spy.database().connection().unwrap();
            let err = spy
                .ingest("jumpstartlab", &payload("/blog", 10, "GET"))
                .unwrap_err();
            assert!(matches!(err, Error::Storage(_)));
            assert_eq!(err.kind(), ErrorKind::Server);
        }

        assert_eq!(spy.database().count_events("jumpstartlab").unwrap(), 0);
    }

    #[test]
    fn test_ingest_into_read_only_store_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.db");
        {
            let conn = rusqlite::Connection::open(&path).unwrap();
            let db = Database::from_connection(conn, Duration::from_secs(1));
            db.migrate().unwrap();
            db.insert_source("jumpstartlab", "http://jumpstartlab.com")
                .unwrap();
        }

        let conn =
            rusqlite::Connection::open_with_flags(&path, rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY)
                .unwrap();
        let spy = TrafficSpy::new(Database::from_connection(conn, Duration::from_secs(1)));

        let err = spy
            .ingest("jumpstartlab", &payload("/blog", 10, "GET"))
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(err.kind(), ErrorKind::Server);
        assert_eq!(spy.database().count_events("jumpstartlab").unwrap(), 0);
    }

    #[test]
    fn test_summary_of_empty_source() {
        let spy = create_test_service();
        let summary = spy.source_summary("jumpstartlab").unwrap();
        assert_eq!(summary.event_count, 0);
        assert_eq!(summary.avg_response_time, 0.0);
    }
}
