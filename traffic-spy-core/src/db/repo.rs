//! Database repository layer
//!
//! Provides registration, append and query operations over the
//! `urls`, `sources` and `events` tables.

use crate::config::StorageConfig;
use crate::error::{Error, Result};
use crate::types::*;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

const EVENT_COLUMNS: &str = r#"
    e.id, e.source_identifier, e.url_id, u.url,
    e.response_status, e.response_time, e.request_type, e.resolution,
    e.user_agent, e.referrer, e.browser_family, e.browser_version, e.os_family,
    e.received_at, e.raw_data
"#;

/// Database handle with a single shared connection.
///
/// All access is serialized through the connection lock; waiting for it is
/// bounded by the configured lock timeout.
pub struct Database {
    conn: Mutex<Connection>,
    lock_timeout: Duration,
}

impl Database {
    /// Open or create a database at the given path with default storage settings
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, &StorageConfig::default())
    }

    /// Open or create a database at the given path
    pub fn open_with(path: &Path, config: &StorageConfig) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).map_err(storage_error)?;
        conn.busy_timeout(config.busy_timeout())?;

        // Enable foreign keys and WAL mode for concurrent readers
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        tracing::debug!(path = %path.display(), "Opened event store");

        Ok(Self::from_connection(conn, config.lock_timeout()))
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self::from_connection(
            conn,
            StorageConfig::default().lock_timeout(),
        ))
    }

    /// Wrap an already configured connection
    pub(crate) fn from_connection(conn: Connection, lock_timeout: Duration) -> Self {
        Self {
            conn: Mutex::new(conn),
            lock_timeout,
        }
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        super::schema::run_migrations(&conn)
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.lock()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.try_lock_for(self.lock_timeout).ok_or_else(|| {
            tracing::warn!(timeout = ?self.lock_timeout, "Timed out waiting for connection");
            Error::Storage(format!(
                "timed out after {:?} waiting for connection",
                self.lock_timeout
            ))
        })
    }

    // ============================================
    // URL operations
    // ============================================

    /// Look up a URL by its exact string
    pub fn find_url(&self, url: &str) -> Result<Option<Url>> {
        let conn = self.lock()?;
        find_url(&conn, url).map_err(Error::from)
    }

    /// Whether this URL string has ever been seen
    pub fn url_exists(&self, url: &str) -> Result<bool> {
        Ok(self.find_url(url)?.is_some())
    }

    /// Get a URL by id
    pub fn get_url(&self, id: i64) -> Result<Option<Url>> {
        let conn = self.lock()?;
        conn.query_row("SELECT id, url FROM urls WHERE id = ?", [id], row_to_url)
            .optional()
            .map_err(Error::from)
    }

    /// Return the URL with this string, creating it on first sight
    pub fn resolve_or_create_url(&self, url: &str) -> Result<Url> {
        let conn = self.lock()?;
        resolve_or_create_url(&conn, url).map_err(storage_error)
    }

    // ============================================
    // Source operations
    // ============================================

    /// Register a new source with its root URL.
    ///
    /// Fails with [`Error::Conflict`] if the identifier is taken.
    pub fn insert_source(&self, identifier: &str, root_url: &str) -> Result<Source> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(storage_error)?;

        if get_source(&tx, identifier)?.is_some() {
            return Err(Error::Conflict(identifier.to_string()));
        }

        let root = resolve_or_create_url(&tx, root_url)?;
        let registered_at = Utc::now();
        tx.execute(
            "INSERT INTO sources (identifier, root_url_id, registered_at) VALUES (?1, ?2, ?3)",
            params![identifier, root.id, registered_at.to_rfc3339()],
        )?;
        tx.commit().map_err(storage_error)?;

        Ok(Source {
            identifier: identifier.to_string(),
            root_url_id: root.id,
            registered_at,
        })
    }

    /// Get a source by identifier
    pub fn get_source(&self, identifier: &str) -> Result<Option<Source>> {
        let conn = self.lock()?;
        get_source(&conn, identifier).map_err(Error::from)
    }

    /// List all sources ordered by identifier
    pub fn list_sources(&self) -> Result<Vec<Source>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT identifier, root_url_id, registered_at FROM sources ORDER BY identifier",
        )?;
        let sources = stmt
            .query_map([], row_to_source)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sources)
    }

    // ============================================
    // Event operations
    // ============================================

    /// Append one event for a source.
    ///
    /// `url` must already be resolved to its absolute form. The URL lookup and
    /// the insert share one transaction, so readers see the whole event or
    /// nothing. Returns the new event id.
    pub fn put(
        &self,
        source_identifier: &str,
        url: &str,
        payload: &Payload,
        client: &ClientInfo,
        raw_data: &serde_json::Value,
    ) -> Result<i64> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(storage_error)?;

        if get_source(&tx, source_identifier)?.is_none() {
            return Err(Error::SourceNotFound(source_identifier.to_string()));
        }

        let url = resolve_or_create_url(&tx, url).map_err(storage_error)?;
        tx.execute(
            r#"
            INSERT INTO events (
                source_identifier, url_id, response_status, response_time, request_type,
                resolution, user_agent, referrer, browser_family, browser_version, os_family,
                received_at, raw_data
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                source_identifier,
                url.id,
                payload.response_status,
                payload.response_time as i64,
                payload.request_type.as_str(),
                payload.resolution,
                payload.browser,
                payload.referrer,
                client.browser_family,
                client.browser_version,
                client.os_family,
                Utc::now().to_rfc3339(),
                raw_data.to_string(),
            ],
        )
        .map_err(storage_error)?;
        let id = tx.last_insert_rowid();
        tx.commit().map_err(storage_error)?;

        Ok(id)
    }

    /// All events for a source, in store order
    pub fn events_for(&self, source_identifier: &str) -> Result<Vec<Event>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM events e
            JOIN urls u ON u.id = e.url_id
            WHERE e.source_identifier = ?
            ORDER BY e.id
            "#
        ))?;
        let events = stmt
            .query_map([source_identifier], row_to_event)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(events)
    }

    /// Events for a source on one resolved URL, in store order
    pub fn events_for_url(&self, source_identifier: &str, url: &str) -> Result<Vec<Event>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM events e
            JOIN urls u ON u.id = e.url_id
            WHERE e.source_identifier = ?1 AND u.url = ?2
            ORDER BY e.id
            "#
        ))?;
        let events = stmt
            .query_map(params![source_identifier, url], row_to_event)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(events)
    }

    /// Number of events stored for a source
    pub fn count_events(&self, source_identifier: &str) -> Result<i64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM events WHERE source_identifier = ?",
            [source_identifier],
            |r| r.get(0),
        )?;
        Ok(count)
    }
}

/// Busy and locked databases are reported as storage failures.
fn storage_error(err: rusqlite::Error) -> Error {
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
            Error::Storage(format!("database busy: {}", err))
        }
        Some(ErrorCode::CannotOpen) | Some(ErrorCode::ReadOnly) | Some(ErrorCode::DiskFull) => {
            Error::Storage(err.to_string())
        }
        _ => Error::Database(err),
    }
}

fn find_url(conn: &Connection, url: &str) -> rusqlite::Result<Option<Url>> {
    conn.query_row("SELECT id, url FROM urls WHERE url = ?", [url], row_to_url)
        .optional()
}

fn resolve_or_create_url(conn: &Connection, url: &str) -> rusqlite::Result<Url> {
    conn.execute(
        "INSERT OR IGNORE INTO urls (url, created_at) VALUES (?1, ?2)",
        params![url, Utc::now().to_rfc3339()],
    )?;
    conn.query_row("SELECT id, url FROM urls WHERE url = ?", [url], row_to_url)
}

fn get_source(conn: &Connection, identifier: &str) -> rusqlite::Result<Option<Source>> {
    conn.query_row(
        "SELECT identifier, root_url_id, registered_at FROM sources WHERE identifier = ?",
        [identifier],
        row_to_source,
    )
    .optional()
}

/// Root URL of a registered source
pub(crate) fn find_root_url(conn: &Connection, identifier: &str) -> rusqlite::Result<Option<Url>> {
    conn.query_row(
        r#"
        SELECT u.id, u.url
        FROM sources s
        JOIN urls u ON u.id = s.root_url_id
        WHERE s.identifier = ?
        "#,
        [identifier],
        row_to_url,
    )
    .optional()
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_url(row: &Row) -> rusqlite::Result<Url> {
    Ok(Url {
        id: row.get(0)?,
        url: row.get(1)?,
    })
}

fn row_to_source(row: &Row) -> rusqlite::Result<Source> {
    let registered_at: String = row.get("registered_at")?;
    Ok(Source {
        identifier: row.get("identifier")?,
        root_url_id: row.get("root_url_id")?,
        registered_at: parse_timestamp(&registered_at),
    })
}

fn row_to_event(row: &Row) -> rusqlite::Result<Event> {
    let request_type_str: String = row.get("request_type")?;
    let request_type = request_type_str.parse::<HttpVerb>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            6,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        )
    })?;
    let response_time: i64 = row.get("response_time")?;
    let received_at: String = row.get("received_at")?;
    let raw_data: String = row.get("raw_data")?;
    let raw_data = serde_json::from_str(&raw_data).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(14, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Event {
        id: row.get("id")?,
        source_identifier: row.get("source_identifier")?,
        url_id: row.get("url_id")?,
        url: row.get("url")?,
        response_status: row.get("response_status")?,
        response_time: response_time.max(0) as u64,
        request_type,
        resolution: row.get("resolution")?,
        user_agent: row.get("user_agent")?,
        referrer: row.get("referrer")?,
        client: ClientInfo {
            browser_family: row.get("browser_family")?,
            browser_version: row.get("browser_version")?,
            os_family: row.get("os_family")?,
        },
        received_at: parse_timestamp(&received_at),
        raw_data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user_agent;

    fn create_test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    fn create_test_payload(url: &str, response_time: u64) -> Payload {
        Payload {
            url: url.to_string(),
            response_status: 200,
            response_time,
            request_type: HttpVerb::Get,
            resolution: "1920x1080".to_string(),
            browser: "Mozilla/5.0 (Windows NT 10.0) Chrome/120.0 Safari/537.36".to_string(),
            referrer: Some("http://google.com".to_string()),
        }
    }

    fn put(db: &Database, source: &str, payload: &Payload) -> i64 {
        let client = user_agent::classify(&payload.browser);
        db.put(source, &payload.url, payload, &client, &serde_json::json!({}))
            .unwrap()
    }

    #[test]
    fn test_source_registration() {
        let db = create_test_db();

        let source = db.insert_source("jumpstartlab", "http://jumpstartlab.com").unwrap();
        let root = db.get_url(source.root_url_id).unwrap().unwrap();
        assert_eq!(root.url, "http://jumpstartlab.com");

        let fetched = db.get_source("jumpstartlab").unwrap().unwrap();
        assert_eq!(fetched.root_url_id, source.root_url_id);
        assert_eq!(db.list_sources().unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_source_conflicts() {
        let db = create_test_db();
        db.insert_source("jumpstartlab", "http://jumpstartlab.com").unwrap();

        let err = db
            .insert_source("jumpstartlab", "http://other.com")
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(id) if id == "jumpstartlab"));
        assert!(!db.url_exists("http://other.com").unwrap());
    }

    #[test]
    fn test_urls_are_interned() {
        let db = create_test_db();
        let a = db.resolve_or_create_url("http://a.com/x").unwrap();
        let b = db.resolve_or_create_url("http://a.com/x").unwrap();
        assert_eq!(a, b);
        assert!(db.url_exists("http://a.com/x").unwrap());
        assert!(!db.url_exists("http://a.com/y").unwrap());
    }

    #[test]
    fn test_put_and_query_in_store_order() {
        let db = create_test_db();
        db.insert_source("jumpstartlab", "http://jumpstartlab.com").unwrap();

        put(&db, "jumpstartlab", &create_test_payload("http://jumpstartlab.com/blog", 50));
        put(&db, "jumpstartlab", &create_test_payload("http://jumpstartlab.com/about", 400));
        put(&db, "jumpstartlab", &create_test_payload("http://jumpstartlab.com/blog", 150));

        let all = db.events_for("jumpstartlab").unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].id < w[1].id));
        assert_eq!(all[0].client.browser_family, "Chrome");
        assert_eq!(all[0].request_type, HttpVerb::Get);

        let blog = db
            .events_for_url("jumpstartlab", "http://jumpstartlab.com/blog")
            .unwrap();
        assert_eq!(
            blog.iter().map(|e| e.response_time).collect::<Vec<_>>(),
            vec![50, 150]
        );
        assert_eq!(db.count_events("jumpstartlab").unwrap(), 3);
    }

    #[test]
    fn test_put_unknown_source_writes_nothing() {
        let db = create_test_db();
        let payload = create_test_payload("http://nowhere.com", 10);
        let client = user_agent::classify(&payload.browser);

        let err = db
            .put("ghost", &payload.url, &payload, &client, &serde_json::json!({}))
            .unwrap_err();
        assert!(matches!(err, Error::SourceNotFound(_)));
        assert!(!db.url_exists("http://nowhere.com").unwrap());
    }

    #[test]
    fn test_events_are_append_only() {
        let db = create_test_db();
        db.insert_source("jumpstartlab", "http://jumpstartlab.com").unwrap();
        put(&db, "jumpstartlab", &create_test_payload("http://jumpstartlab.com", 10));

        let conn = db.connection().unwrap();
        assert!(conn
            .execute("UPDATE events SET response_time = 1", [])
            .is_err());
        assert!(conn.execute("DELETE FROM events", []).is_err());
    }

    fn create_test_db_with_timeout(timeout: Duration) -> Database {
        let db = Database::from_connection(Connection::open_in_memory().unwrap(), timeout);
        db.migrate().unwrap();
        db
    }

    #[test]
    fn test_lock_timeout_surfaces_storage_error() {
        let db = create_test_db_with_timeout(Duration::from_millis(20));

        let _held = db.connection().unwrap();
        let err = db.url_exists("http://a.com").unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_put_while_locked_stores_nothing() {
        let db = create_test_db_with_timeout(Duration::from_millis(20));
        db.insert_source("jumpstartlab", "http://jumpstartlab.com").unwrap();
        let payload = create_test_payload("http://jumpstartlab.com/blog", 10);
        let client = user_agent::classify(&payload.browser);

        {
            let _held = db.connection().unwrap();
            let err = db
                .put("jumpstartlab", &payload.url, &payload, &client, &serde_json::json!({}))
                .unwrap_err();
            assert!(matches!(err, Error::Storage(_)));
        }

        assert_eq!(db.count_events("jumpstartlab").unwrap(), 0);
        assert!(!db.url_exists("http://jumpstartlab.com/blog").unwrap());
    }

    #[test]
    fn test_lock_released_within_timeout_is_acquired() {
        let db = std::sync::Arc::new(create_test_db_with_timeout(Duration::from_secs(5)));
        db.insert_source("jumpstartlab", "http://jumpstartlab.com").unwrap();

        let held = db.connection().unwrap();
        let waiter = {
            let db = std::sync::Arc::clone(&db);
            std::thread::spawn(move || {
                put(&db, "jumpstartlab", &create_test_payload("http://jumpstartlab.com", 10))
            })
        };
        std::thread::sleep(Duration::from_millis(50));
        drop(held);

        waiter.join().unwrap();
        assert_eq!(db.count_events("jumpstartlab").unwrap(), 1);
    }

    #[test]
    fn test_corrupt_raw_data_is_an_error() {
        let db = create_test_db();
        let source = db.insert_source("jumpstartlab", "http://jumpstartlab.com").unwrap();
        db.connection()
            .unwrap()
            .execute(
                r#"
                INSERT INTO events (
                    source_identifier, url_id, response_status, response_time, request_type,
                    resolution, user_agent, referrer, browser_family, browser_version, os_family,
                    received_at, raw_data
                )
                VALUES ('jumpstartlab', ?1, 200, 10, 'GET', '800x600', 'x', NULL,
                        'Unknown', NULL, 'Unknown', ?2, '{not json')
                "#,
                params![source.root_url_id, Utc::now().to_rfc3339()],
            )
            .unwrap();

        let err = db.events_for("jumpstartlab").unwrap_err();
        assert!(matches!(
            err,
            Error::Database(rusqlite::Error::FromSqlConversionFailure(14, _, _))
        ));
    }
}
