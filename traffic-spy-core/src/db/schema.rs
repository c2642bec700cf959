//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: urls, sources, append-only events
    r#"
    -- ============================================
    -- Registry
    -- ============================================

    CREATE TABLE IF NOT EXISTS urls (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        url              TEXT NOT NULL UNIQUE,
        created_at       DATETIME NOT NULL
    );

    CREATE TABLE IF NOT EXISTS sources (
        identifier       TEXT PRIMARY KEY,
        root_url_id      INTEGER NOT NULL REFERENCES urls(id),
        registered_at    DATETIME NOT NULL
    );

    -- ============================================
    -- Events (append-only)
    -- ============================================

    CREATE TABLE IF NOT EXISTS events (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        source_identifier TEXT NOT NULL REFERENCES sources(identifier),
        url_id            INTEGER NOT NULL REFERENCES urls(id),

        response_status   INTEGER NOT NULL,
        response_time     INTEGER NOT NULL CHECK (response_time >= 0),
        request_type      TEXT NOT NULL CHECK (request_type IN
                              ('GET', 'POST', 'PUT', 'DELETE', 'PATCH',
                               'HEAD', 'OPTIONS', 'CONNECT', 'TRACE')),
        resolution        TEXT NOT NULL,
        user_agent        TEXT NOT NULL,
        referrer          TEXT,

        -- Classifier output cached at ingestion
        browser_family    TEXT NOT NULL,
        browser_version   TEXT,
        os_family         TEXT NOT NULL,

        received_at       DATETIME NOT NULL,

        -- Lossless capture
        raw_data          JSON NOT NULL
    );

    CREATE TRIGGER IF NOT EXISTS events_no_update
    BEFORE UPDATE ON events
    BEGIN
        SELECT RAISE(ABORT, 'events are append-only');
    END;

    CREATE TRIGGER IF NOT EXISTS events_no_delete
    BEFORE DELETE ON events
    BEGIN
        SELECT RAISE(ABORT, 'events are append-only');
    END;

    -- ============================================
    -- Indexes
    -- ============================================

    CREATE INDEX IF NOT EXISTS idx_events_source_url ON events(source_identifier, url_id);
    CREATE INDEX IF NOT EXISTS idx_sources_root_url ON sources(root_url_id);
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version = get_schema_version(&conn).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_tables_created() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        for table in ["urls", "sources", "events"] {
            let exists: i32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
                    [table],
                    |r| r.get(0),
                )
                .unwrap();
            assert_eq!(exists, 1, "Table {} should exist", table);
        }
    }

    #[test]
    fn test_foreign_keys() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("PRAGMA foreign_keys = ON", []).unwrap();
        run_migrations(&conn).unwrap();

        let fk_list: Vec<String> = conn
            .prepare("PRAGMA foreign_key_list(events)")
            .unwrap()
            .query_map([], |row| row.get::<_, String>(2))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(fk_list.iter().any(|t| t == "sources"), "events should reference sources");
        assert!(fk_list.iter().any(|t| t == "urls"), "events should reference urls");
    }

    #[test]
    fn test_negative_response_time_rejected_by_schema() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO urls (url, created_at) VALUES ('http://a.com', '2024-01-01T00:00:00Z');
             INSERT INTO sources VALUES ('a', 1, '2024-01-01T00:00:00Z');",
        )
        .unwrap();

        let result = conn.execute(
            "INSERT INTO events (source_identifier, url_id, response_status, response_time,
                 request_type, resolution, user_agent, browser_family, os_family, received_at, raw_data)
             VALUES ('a', 1, 200, -5, 'GET', '800x600', 'ua', 'Unknown', 'Unknown',
                 '2024-01-01T00:00:00Z', '{}')",
            [],
        );
        assert!(result.is_err());
    }
}
