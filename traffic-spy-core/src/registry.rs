//! Source registry
//!
//! The registry maps a source identifier to its root URL and interns URL
//! strings. Registration itself lives in [`Database::insert_source`]; the
//! rest of the crate only consumes the two lookups below.

use crate::db::repo;
use crate::db::Database;
use crate::error::Result;
use crate::types::Url;

/// Lookups the ingestion and query paths need from the registry.
pub trait SourceRegistry {
    /// Root URL registered for `identifier`, or `None` for unknown sources.
    fn find_root_url(&self, identifier: &str) -> Result<Option<Url>>;

    /// Return the URL with this exact string, creating it on first sight.
    fn resolve_or_create_url(&self, url: &str) -> Result<Url>;
}

impl SourceRegistry for Database {
    fn find_root_url(&self, identifier: &str) -> Result<Option<Url>> {
        let conn = self.connection()?;
        Ok(repo::find_root_url(&conn, identifier)?)
    }

    fn resolve_or_create_url(&self, url: &str) -> Result<Url> {
        Database::resolve_or_create_url(self, url)
    }
}
