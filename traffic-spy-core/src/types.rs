//! Core domain types for traffic-spy
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Source** | A registered site or application that submits telemetry |
//! | **Root URL** | The base URL a Source registered with; relative URLs resolve against it |
//! | **Url** | Any URL string seen at registration or ingestion, interned by id |
//! | **Payload** | A validated telemetry record, not yet stored |
//! | **Event** | A stored Payload tied to exactly one Source and one Url |
//!
//! Entities reference each other by id (`Source::root_url_id`, `Event::url_id`)
//! rather than holding each other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================
// Registry entities
// ============================================

/// A registered telemetry source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Opaque unique identifier chosen at registration
    pub identifier: String,
    /// Id of the root URL in the `urls` table
    pub root_url_id: i64,
    /// When the source was registered
    pub registered_at: DateTime<Utc>,
}

/// An interned URL string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Url {
    pub id: i64,
    pub url: String,
}

impl Url {
    /// Resolve `target` against this URL.
    ///
    /// Absolute `http(s)://` targets are kept as given. Anything else is
    /// treated as a path below this URL, joined with a single `/`.
    pub fn join(&self, target: &str) -> String {
        resolve_url(&self.url, target)
    }
}

/// Resolve a possibly relative URL against a root URL.
///
/// Trailing slashes are dropped so `http://a.com/` and `http://a.com` intern
/// as the same URL.
pub fn resolve_url(root: &str, target: &str) -> String {
    let target = target.trim();
    if is_absolute(target) {
        return target.trim_end_matches('/').to_string();
    }

    let root = root.trim_end_matches('/');
    let path = target.trim_matches('/');
    if path.is_empty() {
        root.to_string()
    } else {
        format!("{}/{}", root, path)
    }
}

fn is_absolute(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

// ============================================
// HTTP verbs
// ============================================

/// HTTP request methods accepted in payloads.
///
/// Variants are declared alphabetically so the derived `Ord` matches the
/// lexical order of the canonical names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpVerb {
    Connect,
    Delete,
    Get,
    Head,
    Options,
    Patch,
    Post,
    Put,
    Trace,
}

impl HttpVerb {
    /// Every accepted verb, in declaration order.
    pub const ALL: [HttpVerb; 9] = [
        HttpVerb::Connect,
        HttpVerb::Delete,
        HttpVerb::Get,
        HttpVerb::Head,
        HttpVerb::Options,
        HttpVerb::Patch,
        HttpVerb::Post,
        HttpVerb::Put,
        HttpVerb::Trace,
    ];

    /// Canonical uppercase name, also used for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpVerb::Get => "GET",
            HttpVerb::Post => "POST",
            HttpVerb::Put => "PUT",
            HttpVerb::Delete => "DELETE",
            HttpVerb::Patch => "PATCH",
            HttpVerb::Head => "HEAD",
            HttpVerb::Options => "OPTIONS",
            HttpVerb::Connect => "CONNECT",
            HttpVerb::Trace => "TRACE",
        }
    }
}

impl std::fmt::Display for HttpVerb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HttpVerb {
    type Err = String;

    /// Case-insensitive parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        HttpVerb::ALL
            .iter()
            .copied()
            .find(|verb| verb.as_str() == upper)
            .ok_or_else(|| format!("unknown HTTP verb: {}", s))
    }
}

// ============================================
// Payloads and events
// ============================================

/// A telemetry record that passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    /// Requested resource, absolute or relative to the source's root URL
    pub url: String,
    pub response_status: u16,
    /// Milliseconds
    pub response_time: u64,
    pub request_type: HttpVerb,
    /// Screen resolution, e.g. "1920x1080"
    pub resolution: String,
    /// Raw user-agent string
    pub browser: String,
    /// None when absent or empty
    pub referrer: Option<String>,
}

/// Browser and OS classification of a user-agent string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientInfo {
    pub browser_family: String,
    pub browser_version: Option<String>,
    pub os_family: String,
}

/// A stored telemetry event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Insert sequence; defines store order
    pub id: i64,
    pub source_identifier: String,
    pub url_id: i64,
    /// Resolved absolute URL
    pub url: String,
    pub response_status: u16,
    pub response_time: u64,
    pub request_type: HttpVerb,
    pub resolution: String,
    pub user_agent: String,
    pub referrer: Option<String>,
    /// Classification cached at ingestion
    pub client: ClientInfo,
    pub received_at: DateTime<Utc>,
    /// Payload exactly as submitted
    pub raw_data: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_url() {
        assert_eq!(
            resolve_url("http://jumpstartlab.com", "blog"),
            "http://jumpstartlab.com/blog"
        );
        assert_eq!(
            resolve_url("http://jumpstartlab.com/", "/blog/posts/"),
            "http://jumpstartlab.com/blog/posts"
        );
        assert_eq!(
            resolve_url("http://jumpstartlab.com", ""),
            "http://jumpstartlab.com"
        );
    }

    #[test]
    fn test_resolve_absolute_url() {
        assert_eq!(
            resolve_url("http://jumpstartlab.com", "https://other.com/a"),
            "https://other.com/a"
        );
        assert_eq!(
            resolve_url("http://jumpstartlab.com", "HTTP://JUMPSTARTLAB.COM/a"),
            "HTTP://JUMPSTARTLAB.COM/a"
        );
        assert_eq!(
            resolve_url("http://jumpstartlab.com", "http://jumpstartlab.com/blog/"),
            "http://jumpstartlab.com/blog"
        );
    }

    #[test]
    fn test_verb_parse_case_insensitive() {
        assert_eq!("get".parse::<HttpVerb>().unwrap(), HttpVerb::Get);
        assert_eq!("Delete".parse::<HttpVerb>().unwrap(), HttpVerb::Delete);
        assert!("FETCH".parse::<HttpVerb>().is_err());
        assert_eq!(HttpVerb::Options.to_string(), "OPTIONS");
    }

    #[test]
    fn test_verb_order_is_lexical() {
        let mut names: Vec<&str> = HttpVerb::ALL.iter().map(|v| v.as_str()).collect();
        names.sort();
        let ordered: Vec<&str> = HttpVerb::ALL.iter().map(|v| v.as_str()).collect();
        assert_eq!(names, ordered);
        assert!(HttpVerb::Delete < HttpVerb::Get);
    }

    #[test]
    fn test_verb_serde_uppercase() {
        let json = serde_json::to_string(&HttpVerb::Post).unwrap();
        assert_eq!(json, "\"POST\"");
    }
}
