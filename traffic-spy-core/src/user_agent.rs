//! User-agent classification
//!
//! Raw user-agent strings are matched against two priority-ordered tables,
//! one for browsers and one for operating systems. The first entry with a
//! marker contained in the string wins, so entries whose user agents embed
//! another browser's token (Edge and Opera carry `Chrome/`, Chrome carries
//! `Safari/`) must sit above the browser they imitate.
//!
//! Classification is total: anything unmatched, including the empty string,
//! maps to [`UNKNOWN`].

use crate::types::ClientInfo;

/// Family reported when no signature matches.
pub const UNKNOWN: &str = "Unknown";

/// One row of the browser table.
#[derive(Debug, Clone, Copy)]
pub struct BrowserSignature {
    /// Reported browser family
    pub family: &'static str,
    /// Substrings that identify this browser; any one is enough
    pub markers: &'static [&'static str],
    /// Prefixes whose trailing `[0-9.]` run is the version, tried in order
    pub version_prefixes: &'static [&'static str],
}

/// One row of the operating-system table.
#[derive(Debug, Clone, Copy)]
pub struct OsSignature {
    pub family: &'static str,
    pub markers: &'static [&'static str],
}

const BROWSERS: &[BrowserSignature] = &[
    BrowserSignature {
        family: "Edge",
        markers: &["Edg/", "Edge/", "EdgA/", "EdgiOS/"],
        version_prefixes: &["Edg/", "Edge/", "EdgA/", "EdgiOS/"],
    },
    BrowserSignature {
        family: "Opera",
        markers: &["OPR/", "Opera"],
        version_prefixes: &["OPR/", "Version/", "Opera/"],
    },
    BrowserSignature {
        family: "Samsung Internet",
        markers: &["SamsungBrowser/"],
        version_prefixes: &["SamsungBrowser/"],
    },
    BrowserSignature {
        family: "Chrome",
        markers: &["CriOS/", "Chrome/", "Chromium/"],
        version_prefixes: &["CriOS/", "Chrome/", "Chromium/"],
    },
    BrowserSignature {
        family: "Firefox",
        markers: &["FxiOS/", "Firefox/"],
        version_prefixes: &["FxiOS/", "Firefox/"],
    },
    BrowserSignature {
        family: "Internet Explorer",
        markers: &["MSIE ", "Trident/"],
        version_prefixes: &["MSIE ", "rv:"],
    },
    BrowserSignature {
        family: "Safari",
        markers: &["Safari/"],
        version_prefixes: &["Version/"],
    },
];

const OPERATING_SYSTEMS: &[OsSignature] = &[
    OsSignature {
        family: "Windows Phone",
        markers: &["Windows Phone"],
    },
    OsSignature {
        family: "Windows",
        markers: &["Windows"],
    },
    OsSignature {
        family: "Android",
        markers: &["Android"],
    },
    OsSignature {
        family: "iOS",
        markers: &["iPhone", "iPad", "iPod"],
    },
    OsSignature {
        family: "macOS",
        markers: &["Macintosh", "Mac OS X"],
    },
    OsSignature {
        family: "Chrome OS",
        markers: &["CrOS"],
    },
    OsSignature {
        family: "Linux",
        markers: &["Linux"],
    },
];

/// The browser table in match order.
pub fn signature_table() -> &'static [BrowserSignature] {
    BROWSERS
}

/// The operating-system table in match order.
pub fn os_table() -> &'static [OsSignature] {
    OPERATING_SYSTEMS
}

/// Classify a raw user-agent string.
pub fn classify(raw: &str) -> ClientInfo {
    let browser = BROWSERS
        .iter()
        .find(|sig| sig.markers.iter().any(|m| raw.contains(m)));

    let (browser_family, browser_version) = match browser {
        Some(sig) => (sig.family.to_string(), extract_version(raw, sig)),
        None => (UNKNOWN.to_string(), None),
    };

    let os_family = OPERATING_SYSTEMS
        .iter()
        .find(|sig| sig.markers.iter().any(|m| raw.contains(m)))
        .map_or(UNKNOWN, |sig| sig.family)
        .to_string();

    ClientInfo {
        browser_family,
        browser_version,
        os_family,
    }
}

fn extract_version(raw: &str, sig: &BrowserSignature) -> Option<String> {
    sig.version_prefixes.iter().find_map(|prefix| {
        let start = raw.find(prefix)? + prefix.len();
        let version: String = raw[start..]
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        let version = version.trim_end_matches('.');
        (!version.is_empty()).then(|| version.to_string())
    })
}
