//! Aggregations over event sets
//!
//! Every function here is pure: it reads a slice of events in store order and
//! returns a freshly computed figure. Empty input is a normal case and never
//! an error.
//!
//! Rankings are `(key, count)` pairs sorted by descending count, with ties
//! broken by ascending key. Grouping goes through a `BTreeMap`, so output
//! order never depends on hash iteration.

use crate::types::{Event, HttpVerb};
use std::collections::BTreeMap;

/// `(key, count)` pairs, most frequent first.
pub type Ranking<K> = Vec<(K, i64)>;

/// Count occurrences of each key and rank them.
pub fn rank<K, I>(keys: I) -> Ranking<K>
where
    K: Ord,
    I: IntoIterator<Item = K>,
{
    let mut counts: BTreeMap<K, i64> = BTreeMap::new();
    for key in keys {
        *counts.entry(key).or_insert(0) += 1;
    }

    // BTreeMap yields keys ascending; the stable sort keeps that order for ties
    let mut ranked: Ranking<K> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
}

/// Mean response time in milliseconds; 0.0 for no events.
pub fn avg_response_time(events: &[Event]) -> f64 {
    if events.is_empty() {
        return 0.0;
    }
    let total: u128 = events.iter().map(|e| e.response_time as u128).sum();
    total as f64 / events.len() as f64
}

/// Slowest event; the earliest one wins a tie.
pub fn longest_response_time(events: &[Event]) -> Option<&Event> {
    events.iter().reduce(|best, e| {
        if e.response_time > best.response_time {
            e
        } else {
            best
        }
    })
}

/// Fastest event; the earliest one wins a tie.
pub fn shortest_response_time(events: &[Event]) -> Option<&Event> {
    events.iter().reduce(|best, e| {
        if e.response_time < best.response_time {
            e
        } else {
            best
        }
    })
}

/// Mean response time per URL, slowest first; ties by ascending URL.
pub fn url_avg_response_times(events: &[Event]) -> Vec<(String, f64)> {
    let mut totals: BTreeMap<&str, (u128, u64)> = BTreeMap::new();
    for e in events {
        let entry = totals.entry(e.url.as_str()).or_insert((0, 0));
        entry.0 += e.response_time as u128;
        entry.1 += 1;
    }

    let mut ranked: Vec<(String, f64)> = totals
        .into_iter()
        .map(|(url, (total, count))| (url.to_string(), total as f64 / count as f64))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked
}

pub fn url_request_counts(events: &[Event]) -> Ranking<String> {
    owned_keys(rank(events.iter().map(|e| e.url.as_str())))
}

pub fn screen_resolution_counts(events: &[Event]) -> Ranking<String> {
    owned_keys(rank(events.iter().map(|e| e.resolution.as_str())))
}

/// Referrer popularity; events without a referrer are skipped.
pub fn popular_referrers(events: &[Event]) -> Ranking<String> {
    owned_keys(rank(
        events
            .iter()
            .filter_map(|e| e.referrer.as_deref())
            .filter(|r| !r.trim().is_empty()),
    ))
}

/// Popularity of raw user-agent strings.
pub fn popular_user_agents(events: &[Event]) -> Ranking<String> {
    owned_keys(rank(events.iter().map(|e| e.user_agent.as_str())))
}

/// Requests per HTTP verb. Verbs that never occur are omitted.
pub fn http_verb_breakdown(events: &[Event]) -> Ranking<HttpVerb> {
    rank(events.iter().map(|e| e.request_type))
}

/// Requests per browser family.
pub fn browser_breakdown(events: &[Event]) -> Ranking<String> {
    owned_keys(rank(events.iter().map(|e| e.client.browser_family.as_str())))
}

/// Requests per operating-system family.
pub fn os_breakdown(events: &[Event]) -> Ranking<String> {
    owned_keys(rank(events.iter().map(|e| e.client.os_family.as_str())))
}

fn owned_keys(ranked: Ranking<&str>) -> Ranking<String> {
    ranked
        .into_iter()
        .map(|(key, count)| (key.to_string(), count))
        .collect()
}
