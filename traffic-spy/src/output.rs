//! Text and JSON rendering for CLI results.

use serde::Serialize;
use serde_json::json;
use traffic_spy_core::analytics::{Ranking, ResponseTimeStat};
use traffic_spy_core::{Error, IngestOutcome, Source, SourceSummary, UrlDetail};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
}

/// Outcome of a JSON-lines ingest.
#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    pub accepted: usize,
    /// (line number, reason)
    pub rejected: Vec<(usize, String)>,
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("failed to serialize output: {}", e),
    }
}

pub fn print_registered(format: Format, source: &Source) {
    match format {
        Format::Json => print_json(&json!({ "identifier": source.identifier })),
        Format::Text => println!("Registered source '{}'", source.identifier),
    }
}

pub fn print_ingested(format: Format, outcome: &IngestOutcome) {
    match format {
        Format::Json => print_json(outcome),
        Format::Text => println!(
            "Stored event {} for {} ({} on {})",
            outcome.event_id, outcome.url, outcome.client.browser_family, outcome.client.os_family
        ),
    }
}

pub fn print_batch(format: Format, report: &BatchReport) {
    match format {
        Format::Json => print_json(report),
        Format::Text => {
            println!("Accepted: {}", report.accepted);
            println!("Rejected: {}", report.rejected.len());
            for (line, reason) in &report.rejected {
                println!("  line {}: {}", line, reason);
            }
        }
    }
}

pub fn print_not_found(format: Format, err: &Error) {
    match format {
        Format::Json => print_json(&json!({ "status": "not_found", "message": err.to_string() })),
        Format::Text => println!("No data: {}", err),
    }
}

pub fn print_summary(format: Format, summary: &SourceSummary) {
    if format == Format::Json {
        print_json(summary);
        return;
    }

    println!("Source: {}", summary.identifier);
    println!("Events: {}", summary.event_count);
    println!("Average response time: {:.1} ms", summary.avg_response_time);
    print_ranking("Most requested URLs", &summary.url_counts);

    println!();
    println!("Average response time by URL:");
    if summary.url_avg_response_times.is_empty() {
        println!("  (none)");
    }
    for (url, avg) in &summary.url_avg_response_times {
        println!("  {:>9.1} ms  {}", avg, url);
    }
    print_ranking("Screen resolutions", &summary.resolution_counts);
    print_ranking("Browsers", &summary.browser_breakdown);
    print_ranking("Operating systems", &summary.os_breakdown);
}

pub fn print_url_detail(format: Format, detail: &UrlDetail) {
    if format == Format::Json {
        print_json(detail);
        return;
    }

    println!("Source: {}", detail.identifier);
    println!("URL:    {}", detail.url);
    println!("Events: {}", detail.event_count);
    println!("Longest response time:  {}", format_stat(&detail.longest_response_time));
    println!("Shortest response time: {}", format_stat(&detail.shortest_response_time));
    println!("Average response time:  {:.1} ms", detail.avg_response_time);
    print_ranking("Popular referrers", &detail.popular_referrers);
    print_ranking("Popular user agents", &detail.popular_user_agents);

    let verbs: Ranking<String> = detail
        .verb_breakdown
        .iter()
        .map(|(verb, count)| (verb.to_string(), *count))
        .collect();
    print_ranking("HTTP verbs", &verbs);
}

pub fn print_sources(format: Format, rows: &[(Source, String, i64)]) {
    if format == Format::Json {
        let list: Vec<_> = rows
            .iter()
            .map(|(source, root, events)| {
                json!({
                    "identifier": source.identifier,
                    "root_url": root,
                    "events": events,
                    "registered_at": source.registered_at.to_rfc3339(),
                })
            })
            .collect();
        print_json(&list);
        return;
    }

    if rows.is_empty() {
        println!("No sources registered.");
        return;
    }
    for (source, root, events) in rows {
        println!("{:<24} {:<40} {:>8} events", source.identifier, root, events);
    }
}

fn format_stat(stat: &Option<ResponseTimeStat>) -> String {
    match stat {
        Some(s) => format!("{} ms (event {})", s.response_time, s.event_id),
        None => "-".to_string(),
    }
}

fn print_ranking(title: &str, ranking: &[(String, i64)]) {
    println!();
    println!("{}:", title);
    if ranking.is_empty() {
        println!("  (none)");
        return;
    }
    for (key, count) in ranking {
        println!("  {:>6}  {}", count, key);
    }
}
