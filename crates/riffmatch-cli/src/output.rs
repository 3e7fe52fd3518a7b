//! JSON output formatting

use riffmatch_core::{BatchReport, LabelOutcome, MatchResult};
use serde::Serialize;

/// Print any value as pretty JSON on stdout
pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing result: {}", e),
    }
}

#[derive(Serialize)]
struct MatchOutput<'a> {
    query_path: String,
    run_id: u64,
    matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    label: Option<&'a str>,
    result: &'a MatchResult,
}

/// Print a single match result
pub fn print_match_result(query_path: &str, run_id: u64, result: &MatchResult) {
    print_json(&MatchOutput {
        query_path: query_path.to_string(),
        run_id,
        matched: result.selected.is_some(),
        label: result.selected.as_ref().map(|c| c.provided_name.as_str()),
        result,
    });
}

#[derive(Serialize)]
struct OutcomeLine<'a> {
    file: String,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    label: Option<&'a str>,
    raw_score: Option<f32>,
    weighted_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    run_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

impl<'a> From<&'a LabelOutcome> for OutcomeLine<'a> {
    fn from(outcome: &'a LabelOutcome) -> Self {
        let status = match (&outcome.match_result, outcome.applied, &outcome.label) {
            (None, _, _) => "could_not_analyze",
            (Some(_), true, _) => "labelled",
            (Some(_), false, Some(_)) => "matched",
            (Some(_), false, None) => "no_match",
        };
        Self {
            file: outcome.file.path.display().to_string(),
            status,
            label: outcome.label.as_deref(),
            raw_score: outcome.match_result.as_ref().map(|r| r.raw_score),
            weighted_score: outcome.match_result.as_ref().map(|r| r.weighted_score),
            run_id: outcome.run_id,
            error: outcome.error.as_deref(),
        }
    }
}

#[derive(Serialize)]
struct BatchOutput<'a> {
    status: &'static str,
    processed: usize,
    skipped: usize,
    labelled: usize,
    failed: usize,
    dry_run: bool,
    processing_time_seconds: f64,
    outcomes: Vec<OutcomeLine<'a>>,
}

/// Print an auto-label batch report
pub fn print_batch_report(report: &BatchReport, dry_run: bool, elapsed_secs: f64) {
    print_json(&BatchOutput {
        status: if report.cancelled { "cancelled" } else { "success" },
        processed: report.processed,
        skipped: report.skipped.len(),
        labelled: report.applied_count(),
        failed: report.failed_count(),
        dry_run,
        processing_time_seconds: elapsed_secs,
        outcomes: report.outcomes.iter().map(OutcomeLine::from).collect(),
    });
}
