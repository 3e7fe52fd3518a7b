//! Match diagnostics
//!
//! Human-readable account of a matching run for the "why didn't this match"
//! view: target, threshold, how many candidates were scored, the top entries
//! with raw and weighted scores, and the verdict.

use crate::matching::MatchResult;
use std::collections::VecDeque;
use std::fmt::Write;
use std::sync::{Mutex, PoisonError};

/// Log target for diagnostic lines
pub const LOG_TARGET: &str = "riffmatch::diagnostics";

/// Render a match result as log lines
pub fn render(result: &MatchResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "target: {}", result.target_file_id);
    let _ = writeln!(out, "threshold: {:.3}", result.threshold_used);
    let _ = writeln!(out, "candidates considered: {}", result.candidates_considered);

    for (rank, scored) in result.all_scored.iter().enumerate() {
        let _ = writeln!(
            out,
            "  #{:<2} raw={:.3} weighted={:.3} boost={:<6} {} [{}] ({})",
            rank + 1,
            scored.raw_score,
            scored.weighted_score,
            scored.boost,
            scored.candidate.provided_name,
            scored.candidate.folder_path.display(),
            scored.candidate.fingerprint.source_file_id(),
        );
    }

    match (&result.selected, result.best_near_miss()) {
        (Some(selected), _) => {
            let _ = writeln!(
                out,
                "selected: {} (raw={:.3} weighted={:.3})",
                selected.provided_name, result.raw_score, result.weighted_score
            );
        }
        (None, Some(near)) => {
            let _ = writeln!(
                out,
                "no match above threshold; best near miss: {} (raw={:.3} weighted={:.3})",
                near.candidate.provided_name, near.raw_score, near.weighted_score
            );
        }
        (None, None) => {
            let _ = writeln!(out, "no match above threshold; no candidates");
        }
    }
    out
}

/// Emit the diagnostics of one run through the `log` facade
pub fn log_match_run(run_id: u64, result: &MatchResult) {
    for line in render(result).lines() {
        log::info!(target: LOG_TARGET, "[run {}] {}", run_id, line);
    }
}

/// Bounded history of recent match results
pub struct DiagnosticsStore {
    capacity: usize,
    inner: Mutex<StoreInner>,
}

struct StoreInner {
    next_id: u64,
    runs: VecDeque<(u64, MatchResult)>,
}

impl DiagnosticsStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(StoreInner {
                next_id: 1,
                runs: VecDeque::new(),
            }),
        }
    }

    /// Keep a result and return its run id; the oldest run is evicted
    /// when full
    pub fn record(&self, result: MatchResult) -> u64 {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let id = inner.next_id;
        inner.next_id += 1;
        if inner.runs.len() == self.capacity {
            inner.runs.pop_front();
        }
        inner.runs.push_back((id, result));
        id
    }

    pub fn get(&self, run_id: u64) -> Option<MatchResult> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .runs
            .iter()
            .find(|(id, _)| *id == run_id)
            .map(|(_, r)| r.clone())
    }

    /// Id of the most recent run
    pub fn last_run_id(&self) -> Option<u64> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.runs.back().map(|(id, _)| *id)
    }
}

impl Default for DiagnosticsStore {
    fn default() -> Self {
        Self::new(256)
    }
}
