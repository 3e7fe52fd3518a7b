//! Cross-folder matching and match results
//!
//! Ranks a pool of candidate fingerprints against one target, applies the
//! reference-folder boosts and selects the best candidate above a threshold.
//! Results serialise to JSON for the diagnostics view and the CLI.

use crate::config::MatchingConfig;
use crate::error::IncompatibleFingerprintError;
use crate::fingerprint::Fingerprint;
use crate::library::{normalize_path, ReferenceFolderMark};
use crate::similarity;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

#[cfg(test)]
mod tests;

/// A labelled recording the target may be matched against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub fingerprint: Fingerprint,
    pub provided_name: String,
    pub folder_path: PathBuf,
    /// Recording the fingerprint was taken from. Identical copies share a
    /// file id under content-hash identity, so self-exclusion goes by path.
    #[serde(default)]
    pub source_path: PathBuf,
}

/// Reference boost applied to a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Boost {
    None,
    Local,
    Global,
}

impl fmt::Display for Boost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Boost::None => "none",
            Boost::Local => "local",
            Boost::Global => "global",
        })
    }
}

/// Reference marks indexed by folder
#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    marks: HashMap<PathBuf, (bool, bool)>,
}

impl ReferenceIndex {
    pub fn new(marks: &[ReferenceFolderMark]) -> Self {
        let mut index = HashMap::new();
        for mark in marks {
            let entry = index
                .entry(normalize_path(&mark.folder_path))
                .or_insert((false, false));
            entry.0 |= mark.is_global_reference;
            entry.1 |= mark.is_local_reference;
        }
        Self { marks: index }
    }

    /// Boost for a candidate in `candidate_folder` matched against a target
    /// in `target_folder`. Global marks win over local ones.
    pub fn boost_for(&self, candidate_folder: &Path, target_folder: &Path) -> Boost {
        let Some(&(global, local)) = self.marks.get(candidate_folder) else {
            return Boost::None;
        };
        if global {
            Boost::Global
        } else if local && candidate_folder == target_folder {
            Boost::Local
        } else {
            Boost::None
        }
    }
}

/// One ranked candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub candidate: MatchCandidate,
    /// Similarity before any boost
    pub raw_score: f32,
    /// Raw score plus boost, saturating at 1.0
    pub weighted_score: f32,
    pub boost: Boost,
}

/// Outcome of one matching run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// File id of the target fingerprint
    pub target_file_id: String,
    pub selected: Option<MatchCandidate>,
    /// Scores of the top-ranked candidate, 0 when the pool was empty
    pub raw_score: f32,
    pub weighted_score: f32,
    /// Ranked candidates, best first, capped for diagnostics
    pub all_scored: Vec<ScoredCandidate>,
    pub threshold_used: f32,
    /// Candidates actually scored, before capping
    pub candidates_considered: usize,
}

impl MatchResult {
    /// Top-ranked candidate when nothing cleared the threshold
    pub fn best_near_miss(&self) -> Option<&ScoredCandidate> {
        if self.selected.is_some() {
            return None;
        }
        self.all_scored.first()
    }
}

/// Ranks candidates for a target fingerprint
#[derive(Debug, Clone)]
pub struct CrossFolderMatcher {
    global_boost: f32,
    local_boost: f32,
    max_diagnostics: usize,
}

impl CrossFolderMatcher {
    pub fn new(config: &MatchingConfig) -> Self {
        Self {
            global_boost: config.global_boost,
            local_boost: config.local_boost,
            max_diagnostics: config.max_diagnostics,
        }
    }

    fn boost_amount(&self, boost: Boost) -> f32 {
        match boost {
            Boost::None => 0.0,
            Boost::Local => self.local_boost,
            Boost::Global => self.global_boost,
        }
    }

    /// Find the best candidate for `target`.
    ///
    /// Candidates produced by another algorithm are skipped. A candidate of
    /// the same algorithm with a different vector length is a configuration
    /// error and fails the whole run.
    pub fn find_best_match(
        &self,
        target: &Fingerprint,
        target_folder: &Path,
        candidates: &[MatchCandidate],
        references: &ReferenceIndex,
        threshold: f32,
    ) -> Result<MatchResult, IncompatibleFingerprintError> {
        let mut scored = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            if candidate.fingerprint.algorithm_id() != target.algorithm_id() {
                log::debug!(
                    "Skipping candidate {} ({}): algorithm {} != {}",
                    candidate.fingerprint.source_file_id(),
                    candidate.provided_name,
                    candidate.fingerprint.algorithm_id(),
                    target.algorithm_id()
                );
                continue;
            }

            let raw_score = similarity::score(target, &candidate.fingerprint)?;
            let boost = references.boost_for(&candidate.folder_path, target_folder);
            let weighted_score = (raw_score + self.boost_amount(boost)).min(1.0);

            scored.push(ScoredCandidate {
                candidate: candidate.clone(),
                raw_score,
                weighted_score,
                boost,
            });
        }

        scored.sort_by(rank);
        let candidates_considered = scored.len();

        let (raw_score, weighted_score, selected) = match scored.first() {
            Some(top) => (
                top.raw_score,
                top.weighted_score,
                (top.weighted_score >= threshold).then(|| top.candidate.clone()),
            ),
            None => (0.0, 0.0, None),
        };
        scored.truncate(self.max_diagnostics);

        Ok(MatchResult {
            target_file_id: target.source_file_id().to_string(),
            selected,
            raw_score,
            weighted_score,
            all_scored: scored,
            threshold_used: threshold,
            candidates_considered,
        })
    }
}

/// Ranking order: weighted desc, raw desc, folder path asc, file id asc
fn rank(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.weighted_score
        .total_cmp(&a.weighted_score)
        .then_with(|| b.raw_score.total_cmp(&a.raw_score))
        .then_with(|| a.candidate.folder_path.cmp(&b.candidate.folder_path))
        .then_with(|| {
            a.candidate
                .fingerprint
                .source_file_id()
                .cmp(b.candidate.fingerprint.source_file_id())
        })
        .then_with(|| a.candidate.source_path.cmp(&b.candidate.source_path))
}
