//! Fingerprint value type
//!
//! A fingerprint is a fixed-length summary of one recording produced by one
//! algorithm. The algorithm id is part of its identity: the vector length is
//! checked on construction so two fingerprints of the same algorithm are
//! always comparable.

use crate::error::IncompatibleFingerprintError;
use riffmatch_fp::{AlgorithmId, CacheRecord};
use serde::{Deserialize, Serialize};

/// Immutable fingerprint of one recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    algorithm_id: AlgorithmId,
    vector: Vec<f32>,
    source_file_id: String,
    source_mtime: i64,
    frame_count: u32,
}

impl Fingerprint {
    /// Build a fingerprint from a raw vector.
    ///
    /// Fails when the vector length does not match the algorithm. Non-finite
    /// values are replaced by zero.
    pub fn from_vector(
        algorithm_id: AlgorithmId,
        vector: Vec<f32>,
    ) -> Result<Self, IncompatibleFingerprintError> {
        let expected = algorithm_id.vector_len();
        if vector.len() != expected {
            return Err(IncompatibleFingerprintError::LengthMismatch {
                left: vector.len(),
                right: expected,
            });
        }
        let vector = vector
            .into_iter()
            .map(|v| if v.is_finite() { v } else { 0.0 })
            .collect();
        Ok(Self {
            algorithm_id,
            vector,
            source_file_id: String::new(),
            source_mtime: 0,
            frame_count: 0,
        })
    }

    /// Fresh output of the extractor, already of the algorithm's length
    pub(crate) fn extracted(algorithm_id: AlgorithmId, vector: Vec<f32>, frame_count: u32) -> Self {
        debug_assert_eq!(vector.len(), algorithm_id.vector_len());
        Self {
            algorithm_id,
            vector,
            source_file_id: String::new(),
            source_mtime: 0,
            frame_count,
        }
    }

    /// Attach the identity of the recording this fingerprint describes
    pub fn with_source(mut self, file_id: impl Into<String>, mtime: i64) -> Self {
        self.source_file_id = file_id.into();
        self.source_mtime = mtime;
        self
    }

    pub(crate) fn with_frame_count(mut self, frame_count: u32) -> Self {
        self.frame_count = frame_count;
        self
    }

    /// Rebuild from a validated cache record
    pub(crate) fn from_record(
        record: &CacheRecord,
        file_id: String,
    ) -> Result<Self, IncompatibleFingerprintError> {
        Ok(Self::from_vector(record.algorithm_id, record.vector.clone())?
            .with_source(file_id, record.mtime)
            .with_frame_count(record.frame_count))
    }

    pub(crate) fn to_record(&self) -> CacheRecord {
        CacheRecord {
            algorithm_id: self.algorithm_id,
            vector: self.vector.clone(),
            mtime: self.source_mtime,
            frame_count: self.frame_count,
            file_id: Some(self.source_file_id.clone()),
        }
    }

    pub fn algorithm_id(&self) -> AlgorithmId {
        self.algorithm_id
    }

    pub fn vector(&self) -> &[f32] {
        &self.vector
    }

    pub fn source_file_id(&self) -> &str {
        &self.source_file_id
    }

    pub fn source_mtime(&self) -> i64 {
        self.source_mtime
    }

    /// Analysis frames summarised by the vector (0 for sub-frame input)
    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// True when the vector carries no signal (silence or too-short input)
    pub fn is_empty_signal(&self) -> bool {
        self.vector.iter().all(|&v| v == 0.0)
    }
}
