//! Configuration parameters for analysis and matching

use serde::{Deserialize, Serialize};

/// Signal analysis parameters.
///
/// Changing any of these changes fingerprint values, so caches built with one
/// configuration should not be mixed with another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    // Audio processing
    pub sample_rate: u32,
    pub frame_size: usize,
    pub hop_size: usize,

    // Chroma (pitch-class) mapping range
    pub chroma_min_freq: f32,
    pub chroma_max_freq: f32,

    // Band-energy range
    pub band_min_freq: f32,
    pub band_max_freq: f32,

    /// Frames with RMS below this are treated as silence
    pub silence_rms: f32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_rate: 11025,
            frame_size: 4096,
            hop_size: 2048,

            // C2 .. C7
            chroma_min_freq: 65.4,
            chroma_max_freq: 2093.0,

            band_min_freq: 60.0,
            band_max_freq: 5000.0,

            silence_rms: 1e-4,
        }
    }
}

impl AnalysisConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sample_rate == 0 {
            anyhow::bail!("sample_rate must be > 0");
        }
        if self.frame_size < 64 || !self.frame_size.is_power_of_two() {
            anyhow::bail!("frame_size must be a power of two >= 64");
        }
        if self.hop_size == 0 || self.hop_size > self.frame_size {
            anyhow::bail!("hop_size must be in 1..=frame_size");
        }
        let nyquist = self.sample_rate as f32 / 2.0;
        if self.chroma_min_freq <= 0.0 || self.chroma_min_freq >= self.chroma_max_freq {
            anyhow::bail!("chroma_min_freq must be > 0 and < chroma_max_freq");
        }
        if self.chroma_max_freq > nyquist {
            anyhow::bail!("chroma_max_freq must not exceed Nyquist ({} Hz)", nyquist);
        }
        if self.band_min_freq <= 0.0 || self.band_min_freq >= self.band_max_freq {
            anyhow::bail!("band_min_freq must be > 0 and < band_max_freq");
        }
        if self.band_max_freq > nyquist {
            anyhow::bail!("band_max_freq must not exceed Nyquist ({} Hz)", nyquist);
        }
        if self.silence_rms.is_nan() || self.silence_rms < 0.0 {
            anyhow::bail!("silence_rms must be >= 0");
        }
        Ok(())
    }
}

/// Cross-folder matching parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Minimum weighted score for a candidate to be selected
    pub threshold: f32,
    /// Added to candidates from globally referenced folders
    pub global_boost: f32,
    /// Added to candidates from the target's own folder when it is marked
    /// as a local reference
    pub local_boost: f32,
    /// Scored candidates kept in a result for diagnostics
    pub max_diagnostics: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            threshold: 0.75,
            global_boost: 0.15,
            local_boost: 0.10,
            max_diagnostics: 10,
        }
    }
}

impl MatchingConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            anyhow::bail!("threshold must be within [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.global_boost) || !(0.0..=1.0).contains(&self.local_boost) {
            anyhow::bail!("boosts must be within [0, 1]");
        }
        if self.max_diagnostics == 0 {
            anyhow::bail!("max_diagnostics must be > 0");
        }
        Ok(())
    }
}
