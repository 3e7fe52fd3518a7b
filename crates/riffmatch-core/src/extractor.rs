//! Fingerprint extraction
//!
//! Every algorithm follows the same pipeline: frame the buffer, compute a
//! per-frame descriptor from the power spectrum, then aggregate descriptors
//! into one fixed-length vector.
//!
//! * `chroma`: energy folded into 12 pitch classes, each frame normalised
//!   to unit sum, averaged over voiced frames. Robust to gain, mic placement
//!   and room tone; blind to note order.
//! * `chroma_timeline`: the same frame chroma averaged over 12 equal time
//!   segments. Captures the progression of a riff, so two takes of the same
//!   part correlate while different songs in the same key do not.
//! * `band_energy`: fraction of frame energy in 16 log-spaced bands,
//!   averaged. A coarse timbre descriptor.
//!
//! Silent frames (RMS below the configured floor) are skipped. A buffer that
//! is silent or shorter than one frame yields an all-zero vector.

use crate::audio::SampleBuffer;
use crate::config::AnalysisConfig;
use crate::error::DecodeError;
use crate::fingerprint::Fingerprint;
use crate::transform::{Frame, SpectralFrames};
use riffmatch_fp::{AlgorithmId, CHROMA_BINS, ENERGY_BANDS, TIMELINE_SEGMENTS};

/// FFT bin to descriptor slot mapping, precomputed per configuration
#[derive(Debug, Clone)]
struct BinMap {
    /// (fft bin, pitch class)
    chroma: Vec<(usize, usize)>,
    /// (fft bin, band index)
    bands: Vec<(usize, usize)>,
}

impl BinMap {
    fn new(frames: &SpectralFrames, config: &AnalysisConfig) -> Self {
        let mut chroma = Vec::new();
        let mut bands = Vec::new();

        let band_span = (config.band_max_freq / config.band_min_freq).ln();

        // Skip DC
        for bin in 1..frames.num_bins() {
            let freq = frames.bin_frequency(bin);

            if freq >= config.chroma_min_freq && freq <= config.chroma_max_freq {
                chroma.push((bin, pitch_class(freq)));
            }

            if freq >= config.band_min_freq && freq < config.band_max_freq {
                let pos = (freq / config.band_min_freq).ln() / band_span;
                let band = ((pos * ENERGY_BANDS as f32) as usize).min(ENERGY_BANDS - 1);
                bands.push((bin, band));
            }
        }

        Self { chroma, bands }
    }
}

/// Pitch class of a frequency, C = 0 .. B = 11
fn pitch_class(freq: f32) -> usize {
    let midi = 69.0 + 12.0 * (freq / 440.0).log2();
    (midi.round() as i64).rem_euclid(12) as usize
}

/// Converts sample buffers into fingerprints
pub struct FingerprintExtractor {
    config: AnalysisConfig,
    frames: SpectralFrames,
    bin_map: BinMap,
}

impl FingerprintExtractor {
    pub fn new(config: &AnalysisConfig) -> Self {
        let frames = SpectralFrames::new(config);
        let bin_map = BinMap::new(&frames, config);
        Self {
            config: config.clone(),
            frames,
            bin_map,
        }
    }

    /// Analysis sample rate this extractor expects
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// Extract a fingerprint from a mono buffer at the analysis rate.
    ///
    /// The returned fingerprint carries no source identity; callers attach
    /// one with [`Fingerprint::with_source`].
    pub fn extract(
        &self,
        buffer: &SampleBuffer,
        algorithm: AlgorithmId,
    ) -> Result<Fingerprint, DecodeError> {
        if buffer.samples.is_empty() {
            return Err(DecodeError::EmptyBuffer);
        }
        if buffer.sample_rate != self.config.sample_rate {
            return Err(DecodeError::InvalidSampleRate {
                found: buffer.sample_rate,
                expected: self.config.sample_rate,
            });
        }

        let sanitized;
        let samples: &[f32] = if buffer.samples.iter().all(|s| s.is_finite()) {
            &buffer.samples
        } else {
            sanitized = buffer
                .samples
                .iter()
                .map(|&s| if s.is_finite() { s } else { 0.0 })
                .collect::<Vec<_>>();
            &sanitized
        };

        let num_frames = self.frames.frame_count(samples.len());
        let vector = match algorithm {
            AlgorithmId::Chroma => self.chroma_profile(samples),
            AlgorithmId::ChromaTimeline => self.chroma_timeline(samples, num_frames),
            AlgorithmId::BandEnergy => self.band_energy(samples),
        };

        log::trace!(
            "Extracted {} over {} frames ({:.1}s)",
            algorithm,
            num_frames,
            buffer.duration_secs()
        );

        Ok(Fingerprint::extracted(algorithm, vector, num_frames as u32))
    }

    fn is_voiced(&self, frame: &Frame<'_>) -> bool {
        frame.rms > self.config.silence_rms
    }

    /// Unit-sum chroma of one frame, or `None` if it carries no pitched energy
    fn frame_chroma(&self, frame: &Frame<'_>) -> Option<[f64; CHROMA_BINS]> {
        let mut chroma = [0.0f64; CHROMA_BINS];
        for &(bin, class) in &self.bin_map.chroma {
            chroma[class] += (frame.power[bin] as f64).sqrt();
        }
        normalize_unit_sum(&mut chroma).then_some(chroma)
    }

    fn chroma_profile(&self, samples: &[f32]) -> Vec<f32> {
        let mut sum = [0.0f64; CHROMA_BINS];
        let mut voiced = 0usize;

        self.frames.for_each_frame(samples, |frame| {
            if !self.is_voiced(frame) {
                return;
            }
            if let Some(chroma) = self.frame_chroma(frame) {
                for (acc, c) in sum.iter_mut().zip(chroma) {
                    *acc += c;
                }
                voiced += 1;
            }
        });

        average(&sum, voiced)
    }

    fn chroma_timeline(&self, samples: &[f32], num_frames: usize) -> Vec<f32> {
        let mut sums = vec![[0.0f64; CHROMA_BINS]; TIMELINE_SEGMENTS];
        let mut counts = [0usize; TIMELINE_SEGMENTS];

        self.frames.for_each_frame(samples, |frame| {
            if !self.is_voiced(frame) {
                return;
            }
            if let Some(chroma) = self.frame_chroma(frame) {
                let segment = frame.index * TIMELINE_SEGMENTS / num_frames.max(1);
                for (acc, c) in sums[segment].iter_mut().zip(chroma) {
                    *acc += c;
                }
                counts[segment] += 1;
            }
        });

        sums.iter()
            .zip(counts)
            .flat_map(|(sum, count)| average(sum, count))
            .collect()
    }

    fn band_energy(&self, samples: &[f32]) -> Vec<f32> {
        let mut sum = [0.0f64; ENERGY_BANDS];
        let mut voiced = 0usize;

        self.frames.for_each_frame(samples, |frame| {
            if !self.is_voiced(frame) {
                return;
            }
            let mut bands = [0.0f64; ENERGY_BANDS];
            for &(bin, band) in &self.bin_map.bands {
                bands[band] += frame.power[bin] as f64;
            }
            if normalize_unit_sum(&mut bands) {
                for (acc, b) in sum.iter_mut().zip(bands) {
                    *acc += b;
                }
                voiced += 1;
            }
        });

        average(&sum, voiced)
    }
}

/// Scale to unit sum in place; false if the input has no energy
fn normalize_unit_sum(values: &mut [f64]) -> bool {
    let total: f64 = values.iter().sum();
    if !total.is_finite() || total <= f64::MIN_POSITIVE {
        return false;
    }
    for v in values.iter_mut() {
        *v /= total;
    }
    true
}

fn average(sum: &[f64], count: usize) -> Vec<f32> {
    if count == 0 {
        return vec![0.0; sum.len()];
    }
    sum.iter().map(|&s| (s / count as f64) as f32).collect()
}
