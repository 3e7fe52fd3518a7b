//! Short-time spectral analysis
//!
//! Splits a mono buffer into overlapping Hann-windowed frames and hands the
//! power spectrum of each frame to a visitor. Frames are processed in order
//! on the calling thread, so results are reproducible bit for bit.

use crate::config::AnalysisConfig;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// One analysed frame
#[derive(Debug)]
pub struct Frame<'a> {
    /// Frame number, counted from the start of the buffer
    pub index: usize,
    /// RMS of the unwindowed samples
    pub rms: f32,
    /// Power per FFT bin, `frame_size / 2 + 1` values
    pub power: &'a [f32],
}

/// Reusable frame analyser for one configuration
pub struct SpectralFrames {
    frame_size: usize,
    hop_size: usize,
    sample_rate: u32,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
}

impl SpectralFrames {
    pub fn new(config: &AnalysisConfig) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(config.frame_size);
        Self {
            frame_size: config.frame_size,
            hop_size: config.hop_size,
            sample_rate: config.sample_rate,
            window: create_hann_window(config.frame_size),
            fft,
        }
    }

    /// Number of full frames that fit in `num_samples`
    pub fn frame_count(&self, num_samples: usize) -> usize {
        if num_samples < self.frame_size {
            return 0;
        }
        (num_samples - self.frame_size) / self.hop_size + 1
    }

    /// Number of power bins per frame
    pub fn num_bins(&self) -> usize {
        self.frame_size / 2 + 1
    }

    /// Centre frequency of an FFT bin in Hz
    pub fn bin_frequency(&self, bin: usize) -> f32 {
        bin as f32 * self.sample_rate as f32 / self.frame_size as f32
    }

    /// Visit every full frame of `samples` in order
    pub fn for_each_frame<F>(&self, samples: &[f32], mut visit: F)
    where
        F: FnMut(&Frame<'_>),
    {
        let num_frames = self.frame_count(samples.len());
        let num_bins = self.num_bins();

        let mut buffer = vec![Complex::new(0.0f32, 0.0); self.frame_size];
        let mut scratch = vec![Complex::new(0.0f32, 0.0); self.fft.get_inplace_scratch_len()];
        let mut power = vec![0.0f32; num_bins];

        for frame_idx in 0..num_frames {
            let start = frame_idx * self.hop_size;
            let frame = &samples[start..start + self.frame_size];

            let energy: f64 = frame.iter().map(|&s| (s as f64) * (s as f64)).sum();
            let rms = (energy / self.frame_size as f64).sqrt() as f32;

            for (slot, (&s, &w)) in buffer.iter_mut().zip(frame.iter().zip(&self.window)) {
                *slot = Complex::new(s * w, 0.0);
            }

            self.fft.process_with_scratch(&mut buffer, &mut scratch);

            for (p, c) in power.iter_mut().zip(&buffer[..num_bins]) {
                *p = c.norm_sqr();
            }

            visit(&Frame {
                index: frame_idx,
                rms,
                power: &power,
            });
        }
    }
}

/// Create Hann window
fn create_hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let x = i as f32 / (size - 1) as f32;
            0.5 * (1.0 - (2.0 * PI * x).cos())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hann_window() {
        let window = create_hann_window(512);
        assert_eq!(window.len(), 512);
        assert!((window[0] - 0.0).abs() < 0.001);
        assert!((window[256] - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_frame_count() {
        let frames = SpectralFrames::new(&AnalysisConfig::default());
        assert_eq!(frames.frame_count(4095), 0);
        assert_eq!(frames.frame_count(4096), 1);
        assert_eq!(frames.frame_count(4096 + 2047), 1);
        assert_eq!(frames.frame_count(4096 + 2048), 2);
    }

    #[test]
    fn test_sine_peaks_at_its_bin() {
        let config = AnalysisConfig::default();
        let frames = SpectralFrames::new(&config);
        let freq = 440.0;
        let samples: Vec<f32> = (0..config.frame_size * 2)
            .map(|i| (2.0 * PI * freq * i as f32 / config.sample_rate as f32).sin())
            .collect();

        let mut peaks = Vec::new();
        frames.for_each_frame(&samples, |frame| {
            let (peak, _) = frame
                .power
                .iter()
                .enumerate()
                .fold((0, 0.0f32), |best, (i, &p)| if p > best.1 { (i, p) } else { best });
            peaks.push(frames.bin_frequency(peak));
            assert!(frame.rms > 0.6 && frame.rms < 0.8);
        });

        assert_eq!(peaks.len(), 3);
        for peak in peaks {
            assert!((peak - freq).abs() < 3.0, "peak at {}", peak);
        }
    }
}
