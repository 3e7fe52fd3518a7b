//! Audio decoding and resampling
//!
//! Turns a recording on disk into a mono sample buffer at the analysis rate.
//! Supports WAV, MP3, FLAC, OGG and container formats (M4A, MP4, MKV, ...)
//! using pure Rust decoders.

mod container;
mod decoder;
mod resample;

pub use container::decode_container;
pub use decoder::{decode_audio, AudioData};
pub use resample::resample_to_target;

use crate::error::DecodeError;
use std::path::Path;

/// Mono samples at a known rate, ready for fingerprint extraction
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Source of decoded audio.
///
/// Decoding libraries vary by format, so the engine only sees this trait.
/// Implementations must return in bounded time: read the file, never wait.
pub trait SignalLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<SampleBuffer, DecodeError>;
}

/// Loads audio files from disk and resamples them to the analysis rate
#[derive(Debug, Clone)]
pub struct FileSignalLoader {
    target_sample_rate: u32,
}

impl FileSignalLoader {
    pub fn new(target_sample_rate: u32) -> Self {
        Self { target_sample_rate }
    }
}

impl SignalLoader for FileSignalLoader {
    fn load(&self, path: &Path) -> Result<SampleBuffer, DecodeError> {
        let audio = decode_audio(path, self.target_sample_rate)?;
        log::debug!(
            "Decoded {}: {} samples @ {}Hz",
            path.display(),
            audio.samples.len(),
            audio.sample_rate
        );
        Ok(SampleBuffer::new(audio.samples, audio.sample_rate))
    }
}

/// Supported audio formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Mp3,
    Flac,
    Ogg,

    // Container formats, decoded through Symphonia
    Mp4,
    Mkv,
    Webm,

    Unknown,
}

impl AudioFormat {
    /// Detect format from file extension
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("wav") | Some("wave") => AudioFormat::Wav,
            Some("mp3") => AudioFormat::Mp3,
            Some("flac") => AudioFormat::Flac,
            Some("ogg") | Some("oga") => AudioFormat::Ogg,

            Some("m4a") | Some("mp4") | Some("aac") | Some("mov") => AudioFormat::Mp4,
            Some("mkv") | Some("mka") => AudioFormat::Mkv,
            Some("webm") => AudioFormat::Webm,

            _ => AudioFormat::Unknown,
        }
    }

    /// Check if format is decoded via the container demuxer
    pub fn is_container(&self) -> bool {
        matches!(self, AudioFormat::Mp4 | AudioFormat::Mkv | AudioFormat::Webm)
    }

    /// True for anything the loader can attempt
    pub fn is_supported(&self) -> bool {
        *self != AudioFormat::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_detection_is_case_insensitive() {
        assert_eq!(AudioFormat::from_path(Path::new("Take 1.WAV")), AudioFormat::Wav);
        assert_eq!(AudioFormat::from_path(Path::new("voice memo.m4a")), AudioFormat::Mp4);
        assert!(AudioFormat::from_path(Path::new("x.m4a")).is_container());
        assert!(!AudioFormat::from_path(Path::new("notes.txt")).is_supported());
    }

    #[test]
    fn test_loader_reads_wav_and_resamples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..22050 {
            let v = ((i as f32 * 0.05).sin() * 10000.0) as i16;
            writer.write_sample(v).unwrap();
            writer.write_sample(v).unwrap();
        }
        writer.finalize().unwrap();

        let buffer = FileSignalLoader::new(11025).load(&path).unwrap();
        assert_eq!(buffer.sample_rate, 11025);
        assert!((buffer.duration_secs() - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_loader_reports_missing_and_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let loader = FileSignalLoader::new(11025);

        let missing = dir.path().join("gone.wav");
        assert!(matches!(loader.load(&missing), Err(DecodeError::NotFound(_))));

        let corrupt = dir.path().join("broken.wav");
        std::fs::write(&corrupt, b"RIFF....not really").unwrap();
        assert!(matches!(loader.load(&corrupt), Err(DecodeError::Corrupt { .. })));

        let unknown = dir.path().join("lyrics.txt");
        std::fs::write(&unknown, b"la la la").unwrap();
        assert!(matches!(
            loader.load(&unknown),
            Err(DecodeError::UnsupportedFormat(_))
        ));
    }
}
