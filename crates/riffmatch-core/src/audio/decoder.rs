//! Audio decoding for multiple formats

use super::{decode_container, resample_to_target, AudioFormat};
use crate::error::DecodeError;
use std::path::Path;

/// Decoded audio data (interleaved)
#[derive(Debug, Clone)]
pub struct AudioData {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioData {
    /// Convert to mono by averaging channels
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels <= 1 {
            return self.samples.clone();
        }

        self.samples
            .chunks(self.channels as usize)
            .map(|chunk| chunk.iter().sum::<f32>() / chunk.len() as f32)
            .collect()
    }
}

/// Decode audio file to mono at the target sample rate
pub fn decode_audio(path: &Path, target_sample_rate: u32) -> Result<AudioData, DecodeError> {
    if !path.exists() {
        return Err(DecodeError::NotFound(path.to_path_buf()));
    }

    let format = AudioFormat::from_path(path);

    let mut audio_data = match format {
        AudioFormat::Wav => decode_wav(path)?,
        AudioFormat::Mp3 => decode_mp3(path)?,
        AudioFormat::Flac => decode_flac(path)?,
        AudioFormat::Ogg => decode_ogg(path)?,
        f if f.is_container() => decode_container(path)?,
        _ => return Err(DecodeError::UnsupportedFormat(path.to_path_buf())),
    };

    if audio_data.sample_rate == 0 || audio_data.channels == 0 {
        return Err(DecodeError::corrupt(path, "stream declares no sample rate or channels"));
    }

    let mono = audio_data.to_mono();
    audio_data.samples = resample_to_target(&mono, audio_data.sample_rate, target_sample_rate);
    audio_data.sample_rate = target_sample_rate;
    audio_data.channels = 1;

    Ok(audio_data)
}

/// Decode WAV file
fn decode_wav(path: &Path) -> Result<AudioData, DecodeError> {
    let mut reader = hound::WavReader::open(path).map_err(|e| DecodeError::corrupt(path, e))?;

    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DecodeError::corrupt(path, e))?,
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| DecodeError::corrupt(path, e))?
        }
    };

    Ok(AudioData {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

/// Decode MP3 file
fn decode_mp3(path: &Path) -> Result<AudioData, DecodeError> {
    let data = std::fs::read(path).map_err(|e| DecodeError::corrupt(path, e))?;

    let mut decoder = minimp3::Decoder::new(&data[..]);
    let mut samples = Vec::new();
    let mut sample_rate = 0;
    let mut channels = 0;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if sample_rate == 0 {
                    sample_rate = frame.sample_rate as u32;
                    channels = frame.channels as u16;
                }
                samples.extend(frame.data.iter().map(|&s| s as f32 / 32768.0));
            }
            Err(minimp3::Error::Eof) => break,
            Err(minimp3::Error::SkippedData) => continue,
            Err(e) => return Err(DecodeError::corrupt(path, e)),
        }
    }

    Ok(AudioData {
        samples,
        sample_rate,
        channels,
    })
}

/// Decode FLAC file
fn decode_flac(path: &Path) -> Result<AudioData, DecodeError> {
    let mut reader = claxon::FlacReader::open(path).map_err(|e| DecodeError::corrupt(path, e))?;

    let info = reader.streaminfo();
    let max_val = (1i64 << (info.bits_per_sample.max(1) - 1)) as f32;

    let samples: Vec<f32> = reader
        .samples()
        .map(|s| s.map(|v| v as f32 / max_val))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| DecodeError::corrupt(path, e))?;

    Ok(AudioData {
        samples,
        sample_rate: info.sample_rate,
        channels: info.channels as u16,
    })
}

/// Decode OGG Vorbis file
fn decode_ogg(path: &Path) -> Result<AudioData, DecodeError> {
    let file = std::fs::File::open(path).map_err(|e| DecodeError::corrupt(path, e))?;

    let mut reader = lewton::inside_ogg::OggStreamReader::new(file)
        .map_err(|e| DecodeError::corrupt(path, e))?;

    let sample_rate = reader.ident_hdr.audio_sample_rate;
    let channels = reader.ident_hdr.audio_channels as u16;

    let mut samples = Vec::new();
    while let Some(packet) = reader
        .read_dec_packet_itl()
        .map_err(|e| DecodeError::corrupt(path, e))?
    {
        samples.extend(packet.iter().map(|&s| s as f32 / 32768.0));
    }

    Ok(AudioData {
        samples,
        sample_rate,
        channels,
    })
}
