//! Encoded bytes to planar `f32` audio. WAV via `hound`, MP3 via `minimp3`.

use std::io::Cursor;

use super::AudioBuffer;
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Mp3,
}

/// Guess the container from magic bytes.
pub fn sniff(bytes: &[u8]) -> Option<AudioFormat> {
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
        return Some(AudioFormat::Wav);
    }
    if bytes.starts_with(b"ID3") || (bytes.len() >= 2 && bytes[0] == 0xFF && bytes[1] & 0xE0 == 0xE0) {
        return Some(AudioFormat::Mp3);
    }
    None
}

pub fn decode_audio(bytes: &[u8]) -> Result<AudioBuffer> {
    match sniff(bytes) {
        Some(AudioFormat::Wav) => decode_wav(bytes),
        Some(AudioFormat::Mp3) => decode_mp3(bytes),
        None => Err(EngineError::Decode {
            reason: format!("unrecognized audio format ({} bytes)", bytes.len()),
        }),
    }
}

fn decode_err(e: impl std::fmt::Display) -> EngineError {
    EngineError::Decode { reason: e.to_string() }
}

fn deinterleave(interleaved: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let channels = channels.max(1);
    let frames = interleaved.len() / channels;
    let mut planar = vec![Vec::with_capacity(frames); channels];
    for frame in interleaved.chunks_exact(channels) {
        for (ch, s) in frame.iter().enumerate() {
            planar[ch].push(*s);
        }
    }
    planar
}

fn decode_wav(bytes: &[u8]) -> Result<AudioBuffer> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes)).map_err(decode_err)?;
    let spec = reader.spec();
    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(decode_err)?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1_i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(decode_err)?
        }
    };
    if interleaved.is_empty() {
        return Err(decode_err("wav has no samples"));
    }
    Ok(AudioBuffer::new(
        deinterleave(&interleaved, spec.channels as usize),
        spec.sample_rate,
    ))
}

/// Every MP3 frame must share the first frame's channel count and rate.
fn check_frame_format(format: &mut Option<(usize, u32)>, channels: usize, rate: u32) -> Result<()> {
    let (expected_channels, expected_rate) = *format.get_or_insert((channels, rate));
    if channels != expected_channels {
        return Err(decode_err("mp3 channel count changes mid-stream"));
    }
    if rate != expected_rate {
        return Err(decode_err(format!("mp3 sample rate changes mid-stream ({expected_rate} -> {rate})")));
    }
    Ok(())
}

fn decode_mp3(bytes: &[u8]) -> Result<AudioBuffer> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(bytes));
    let mut interleaved = Vec::new();
    let mut format: Option<(usize, u32)> = None;
    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                check_frame_format(&mut format, frame.channels, frame.sample_rate as u32)?;
                interleaved.extend(frame.data.iter().map(|s| *s as f32 / 32768.0));
            }
            Err(minimp3::Error::Eof) => break,
            Err(minimp3::Error::SkippedData) => continue,
            Err(e) => return Err(decode_err(e)),
        }
    }
    let Some((channels, rate)) = format else {
        return Err(decode_err("mp3 has no audio frames"));
    };
    Ok(AudioBuffer::new(deinterleave(&interleaved, channels), rate))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 16-bit PCM WAV bytes for tests.
    pub(crate) fn wav_bytes(channels: u16, sample_rate: u32, frames: usize, value: f32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for _ in 0..frames * channels as usize {
                writer.write_sample((value * 32767.0) as i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn mp3_frames_must_keep_the_first_format() {
        let mut format = None;
        check_frame_format(&mut format, 2, 44100).unwrap();
        check_frame_format(&mut format, 2, 44100).unwrap();
        let err = check_frame_format(&mut format, 2, 48000).unwrap_err();
        assert!(err.to_string().contains("sample rate"));
        assert!(check_frame_format(&mut format, 1, 44100).is_err());
        assert_eq!(format, Some((2, 44100)));
    }

    #[test]
    fn decodes_stereo_pcm16() {
        let bytes = wav_bytes(2, 22050, 100, 0.5);
        assert_eq!(sniff(&bytes), Some(AudioFormat::Wav));
        let buf = decode_audio(&bytes).unwrap();
        assert_eq!(buf.channel_count(), 2);
        assert_eq!(buf.frames(), 100);
        assert_eq!(buf.sample_rate(), 22050);
        assert!((buf.channel(1)[10] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn decodes_float_wav() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for s in [0.25_f32, -0.75] {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        let buf = decode_audio(cursor.get_ref()).unwrap();
        assert_eq!(buf.channel(0), &[0.25, -0.75]);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = decode_audio(b"definitely not audio").unwrap_err();
        assert!(matches!(err, EngineError::Decode { .. }));
    }

    #[test]
    fn truncated_wav_is_a_decode_error() {
        let bytes = wav_bytes(1, 8000, 10, 0.1);
        assert!(decode_audio(&bytes[..20]).is_err());
    }
}
