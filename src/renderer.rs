//! Offline bounce of the engine output to WAV.

use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::engine::GameAudio;
use crate::error::{EngineError, Result};

/// Render `seconds` of engine output, firing scheduled actions as it goes.
pub fn render_stereo(engine: &mut GameAudio, seconds: f64) -> (Vec<f32>, Vec<f32>) {
    let frames = (seconds.max(0.0) * engine.sample_rate() as f64).round() as usize;
    let mut left = vec![0.0; frames];
    let mut right = vec![0.0; frames];
    engine.render(&mut left, &mut right);
    (left, right)
}

/// Render `seconds` of engine output as a 16-bit stereo WAV file.
pub fn bounce_wav(engine: &mut GameAudio, seconds: f64) -> Result<Vec<u8>> {
    let (left, right) = render_stereo(engine, seconds);
    encode_wav(&left, &right, engine.sample_rate())
}

/// Interleave two channels into 16-bit PCM WAV bytes.
pub fn encode_wav(left: &[f32], right: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    let mut writer = WavWriter::new(&mut cursor, spec).map_err(encode_error)?;
    for (l, r) in left.iter().zip(right) {
        writer.write_sample(to_i16(*l)).map_err(encode_error)?;
        writer.write_sample(to_i16(*r)).map_err(encode_error)?;
    }
    writer.finalize().map_err(encode_error)?;
    Ok(cursor.into_inner())
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

fn encode_error(e: hound::Error) -> EngineError {
    EngineError::Encode(e.to_string())
}
