//! Summing, panning and output clipping helpers.

use std::f32::consts::FRAC_PI_4;

/// Add `src * gain` into `dst`.
#[inline]
pub fn mix_into(dst: &mut [f32], src: &[f32], gain: f32) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d += s * gain;
    }
}

/// tanh soft clipper applied at the destination.
#[inline]
pub fn soft_clip(x: f32) -> f32 {
    x.tanh()
}

pub fn soft_clip_block(buf: &mut [f32]) {
    for s in buf.iter_mut() {
        *s = soft_clip(*s);
    }
}

/// Equal-power gains for `pan` in [-1 (left), 1 (right)].
#[inline]
pub fn equal_power_pan(pan: f32) -> (f32, f32) {
    let angle = (pan.clamp(-1.0, 1.0) + 1.0) * FRAC_PI_4;
    (angle.cos(), angle.sin())
}

pub fn peak(buf: &[f32]) -> f32 {
    buf.iter().fold(0.0_f32, |m, s| m.max(s.abs()))
}

pub fn rms(buf: &[f32]) -> f32 {
    if buf.is_empty() {
        return 0.0;
    }
    (buf.iter().map(|s| s * s).sum::<f32>() / buf.len() as f32).sqrt()
}
