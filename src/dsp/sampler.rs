//! Buffer playback with resampling, looping and seeking.

use std::sync::Arc;

use crate::buffers::AudioBuffer;

/// Plays one decoded buffer at the output rate via linear interpolation.
#[derive(Debug, Clone)]
pub struct BufferPlayer {
    buffer: Arc<AudioBuffer>,
    /// Read position in buffer frames.
    position: f64,
    /// Buffer frames consumed per output frame at playback rate 1.
    rate_ratio: f64,
    playback_rate: f64,
    looping: bool,
    /// Loop points in buffer frames; `loop_end == 0` means the buffer end.
    loop_start: f64,
    loop_end: f64,
    finished: bool,
}

impl BufferPlayer {
    pub fn new(buffer: Arc<AudioBuffer>, output_rate: f64) -> Self {
        let rate_ratio = buffer.sample_rate() as f64 / output_rate;
        BufferPlayer {
            buffer,
            position: 0.0,
            rate_ratio,
            playback_rate: 1.0,
            looping: false,
            loop_start: 0.0,
            loop_end: 0.0,
            finished: false,
        }
    }

    pub fn buffer(&self) -> &Arc<AudioBuffer> {
        &self.buffer
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Loop region in seconds. An empty or inverted region loops the whole buffer.
    pub fn set_loop_points(&mut self, start: f64, end: f64) {
        let sr = self.buffer.sample_rate() as f64;
        let frames = self.buffer.frames() as f64;
        let (start, end) = ((start * sr).clamp(0.0, frames), (end * sr).clamp(0.0, frames));
        if end > start {
            self.loop_start = start;
            self.loop_end = end;
        } else {
            self.loop_start = 0.0;
            self.loop_end = 0.0;
        }
    }

    pub fn set_playback_rate(&mut self, rate: f64) {
        self.playback_rate = rate.clamp(0.0625, 16.0);
    }

    /// Jump to `seconds` into the buffer (wrapped when looping).
    pub fn seek(&mut self, seconds: f64) {
        let frames = self.buffer.frames() as f64;
        let mut pos = (seconds * self.buffer.sample_rate() as f64).max(0.0);
        if self.looping && frames > 0.0 {
            pos %= self.loop_bounds().1.max(1.0);
        }
        self.position = pos;
        self.finished = pos >= frames;
    }

    pub fn position_secs(&self) -> f64 {
        self.position / self.buffer.sample_rate() as f64
    }

    fn loop_bounds(&self) -> (f64, f64) {
        if self.loop_end > self.loop_start {
            (self.loop_start, self.loop_end)
        } else {
            (0.0, self.buffer.frames() as f64)
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    #[inline]
    pub fn next_frame(&mut self) -> (f32, f32) {
        if self.finished {
            return (0.0, 0.0);
        }
        let left = self.buffer.read_interpolated(0, self.position);
        let right = if self.buffer.channel_count() > 1 {
            self.buffer.read_interpolated(1, self.position)
        } else {
            left
        };

        self.position += self.rate_ratio * self.playback_rate;
        if self.looping {
            let (start, end) = self.loop_bounds();
            if end > start && self.position >= end {
                self.position = start + (self.position - end) % (end - start);
            }
        } else if self.position >= self.buffer.frames() as f64 {
            self.finished = true;
        }
        (left, right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize, sample_rate: u32) -> Arc<AudioBuffer> {
        Arc::new(AudioBuffer::mono((0..frames).map(|i| i as f32).collect(), sample_rate))
    }

    #[test]
    fn one_shot_finishes_at_end() {
        let mut p = BufferPlayer::new(ramp(4, 100), 100.0);
        let out: Vec<f32> = (0..6).map(|_| p.next_frame().0).collect();
        assert_eq!(out, vec![0.0, 1.0, 2.0, 3.0, 0.0, 0.0]);
        assert!(p.is_finished());
    }

    #[test]
    fn resamples_to_output_rate() {
        let mut p = BufferPlayer::new(ramp(8, 100), 200.0);
        let out: Vec<f32> = (0..4).map(|_| p.next_frame().0).collect();
        assert_eq!(out, vec![0.0, 0.5, 1.0, 1.5]);
    }

    #[test]
    fn looping_wraps_and_never_finishes() {
        let mut p = BufferPlayer::new(ramp(4, 100), 100.0);
        p.set_looping(true);
        let out: Vec<f32> = (0..6).map(|_| p.next_frame().0).collect();
        assert_eq!(out, vec![0.0, 1.0, 2.0, 3.0, 0.0, 1.0]);
        assert!(!p.is_finished());
    }

    #[test]
    fn loop_points_restrict_region() {
        let mut p = BufferPlayer::new(ramp(10, 10), 10.0);
        p.set_looping(true);
        p.set_loop_points(0.2, 0.5);
        p.seek(0.2);
        let out: Vec<f32> = (0..5).map(|_| p.next_frame().0).collect();
        assert_eq!(out, vec![2.0, 3.0, 4.0, 2.0, 3.0]);
    }

    #[test]
    fn seek_wraps_when_looping() {
        let mut p = BufferPlayer::new(ramp(10, 10), 10.0);
        p.set_looping(true);
        p.seek(2.3);
        assert!((p.position_secs() - 0.3).abs() < 1e-9);
        p.set_looping(false);
        p.seek(5.0);
        assert!(p.is_finished());
    }
}
