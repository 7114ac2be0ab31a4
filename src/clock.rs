//! Audio clock and musical transport.
//!
//! The clock counts rendered frames; it is the only time base in the engine.
//! Nothing reads wall-clock time. The transport rides on top of it and turns
//! rendered seconds into beats while it runs.

use std::fmt;

/// Seconds on the context timeline (frames rendered / sample rate).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct ClockTime(pub f64);

impl ClockTime {
    pub fn secs(self) -> f64 {
        self.0
    }

    pub fn after(self, seconds: f64) -> ClockTime {
        ClockTime(self.0 + seconds.max(0.0))
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.0)
    }
}

/// Position on the transport timeline, in beats.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct BeatTime(pub f64);

impl BeatTime {
    pub fn beats(self) -> f64 {
        self.0
    }

    pub fn after(self, beats: f64) -> BeatTime {
        BeatTime(self.0 + beats.max(0.0))
    }
}

impl fmt::Display for BeatTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "beat {:.3}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    Uninitialized,
    Suspended,
    Running,
}

#[derive(Debug, Clone, Copy)]
struct BpmRamp {
    from: f64,
    to: f64,
    start: f64,
    duration: f64,
}

/// Tempo-aware position shared by every phase-locked sequence and layer.
#[derive(Debug, Clone)]
pub struct Transport {
    bpm: f64,
    ramp: Option<BpmRamp>,
    position: f64,
    elapsed: f64,
    running: bool,
    beats_per_bar: u32,
}

impl Transport {
    pub fn new(bpm: f64, beats_per_bar: u32) -> Self {
        Transport {
            bpm: bpm.max(1.0),
            ramp: None,
            position: 0.0,
            elapsed: 0.0,
            running: false,
            beats_per_bar: beats_per_bar.max(1),
        }
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Back to position 0. Does not change the running flag.
    pub fn reset(&mut self) {
        self.position = 0.0;
        self.elapsed = 0.0;
        self.ramp = None;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn set_bpm(&mut self, bpm: f64) {
        self.ramp = None;
        self.bpm = bpm.max(1.0);
    }

    /// Glide to `bpm` over `seconds` of transport time.
    pub fn ramp_bpm(&mut self, bpm: f64, seconds: f64) {
        let to = bpm.max(1.0);
        if seconds <= 0.0 {
            self.set_bpm(to);
            return;
        }
        self.ramp = Some(BpmRamp {
            from: self.bpm,
            to,
            start: self.elapsed,
            duration: seconds,
        });
    }

    pub fn position(&self) -> BeatTime {
        BeatTime(self.position)
    }

    /// Seconds the transport has been running since its last reset.
    pub fn seconds(&self) -> f64 {
        self.elapsed
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.beats_per_bar
    }

    pub fn set_beats_per_bar(&mut self, beats: u32) {
        self.beats_per_bar = beats.max(1);
    }

    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Duration of `beats` at the current tempo.
    pub fn seconds_from_beats(&self, beats: f64) -> f64 {
        beats * self.seconds_per_beat()
    }

    pub fn beats_from_seconds(&self, seconds: f64) -> f64 {
        seconds / self.seconds_per_beat()
    }

    /// First bar line strictly after the current position.
    pub fn next_bar(&self) -> BeatTime {
        let bar = self.beats_per_bar as f64;
        BeatTime(((self.position / bar).floor() + 1.0) * bar)
    }

    /// Move the transport forward by `seconds` of rendered audio.
    pub fn advance(&mut self, seconds: f64) {
        if !self.running || seconds <= 0.0 {
            return;
        }
        if let Some(ramp) = self.ramp {
            let t = ((self.elapsed + seconds * 0.5 - ramp.start) / ramp.duration).clamp(0.0, 1.0);
            self.bpm = ramp.from + (ramp.to - ramp.from) * t;
            if self.elapsed + seconds - ramp.start >= ramp.duration {
                self.bpm = ramp.to;
                self.ramp = None;
            }
        }
        self.position += seconds * self.bpm / 60.0;
        self.elapsed += seconds;
    }
}

/// The engine's single clock: lifecycle state, rendered frames, transport.
#[derive(Debug, Clone)]
pub struct AudioClock {
    state: ClockState,
    sample_rate: f64,
    frames: u64,
    pub transport: Transport,
}

impl AudioClock {
    pub fn new(sample_rate: u32, bpm: f64, beats_per_bar: u32) -> Self {
        AudioClock {
            state: ClockState::Uninitialized,
            sample_rate: sample_rate as f64,
            frames: 0,
            transport: Transport::new(bpm, beats_per_bar),
        }
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn set_state(&mut self, state: ClockState) {
        self.state = state;
    }

    pub fn is_running(&self) -> bool {
        self.state == ClockState::Running
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn now(&self) -> ClockTime {
        ClockTime(self.frames as f64 / self.sample_rate)
    }

    pub fn advance_frames(&mut self, frames: usize) {
        self.frames += frames as u64;
        self.transport.advance(frames as f64 / self.sample_rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn transport_counts_beats_only_while_running() {
        let mut t = Transport::new(120.0, 4);
        t.advance(1.0);
        assert_eq!(t.position().beats(), 0.0);

        t.start();
        t.advance(1.0);
        assert_relative_eq!(t.position().beats(), 2.0);
        assert_relative_eq!(t.seconds(), 1.0);
    }

    #[test]
    fn next_bar_is_strictly_ahead() {
        let mut t = Transport::new(120.0, 4);
        assert_eq!(t.next_bar(), BeatTime(4.0));
        t.start();
        t.advance(2.0); // beat 4.0 exactly
        assert_eq!(t.next_bar(), BeatTime(8.0));
        t.advance(0.25);
        assert_eq!(t.next_bar(), BeatTime(8.0));
    }

    #[test]
    fn bpm_ramp_settles_on_target() {
        let mut t = Transport::new(100.0, 4);
        t.start();
        t.ramp_bpm(140.0, 1.0);
        for _ in 0..20 {
            t.advance(0.1);
        }
        assert_relative_eq!(t.bpm(), 140.0);
    }

    #[test]
    fn reset_rewinds_position() {
        let mut t = Transport::new(120.0, 4);
        t.start();
        t.advance(3.0);
        t.reset();
        assert_eq!(t.position(), BeatTime(0.0));
        assert_eq!(t.seconds(), 0.0);
        assert!(t.is_running());
    }

    #[test]
    fn clock_time_follows_frames() {
        let mut clock = AudioClock::new(48000, 120.0, 4);
        assert_eq!(clock.state(), ClockState::Uninitialized);
        clock.advance_frames(24000);
        assert_relative_eq!(clock.now().secs(), 0.5);
    }
}
