//! Stereo feedback delay.

/// Delay line holding up to `max_delay` seconds per channel.
#[derive(Debug, Clone)]
pub struct Delay {
    buffer_l: Vec<f32>,
    buffer_r: Vec<f32>,
    write_pos: usize,
    sample_rate: f64,
    max_delay: f64,

    /// Delay time in seconds.
    time: f64,
    /// 0 = single echo, capped below 1 to stay stable.
    feedback: f32,
    /// 0 = dry, 1 = wet only.
    mix: f32,
}

impl Delay {
    pub fn new(sample_rate: f64, max_delay: f64) -> Self {
        let size = (sample_rate * max_delay) as usize + 1;
        Delay {
            buffer_l: vec![0.0; size],
            buffer_r: vec![0.0; size],
            write_pos: 0,
            sample_rate,
            max_delay,
            time: 0.25,
            feedback: 0.3,
            mix: 0.3,
        }
    }

    pub fn set_time(&mut self, seconds: f64) {
        self.time = seconds.clamp(0.0, self.max_delay);
    }

    pub fn set_feedback(&mut self, feedback: f64) {
        self.feedback = feedback.clamp(0.0, 0.95) as f32;
    }

    pub fn set_mix(&mut self, mix: f64) {
        self.mix = mix.clamp(0.0, 1.0) as f32;
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let len = self.buffer_l.len();
        let delay = ((self.time * self.sample_rate) as usize).min(len - 1);
        let read_pos = (self.write_pos + len - delay) % len;

        let delayed_l = self.buffer_l[read_pos];
        let delayed_r = self.buffer_r[read_pos];

        self.buffer_l[self.write_pos] = left + delayed_l * self.feedback;
        self.buffer_r[self.write_pos] = right + delayed_r * self.feedback;
        self.write_pos = (self.write_pos + 1) % len;

        let dry = 1.0 - self.mix;
        (left * dry + delayed_l * self.mix, right * dry + delayed_r * self.mix)
    }

    pub fn process_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            (*l, *r) = self.process(*l, *r);
        }
    }

    pub fn clear(&mut self) {
        self.buffer_l.fill(0.0);
        self.buffer_r.fill(0.0);
        self.write_pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wet_delay(sample_rate: f64, time: f64, feedback: f64) -> Delay {
        let mut d = Delay::new(sample_rate, 1.0);
        d.set_time(time);
        d.set_feedback(feedback);
        d.set_mix(1.0);
        d
    }

    #[test]
    fn dry_mix_passes_input() {
        let mut d = Delay::new(44100.0, 1.0);
        d.set_mix(0.0);
        assert_eq!(d.process(0.5, -0.5), (0.5, -0.5));
    }

    #[test]
    fn impulse_returns_after_delay_time() {
        let mut d = wet_delay(1000.0, 0.01, 0.0);
        d.process(1.0, 1.0);
        for _ in 1..10 {
            assert_eq!(d.process(0.0, 0.0).0, 0.0);
        }
        assert_eq!(d.process(0.0, 0.0), (1.0, 1.0));
    }

    #[test]
    fn feedback_attenuates_each_echo() {
        let mut d = wet_delay(1000.0, 0.01, 0.5);
        d.process(1.0, 1.0);
        let echoes: Vec<f32> = (1..=20).map(|_| d.process(0.0, 0.0).0).filter(|s| *s != 0.0).collect();
        assert_eq!(echoes, vec![1.0, 0.5]);
    }

    #[test]
    fn time_is_clamped_to_buffer() {
        let mut d = Delay::new(1000.0, 0.5);
        d.set_time(3.0);
        assert_eq!(d.time(), 0.5);
    }
}
