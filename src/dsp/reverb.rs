//! Freeverb-style stereo reverb: parallel damped combs into series allpasses.

#[derive(Debug, Clone)]
struct CombFilter {
    buffer: Vec<f32>,
    index: usize,
    feedback: f32,
    damp1: f32,
    damp2: f32,
    filterstore: f32,
}

impl CombFilter {
    fn new(size: usize) -> Self {
        CombFilter {
            buffer: vec![0.0; size.max(1)],
            index: 0,
            feedback: 0.84,
            damp1: 0.2,
            damp2: 0.8,
            filterstore: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let output = self.buffer[self.index];
        self.filterstore = output * self.damp2 + self.filterstore * self.damp1;
        self.buffer[self.index] = input + self.filterstore * self.feedback;
        self.index = (self.index + 1) % self.buffer.len();
        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.filterstore = 0.0;
    }
}

#[derive(Debug, Clone)]
struct AllpassFilter {
    buffer: Vec<f32>,
    index: usize,
}

impl AllpassFilter {
    fn new(size: usize) -> Self {
        AllpassFilter {
            buffer: vec![0.0; size.max(1)],
            index: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let bufout = self.buffer[self.index];
        self.buffer[self.index] = input + bufout * 0.5;
        self.index = (self.index + 1) % self.buffer.len();
        bufout - input
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
    }
}

// Tuned for 44.1 kHz, scaled to the running rate.
const COMB_TUNING: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];
const ALLPASS_TUNING: [usize; 4] = [556, 441, 341, 225];
const STEREO_SPREAD: usize = 23;
const INPUT_GAIN: f32 = 0.015;

#[derive(Debug, Clone)]
pub struct Reverb {
    comb_l: Vec<CombFilter>,
    comb_r: Vec<CombFilter>,
    allpass_l: Vec<AllpassFilter>,
    allpass_r: Vec<AllpassFilter>,
    room_size: f32,
    damping: f32,
    mix: f32,
    width: f32,
}

impl Reverb {
    pub fn new(sample_rate: f64) -> Self {
        let scale = sample_rate / 44100.0;
        let sized = |t: usize, spread: usize| ((t as f64) * scale) as usize + spread;
        let mut reverb = Reverb {
            comb_l: COMB_TUNING.iter().map(|&t| CombFilter::new(sized(t, 0))).collect(),
            comb_r: COMB_TUNING.iter().map(|&t| CombFilter::new(sized(t, STEREO_SPREAD))).collect(),
            allpass_l: ALLPASS_TUNING.iter().map(|&t| AllpassFilter::new(sized(t, 0))).collect(),
            allpass_r: ALLPASS_TUNING
                .iter()
                .map(|&t| AllpassFilter::new(sized(t, STEREO_SPREAD)))
                .collect(),
            room_size: 0.5,
            damping: 0.5,
            mix: 0.3,
            width: 1.0,
        };
        reverb.update_combs();
        reverb
    }

    /// Decay length in [0, 1].
    pub fn set_room_size(&mut self, room_size: f64) {
        self.room_size = room_size.clamp(0.0, 1.0) as f32;
        self.update_combs();
    }

    /// High-frequency absorption in [0, 1]; higher is darker.
    pub fn set_damping(&mut self, damping: f64) {
        self.damping = damping.clamp(0.0, 1.0) as f32;
        self.update_combs();
    }

    pub fn set_mix(&mut self, mix: f64) {
        self.mix = mix.clamp(0.0, 1.0) as f32;
    }

    pub fn set_width(&mut self, width: f64) {
        self.width = width.clamp(0.0, 1.0) as f32;
    }

    pub fn mix(&self) -> f64 {
        self.mix as f64
    }

    fn update_combs(&mut self) {
        let feedback = self.room_size * 0.28 + 0.7;
        for comb in self.comb_l.iter_mut().chain(self.comb_r.iter_mut()) {
            comb.feedback = feedback;
            comb.damp1 = self.damping;
            comb.damp2 = 1.0 - self.damping;
        }
    }

    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let input = (left + right) * INPUT_GAIN;

        let mut out_l: f32 = self.comb_l.iter_mut().map(|c| c.process(input)).sum();
        let mut out_r: f32 = self.comb_r.iter_mut().map(|c| c.process(input)).sum();
        for ap in &mut self.allpass_l {
            out_l = ap.process(out_l);
        }
        for ap in &mut self.allpass_r {
            out_r = ap.process(out_r);
        }

        let wet1 = self.width / 2.0 + 0.5;
        let wet2 = (1.0 - self.width) / 2.0;
        let wet_l = out_l * wet1 + out_r * wet2;
        let wet_r = out_r * wet1 + out_l * wet2;

        let dry = 1.0 - self.mix;
        (left * dry + wet_l * self.mix, right * dry + wet_r * self.mix)
    }

    pub fn process_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            (*l, *r) = self.process(*l, *r);
        }
    }

    pub fn clear(&mut self) {
        self.comb_l.iter_mut().chain(self.comb_r.iter_mut()).for_each(CombFilter::clear);
        self.allpass_l
            .iter_mut()
            .chain(self.allpass_r.iter_mut())
            .for_each(AllpassFilter::clear);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reverb(room: f64, mix: f64) -> Reverb {
        let mut r = Reverb::new(44100.0);
        r.set_room_size(room);
        r.set_mix(mix);
        r
    }

    #[test]
    fn dry_mix_passes_input() {
        let mut r = reverb(0.5, 0.0);
        assert_eq!(r.process(0.5, -0.5), (0.5, -0.5));
    }

    #[test]
    fn impulse_leaves_a_tail_that_decays() {
        let mut r = reverb(0.3, 1.0);
        r.process(1.0, 1.0);
        let early = (0..4000).map(|_| r.process(0.0, 0.0).0.abs()).fold(0.0_f32, f32::max);
        assert!(early > 0.001);
        for _ in 0..44100 {
            r.process(0.0, 0.0);
        }
        let late = (0..4000).map(|_| r.process(0.0, 0.0).0.abs()).fold(0.0_f32, f32::max);
        assert!(late < early * 0.1, "early {early}, late {late}");
    }

    #[test]
    fn clear_silences_tail() {
        let mut r = reverb(0.9, 1.0);
        r.process(1.0, 1.0);
        r.clear();
        assert!((0..5000).all(|_| r.process(0.0, 0.0) == (0.0, 0.0)));
    }
}
