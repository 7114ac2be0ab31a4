//! Automatable parameter, WebAudio `AudioParam` style.
//!
//! Events are queued in time order and evaluated once per sample against the
//! context clock. A ramp starts from whatever value the parameter holds when
//! the ramp becomes the head of the queue.

use std::collections::VecDeque;

/// Smallest magnitude an exponential ramp may start from or aim at.
pub const EXP_FLOOR: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampCurve {
    Linear,
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Event {
    Set {
        time: f64,
        value: f64,
    },
    Ramp {
        end: f64,
        target: f64,
        curve: RampCurve,
        /// (time, value) captured when the ramp starts.
        from: Option<(f64, f64)>,
    },
}

impl Event {
    fn value(&self) -> f64 {
        match *self {
            Event::Set { value, .. } => value,
            Event::Ramp { target, .. } => target,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Param {
    value: f64,
    events: VecDeque<Event>,
}

impl Param {
    pub fn new(value: f64) -> Self {
        Param {
            value,
            events: VecDeque::new(),
        }
    }

    /// Current value (as of the last evaluated sample).
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Value the parameter ends at once every queued event has run.
    pub fn target_value(&self) -> f64 {
        self.events.back().map_or(self.value, Event::value)
    }

    pub fn is_automating(&self) -> bool {
        !self.events.is_empty()
    }

    /// Jump immediately, dropping any queued automation.
    pub fn set_value(&mut self, value: f64) {
        self.events.clear();
        self.value = value;
    }

    pub fn set_value_at(&mut self, value: f64, time: f64) {
        self.events.push_back(Event::Set { time, value });
    }

    pub fn linear_ramp_to(&mut self, target: f64, end: f64) {
        self.events.push_back(Event::Ramp {
            end,
            target,
            curve: RampCurve::Linear,
            from: None,
        });
    }

    pub fn exponential_ramp_to(&mut self, target: f64, end: f64) {
        self.events.push_back(Event::Ramp {
            end,
            target,
            curve: RampCurve::Exponential,
            from: None,
        });
    }

    /// Drop queued automation and freeze at the current value.
    pub fn cancel_and_hold(&mut self, now: f64) {
        if let Some(Event::Ramp {
            end,
            target,
            curve,
            from: Some(from),
        }) = self.events.front().copied()
        {
            self.value = interpolate(from, (end, target), curve, now);
        }
        self.events.clear();
    }

    /// Cancel whatever is queued and glide from the held value to `target`.
    pub fn ramp_to(&mut self, target: f64, now: f64, duration: f64, curve: RampCurve) {
        self.cancel_and_hold(now);
        if duration <= 0.0 {
            self.value = target;
            return;
        }
        self.events.push_back(Event::Ramp {
            end: now + duration,
            target,
            curve,
            from: Some((now, self.value)),
        });
    }

    /// Evaluate at `time` (seconds), consuming finished events.
    pub fn next_value(&mut self, time: f64) -> f64 {
        while let Some(front) = self.events.front_mut() {
            match front {
                Event::Set { time: at, value } => {
                    if time < *at {
                        break;
                    }
                    self.value = *value;
                    self.events.pop_front();
                }
                Event::Ramp {
                    end,
                    target,
                    curve,
                    from,
                } => {
                    let start = *from.get_or_insert((time, self.value));
                    if time >= *end {
                        self.value = *target;
                        self.events.pop_front();
                        continue;
                    }
                    self.value = interpolate(start, (*end, *target), *curve, time);
                    break;
                }
            }
        }
        self.value
    }
}

fn interpolate(from: (f64, f64), to: (f64, f64), curve: RampCurve, time: f64) -> f64 {
    let (t0, v0) = from;
    let (t1, v1) = to;
    if t1 <= t0 {
        return v1;
    }
    let x = ((time - t0) / (t1 - t0)).clamp(0.0, 1.0);
    match curve {
        RampCurve::Linear => v0 + (v1 - v0) * x,
        RampCurve::Exponential => {
            let a = v0.abs().max(EXP_FLOOR).copysign(if v0 == 0.0 { v1 } else { v0 });
            let b = v1.abs().max(EXP_FLOOR).copysign(if v1 == 0.0 { v0 } else { v1 });
            if a.signum() != b.signum() {
                return v0 + (v1 - v0) * x;
            }
            a * (b / a).powf(x)
        }
    }
}

/// Decibels to linear gain.
#[inline]
pub fn db_to_gain(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

/// Linear gain to decibels, floored at -100 dB.
#[inline]
pub fn gain_to_db(gain: f64) -> f64 {
    if gain <= 0.0 {
        -100.0
    } else {
        (20.0 * gain.log10()).max(-100.0)
    }
}
