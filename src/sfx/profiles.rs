//! Fixed synthesis recipes per effect type.
//!
//! Every effect variant picks its waveform, sweep endpoints and envelope
//! timings from these tables; nothing is derived continuously from input.

use serde::{Deserialize, Serialize};

use crate::dsp::filter::FilterType;
use crate::dsp::noise::NoiseColor;
use crate::dsp::oscillator::Waveform;

/// Pitch glide from `start_hz` to `end_hz`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sweep {
    pub start_hz: f64,
    pub end_hz: f64,
}

/// A swept oscillator through an optional filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneProfile {
    pub waveform: Waveform,
    pub sweep: Sweep,
    pub attack: f64,
    pub duration: f64,
    pub level: f64,
    pub filter: Option<(FilterType, f64)>,
}

/// A noise burst through a swept filter, with an optional low thump.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseProfile {
    pub color: NoiseColor,
    pub filter: FilterType,
    pub cutoff: Sweep,
    pub q: f64,
    pub attack: f64,
    pub duration: f64,
    pub level: f64,
    pub thump: Option<Sweep>,
    /// 0 for none, otherwise distortion amount.
    pub drive: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WeaponCategory {
    #[default]
    Laser,
    Plasma,
    Pulse,
    Railgun,
}

impl WeaponCategory {
    pub const ALL: [WeaponCategory; 4] = [
        WeaponCategory::Laser,
        WeaponCategory::Plasma,
        WeaponCategory::Pulse,
        WeaponCategory::Railgun,
    ];

    pub fn profile(self) -> ToneProfile {
        match self {
            WeaponCategory::Laser => ToneProfile {
                waveform: Waveform::Square,
                sweep: Sweep {
                    start_hz: 1800.0,
                    end_hz: 220.0,
                },
                attack: 0.002,
                duration: 0.18,
                level: 0.35,
                filter: Some((FilterType::Lowpass, 4000.0)),
            },
            WeaponCategory::Plasma => ToneProfile {
                waveform: Waveform::Sawtooth,
                sweep: Sweep {
                    start_hz: 600.0,
                    end_hz: 90.0,
                },
                attack: 0.01,
                duration: 0.35,
                level: 0.4,
                filter: Some((FilterType::Lowpass, 1800.0)),
            },
            WeaponCategory::Pulse => ToneProfile {
                waveform: Waveform::Triangle,
                sweep: Sweep {
                    start_hz: 900.0,
                    end_hz: 450.0,
                },
                attack: 0.001,
                duration: 0.09,
                level: 0.45,
                filter: None,
            },
            WeaponCategory::Railgun => ToneProfile {
                waveform: Waveform::Sawtooth,
                sweep: Sweep {
                    start_hz: 3200.0,
                    end_hz: 60.0,
                },
                attack: 0.001,
                duration: 0.6,
                level: 0.4,
                filter: Some((FilterType::Highpass, 120.0)),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CollisionSize {
    Small,
    Medium,
    Large,
}

impl CollisionSize {
    /// Bucket an impact intensity in [0, 1].
    pub fn from_intensity(intensity: f64) -> Self {
        if intensity < 0.33 {
            CollisionSize::Small
        } else if intensity < 0.66 {
            CollisionSize::Medium
        } else {
            CollisionSize::Large
        }
    }

    pub fn profile(self) -> NoiseProfile {
        match self {
            CollisionSize::Small => NoiseProfile {
                color: NoiseColor::White,
                filter: FilterType::Bandpass,
                cutoff: Sweep {
                    start_hz: 3000.0,
                    end_hz: 1200.0,
                },
                q: 1.5,
                attack: 0.001,
                duration: 0.12,
                level: 0.3,
                thump: None,
                drive: 0.0,
            },
            CollisionSize::Medium => NoiseProfile {
                color: NoiseColor::Pink,
                filter: FilterType::Bandpass,
                cutoff: Sweep {
                    start_hz: 1800.0,
                    end_hz: 500.0,
                },
                q: 1.0,
                attack: 0.002,
                duration: 0.25,
                level: 0.4,
                thump: Some(Sweep {
                    start_hz: 140.0,
                    end_hz: 60.0,
                }),
                drive: 0.0,
            },
            CollisionSize::Large => NoiseProfile {
                color: NoiseColor::Brown,
                filter: FilterType::Lowpass,
                cutoff: Sweep {
                    start_hz: 2500.0,
                    end_hz: 300.0,
                },
                q: 0.8,
                attack: 0.003,
                duration: 0.5,
                level: 0.5,
                thump: Some(Sweep {
                    start_hz: 110.0,
                    end_hz: 40.0,
                }),
                drive: 0.3,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExplosionSize {
    Small,
    #[default]
    Medium,
    Large,
}

impl ExplosionSize {
    pub fn profile(self) -> NoiseProfile {
        match self {
            ExplosionSize::Small => NoiseProfile {
                color: NoiseColor::Pink,
                filter: FilterType::Lowpass,
                cutoff: Sweep {
                    start_hz: 3000.0,
                    end_hz: 200.0,
                },
                q: 0.7,
                attack: 0.005,
                duration: 0.6,
                level: 0.5,
                thump: Some(Sweep {
                    start_hz: 90.0,
                    end_hz: 40.0,
                }),
                drive: 0.2,
            },
            ExplosionSize::Medium => NoiseProfile {
                color: NoiseColor::Brown,
                filter: FilterType::Lowpass,
                cutoff: Sweep {
                    start_hz: 2200.0,
                    end_hz: 120.0,
                },
                q: 0.7,
                attack: 0.01,
                duration: 1.2,
                level: 0.6,
                thump: Some(Sweep {
                    start_hz: 70.0,
                    end_hz: 30.0,
                }),
                drive: 0.4,
            },
            ExplosionSize::Large => NoiseProfile {
                color: NoiseColor::Brown,
                filter: FilterType::Lowpass,
                cutoff: Sweep {
                    start_hz: 1600.0,
                    end_hz: 60.0,
                },
                q: 0.9,
                attack: 0.02,
                duration: 2.4,
                level: 0.7,
                thump: Some(Sweep {
                    start_hz: 55.0,
                    end_hz: 25.0,
                }),
                drive: 0.6,
            },
        }
    }
}

/// The looping engine drone: two detuned oscillators under a lowpass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HumProfile {
    pub waveform: Waveform,
    pub frequency: f64,
    /// Cents between the two oscillators.
    pub detune: f64,
    pub cutoff: f64,
    pub level: f64,
    pub fade_in: f64,
}

pub const ENGINE_HUM: HumProfile = HumProfile {
    waveform: Waveform::Sawtooth,
    frequency: 55.0,
    detune: 14.0,
    cutoff: 420.0,
    level: 0.25,
    fade_in: 0.5,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collision_buckets() {
        assert_eq!(CollisionSize::from_intensity(0.0), CollisionSize::Small);
        assert_eq!(CollisionSize::from_intensity(0.5), CollisionSize::Medium);
        assert_eq!(CollisionSize::from_intensity(1.0), CollisionSize::Large);
    }

    #[test]
    fn every_profile_is_playable() {
        for category in WeaponCategory::ALL {
            let p = category.profile();
            assert!(p.sweep.start_hz > 0.0 && p.sweep.end_hz > 0.0);
            assert!(p.duration > p.attack);
        }
        for size in [ExplosionSize::Small, ExplosionSize::Medium, ExplosionSize::Large] {
            let p = size.profile();
            assert!(p.duration > p.attack && p.level <= 1.0);
        }
        assert!(ExplosionSize::Large.profile().duration > ExplosionSize::Small.profile().duration);
    }

    #[test]
    fn categories_deserialize_by_name() {
        let c: WeaponCategory = serde_json::from_str("\"railgun\"").unwrap();
        assert_eq!(c, WeaponCategory::Railgun);
    }
}
