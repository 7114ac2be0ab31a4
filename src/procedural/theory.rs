//! Scales, chord progressions and pitch conversion.
//!
//! Every table lookup goes through [`safe_index`], so any integer index
//! (negative or past the end) resolves to a real table entry.

use serde::{Deserialize, Serialize};

pub const MAJOR: [i32; 7] = [0, 2, 4, 5, 7, 9, 11];
pub const LYDIAN: [i32; 7] = [0, 2, 4, 6, 7, 9, 11];
pub const MIXOLYDIAN: [i32; 7] = [0, 2, 4, 5, 7, 9, 10];
pub const DORIAN: [i32; 7] = [0, 2, 3, 5, 7, 9, 10];
pub const MINOR: [i32; 7] = [0, 2, 3, 5, 7, 8, 10];
pub const PHRYGIAN: [i32; 7] = [0, 1, 3, 5, 7, 8, 10];

/// Scale-degree roots of each progression, one chord per bar.
const BRIGHT_PROGRESSION: [i64; 4] = [0, 4, 5, 3];
const NEUTRAL_PROGRESSION: [i64; 4] = [0, 3, 6, 4];
const DARK_PROGRESSION: [i64; 4] = [0, 5, 3, 4];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Scale {
    Major,
    Lydian,
    Mixolydian,
    #[default]
    Dorian,
    Minor,
    Phrygian,
}

impl Scale {
    pub fn intervals(self) -> &'static [i32] {
        match self {
            Scale::Major => &MAJOR,
            Scale::Lydian => &LYDIAN,
            Scale::Mixolydian => &MIXOLYDIAN,
            Scale::Dorian => &DORIAN,
            Scale::Minor => &MINOR,
            Scale::Phrygian => &PHRYGIAN,
        }
    }

    pub fn progression(self) -> &'static [i64] {
        match self {
            Scale::Major | Scale::Lydian => &BRIGHT_PROGRESSION,
            Scale::Mixolydian | Scale::Dorian => &NEUTRAL_PROGRESSION,
            Scale::Minor | Scale::Phrygian => &DARK_PROGRESSION,
        }
    }

    /// Harmonic mode for a success level: bright above 0.7, dark below 0.3.
    pub fn for_success(success: f64) -> Scale {
        if success > 0.7 {
            Scale::Major
        } else if success < 0.3 {
            Scale::Minor
        } else {
            Scale::Dorian
        }
    }
}

/// `index mod len`, never negative. An empty table yields 0.
#[inline]
pub fn safe_index(index: i64, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    index.rem_euclid(len as i64) as usize
}

/// The table entry at `index`, wrapped. `None` only for an empty table.
pub fn lookup<T: Copy>(table: &[T], index: i64) -> Option<T> {
    table.get(safe_index(index, table.len())).copied()
}

/// `frequency` if it is a usable pitch, otherwise `fallback`.
#[inline]
pub fn safe_frequency(frequency: f64, fallback: f64) -> f64 {
    if frequency.is_finite() && frequency > 0.0 {
        frequency
    } else {
        fallback
    }
}

/// MIDI note of scale `degree` above `root`. Degrees past the scale length
/// move by octaves.
pub fn scale_note(scale: Scale, root: i32, degree: i64) -> i32 {
    let intervals = scale.intervals();
    let len = intervals.len() as i64;
    let octave = degree.div_euclid(len.max(1)).clamp(-10, 10);
    root + octave as i32 * 12 + lookup(intervals, degree).unwrap_or(0)
}

/// Triad (root, third, fifth) of progression step `chord_index`.
pub fn chord_notes(scale: Scale, root: i32, chord_index: i64) -> [i32; 3] {
    let degree = lookup(scale.progression(), chord_index).unwrap_or(0);
    [
        scale_note(scale, root, degree),
        scale_note(scale, root, degree + 2),
        scale_note(scale, root, degree + 4),
    ]
}

/// Frequency of a MIDI note, falling back to the root when out of range.
pub fn note_frequency(midi: i32, root: i32) -> f64 {
    safe_frequency(midi_to_frequency(midi.clamp(0, 127), 440.0), midi_to_frequency(root, 440.0))
}

/// Parse a note name (e.g. "C4", "F#3", "Bb5") into a MIDI note number.
pub fn note_to_midi(note: &str) -> Option<i32> {
    let mut chars = note.chars();
    let mut semitone = match chars.next()?.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };
    let rest = chars.as_str();
    let octave = match rest.as_bytes().first() {
        Some(b'#') => {
            semitone += 1;
            &rest[1..]
        }
        Some(b'b') => {
            semitone -= 1;
            &rest[1..]
        }
        _ => rest,
    };
    let octave: i32 = octave.parse().ok()?;
    // C4 = 60
    Some((octave + 1) * 12 + semitone)
}

/// `tuning_pitch` is A4 (MIDI 69).
pub fn midi_to_frequency(midi: i32, tuning_pitch: f64) -> f64 {
    tuning_pitch * 2.0_f64.powf((midi as f64 - 69.0) / 12.0)
}

pub fn note_to_frequency(note: &str) -> Option<f64> {
    note_to_midi(note).map(|m| midi_to_frequency(m, 440.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn safe_index_wraps_every_integer() {
        for len in 1..9usize {
            for index in -50i64..50 {
                assert!(safe_index(index, len) < len);
            }
        }
        assert_eq!(safe_index(-1, 7), 6);
        assert_eq!(safe_index(i64::MIN, 7), i64::MIN.rem_euclid(7) as usize);
        assert_eq!(safe_index(3, 0), 0);
    }

    #[test]
    fn lookups_always_hit_the_table() {
        for scale in [Scale::Major, Scale::Dorian, Scale::Phrygian] {
            let table = scale.progression();
            for index in [-1_000_000i64, -9, -1, 0, 3, 4, 17, i64::MAX] {
                let degree = lookup(table, index).unwrap();
                assert!(table.contains(&degree));
                let notes = chord_notes(scale, 45, index);
                assert!(notes.iter().all(|n| note_frequency(*n, 45).is_finite()));
            }
        }
        assert_eq!(lookup::<i32>(&[], 3), None);
    }

    #[test]
    fn scale_degrees_wrap_by_octave() {
        assert_eq!(scale_note(Scale::Major, 60, 0), 60);
        assert_eq!(scale_note(Scale::Major, 60, 7), 72);
        assert_eq!(scale_note(Scale::Major, 60, -1), 59);
        assert_eq!(scale_note(Scale::Minor, 57, 2), 60);
    }

    #[test]
    fn safe_frequency_falls_back() {
        assert_eq!(safe_frequency(f64::NAN, 110.0), 110.0);
        assert_eq!(safe_frequency(f64::INFINITY, 110.0), 110.0);
        assert_eq!(safe_frequency(-3.0, 110.0), 110.0);
        assert_eq!(safe_frequency(220.0, 110.0), 220.0);
    }

    #[test]
    fn note_names() {
        assert_eq!(note_to_midi("C4"), Some(60));
        assert_eq!(note_to_midi("A2"), Some(45));
        assert_eq!(note_to_midi("F#3"), Some(54));
        assert_eq!(note_to_midi("Bb5"), Some(82));
        assert_eq!(note_to_midi("H2"), None);
        assert_eq!(note_to_midi(""), None);
        assert_relative_eq!(note_to_frequency("A4").unwrap(), 440.0);
        assert_relative_eq!(midi_to_frequency(57, 440.0), 220.0, epsilon = 1e-9);
    }

    #[test]
    fn success_picks_mode() {
        assert_eq!(Scale::for_success(0.9), Scale::Major);
        assert_eq!(Scale::for_success(0.1), Scale::Minor);
        assert_eq!(Scale::for_success(0.5), Scale::Dorian);
    }
}
