//! # Pitch Naming
//!
//! Converts note positions (note units around one octave) into musical
//! terms: pitch class names, cents off the nearest semitone, and Hz for a
//! given octave of the bank.
//!
//! ## Features
//! - Pitch class of any note position, honoring the root note offset
//! - Cents deviation from the nearest equal-tempered semitone
//! - Note position to Hz and Hz to note position
//! - Name lookup for setting the root note (sharps and flats accepted)

use std::collections::BTreeMap;

use once_cell::sync::Lazy;

use crate::config::Settings;

/// Pitch class names, starting from A.
pub const PITCH_CLASSES: [&str; 12] = ["A", "A#", "B", "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#"];

/// Name to semitones above A, including flat spellings.
static PITCH_CLASS_MAP: Lazy<BTreeMap<&'static str, u8>> = Lazy::new(|| {
    const FLATS: [(&str, u8); 5] = [("Bb", 1), ("Db", 4), ("Eb", 6), ("Gb", 9), ("Ab", 11)];
    PITCH_CLASSES
        .iter()
        .enumerate()
        .map(|(i, name)| (*name, i as u8))
        .chain(FLATS)
        .collect()
});

/// The nearest pitch class to a note position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchLabel {
    pub name: &'static str,
    /// Deviation from that pitch class, in `[-50, 50]`.
    pub cents: f32,
}

/// Semitones above bin 0 for a note position.
///
/// # Arguments
/// * `freq` - Note position in note units
/// * `bins_per_octave` - Bins per octave of the bank
/// * `semi_bits` - Sub-bin bits (`semi_bits_per_bin`)
pub fn note_to_semitones(freq: i16, bins_per_octave: usize, semi_bits: u8) -> f32 {
    let note_range = (bins_per_octave << semi_bits) as f32;
    freq as f32 * 12.0 / note_range
}

/// Names the pitch class nearest to a note position.
///
/// `settings.root_note_offset` says how many semitones above A bin 0 sits.
pub fn pitch_class(freq: i16, bins_per_octave: usize, settings: &Settings) -> PitchLabel {
    let semis = note_to_semitones(freq, bins_per_octave, settings.semi_bits_per_bin) + settings.root_note_offset as f32;
    let nearest = semis.round();
    PitchLabel {
        name: PITCH_CLASSES[(nearest as i32).rem_euclid(12) as usize],
        cents: (semis - nearest) * 100.0,
    }
}

/// Frequency in Hz of a note position within `octave` of the bank.
pub fn note_to_hz(freq: i16, octave: usize, bins_per_octave: usize, settings: &Settings) -> f32 {
    let note_range = (bins_per_octave << settings.semi_bits_per_bin) as f32;
    settings.base_freq * 2f32.powf(octave as f32 + freq as f32 / note_range)
}

/// Position of `hz` on the note circle, rounded to the nearest note unit,
/// together with the bank octave it falls in (which may be out of range).
pub fn hz_to_note(hz: f32, bins_per_octave: usize, settings: &Settings) -> (i16, i32) {
    let note_range = (bins_per_octave << settings.semi_bits_per_bin) as i32;
    let units = ((hz / settings.base_freq).log2() * note_range as f32).round() as i32;
    (units.rem_euclid(note_range) as i16, units.div_euclid(note_range))
}

/// Deviation of `freq` from `target_freq` in cents (positive = sharp).
pub fn calculate_cents_deviation(freq: f32, target_freq: f32) -> f32 {
    1200.0 * (freq / target_freq).log2()
}

/// Root note offset for a pitch class name such as `"C"` or `"Eb"`.
pub fn root_offset_for(name: &str) -> Option<u8> {
    PITCH_CLASS_MAP.get(name).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn bin_zero_is_the_root() {
        let settings = Settings::default();
        let label = pitch_class(0, 24, &settings);
        assert_eq!(label.name, "A");
        assert_abs_diff_eq!(label.cents, 0.0);

        let settings = Settings { root_note_offset: 3, ..Settings::default() };
        assert_eq!(pitch_class(0, 24, &settings).name, "C");
    }

    #[test]
    fn quarter_tones_and_wrap() {
        let settings = Settings::default();
        // 24 bins, 3 semi bits: 16 units per semitone.
        let label = pitch_class(16 * 7, 24, &settings);
        assert_eq!(label.name, "E");
        let label = pitch_class(16 * 7 + 4, 24, &settings);
        assert_eq!(label.name, "E");
        assert_abs_diff_eq!(label.cents, 25.0, epsilon = 1e-3);
        // Just below the top of the circle is A again, slightly flat.
        let label = pitch_class(191, 24, &settings);
        assert_eq!(label.name, "A");
        assert_abs_diff_eq!(label.cents, -6.25, epsilon = 1e-3);
    }

    #[test]
    fn hz_round_trip() {
        let settings = Settings::default();
        assert_abs_diff_eq!(note_to_hz(0, 0, 24, &settings), 55.0, epsilon = 1e-3);
        assert_abs_diff_eq!(note_to_hz(0, 3, 24, &settings), 440.0, epsilon = 1e-2);
        assert_abs_diff_eq!(note_to_hz(96, 1, 24, &settings), 110.0 * 2f32.sqrt(), epsilon = 1e-2);

        assert_eq!(hz_to_note(440.0, 24, &settings), (0, 3));
        assert_eq!(hz_to_note(261.63, 24, &settings), (48, 2));
    }

    #[test]
    fn cents_deviation() {
        assert_abs_diff_eq!(calculate_cents_deviation(880.0, 440.0), 1200.0, epsilon = 1e-3);
        assert_abs_diff_eq!(calculate_cents_deviation(440.0, 440.0), 0.0);
    }

    #[test]
    fn root_names() {
        assert_eq!(root_offset_for("A"), Some(0));
        assert_eq!(root_offset_for("C"), Some(3));
        assert_eq!(root_offset_for("Eb"), Some(6));
        assert_eq!(root_offset_for("D#"), Some(6));
        assert_eq!(root_offset_for("H"), None);
    }
}
