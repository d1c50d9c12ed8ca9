//! # Analyzer Settings
//!
//! Runtime-tunable parameters of the analysis pipeline. Array sizes (bins per
//! octave, octave count, note slots) are compile-time parameters of
//! [`Engine`](crate::engine::Engine); everything here can change between frames.
//!
//! ## Features
//! - Reference defaults for a 16 kHz, 5-octave, 24-bins-per-octave analyzer
//! - Range validation for every field
//! - Named byte access for remote tuning (`get` / `set`)
//! - JSON persistence through serde

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How the correlators are driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DftMode {
    /// One octave per scheduler tick, box-filtered samples for low octaves.
    #[default]
    Progressive,
    /// Every bin on every sample; low octaves get slower phase advances instead.
    Full,
}

/// All runtime parameters of the analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Decay shift applied to running correlations at each publish.
    pub dft_iir: u8,
    /// Number of publish-sentinel visits between snapshot/decay steps.
    pub dft_update: u8,
    /// Extra right shift applied to magnitudes.
    pub rmux_shift: u8,
    /// Shift each octave's magnitude by its index to flatten the response
    /// (progressive mode only).
    pub octave_adaptive_gain: bool,
    /// IIR shift smoothing output bins into fuzzed bins.
    pub fuzz_iir_bits: u8,
    /// Output bins at or below `lower_cutoff * 256` never feed the fuzz IIR.
    pub lower_cutoff: u8,
    pub filter_blur_passes: u8,
    /// Sub-bin resolution of note frequencies, in bits.
    pub semi_bits_per_bin: u8,
    /// Largest jump (in 255ths of half the note range) a note may follow.
    pub max_jump_distance: u8,
    /// Notes closer than this (same units) are merged. 0 disables merging.
    pub max_combine_distance: u8,
    pub amp1_attack_bits: u8,
    pub amp1_decay_bits: u8,
    pub amp2_attack_bits: u8,
    pub amp2_decay_bits: u8,
    /// Slow amplitude target is `peak * amp_1_mult / 16`.
    pub amp_1_mult: u8,
    /// Fast amplitude target is `peak * amp_2_mult / 16`.
    pub amp_2_mult: u8,
    /// A new note needs a slow target of at least `min_amp_for_note << 8`.
    pub min_amp_for_note: u8,
    /// Notes whose slow amplitude drops below this `<< 8` are freed.
    pub minimum_amp_for_note_to_disappear: u8,
    /// Semitones from A to the pitch class of bin 0 (0 = A).
    pub root_note_offset: u8,
    pub dft_mode: DftMode,
    /// Frequency of bin 0 of the lowest octave, in Hz.
    pub base_freq: f32,
    pub sample_rate: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dft_iir: 6,
            dft_update: 1,
            rmux_shift: 6,
            octave_adaptive_gain: true,
            fuzz_iir_bits: 1,
            lower_cutoff: 1,
            filter_blur_passes: 2,
            semi_bits_per_bin: 3,
            max_jump_distance: 4,
            max_combine_distance: 7,
            amp1_attack_bits: 4,
            amp1_decay_bits: 4,
            amp2_attack_bits: 2,
            amp2_decay_bits: 2,
            amp_1_mult: 16,
            amp_2_mult: 16,
            min_amp_for_note: 80,
            minimum_amp_for_note_to_disappear: 64,
            root_note_offset: 0,
            dft_mode: DftMode::Progressive,
            base_freq: 55.0,
            sample_rate: 16_000,
        }
    }
}

/// Name and accepted range of one byte-sized tunable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tunable {
    pub name: &'static str,
    pub min: u8,
    pub max: u8,
}

const fn tunable(name: &'static str, min: u8, max: u8) -> Tunable {
    Tunable { name, min, max }
}

/// Every setting reachable through [`Settings::get`] and [`Settings::set`].
pub const TUNABLES: [Tunable; 20] = [
    tunable("dft_iir", 1, 16),
    tunable("dft_update", 1, 255),
    tunable("rmux_shift", 0, 31),
    tunable("octave_adaptive_gain", 0, 1),
    tunable("fuzz_iir_bits", 0, 15),
    tunable("lower_cutoff", 0, 255),
    tunable("filter_blur_passes", 0, 16),
    tunable("semi_bits_per_bin", 1, 8),
    tunable("max_jump_distance", 0, 255),
    tunable("max_combine_distance", 0, 255),
    tunable("amp1_attack_bits", 0, 15),
    tunable("amp1_decay_bits", 0, 15),
    tunable("amp2_attack_bits", 0, 15),
    tunable("amp2_decay_bits", 0, 15),
    tunable("amp_1_mult", 0, 255),
    tunable("amp_2_mult", 0, 255),
    tunable("min_amp_for_note", 0, 255),
    tunable("minimum_amp_for_note_to_disappear", 0, 255),
    tunable("root_note_offset", 0, 11),
    tunable("dft_mode", 0, 1),
];

impl Settings {
    /// Reads a tunable by name. Booleans and modes read as 0/1.
    pub fn get(&self, name: &str) -> Option<u8> {
        let value = match name {
            "dft_iir" => self.dft_iir,
            "dft_update" => self.dft_update,
            "rmux_shift" => self.rmux_shift,
            "octave_adaptive_gain" => self.octave_adaptive_gain as u8,
            "fuzz_iir_bits" => self.fuzz_iir_bits,
            "lower_cutoff" => self.lower_cutoff,
            "filter_blur_passes" => self.filter_blur_passes,
            "semi_bits_per_bin" => self.semi_bits_per_bin,
            "max_jump_distance" => self.max_jump_distance,
            "max_combine_distance" => self.max_combine_distance,
            "amp1_attack_bits" => self.amp1_attack_bits,
            "amp1_decay_bits" => self.amp1_decay_bits,
            "amp2_attack_bits" => self.amp2_attack_bits,
            "amp2_decay_bits" => self.amp2_decay_bits,
            "amp_1_mult" => self.amp_1_mult,
            "amp_2_mult" => self.amp_2_mult,
            "min_amp_for_note" => self.min_amp_for_note,
            "minimum_amp_for_note_to_disappear" => self.minimum_amp_for_note_to_disappear,
            "root_note_offset" => self.root_note_offset,
            "dft_mode" => match self.dft_mode {
                DftMode::Progressive => 0,
                DftMode::Full => 1,
            },
            _ => return None,
        };
        Some(value)
    }

    /// Writes a tunable by name after range-checking it.
    ///
    /// # Returns
    /// * `Err(ConfigError::UnknownSetting)` - No tunable has this name
    /// * `Err(ConfigError::OutOfRange)` - Value outside the tunable's range
    pub fn set(&mut self, name: &str, value: u8) -> Result<(), ConfigError> {
        let tunable = TUNABLES
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| ConfigError::UnknownSetting(name.to_string()))?;
        check_range(tunable, value)?;

        let slot = match name {
            "dft_iir" => &mut self.dft_iir,
            "dft_update" => &mut self.dft_update,
            "rmux_shift" => &mut self.rmux_shift,
            "octave_adaptive_gain" => {
                self.octave_adaptive_gain = value != 0;
                return Ok(());
            }
            "fuzz_iir_bits" => &mut self.fuzz_iir_bits,
            "lower_cutoff" => &mut self.lower_cutoff,
            "filter_blur_passes" => &mut self.filter_blur_passes,
            "semi_bits_per_bin" => &mut self.semi_bits_per_bin,
            "max_jump_distance" => &mut self.max_jump_distance,
            "max_combine_distance" => &mut self.max_combine_distance,
            "amp1_attack_bits" => &mut self.amp1_attack_bits,
            "amp1_decay_bits" => &mut self.amp1_decay_bits,
            "amp2_attack_bits" => &mut self.amp2_attack_bits,
            "amp2_decay_bits" => &mut self.amp2_decay_bits,
            "amp_1_mult" => &mut self.amp_1_mult,
            "amp_2_mult" => &mut self.amp_2_mult,
            "min_amp_for_note" => &mut self.min_amp_for_note,
            "minimum_amp_for_note_to_disappear" => &mut self.minimum_amp_for_note_to_disappear,
            "root_note_offset" => &mut self.root_note_offset,
            "dft_mode" => {
                self.dft_mode = if value == 0 { DftMode::Progressive } else { DftMode::Full };
                return Ok(());
            }
            _ => return Err(ConfigError::UnknownSetting(name.to_string())),
        };
        *slot = value;
        Ok(())
    }

    /// Checks every tunable against its range, plus the tuning itself.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for tunable in &TUNABLES {
            // Every registry entry has a getter; a miss would be a typo in TUNABLES.
            if let Some(value) = self.get(tunable.name) {
                check_range(tunable, value)?;
            }
        }
        if !(self.base_freq.is_finite() && self.base_freq > 0.0) || self.sample_rate == 0 {
            return Err(ConfigError::InvalidTuning {
                base_freq: self.base_freq,
                sample_rate: self.sample_rate,
            });
        }
        Ok(())
    }

    /// Note range for a bank with `bins_per_octave` bins:
    /// `bins_per_octave << semi_bits_per_bin`.
    pub fn note_range(&self, bins_per_octave: usize) -> i32 {
        (bins_per_octave as i32) << self.semi_bits_per_bin
    }

    /// Loads settings from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&data)
            .with_context(|| format!("parsing settings in {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Saves settings as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("writing settings to {}", path.display()))?;
        Ok(())
    }
}

fn check_range(tunable: &Tunable, value: u8) -> Result<(), ConfigError> {
    if value < tunable.min || value > tunable.max {
        return Err(ConfigError::OutOfRange {
            name: tunable.name,
            value: value as u32,
            min: tunable.min as u32,
            max: tunable.max as u32,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(Settings::default().validate(), Ok(()));
    }

    #[test]
    fn every_tunable_round_trips_by_name() {
        let mut settings = Settings::default();
        for tunable in &TUNABLES {
            settings.set(tunable.name, tunable.max).unwrap();
            assert_eq!(settings.get(tunable.name), Some(tunable.max), "{}", tunable.name);
        }
        assert_eq!(settings.dft_mode, DftMode::Full);
        assert!(settings.octave_adaptive_gain);
    }

    #[test]
    fn set_rejects_bad_input() {
        let mut settings = Settings::default();
        assert_eq!(
            settings.set("no_such_knob", 1),
            Err(ConfigError::UnknownSetting("no_such_knob".into()))
        );
        assert!(matches!(
            settings.set("semi_bits_per_bin", 0),
            Err(ConfigError::OutOfRange { name: "semi_bits_per_bin", .. })
        ));
        assert_eq!(settings.semi_bits_per_bin, 3);
    }

    #[test]
    fn validate_rejects_bad_tuning() {
        let settings = Settings { sample_rate: 0, ..Settings::default() };
        assert!(matches!(settings.validate(), Err(ConfigError::InvalidTuning { .. })));

        let settings = Settings { base_freq: f32::NAN, ..Settings::default() };
        assert!(settings.validate().is_err());

        let settings = Settings { dft_update: 0, ..Settings::default() };
        assert!(matches!(settings.validate(), Err(ConfigError::OutOfRange { name: "dft_update", .. })));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: Settings = serde_json::from_str(r#"{ "dft_iir": 5, "dft_mode": "Full" }"#).unwrap();
        assert_eq!(settings.dft_iir, 5);
        assert_eq!(settings.dft_mode, DftMode::Full);
        assert_eq!(settings.max_combine_distance, 7);
    }

    #[test]
    fn save_then_load() {
        let path = std::env::temp_dir().join(format!("colorchord-settings-{}.json", std::process::id()));
        let settings = Settings { max_jump_distance: 9, base_freq: 65.4, ..Settings::default() };
        settings.save(&path).unwrap();
        let loaded = Settings::load(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, settings);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Settings::load("/definitely/not/here.json").unwrap_err();
        assert!(err.to_string().contains("reading settings"));
    }
}
