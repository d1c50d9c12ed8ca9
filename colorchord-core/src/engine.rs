//! # Analysis Engine
//!
//! Owns the whole pipeline: Goertzel bank, magnitude estimator, spectral
//! post-processor and note tracker. Samples go in one at a time; every
//! [`SAMPLES_PER_FRAME`] samples (or whenever the caller asks) a frame runs
//! `publish -> fuzz/fold/blur -> peak pick -> track`.
//!
//! ## Features
//! - Bins per octave, octave count and note slots as const generics
//! - Magnitude norm chosen by type parameter ([`Exact`] or [`Approximate`](crate::magnitude::Approximate))
//! - Runtime retuning and settings changes between frames
//! - Equalizer calibration passthrough
//! - Lifetime diagnostics counters
//!
//! Neither [`Engine::advance_one_sample`] nor [`Engine::run_frame`] allocates.

use std::marker::PhantomData;

use tracing::{Level, info, trace};

use crate::config::Settings;
use crate::dft::GoertzelBank;
use crate::error::ConfigError;
use crate::freqtable::build_frequency_table;
use crate::magnitude::{Exact, MagnitudeEstimator, MagnitudePolicy};
use crate::notes::{NoteSlot, NoteTracker, TrackerCounters};
use crate::peaks::{Peak, find_peaks};
use crate::postprocess::SpectralPostProcessor;

/// Samples between frames in the reference design.
pub const SAMPLES_PER_FRAME: usize = 128;

/// The reference analyzer: 24 bins per octave, 5 octaves, 12 notes.
pub type ColorChord = Engine<24, 5, 12, Exact>;

/// Lifetime counters, cheap to copy out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub frames: u64,
    pub publishes: u64,
    /// Output bin values clamped to 65535.
    pub magnitude_saturations: u64,
    pub notes: TrackerCounters,
}

/// A complete analyzer.
///
/// * `BPO` - bins per octave
/// * `OCT` - octaves, `1..=8`
/// * `NOTES` - note slots, `1..=255`
/// * `M` - magnitude norm
#[derive(Debug, Clone)]
pub struct Engine<const BPO: usize, const OCT: usize, const NOTES: usize, M: MagnitudePolicy = Exact> {
    settings: Settings,
    frequency_table: [u16; BPO],
    bank: GoertzelBank<BPO, OCT>,
    estimator: MagnitudeEstimator<BPO, OCT>,
    post: SpectralPostProcessor<BPO, OCT>,
    tracker: NoteTracker<NOTES>,
    samples_in_frame: usize,
    frames: u64,
    _policy: PhantomData<M>,
}

impl<const BPO: usize, const OCT: usize, const NOTES: usize, M: MagnitudePolicy> Engine<BPO, OCT, NOTES, M> {
    /// Builds an engine tuned from `settings.base_freq` and `settings.sample_rate`.
    ///
    /// # Returns
    /// * `Err(ConfigError)` - invalid settings, dimensions or tuning
    pub fn new(settings: Settings) -> Result<Self, ConfigError> {
        Self::check(&settings)?;
        let table = build_frequency_table::<BPO>(settings.base_freq, settings.sample_rate, OCT)?;
        Self::assemble(settings, table)
    }

    /// Builds an engine around an existing table, e.g. a
    /// [`precomputed_frequency_table`](crate::freqtable::precomputed_frequency_table).
    /// `settings.base_freq` is not consulted.
    pub fn with_frequency_table(settings: Settings, table: [u16; BPO]) -> Result<Self, ConfigError> {
        Self::check(&settings)?;
        Self::assemble(settings, table)
    }

    fn check(settings: &Settings) -> Result<(), ConfigError> {
        settings.validate()?;
        if !(1..=u8::MAX as usize).contains(&NOTES) {
            return Err(ConfigError::UnsupportedNoteCount(NOTES));
        }
        // Note positions are i16.
        if BPO == 0 || BPO > i16::MAX as usize || settings.note_range(BPO) > i16::MAX as i32 {
            return Err(ConfigError::UnsupportedBinsPerOctave(BPO));
        }
        Ok(())
    }

    fn assemble(settings: Settings, table: [u16; BPO]) -> Result<Self, ConfigError> {
        let mut bank = GoertzelBank::new(&settings)?;
        bank.apply_frequency_table(&table);
        info!(
            bins_per_octave = BPO,
            octaves = OCT,
            notes = NOTES,
            policy = M::NAME,
            mode = ?settings.dft_mode,
            base_freq = settings.base_freq,
            sample_rate = settings.sample_rate,
            "engine ready"
        );
        Ok(Self {
            settings,
            frequency_table: table,
            bank,
            estimator: MagnitudeEstimator::default(),
            post: SpectralPostProcessor::default(),
            tracker: NoteTracker::new(),
            samples_in_frame: 0,
            frames: 0,
            _policy: PhantomData,
        })
    }

    /// Feeds one sample to the bank. Does not run frames.
    #[inline]
    pub fn advance_one_sample(&mut self, sample: i16) {
        self.bank.advance_one_sample(sample);
    }

    /// Feeds one sample and runs a frame every [`SAMPLES_PER_FRAME`] samples.
    ///
    /// # Returns
    /// * `true` - a frame ran after this sample
    #[inline]
    pub fn push_sample(&mut self, sample: i16) -> bool {
        self.bank.advance_one_sample(sample);
        self.samples_in_frame += 1;
        if self.samples_in_frame >= SAMPLES_PER_FRAME {
            self.samples_in_frame = 0;
            self.run_frame();
            true
        } else {
            false
        }
    }

    /// Runs the per-frame pipeline on the bank's latest snapshots.
    pub fn run_frame(&mut self) {
        let output = self.estimator.publish_output_bins::<M>(&self.bank, &self.settings);
        let (folded, _) = self.post.update(output, &self.settings);
        let semi_bits = self.settings.semi_bits_per_bin;

        if tracing::enabled!(Level::TRACE) {
            for Peak { freq, amplitude } in find_peaks(folded, semi_bits) {
                trace!(frame = self.frames, freq, amplitude, "peak");
            }
        }

        let note_range = self.settings.note_range(BPO);
        self.tracker.ingest_peaks(find_peaks(folded, semi_bits), &self.settings, note_range);
        self.frames += 1;
    }

    /// Rebuilds the frequency table for a new base frequency or sample rate.
    ///
    /// Nothing changes if the new tuning is rejected.
    pub fn retune(&mut self, base_freq: f32, sample_rate: u32) -> Result<(), ConfigError> {
        let table = build_frequency_table::<BPO>(base_freq, sample_rate, OCT)?;
        self.settings.base_freq = base_freq;
        self.settings.sample_rate = sample_rate;
        self.apply_frequency_table(&table);
        info!(base_freq, sample_rate, "engine retuned");
        Ok(())
    }

    /// Installs a frequency table. Correlations keep running, so expect a
    /// few frames of settling.
    pub fn apply_frequency_table(&mut self, table: &[u16; BPO]) {
        self.frequency_table = *table;
        self.bank.apply_frequency_table(table);
    }

    /// Replaces all settings at once.
    ///
    /// A tuning change rebuilds the table. A mode change clears the bank. A
    /// change of note resolution forgets every note, since their positions
    /// are in the old units.
    pub fn update_settings(&mut self, settings: Settings) -> Result<(), ConfigError> {
        Self::check(&settings)?;
        let retuned = settings.base_freq != self.settings.base_freq || settings.sample_rate != self.settings.sample_rate;
        let table = if retuned {
            build_frequency_table::<BPO>(settings.base_freq, settings.sample_rate, OCT)?
        } else {
            self.frequency_table
        };

        let mode_changed = settings.dft_mode != self.settings.dft_mode;
        if settings.semi_bits_per_bin != self.settings.semi_bits_per_bin {
            self.tracker.clear();
        }
        self.bank.configure(&settings);
        if retuned || mode_changed {
            self.apply_frequency_table(&table);
        }
        self.settings = settings;
        info!(retuned, mode_changed, "settings updated");
        Ok(())
    }

    /// Changes one named tunable.
    pub fn set(&mut self, name: &str, value: u8) -> Result<(), ConfigError> {
        let mut settings = self.settings.clone();
        settings.set(name, value)?;
        self.update_settings(settings)
    }

    /// Zeroes every stage. Settings, tuning and counters are kept.
    pub fn reset(&mut self) {
        self.bank.clear();
        self.estimator.clear();
        self.post.clear();
        self.tracker.clear();
        self.samples_in_frame = 0;
    }

    pub fn start_equalizer_calibration(&mut self, frames: u32) {
        self.post.start_equalizer_calibration(frames);
    }

    pub fn clear_equalizer(&mut self) {
        self.post.clear_equalizer();
    }

    /// True once calibration has finished or a profile was loaded.
    pub fn equalizer_active(&self) -> bool {
        self.post.equalizer_active()
    }

    pub fn equalizer_profile(&self) -> Option<Vec<u16>> {
        self.post.equalizer_profile()
    }

    pub fn load_equalizer_profile(&mut self, profile: &[u16]) -> Result<(), ConfigError> {
        self.post.load_equalizer_profile(profile)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn frequency_table(&self) -> &[u16; BPO] {
        &self.frequency_table
    }

    pub fn bank(&self) -> &GoertzelBank<BPO, OCT> {
        &self.bank
    }

    /// Note units per octave at the current resolution.
    pub fn note_range(&self) -> i32 {
        self.settings.note_range(BPO)
    }

    /// Output bins from the last frame, octave-major, `BPO * OCT` long.
    pub fn output_bins(&self) -> &[u16] {
        self.estimator.output_bins().as_flattened()
    }

    /// Fuzzed bins, octave-major, `BPO * OCT` long.
    pub fn fuzzed_bins(&self) -> &[u16] {
        self.post.fuzzed_bins().as_flattened()
    }

    pub fn folded_bins(&self) -> &[u16; BPO] {
        self.post.folded_bins()
    }

    pub fn octave_bins(&self) -> &[u16; OCT] {
        self.post.octave_bins()
    }

    pub fn notes(&self) -> &[NoteSlot; NOTES] {
        self.tracker.slots()
    }

    pub fn active_notes(&self) -> impl Iterator<Item = (usize, &NoteSlot)> {
        self.tracker.active_notes()
    }

    pub fn note_peak_freqs(&self) -> [i16; NOTES] {
        self.tracker.note_peak_freqs()
    }

    pub fn note_peak_amps(&self) -> [u16; NOTES] {
        self.tracker.note_peak_amps()
    }

    pub fn note_peak_amps2(&self) -> [u16; NOTES] {
        self.tracker.note_peak_amps2()
    }

    pub fn note_jumped_to(&self) -> [u8; NOTES] {
        self.tracker.note_jumped_to()
    }

    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            frames: self.frames,
            publishes: self.bank.publishes(),
            magnitude_saturations: self.estimator.saturations(),
            notes: self.tracker.counters(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DftMode;
    use crate::freqtable::REFERENCE_TABLE;
    use crate::magnitude::Approximate;

    #[test]
    fn reference_engine_builds() {
        let engine = ColorChord::new(Settings::default()).unwrap();
        assert_eq!(engine.note_range(), 192);
        assert_eq!(engine.output_bins().len(), 120);
        assert_eq!(engine.fuzzed_bins().len(), 120);
        assert!(engine.notes().iter().all(|n| !n.is_occupied()));
    }

    #[test]
    fn rejects_bad_dimensions() {
        assert_eq!(
            Engine::<24, 5, 0, Exact>::new(Settings::default()).unwrap_err(),
            ConfigError::UnsupportedNoteCount(0)
        );
        assert_eq!(
            Engine::<24, 5, 256, Exact>::new(Settings::default()).unwrap_err(),
            ConfigError::UnsupportedNoteCount(256)
        );
        assert_eq!(
            Engine::<24, 9, 12, Exact>::new(Settings::default()).unwrap_err(),
            ConfigError::UnsupportedOctaves(9)
        );
        let wide = Settings { semi_bits_per_bin: 8, ..Settings::default() };
        assert_eq!(
            Engine::<200, 1, 12, Exact>::with_frequency_table(wide, [0; 200]).unwrap_err(),
            ConfigError::UnsupportedBinsPerOctave(200)
        );
    }

    #[test]
    fn frame_every_128_samples() {
        let mut engine = ColorChord::new(Settings::default()).unwrap();
        let ran: usize = (0..SAMPLES_PER_FRAME * 3).filter(|_| engine.push_sample(0)).count();
        assert_eq!(ran, 3);
        assert_eq!(engine.diagnostics().frames, 3);
        // 2 ticks per sample, one publish per 32-tick cycle.
        assert_eq!(engine.diagnostics().publishes, (SAMPLES_PER_FRAME * 3 / 16) as u64);
    }

    #[test]
    fn precomputed_table_matches_runtime_tuning() {
        let runtime = ColorChord::new(Settings::default()).unwrap();
        let baked = ColorChord::with_frequency_table(Settings::default(), REFERENCE_TABLE).unwrap();
        for (a, b) in runtime.frequency_table().iter().zip(baked.frequency_table().iter()) {
            assert!(a.abs_diff(*b) <= 1);
        }
    }

    #[test]
    fn retune_rejects_without_side_effects() {
        let mut engine = ColorChord::new(Settings::default()).unwrap();
        let before = *engine.frequency_table();
        assert!(engine.retune(5000.0, 16_000).is_err());
        assert_eq!(*engine.frequency_table(), before);
        assert_eq!(engine.settings().base_freq, 55.0);

        engine.retune(110.0, 32_000).unwrap();
        // Doubling both leaves the advances unchanged.
        for (a, b) in engine.frequency_table().iter().zip(before.iter()) {
            assert!(a.abs_diff(*b) <= 1);
        }
        assert_eq!(engine.settings().sample_rate, 32_000);
    }

    #[test]
    fn named_settings_flow_into_the_engine() {
        let mut engine = Engine::<12, 3, 4, Approximate>::new(Settings::default()).unwrap();
        engine.set("semi_bits_per_bin", 4).unwrap();
        assert_eq!(engine.note_range(), 12 << 4);
        assert!(engine.set("semi_bits_per_bin", 9).is_err());
        assert_eq!(engine.note_range(), 12 << 4);

        engine.set("dft_mode", 1).unwrap();
        assert_eq!(engine.bank().mode(), DftMode::Full);
        // Full mode shifts lower octaves down.
        let top = engine.bank().bins()[2][0].phase_advance;
        let low = engine.bank().bins()[0][0].phase_advance;
        assert_eq!(low, engine.frequency_table()[0] >> 2);
        assert_eq!(top, engine.frequency_table()[0]);
    }

    #[test]
    fn reset_clears_state_but_keeps_counters() {
        let mut engine = ColorChord::new(Settings::default()).unwrap();
        for n in 0..4096 {
            engine.push_sample(((n % 37) as i16 - 18) * 500);
        }
        engine.reset();
        assert!(engine.output_bins().iter().all(|&v| v == 0));
        assert!(engine.fuzzed_bins().iter().all(|&v| v == 0));
        assert!(engine.notes().iter().all(|n| !n.is_occupied()));
        assert_eq!(engine.diagnostics().frames, 32);
    }
}
