//! # Spectral Post-Processing
//!
//! Smooths the published output bins over time ("fuzz"), folds every octave
//! onto one circular octave, and blurs the folded spectrum so that a note
//! straddling two bins still reads as a single peak.
//!
//! ## Features
//! - Shift-encoded amplitude IIR with a noise floor cutoff
//! - Octave folding plus per-octave energy sums
//! - Circular (1/4, 1/2, 1/4) blur, double-buffered per pass
//! - Optional per-bin equalization learned from a calibration sweep

use tracing::debug;

use crate::config::Settings;
use crate::error::ConfigError;
use crate::fixed::leak_u16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EqualizerState {
    Off,
    Calibrating { frames_left: u32 },
    Active,
}

/// Per-bin gain correction learned from the loudest response of each bin.
#[derive(Debug, Clone)]
struct Equalizer<const BPO: usize, const OCT: usize> {
    max_bins: [[u16; BPO]; OCT],
    max_all: u32,
    state: EqualizerState,
}

impl<const BPO: usize, const OCT: usize> Equalizer<BPO, OCT> {
    fn off() -> Self {
        Self { max_bins: [[1; BPO]; OCT], max_all: 1, state: EqualizerState::Off }
    }

    fn attack(&self, octave: usize, bin: usize, output: u16, fuzz_bits: u8) -> u16 {
        match self.state {
            EqualizerState::Active => {
                let max_bin = self.max_bins[octave][bin].max(1) as u64;
                let equalized = (self.max_all as u64 * output as u64 / max_bin) >> fuzz_bits;
                equalized.min(u16::MAX as u64) as u16
            }
            _ => output >> fuzz_bits,
        }
    }

    fn observe(&mut self, fuzzed: &[[u16; BPO]; OCT]) {
        let EqualizerState::Calibrating { frames_left } = self.state else {
            return;
        };
        for (maxima, row) in self.max_bins.iter_mut().zip(fuzzed.iter()) {
            for (max_bin, &value) in maxima.iter_mut().zip(row.iter()) {
                *max_bin = (*max_bin).max(value);
                self.max_all = self.max_all.max(*max_bin as u32);
            }
        }
        if frames_left <= 1 {
            debug!(max_all = self.max_all, "equalizer calibration finished");
            self.state = EqualizerState::Active;
        } else {
            self.state = EqualizerState::Calibrating { frames_left: frames_left - 1 };
        }
    }
}

/// Fuzzed, folded and per-octave spectra.
#[derive(Debug, Clone)]
pub struct SpectralPostProcessor<const BPO: usize, const OCT: usize> {
    fuzzed: [[u16; BPO]; OCT],
    folded: [u16; BPO],
    octave_bins: [u16; OCT],
    equalizer: Equalizer<BPO, OCT>,
}

impl<const BPO: usize, const OCT: usize> Default for SpectralPostProcessor<BPO, OCT> {
    fn default() -> Self {
        Self {
            fuzzed: [[0; BPO]; OCT],
            folded: [0; BPO],
            octave_bins: [0; OCT],
            equalizer: Equalizer::off(),
        }
    }
}

impl<const BPO: usize, const OCT: usize> SpectralPostProcessor<BPO, OCT> {
    /// Runs fuzz, fold and blur over one frame of output bins.
    ///
    /// # Returns
    /// * `(folded, octave_bins)` - the blurred folded spectrum and the
    ///   per-octave sums of the fuzzed bins
    pub fn update(&mut self, output_bins: &[[u16; BPO]; OCT], settings: &Settings) -> (&[u16; BPO], &[u16; OCT]) {
        self.fuzz(output_bins, settings);
        self.equalizer.observe(&self.fuzzed);
        self.fold();
        self.blur(settings.filter_blur_passes);
        (&self.folded, &self.octave_bins)
    }

    fn fuzz(&mut self, output_bins: &[[u16; BPO]; OCT], settings: &Settings) {
        let bits = settings.fuzz_iir_bits;
        let cutoff = settings.lower_cutoff as u32 * 256;
        for (octave, (fuzzed, outputs)) in self.fuzzed.iter_mut().zip(output_bins.iter()).enumerate() {
            for (bin, (fuzz, &output)) in fuzzed.iter_mut().zip(outputs.iter()).enumerate() {
                *fuzz = leak_u16(*fuzz, bits);
                // Below the cutoff is noise: it may only decay.
                if output as u32 > cutoff {
                    *fuzz = fuzz.saturating_add(self.equalizer.attack(octave, bin, output, bits));
                }
            }
        }
    }

    fn fold(&mut self) {
        self.folded = [0; BPO];
        self.octave_bins = [0; OCT];
        for (octave, row) in self.fuzzed.iter().enumerate() {
            for (folded, &value) in self.folded.iter_mut().zip(row.iter()) {
                *folded = folded.saturating_add(value);
                self.octave_bins[octave] = self.octave_bins[octave].saturating_add(value);
            }
        }
    }

    fn blur(&mut self, passes: u8) {
        for _ in 0..passes {
            let source = self.folded;
            for (i, out) in self.folded.iter_mut().enumerate() {
                let left = source[(i + BPO - 1) % BPO];
                let right = source[(i + 1) % BPO];
                *out = (left >> 2) + (right >> 2) + (source[i] >> 1);
            }
        }
    }

    /// Starts learning per-bin maxima over the next `frames` frames.
    /// Play a sweep across the whole range while this runs.
    pub fn start_equalizer_calibration(&mut self, frames: u32) {
        debug!(frames, "equalizer calibration started");
        self.equalizer = Equalizer::off();
        if frames > 0 {
            self.equalizer.state = EqualizerState::Calibrating { frames_left: frames };
        }
    }

    pub fn clear_equalizer(&mut self) {
        self.equalizer = Equalizer::off();
    }

    pub fn equalizer_active(&self) -> bool {
        self.equalizer.state == EqualizerState::Active
    }

    pub fn equalizer_calibrating(&self) -> bool {
        matches!(self.equalizer.state, EqualizerState::Calibrating { .. })
    }

    /// Learned per-bin maxima, octave-major, once calibration has finished.
    pub fn equalizer_profile(&self) -> Option<Vec<u16>> {
        self.equalizer_active().then(|| self.equalizer.max_bins.as_flattened().to_vec())
    }

    /// Installs previously learned maxima and activates equalization.
    pub fn load_equalizer_profile(&mut self, profile: &[u16]) -> Result<(), ConfigError> {
        if profile.len() != BPO * OCT {
            return Err(ConfigError::EqualizerProfileLength { got: profile.len(), expected: BPO * OCT });
        }
        let mut equalizer = Equalizer::off();
        for (slot, &value) in equalizer.max_bins.as_flattened_mut().iter_mut().zip(profile.iter()) {
            *slot = value.max(1);
            equalizer.max_all = equalizer.max_all.max(*slot as u32);
        }
        equalizer.state = EqualizerState::Active;
        self.equalizer = equalizer;
        Ok(())
    }

    /// Fuzzed bins, octave-major.
    pub fn fuzzed_bins(&self) -> &[[u16; BPO]; OCT] {
        &self.fuzzed
    }

    pub fn folded_bins(&self) -> &[u16; BPO] {
        &self.folded
    }

    pub fn octave_bins(&self) -> &[u16; OCT] {
        &self.octave_bins
    }

    pub fn clear(&mut self) {
        self.fuzzed = [[0; BPO]; OCT];
        self.folded = [0; BPO];
        self.octave_bins = [0; OCT];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(blur: u8) -> Settings {
        Settings { filter_blur_passes: blur, ..Settings::default() }
    }

    #[test]
    fn fuzz_attacks_above_cutoff_and_always_decays() {
        let mut post = SpectralPostProcessor::<4, 1>::default();
        let s = settings(0);
        post.update(&[[1000, 256, 257, 0]], &s);
        // bits 1: 0 - 0 + out/2, but 256 is not above the 1 * 256 cutoff.
        assert_eq!(post.fuzzed_bins()[0], [500, 0, 128, 0]);

        post.update(&[[0, 0, 0, 0]], &s);
        assert_eq!(post.fuzzed_bins()[0], [250, 0, 64, 0]);
    }

    #[test]
    fn fold_sums_octaves() {
        let mut post = SpectralPostProcessor::<3, 2>::default();
        let s = Settings { fuzz_iir_bits: 0, ..settings(0) };
        let (folded, octaves) = post.update(&[[1000, 2000, 3000], [400, 500, 60_000]], &s);
        assert_eq!(*folded, [1400, 2500, 63_000]);
        assert_eq!(*octaves, [6000, 60_900]);
    }

    #[test]
    fn fold_saturates() {
        let mut post = SpectralPostProcessor::<1, 2>::default();
        let s = Settings { fuzz_iir_bits: 0, ..settings(0) };
        let (folded, _) = post.update(&[[60_000], [60_000]], &s);
        assert_eq!(folded[0], 65_535);
    }

    #[test]
    fn blur_is_circular() {
        let mut post = SpectralPostProcessor::<6, 1>::default();
        let s = Settings { fuzz_iir_bits: 0, ..settings(1) };
        let (folded, _) = post.update(&[[4000, 0, 0, 0, 0, 0]], &s);
        assert_eq!(*folded, [2000, 1000, 0, 0, 0, 1000]);

        let mut post = SpectralPostProcessor::<6, 1>::default();
        let s = Settings { fuzz_iir_bits: 0, ..settings(2) };
        let (folded, _) = post.update(&[[4000, 0, 0, 0, 0, 0]], &s);
        assert_eq!(*folded, [1500, 1000, 250, 0, 250, 1000]);
    }

    #[test]
    fn equalizer_flattens_response() {
        let mut post = SpectralPostProcessor::<2, 1>::default();
        let s = Settings { fuzz_iir_bits: 0, ..settings(0) };
        post.start_equalizer_calibration(2);
        post.update(&[[8000, 2000]], &s);
        assert!(post.equalizer_calibrating());
        post.update(&[[8000, 2000]], &s);
        assert!(post.equalizer_active());
        assert_eq!(post.equalizer_profile(), Some(vec![8000, 2000]));

        post.update(&[[4000, 1000]], &s);
        assert_eq!(post.fuzzed_bins()[0], [4000, 4000]);
    }

    #[test]
    fn equalizer_profile_length_is_checked() {
        let mut post = SpectralPostProcessor::<2, 2>::default();
        assert_eq!(
            post.load_equalizer_profile(&[1, 2, 3]),
            Err(ConfigError::EqualizerProfileLength { got: 3, expected: 4 })
        );
        post.load_equalizer_profile(&[100, 200, 0, 400]).unwrap();
        assert!(post.equalizer_active());
        assert_eq!(post.equalizer_profile(), Some(vec![100, 200, 1, 400]));
    }
}
