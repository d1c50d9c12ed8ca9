//! # Magnitude Estimation
//!
//! Turns published sin/cos snapshots into one normalized 16-bit energy per
//! bin. Two norms are available as zero-sized policy types, chosen at build
//! time through the engine's type parameter:
//!
//! - [`Exact`]: rounded integer square root of the high halves
//! - [`Approximate`]: octagonal norm `max + min / 2`, no multiplies at all
//!
//! Values that do not fit in 16 bits after scaling are clamped to 65535.

use tracing::trace;

use crate::config::{DftMode, Settings};
use crate::dft::GoertzelBank;
use crate::fixed::{saturate_u16, sqrt_rounded};

/// A norm over one bin's correlation pair.
///
/// Both implementations return a value on the scale of the raw 32-bit
/// correlations so the same post-scaling applies to either.
pub trait MagnitudePolicy {
    const NAME: &'static str;

    fn raw_magnitude(sin: i32, cos: i32) -> u64;
}

/// Rounded `sqrt(sin^2 + cos^2)`, computed on the top 16 bits of each term.
#[derive(Debug, Clone, Copy, Default)]
pub struct Exact;

impl MagnitudePolicy for Exact {
    const NAME: &'static str = "exact";

    fn raw_magnitude(sin: i32, cos: i32) -> u64 {
        let s = (sin >> 16) as i64;
        let c = (cos >> 16) as i64;
        // At most 2 * 32768^2, which fits u32.
        let squared = (s * s + c * c) as u32;
        (sqrt_rounded(squared) as u64) << 16
    }
}

/// `max(|sin|, |cos|) + min(|sin|, |cos|) / 2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Approximate;

impl MagnitudePolicy for Approximate {
    const NAME: &'static str = "approximate";

    fn raw_magnitude(sin: i32, cos: i32) -> u64 {
        let s = sin.unsigned_abs() as u64;
        let c = cos.unsigned_abs() as u64;
        if s > c { s + (c >> 1) } else { c + (s >> 1) }
    }
}

/// Scales a raw magnitude into the 16-bit output range.
///
/// `((raw << 2) >> shift) / dft_update`, clamped to 65535. The second value
/// reports whether clamping happened.
#[inline]
pub fn scale_magnitude(raw: u64, shift: u32, dft_update: u8) -> (u16, bool) {
    let scaled = ((raw << 2) >> shift.min(63)) / dft_update.max(1) as u64;
    saturate_u16(scaled)
}

/// Magnitude of one bin under policy `M`.
#[inline]
pub fn bin_magnitude<M: MagnitudePolicy>(sin: i32, cos: i32, shift: u32, dft_update: u8) -> (u16, bool) {
    scale_magnitude(M::raw_magnitude(sin, cos), shift, dft_update)
}

/// Holds the most recently published output bins.
#[derive(Debug, Clone)]
pub struct MagnitudeEstimator<const BPO: usize, const OCT: usize> {
    output: [[u16; BPO]; OCT],
    saturations: u64,
}

impl<const BPO: usize, const OCT: usize> Default for MagnitudeEstimator<BPO, OCT> {
    fn default() -> Self {
        Self { output: [[0; BPO]; OCT], saturations: 0 }
    }
}

impl<const BPO: usize, const OCT: usize> MagnitudeEstimator<BPO, OCT> {
    /// Recomputes every output bin from the bank's current snapshots.
    ///
    /// The right shift is `rmux_shift + dft_iir`, plus the octave index when
    /// octave-adaptive gain is on and the bank is progressive (upper octaves
    /// integrate more updates per publish, so they are attenuated more).
    pub fn publish_output_bins<M: MagnitudePolicy>(
        &mut self,
        bank: &GoertzelBank<BPO, OCT>,
        settings: &Settings,
    ) -> &[[u16; BPO]; OCT] {
        let base_shift = settings.rmux_shift as u32 + settings.dft_iir as u32;
        let per_octave = settings.octave_adaptive_gain && bank.mode() == DftMode::Progressive;
        let mut clipped = 0u64;

        for (octave, (outputs, bins)) in self.output.iter_mut().zip(bank.bins().iter()).enumerate() {
            let shift = if per_octave { base_shift + octave as u32 } else { base_shift };
            for (out, bin) in outputs.iter_mut().zip(bins.iter()) {
                let (value, saturated) =
                    bin_magnitude::<M>(bin.snapshot_sin, bin.snapshot_cos, shift, settings.dft_update);
                *out = value;
                clipped += saturated as u64;
            }
        }

        if clipped > 0 {
            trace!(clipped, policy = M::NAME, "clipping output bins to prevent overflow");
            self.saturations += clipped;
        }
        &self.output
    }

    /// Output bins from the last publish, octave-major.
    pub fn output_bins(&self) -> &[[u16; BPO]; OCT] {
        &self.output
    }

    /// Total number of bin values clamped to 65535 so far.
    pub fn saturations(&self) -> u64 {
        self.saturations
    }

    pub fn clear(&mut self) {
        self.output = [[0; BPO]; OCT];
    }
}
