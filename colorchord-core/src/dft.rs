//! # Progressive Goertzel Bank
//!
//! A bank of quadrature correlators, `BPO` bins per octave over `OCT`
//! octaves, laid out octave-major. Each bin carries its own 8.8 phase
//! accumulator and running sin/cos sums against the input.
//!
//! ## Features
//! - Progressive mode: one octave per scheduler tick, low octaves see
//!   box-filtered samples at a proportionally lower rate
//! - Full mode: every bin on every sample
//! - Exponential leak of the running sums at each publish, which doubles as
//!   the snapshot point for magnitude estimation
//!
//! The per-sample path never allocates and never logs.

use crate::config::{DftMode, Settings};
use crate::error::ConfigError;
use crate::fixed::leak_i32;
use crate::schedule::{OctaveSchedule, ScheduleSlot, build_schedule};
use crate::sintable::{cos_at, sin_at};

/// One frequency channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bin {
    /// Turns per update in 8.8 fixed point (256 = one full turn).
    pub phase_advance: u16,
    pub phase_position: u16,
    pub correlation_sin: i32,
    pub correlation_cos: i32,
    /// Correlations as they were at the last publish, before decay.
    pub snapshot_sin: i32,
    pub snapshot_cos: i32,
}

impl Bin {
    #[inline]
    fn correlate(&mut self, sample: i32) {
        self.phase_position = self.phase_position.wrapping_add(self.phase_advance);
        let index = (self.phase_position >> 8) as u8;
        self.correlation_sin = self.correlation_sin.saturating_add(sin_at(index) * sample);
        self.correlation_cos = self.correlation_cos.saturating_add(cos_at(index) * sample);
    }

    #[inline]
    fn publish(&mut self, dft_iir: u8) {
        self.snapshot_sin = self.correlation_sin;
        self.snapshot_cos = self.correlation_cos;
        self.correlation_sin = leak_i32(self.correlation_sin, dft_iir);
        self.correlation_cos = leak_i32(self.correlation_cos, dft_iir);
    }
}

/// The filter bank and its scheduling state.
#[derive(Debug, Clone)]
pub struct GoertzelBank<const BPO: usize, const OCT: usize> {
    bins: [[Bin; BPO]; OCT],
    schedule: OctaveSchedule,
    octave_accumulators: [i32; OCT],
    /// Sentinel visits (progressive) or samples (full) since the last publish.
    publish_cycle: u8,
    publishes: u64,
    mode: DftMode,
    dft_iir: u8,
    dft_update: u8,
}

impl<const BPO: usize, const OCT: usize> GoertzelBank<BPO, OCT> {
    /// Builds a silent bank with all phase advances at zero.
    ///
    /// # Returns
    /// * `Err(ConfigError)` - the octave count has no valid schedule
    pub fn new(settings: &Settings) -> Result<Self, ConfigError> {
        let schedule = build_schedule(OCT)?;
        Ok(Self {
            bins: [[Bin::default(); BPO]; OCT],
            schedule,
            octave_accumulators: [0; OCT],
            publish_cycle: 0,
            publishes: 0,
            mode: settings.dft_mode,
            dft_iir: settings.dft_iir,
            dft_update: settings.dft_update.max(1),
        })
    }

    /// Picks up decay and publish settings. Switching mode clears the bank,
    /// since the two modes use different phase advance scalings.
    pub fn configure(&mut self, settings: &Settings) {
        self.dft_iir = settings.dft_iir;
        self.dft_update = settings.dft_update.max(1);
        if settings.dft_mode != self.mode {
            self.mode = settings.dft_mode;
            self.clear();
        }
    }

    /// Installs one octave's worth of phase advances into every octave.
    ///
    /// In full mode each lower octave's advance is shifted right by its
    /// distance from the top octave, since every bin sees every sample.
    pub fn apply_frequency_table(&mut self, table: &[u16; BPO]) {
        for (octave, bins) in self.bins.iter_mut().enumerate() {
            let shift = match self.mode {
                DftMode::Progressive => 0,
                DftMode::Full => OCT - 1 - octave,
            };
            for (bin, &advance) in bins.iter_mut().zip(table.iter()) {
                bin.phase_advance = advance >> shift;
            }
        }
    }

    /// Feeds one audio sample.
    ///
    /// Progressive mode runs two scheduler ticks per sample so the top
    /// octave correlates at the full sample rate.
    #[inline]
    pub fn advance_one_sample(&mut self, sample: i16) {
        match self.mode {
            DftMode::Progressive => {
                self.tick(sample);
                self.tick(sample);
            }
            DftMode::Full => self.update_all(sample),
        }
    }

    /// One progressive scheduler tick.
    #[inline]
    pub fn tick(&mut self, sample: i16) {
        let slot = self.schedule.next_slot();
        for accumulator in self.octave_accumulators.iter_mut() {
            *accumulator += sample as i32;
        }

        match slot {
            ScheduleSlot::Publish => {
                self.publish_cycle += 1;
                if self.publish_cycle >= self.dft_update {
                    self.publish_cycle = 0;
                    self.publish();
                }
            }
            ScheduleSlot::Octave(octave) => {
                let octave = octave as usize;
                let filtered = (self.octave_accumulators[octave] >> (OCT - octave))
                    .clamp(i16::MIN as i32, i16::MAX as i32);
                self.octave_accumulators[octave] = 0;
                for bin in self.bins[octave].iter_mut() {
                    bin.correlate(filtered);
                }
            }
        }
    }

    fn update_all(&mut self, sample: i16) {
        self.publish_cycle += 1;
        let publish = self.publish_cycle >= self.dft_update;
        if publish {
            self.publish_cycle = 0;
            self.publishes += 1;
        }
        let dft_iir = self.dft_iir;
        for bin in self.bins.iter_mut().flatten() {
            if publish {
                bin.publish(dft_iir);
            }
            bin.correlate(sample as i32);
        }
    }

    fn publish(&mut self) {
        self.publishes += 1;
        let dft_iir = self.dft_iir;
        for bin in self.bins.iter_mut().flatten() {
            bin.publish(dft_iir);
        }
    }

    /// Zeroes correlations, snapshots, phases and accumulators. Phase
    /// advances are kept.
    pub fn clear(&mut self) {
        for bin in self.bins.iter_mut().flatten() {
            *bin = Bin { phase_advance: bin.phase_advance, ..Bin::default() };
        }
        self.octave_accumulators = [0; OCT];
        self.publish_cycle = 0;
        self.schedule.reset();
    }

    /// All bins, octave-major.
    pub fn bins(&self) -> &[[Bin; BPO]; OCT] {
        &self.bins
    }

    /// Number of snapshot/decay steps taken so far.
    pub fn publishes(&self) -> u64 {
        self.publishes
    }

    pub fn mode(&self) -> DftMode {
        self.mode
    }

    #[cfg(test)]
    pub(crate) fn bins_mut(&mut self) -> &mut [[Bin; BPO]; OCT] {
        &mut self.bins
    }
}
