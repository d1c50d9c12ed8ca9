//! # Configuration Errors
//!
//! Everything that can go wrong in this crate goes wrong at setup time.
//! Once an engine has been built, the per-sample and per-frame paths are
//! infallible: overflow is handled by saturation, never by an error.

use thiserror::Error;

/// A configuration that cannot be turned into a working engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// The octave count is outside what the schedule table can express.
    #[error("unsupported octave count {0} (expected 1..=8)")]
    UnsupportedOctaves(usize),

    /// The bit-pattern search for a schedule slot ran past the octave count.
    #[error("octave schedule fault at cycle position {position} for {octaves} octaves")]
    ScheduleFault { position: usize, octaves: usize },

    /// Bins per octave must be non-zero and small enough for the note range.
    #[error("unsupported bins per octave {0}")]
    UnsupportedBinsPerOctave(usize),

    /// At least one note slot is required, and slot indices must fit a `u8`.
    #[error("unsupported note slot count {0} (expected 1..=255)")]
    UnsupportedNoteCount(usize),

    /// A phase advance does not fit in the 8.8 fixed-point format.
    #[error("phase advance for bin {bin} overflows 16 bits ({value:.1})")]
    AdvanceOverflow { bin: usize, value: f64 },

    /// Base frequency or sample rate is zero, negative or not finite.
    #[error("invalid tuning: base frequency {base_freq} Hz at {sample_rate} Hz")]
    InvalidTuning { base_freq: f32, sample_rate: u32 },

    /// A named setting exists but the value is outside its accepted range.
    #[error("setting `{name}` out of range: {value} (allowed {min}..={max})")]
    OutOfRange {
        name: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    /// No tunable with this name exists.
    #[error("unknown setting `{0}`")]
    UnknownSetting(String),

    /// An equalizer profile whose length does not match the bank.
    #[error("equalizer profile has {got} bins, expected {expected}")]
    EqualizerProfileLength { got: usize, expected: usize },
}
