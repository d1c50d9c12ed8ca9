//! # Frequency Tables
//!
//! Per-bin phase advances for one octave of the bank, equal-tempered from a
//! base frequency:
//!
//! `advance[i] = round(65536 / sample_rate * base_freq * 2^(i / BPO) * 2^(octaves - 1))`
//!
//! The `2^(octaves - 1)` factor places the table at the top octave; in
//! progressive mode lower octaves reuse it unchanged because they are
//! updated at a proportionally lower rate.
//!
//! Two builders exist. [`build_frequency_table`] uses floating point and is
//! meant for init time or retuning. [`precomputed_frequency_table`] is a
//! `const fn` so the table can be baked into the binary; it only supports
//! 12, 24, 36 or 48 bins per octave and any other size fails to compile.

use tracing::warn;

use crate::error::ConfigError;

/// Equal-tempered ratios `2^(i/12)`.
pub const RATIOS_12: [f64; 12] = [
    1.000000, 1.059463, 1.122462, 1.189207, 1.259921, 1.334840, 1.414214, 1.498307, 1.587401,
    1.681793, 1.781797, 1.887749,
];

/// Equal-tempered ratios `2^(i/24)`.
pub const RATIOS_24: [f64; 24] = [
    1.000000, 1.029302, 1.059463, 1.090508, 1.122462, 1.155353, 1.189207, 1.224054, 1.259921,
    1.296840, 1.334840, 1.373954, 1.414214, 1.455653, 1.498307, 1.542211, 1.587401, 1.633915,
    1.681793, 1.731073, 1.781797, 1.834008, 1.887749, 1.943064,
];

/// Equal-tempered ratios `2^(i/36)`.
pub const RATIOS_36: [f64; 36] = [
    1.000000, 1.019441, 1.039259, 1.059463, 1.080060, 1.101057, 1.122462, 1.144283, 1.166529,
    1.189207, 1.212326, 1.235894, 1.259921, 1.284415, 1.309385, 1.334840, 1.360790, 1.387245,
    1.414214, 1.441707, 1.469734, 1.498307, 1.527435, 1.557129, 1.587401, 1.618261, 1.649721,
    1.681793, 1.714488, 1.747819, 1.781797, 1.816437, 1.851749, 1.887749, 1.924448, 1.961860,
];

/// Equal-tempered ratios `2^(i/48)`.
pub const RATIOS_48: [f64; 48] = [
    1.000000, 1.014545, 1.029302, 1.044274, 1.059463, 1.074873, 1.090508, 1.106370, 1.122462,
    1.138789, 1.155353, 1.172158, 1.189207, 1.206505, 1.224054, 1.241858, 1.259921, 1.278247,
    1.296840, 1.315703, 1.334840, 1.354256, 1.373954, 1.393938, 1.414214, 1.434784, 1.455653,
    1.476826, 1.498307, 1.520100, 1.542211, 1.564643, 1.587401, 1.610490, 1.633915, 1.657681,
    1.681793, 1.706255, 1.731073, 1.756252, 1.781797, 1.807714, 1.834008, 1.860684, 1.887749,
    1.915207, 1.943064, 1.971326,
];

/// Phase advance scale for the top octave: `65536 / sample_rate * 2^(octaves - 1)`.
/// Callers check `octaves` against `1..=MAX_OCTAVES` first.
const fn top_octave_scale(sample_rate: u32, octaves: u32) -> f64 {
    65536.0 / sample_rate as f64 * (1u64 << octaves.saturating_sub(1)) as f64
}

/// Builds a table at compile time from the stored ratio constants.
///
/// Instantiating this with a `BPO` other than 12, 24, 36 or 48 is a
/// compile error.
///
/// # Panics
/// If `octaves` is outside `1..=8` or `sample_rate` is zero. In a `const`
/// item this is reported at compile time.
pub const fn precomputed_frequency_table<const BPO: usize>(
    base_freq: f64,
    sample_rate: u32,
    octaves: u32,
) -> [u16; BPO] {
    const {
        assert!(
            BPO == 12 || BPO == 24 || BPO == 36 || BPO == 48,
            "precomputed frequency tables exist only for 12, 24, 36 or 48 bins per octave"
        )
    };
    assert!(
        octaves >= 1 && octaves as usize <= crate::schedule::MAX_OCTAVES,
        "octaves must be in 1..=8"
    );
    assert!(sample_rate > 0, "sample rate must be nonzero");
    let ratios: &[f64] = match BPO {
        12 => &RATIOS_12,
        24 => &RATIOS_24,
        36 => &RATIOS_36,
        _ => &RATIOS_48,
    };
    let scale = top_octave_scale(sample_rate, octaves) * base_freq;
    let mut table = [0u16; BPO];
    let mut i = 0;
    while i < BPO {
        table[i] = (ratios[i] * scale + 0.5) as u16;
        i += 1;
    }
    table
}

/// Reference table: 24 bins per octave, 5 octaves from 55 Hz at 16 kHz.
pub const REFERENCE_TABLE: [u16; 24] = precomputed_frequency_table::<24>(55.0, 16_000, 5);

/// Builds a table at runtime.
///
/// # Arguments
/// * `base_freq` - Frequency of bin 0 in the lowest octave, in Hz
/// * `sample_rate` - Sample rate in Hz
/// * `octaves` - Number of octaves in the bank
///
/// # Returns
/// * `Err(ConfigError::InvalidTuning)` - non-positive frequency or zero rate
/// * `Err(ConfigError::AdvanceOverflow)` - some advance does not fit 16 bits
pub fn build_frequency_table<const BPO: usize>(
    base_freq: f32,
    sample_rate: u32,
    octaves: usize,
) -> Result<[u16; BPO], ConfigError> {
    if !(base_freq.is_finite() && base_freq > 0.0) || sample_rate == 0 {
        return Err(ConfigError::InvalidTuning { base_freq, sample_rate });
    }
    if !(1..=crate::schedule::MAX_OCTAVES).contains(&octaves) {
        return Err(ConfigError::UnsupportedOctaves(octaves));
    }
    if BPO == 0 {
        return Err(ConfigError::UnsupportedBinsPerOctave(BPO));
    }

    let scale = top_octave_scale(sample_rate, octaves as u32) * base_freq as f64;
    let mut table = [0u16; BPO];
    for (i, advance) in table.iter_mut().enumerate() {
        let value = scale * 2f64.powf(i as f64 / BPO as f64) + 0.5;
        if value >= 65536.0 {
            return Err(ConfigError::AdvanceOverflow { bin: i, value });
        }
        *advance = value as u16;
    }

    if let Some(&top) = table.last() {
        if top >= 1 << 15 {
            warn!(top, "top bin is above the Nyquist frequency and will alias");
        }
    }
    Ok(table)
}

/// Frequency in Hz that a phase advance tracks in `octave` of a progressive bank.
///
/// # Returns
/// * `None` - `octave` is not one of the bank's `octaves`
pub fn advance_to_hz(advance: u16, sample_rate: u32, octave: usize, octaves: usize) -> Option<f64> {
    let shift = octaves.checked_sub(1)?.checked_sub(octave)?;
    let divisor = 1u64.checked_shl(u32::try_from(shift).ok()?)?;
    Some(advance as f64 * sample_rate as f64 / 65536.0 / divisor as f64)
}
