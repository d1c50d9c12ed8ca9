//! # Fixed-Point Helpers
//!
//! Small named operations for the shift-encoded filters used throughout the
//! pipeline. Every IIR in the analyzer is written as a right shift rather
//! than a multiply, and every 16-bit output saturates instead of wrapping.
//! Keeping the arithmetic here makes each contract testable on its own.

/// Integer square root with arithmetic rounding.
///
/// Uses the "second-to-top bit" binary method: `one` starts at the highest
/// power of four not above the input and walks down two bits at a time.
/// A fractional part of one half or more rounds up.
///
/// # Examples
/// - `sqrt_rounded(2) == 1`
/// - `sqrt_rounded(3) == 2`
/// - `sqrt_rounded(8) == 3`
pub fn sqrt_rounded(input: u32) -> u32 {
    let mut op = input;
    let mut res: u32 = 0;
    let mut one: u32 = 1 << 30;

    while one > op {
        one >>= 2;
    }

    while one != 0 {
        if op >= res + one {
            op -= res + one;
            res += 2 * one;
        }
        res >>= 1;
        one >>= 2;
    }

    if op > res {
        res += 1;
    }
    res
}

/// Clamps a wide unsigned value into `u16`, reporting whether it clipped.
#[inline]
pub fn saturate_u16(value: u64) -> (u16, bool) {
    if value > u16::MAX as u64 {
        (u16::MAX, true)
    } else {
        (value as u16, false)
    }
}

/// Exponential leak `value -= value >> bits`.
#[inline]
pub fn leak_i32(value: i32, bits: u8) -> i32 {
    value - (value >> bits)
}

/// Exponential leak for unsigned 16-bit state.
///
/// The decrement is rounded up, so repeated leaking always reaches zero
/// instead of sticking at values below `1 << bits`.
#[inline]
pub fn leak_u16(value: u16, bits: u8) -> u16 {
    let mask = (1u32 << bits.min(16)) - 1;
    value - ((value as u32 + mask) >> bits.min(16)) as u16
}

/// One step of a shift-encoded IIR toward `target`:
/// `current - (current >> bits) + (target >> bits)`.
///
/// With `current` and `target` both in `u16` range the result stays in range,
/// so no clamping is needed beyond the final conversion.
#[inline]
pub fn iir_toward(current: u16, target: u16, bits: u8) -> u16 {
    let next = current as i32 - (current as i32 >> bits) + (target as i32 >> bits);
    next.clamp(0, u16::MAX as i32) as u16
}

/// Shortest distance between two positions on a circle of `range` units.
#[inline]
pub fn circular_distance(a: i16, b: i16, range: i32) -> i32 {
    let mut distance = (a as i32 - b as i32).abs();
    if distance * 2 > range {
        distance = range - distance;
    }
    distance
}

/// True when `distance`, measured against half of `range`, is within
/// `limit / 255` of it. This is how the jump and combine thresholds are
/// expressed as a byte regardless of the note resolution.
#[inline]
pub fn within_fraction(distance: i32, range: i32, limit: u8) -> bool {
    distance * 255 <= (range / 2) * limit as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqrt_rounding_law() {
        let expected = [(2, 1), (3, 2), (4, 2), (6, 2), (7, 3), (8, 3), (9, 3)];
        for (input, root) in expected {
            assert_eq!(sqrt_rounded(input), root, "sqrt_rounded({input})");
        }
        assert_eq!(sqrt_rounded(0), 0);
        assert_eq!(sqrt_rounded(1), 1);
    }

    #[test]
    fn sqrt_is_monotonic() {
        let mut previous = 0;
        for n in (0..200_000u32).chain((u32::MAX - 5000)..=u32::MAX) {
            let root = sqrt_rounded(n);
            assert!(root >= previous, "not monotonic at {n}");
            previous = root;
        }
        assert_eq!(sqrt_rounded(u32::MAX), 65536);
    }

    #[test]
    fn sqrt_matches_float_rounding() {
        for n in (0..1_000_000u32).step_by(997) {
            let float = (n as f64).sqrt().round() as u32;
            assert_eq!(sqrt_rounded(n), float, "n = {n}");
        }
    }

    #[test]
    fn saturation_clamps() {
        assert_eq!(saturate_u16(65_535), (65_535, false));
        assert_eq!(saturate_u16(65_536), (65_535, true));
        assert_eq!(saturate_u16(u64::MAX), (65_535, true));
    }

    #[test]
    fn iir_moves_toward_target() {
        assert_eq!(iir_toward(0, 65_535, 4), 4095);
        assert_eq!(iir_toward(65_535, 65_535, 4), 65_535);
        assert_eq!(iir_toward(1600, 0, 4), 1500);
        assert_eq!(iir_toward(100, 100, 0), 100);
    }

    #[test]
    fn unsigned_leak_reaches_zero() {
        assert_eq!(leak_u16(1000, 1), 500);
        assert_eq!(leak_u16(1600, 4), 1500);
        assert_eq!(leak_u16(1, 1), 0);
        assert_eq!(leak_u16(15, 4), 14);
        assert_eq!(leak_u16(65_535, 0), 0);

        let mut value = u16::MAX;
        let mut steps = 0;
        while value > 0 {
            value = leak_u16(value, 4);
            steps += 1;
        }
        assert!(steps < 300, "took {steps} steps");
    }

    #[test]
    fn circular_distance_wraps() {
        assert_eq!(circular_distance(2, 190, 192), 4);
        assert_eq!(circular_distance(190, 2, 192), 4);
        assert_eq!(circular_distance(10, 20, 192), 10);
        assert_eq!(circular_distance(0, 96, 192), 96);
    }

    #[test]
    fn fraction_threshold() {
        // 192 note units, half range 96: limit 4 allows distance 1 (255 <= 384).
        assert!(within_fraction(1, 192, 4));
        assert!(!within_fraction(2, 192, 4));
        assert!(within_fraction(2, 192, 7));
        assert!(!within_fraction(3, 192, 7));
    }
}
