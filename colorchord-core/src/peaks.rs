//! # Peak Picking
//!
//! Finds local maxima in the folded spectrum and refines each one to a
//! sub-bin frequency by linear interpolation toward its larger neighbor.
//!
//! Frequencies are in note units: `bins_per_octave << semi_bits_per_bin`
//! units per octave, wrapping at the top.

/// A local maximum of the folded spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Peak {
    /// Position in note units, in `[0, note_range)`.
    pub freq: i16,
    /// Folded bin value at the peak.
    pub amplitude: i32,
}

/// Iterator over the peaks of a folded spectrum, in ascending bin order.
#[derive(Debug, Clone)]
pub struct Peaks<'a, const BPO: usize> {
    folded: &'a [u16; BPO],
    index: usize,
    semi_bits: u8,
}

/// Yields every peak in `folded`.
///
/// Bin `i` is a peak when it is at least as large as both circular
/// neighbors and not equal to both of them, so flat plateaus yield
/// nothing. `BPO << semi_bits` must fit an `i16`.
pub fn find_peaks<const BPO: usize>(folded: &[u16; BPO], semi_bits: u8) -> Peaks<'_, BPO> {
    Peaks { folded, index: 0, semi_bits }
}

/// Sub-bin position of a peak at bin `index` with the given neighbors.
///
/// The offset is `(next - prev) / (this - lower)` in Q15, where `lower` is
/// the smaller neighbor, then rounded to `semi_bits` fractional bits. A
/// peak with one equal neighbor lands exactly halfway between the two.
fn interpolate_peak(index: usize, prev: i32, this: i32, next: i32, semi_bits: u8) -> i32 {
    let offset = if next < prev {
        -(((prev - next) << 15) / (this - next))
    } else {
        ((next - prev) << 15) / (this - prev)
    };
    ((index as i32) << semi_bits) + ((offset + (1 << (15 - semi_bits))) >> (16 - semi_bits))
}

impl<const BPO: usize> Iterator for Peaks<'_, BPO> {
    type Item = Peak;

    fn next(&mut self) -> Option<Peak> {
        let note_range = (BPO as i32) << self.semi_bits;
        while self.index < BPO {
            let i = self.index;
            self.index += 1;

            let prev = self.folded[(i + BPO - 1) % BPO] as i32;
            let this = self.folded[i] as i32;
            let next = self.folded[(i + 1) % BPO] as i32;
            if prev > this || next > this || (prev == this && next == this) {
                continue;
            }

            let freq = interpolate_peak(i, prev, this, next, self.semi_bits).rem_euclid(note_range);
            return Some(Peak { freq: freq as i16, amplitude: this });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect<const BPO: usize>(folded: [u16; BPO], semi_bits: u8) -> Vec<Peak> {
        find_peaks(&folded, semi_bits).collect()
    }

    #[test]
    fn symmetric_peak_sits_on_bin_center() {
        let mut folded = [0u16; 12];
        folded[4] = 100;
        folded[5] = 1000;
        folded[6] = 100;
        assert_eq!(collect(folded, 3), vec![Peak { freq: 40, amplitude: 1000 }]);
    }

    #[test]
    fn plateau_and_silence_yield_nothing() {
        assert!(collect([0u16; 12], 3).is_empty());
        assert!(collect([500u16; 12], 3).is_empty());
    }

    #[test]
    fn equal_neighbor_pair_meets_halfway() {
        let mut folded = [0u16; 12];
        folded[4] = 800;
        folded[5] = 800;
        let peaks = collect(folded, 3);
        // Both bins qualify and both land between them.
        assert_eq!(peaks.len(), 2);
        assert!(peaks.iter().all(|p| p.freq == 36), "{peaks:?}");
    }

    #[test]
    fn offset_leans_toward_larger_neighbor() {
        let mut folded = [0u16; 12];
        folded[5] = 1000;
        folded[6] = 500;
        folded[4] = 0;
        let peaks = collect(folded, 3);
        // offset = (500 << 15) / 1000 = 16384, (16384 + 4096) >> 13 = 2
        assert_eq!(peaks, vec![Peak { freq: 42, amplitude: 1000 }]);

        folded[6] = 0;
        folded[4] = 500;
        // -16384 + 4096 = -12288, >> 13 rounds down to -2
        assert_eq!(collect(folded, 3), vec![Peak { freq: 38, amplitude: 1000 }]);
    }

    #[test]
    fn wraps_below_zero_to_top_of_range() {
        let mut folded = [0u16; 12];
        folded[0] = 1000;
        folded[11] = 1000;
        let peaks = collect(folded, 3);
        assert_eq!(peaks.len(), 2);
        assert!(peaks.iter().all(|p| p.freq == 92), "{peaks:?}");
    }

    #[test]
    fn peaks_come_in_bin_order() {
        let folded = [0, 900, 0, 0, 300, 0, 0, 0, 700, 0, 0, 0u16];
        let freqs: Vec<i16> = collect(folded, 2).iter().map(|p| p.freq).collect();
        assert_eq!(freqs, vec![4, 16, 32]);
    }
}
