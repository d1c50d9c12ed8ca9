//! # Octave Scheduler
//!
//! Decides which single octave of the bank is correlated on each scheduler
//! tick. The top octave runs every other tick, the next one down every fourth
//! tick, and so on; one slot per cycle is reserved for publishing snapshots.
//! Because only one octave is visited per tick, the per-tick cost is
//! `2 * bins_per_octave` multiply-adds no matter how many octaves exist.
//!
//! For five octaves the cycle reads:
//! `P 4 3 4 2 4 3 4 1 4 3 4 2 4 3 4 0 4 3 4 2 4 3 4 1 4 3 4 2 4 3 4`

use crate::error::ConfigError;

/// Largest octave count whose cycle fits the fixed table.
pub const MAX_OCTAVES: usize = 8;
const MAX_CYCLE: usize = 1 << MAX_OCTAVES;

/// What a scheduler tick does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleSlot {
    /// Sentinel: no correlation update, possibly publish and decay.
    Publish,
    /// Correlate the bins of this octave.
    Octave(u8),
}

/// Cyclic octave schedule plus its round-robin read position.
#[derive(Debug, Clone)]
pub struct OctaveSchedule {
    slots: [ScheduleSlot; MAX_CYCLE],
    cycle: usize,
    position: usize,
}

/// Builds the schedule for `octaves` octaves.
///
/// Slot 0 is the publish sentinel. Slot `i + 1` is
/// `octaves - j - 1` where `j` is the index of the lowest zero bit of `i`.
///
/// # Returns
/// * `Err(ConfigError::UnsupportedOctaves)` - `octaves` outside `1..=8`
/// * `Err(ConfigError::ScheduleFault)` - the bit search ran past `octaves`
pub fn build_schedule(octaves: usize) -> Result<OctaveSchedule, ConfigError> {
    if !(1..=MAX_OCTAVES).contains(&octaves) {
        return Err(ConfigError::UnsupportedOctaves(octaves));
    }
    let cycle = 1usize << octaves;
    let mut slots = [ScheduleSlot::Publish; MAX_CYCLE];

    for i in 0..cycle - 1 {
        let j = (0..=octaves).find(|&j| i & (1 << j) == 0).unwrap_or(octaves + 1);
        if j >= octaves {
            return Err(ConfigError::ScheduleFault { position: i + 1, octaves });
        }
        slots[i + 1] = ScheduleSlot::Octave((octaves - j - 1) as u8);
    }

    Ok(OctaveSchedule { slots, cycle, position: 0 })
}

impl OctaveSchedule {
    /// Returns the slot for this tick and advances the read position.
    #[inline]
    pub fn next_slot(&mut self) -> ScheduleSlot {
        let slot = self.slots[self.position];
        self.position = (self.position + 1) & (self.cycle - 1);
        slot
    }

    /// Number of ticks in one full cycle (`2^octaves`).
    pub fn cycle_len(&self) -> usize {
        self.cycle
    }

    /// The slots of one cycle, sentinel first.
    pub fn slots(&self) -> &[ScheduleSlot] {
        &self.slots[..self.cycle]
    }

    /// Rewinds to the sentinel.
    pub fn reset(&mut self) {
        self.position = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_octave_pattern() {
        let schedule = build_schedule(5).unwrap();
        let rendered: Vec<i32> = schedule
            .slots()
            .iter()
            .map(|s| match s {
                ScheduleSlot::Publish => -1,
                ScheduleSlot::Octave(o) => *o as i32,
            })
            .collect();
        assert_eq!(
            rendered,
            vec![
                -1, 4, 3, 4, 2, 4, 3, 4, 1, 4, 3, 4, 2, 4, 3, 4, 0, 4, 3, 4, 2, 4, 3, 4, 1, 4, 3, 4,
                2, 4, 3, 4
            ]
        );
    }

    #[test]
    fn valid_for_all_supported_octave_counts() {
        for octaves in 1..=MAX_OCTAVES {
            let schedule = build_schedule(octaves).unwrap();
            assert_eq!(schedule.cycle_len(), 1 << octaves);
            let slots = schedule.slots();
            assert_eq!(slots[0], ScheduleSlot::Publish);
            for (i, slot) in slots.iter().enumerate().skip(1) {
                match slot {
                    ScheduleSlot::Octave(o) => assert!((*o as usize) < octaves),
                    ScheduleSlot::Publish => panic!("second sentinel at {i} for {octaves} octaves"),
                }
                // Top octave on every odd slot.
                if i % 2 == 1 {
                    assert_eq!(*slot, ScheduleSlot::Octave((octaves - 1) as u8));
                }
            }
        }
    }

    #[test]
    fn each_octave_visited_at_halving_rate() {
        let octaves = 6;
        let schedule = build_schedule(octaves).unwrap();
        for o in 0..octaves {
            let visits = schedule
                .slots()
                .iter()
                .filter(|s| **s == ScheduleSlot::Octave(o as u8))
                .count();
            assert_eq!(visits, 1 << o, "octave {o}");
        }
    }

    #[test]
    fn rejects_unsupported_counts() {
        assert_eq!(build_schedule(0).unwrap_err(), ConfigError::UnsupportedOctaves(0));
        assert_eq!(build_schedule(9).unwrap_err(), ConfigError::UnsupportedOctaves(9));
    }

    #[test]
    fn next_slot_wraps() {
        let mut schedule = build_schedule(2).unwrap();
        let seen: Vec<ScheduleSlot> = (0..5).map(|_| schedule.next_slot()).collect();
        assert_eq!(
            seen,
            vec![
                ScheduleSlot::Publish,
                ScheduleSlot::Octave(1),
                ScheduleSlot::Octave(0),
                ScheduleSlot::Octave(1),
                ScheduleSlot::Publish,
            ]
        );
    }
}
