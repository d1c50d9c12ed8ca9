//! # Note Tracking
//!
//! Keeps a fixed pool of note slots alive across frames. Each frame's peaks
//! either reinforce the nearest existing note, spawn a new one in the lowest
//! free slot, or are dropped when the pool is full.
//!
//! ## Features
//! - Identity hysteresis: a note keeps its frequency while peaks stay within
//!   the jump distance
//! - Two amplitude trackers per note with separate attack and decay rates
//! - One-frame blips never allocate a note
//! - Close notes merge along the shorter arc of the note circle
//! - Notes that are no longer reinforced decay and are reaped
//!
//! Amplitude updates use `amp - (amp >> bits) + (target >> bits)`, attack
//! bits when the target is above the current value and decay bits otherwise.

use tracing::debug;

use crate::config::Settings;
use crate::fixed::{circular_distance, iir_toward, within_fraction};
use crate::peaks::Peak;

/// Frequency of an unoccupied slot.
pub const EMPTY_FREQUENCY: i16 = -1;

/// One tracked note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteSlot {
    /// Position in note units, or [`EMPTY_FREQUENCY`] when free.
    pub frequency: i16,
    /// Slow amplitude tracker.
    pub amp_slow: u16,
    /// Fast amplitude tracker.
    pub amp_fast: u16,
    /// Index + 1 of the slot this note merged into during the last frame, 0 if none.
    pub merged_into: u8,
}

impl NoteSlot {
    pub const EMPTY: Self = Self { frequency: EMPTY_FREQUENCY, amp_slow: 0, amp_fast: 0, merged_into: 0 };

    pub fn is_occupied(&self) -> bool {
        self.frequency >= 0
    }
}

impl Default for NoteSlot {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Lifetime event counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerCounters {
    pub spawned: u64,
    pub merged: u64,
    pub reaped: u64,
    /// New notes killed on arrival for being too quiet.
    pub blips: u64,
    /// Peaks with no matching note and no free slot.
    pub dropped_peaks: u64,
}

/// A fixed pool of `NOTES` note slots.
#[derive(Debug, Clone)]
pub struct NoteTracker<const NOTES: usize> {
    slots: [NoteSlot; NOTES],
    hit: [bool; NOTES],
    rising: [bool; NOTES],
    counters: TrackerCounters,
}

impl<const NOTES: usize> Default for NoteTracker<NOTES> {
    fn default() -> Self {
        Self {
            slots: [NoteSlot::EMPTY; NOTES],
            hit: [false; NOTES],
            rising: [false; NOTES],
            counters: TrackerCounters::default(),
        }
    }
}

#[inline]
fn approach(current: u16, target: u16, attack_bits: u8, decay_bits: u8) -> u16 {
    let bits = if target > current { attack_bits } else { decay_bits };
    iir_toward(current, target, bits)
}

#[inline]
fn scaled_target(amplitude: i32, mult: u8) -> u32 {
    ((amplitude.max(0) as u64 * mult as u64) >> 4).min(u16::MAX as u64) as u32
}

/// Amplitude-weighted mean of two note positions along the shorter arc.
fn weighted_circular_mean(into: &NoteSlot, from: &NoteSlot, note_range: i32) -> i16 {
    let mut delta = from.frequency as i32 - into.frequency as i32;
    if delta * 2 > note_range {
        delta -= note_range;
    } else if delta * 2 < -note_range {
        delta += note_range;
    }
    let total = into.amp_slow as i64 + from.amp_slow as i64;
    if total == 0 {
        return into.frequency;
    }
    // Rounded delta * amp_from / total.
    let shift = (delta as i64 * from.amp_slow as i64 * 2 + total).div_euclid(2 * total);
    (into.frequency as i64 + shift).rem_euclid(note_range as i64) as i16
}

impl<const NOTES: usize> NoteTracker<NOTES> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs one frame of tracking: match every peak, then merge, decay and reap.
    ///
    /// # Arguments
    /// * `peaks` - This frame's peaks, in any order
    /// * `settings` - Thresholds and amplitude rates
    /// * `note_range` - Note units per octave
    pub fn ingest_peaks<I>(&mut self, peaks: I, settings: &Settings, note_range: i32)
    where
        I: IntoIterator<Item = Peak>,
    {
        self.hit = [false; NOTES];
        self.rising = [false; NOTES];
        for slot in self.slots.iter_mut() {
            slot.merged_into = 0;
        }

        for peak in peaks {
            self.track_peak(peak, settings, note_range);
        }
        if settings.max_combine_distance > 0 {
            self.merge_close_notes(settings.max_combine_distance, note_range);
        }
        self.decay_unhit(settings);
        self.reap(settings);
    }

    fn track_peak(&mut self, peak: Peak, settings: &Settings, note_range: i32) {
        let mut closest: Option<(usize, i32)> = None;
        let mut lowest_free = None;
        for (index, slot) in self.slots.iter().enumerate() {
            if !slot.is_occupied() {
                lowest_free = lowest_free.or(Some(index));
                continue;
            }
            let distance = circular_distance(peak.freq, slot.frequency, note_range);
            if closest.is_none_or(|(_, best)| distance < best) {
                closest = Some((index, distance));
            }
        }

        let (index, is_new) = match closest {
            Some((index, distance)) if within_fraction(distance, note_range, settings.max_jump_distance) => {
                (index, false)
            }
            _ => match lowest_free {
                Some(index) => {
                    self.slots[index] = NoteSlot { frequency: peak.freq, ..NoteSlot::EMPTY };
                    (index, true)
                }
                None => {
                    self.counters.dropped_peaks += 1;
                    return;
                }
            },
        };

        let target_slow = scaled_target(peak.amplitude, settings.amp_1_mult);
        let target_fast = scaled_target(peak.amplitude, settings.amp_2_mult);
        let slot = &mut self.slots[index];
        let before = slot.amp_slow;
        slot.amp_slow = approach(slot.amp_slow, target_slow as u16, settings.amp1_attack_bits, settings.amp1_decay_bits);
        slot.amp_fast = approach(slot.amp_fast, target_fast as u16, settings.amp2_attack_bits, settings.amp2_decay_bits);
        self.hit[index] = true;
        self.rising[index] |= slot.amp_slow > before;

        if is_new {
            if target_slow < (settings.min_amp_for_note as u32) << 8 {
                *slot = NoteSlot::EMPTY;
                self.counters.blips += 1;
            } else {
                self.counters.spawned += 1;
                debug!(slot = index, freq = peak.freq, amp = target_slow, "note spawned");
            }
        }
    }

    /// Folds every pair of notes closer than `limit` into the louder one.
    /// Ties go to the lower index.
    fn merge_close_notes(&mut self, limit: u8, note_range: i32) {
        for i in 0..NOTES {
            for j in 0..i {
                let (a, b) = (self.slots[i], self.slots[j]);
                if !a.is_occupied() || !b.is_occupied() {
                    continue;
                }
                let distance = circular_distance(a.frequency, b.frequency, note_range);
                if !within_fraction(distance, note_range, limit) {
                    continue;
                }

                let (into, from) = if a.amp_slow > b.amp_slow { (i, j) } else { (j, i) };
                let frequency = weighted_circular_mean(&self.slots[into], &self.slots[from], note_range);
                self.slots[into].frequency = frequency;
                self.slots[from] = NoteSlot { merged_into: into as u8 + 1, ..NoteSlot::EMPTY };
                self.counters.merged += 1;
                debug!(from, into, freq = frequency, "notes merged");
            }
        }
    }

    /// `amp -= amp >> decay_bits` for every occupied slot no peak reached.
    /// The reap threshold frees a note long before this could stall.
    fn decay_unhit(&mut self, settings: &Settings) {
        for (slot, &hit) in self.slots.iter_mut().zip(self.hit.iter()) {
            if slot.is_occupied() && !hit {
                slot.amp_slow -= slot.amp_slow >> settings.amp1_decay_bits;
                slot.amp_fast -= slot.amp_fast >> settings.amp2_decay_bits;
            }
        }
    }

    /// Frees quiet notes. A note that is still climbing toward its target
    /// this frame is spared until it stops rising.
    fn reap(&mut self, settings: &Settings) {
        let threshold = (settings.minimum_amp_for_note_to_disappear as u32) << 8;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_occupied() && (slot.amp_slow as u32) < threshold && !self.rising[index] {
                debug!(slot = index, freq = slot.frequency, "note reaped");
                *slot = NoteSlot::EMPTY;
                self.counters.reaped += 1;
            }
        }
    }

    /// Forgets every note. Counters are kept.
    pub fn clear(&mut self) {
        self.slots = [NoteSlot::EMPTY; NOTES];
        self.hit = [false; NOTES];
        self.rising = [false; NOTES];
    }

    pub fn slots(&self) -> &[NoteSlot; NOTES] {
        &self.slots
    }

    /// Occupied slots with their indices.
    pub fn active_notes(&self) -> impl Iterator<Item = (usize, &NoteSlot)> {
        self.slots.iter().enumerate().filter(|(_, slot)| slot.is_occupied())
    }

    pub fn note_peak_freqs(&self) -> [i16; NOTES] {
        std::array::from_fn(|i| self.slots[i].frequency)
    }

    pub fn note_peak_amps(&self) -> [u16; NOTES] {
        std::array::from_fn(|i| self.slots[i].amp_slow)
    }

    pub fn note_peak_amps2(&self) -> [u16; NOTES] {
        std::array::from_fn(|i| self.slots[i].amp_fast)
    }

    pub fn note_jumped_to(&self) -> [u8; NOTES] {
        std::array::from_fn(|i| self.slots[i].merged_into)
    }

    pub fn counters(&self) -> TrackerCounters {
        self.counters
    }
}
