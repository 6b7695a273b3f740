// Copyright 2024 kasane
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    cmp::{max, min},
    fmt::{Display, Formatter},
};

use kasane_common::{TsNs, UnitOffset};
use tracing::warn;

/// WrittenRange is a part of a storage unit that holds valid data.
///
/// Offsets are relative to the start of the unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrittenRange {
    pub start: UnitOffset,
    pub stop:  UnitOffset,
    pub ts_ns: TsNs,
}

impl WrittenRange {
    pub fn new(start: UnitOffset, stop: UnitOffset, ts_ns: TsNs) -> Self {
        debug_assert!(start < stop, "empty written range [{start}, {stop})");
        Self { start, stop, ts_ns }
    }

    pub fn size(&self) -> u64 { self.stop - self.start }
}

impl Display for WrittenRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})@{}", self.start, self.stop, self.ts_ns)
    }
}

/// What happened to one [WrittenIntervalTracker::mark_written] call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MarkOutcome {
    pub accepted_bytes: u64,
    /// Bytes already held by a newer write, they keep the newer timestamp.
    pub dropped_bytes:  u64,
}

impl MarkOutcome {
    pub fn is_out_of_order(&self) -> bool { self.dropped_bytes > 0 }
}

/// WrittenIntervalTracker records which ranges of a storage unit were written
/// and when.
///
/// The ranges are sorted by offset and never overlap. A newer write replaces
/// whatever it covers, an older write never replaces a newer one. Adjacent
/// ranges are kept apart, even with the same timestamp, so every write stays
/// visible with its own time.
///
/// The tracker itself is not synchronized, the owning unit guards it.
#[derive(Debug, Default)]
pub struct WrittenIntervalTracker {
    ranges:              Vec<WrittenRange>,
    out_of_order_writes: u64,
}

impl WrittenIntervalTracker {
    pub fn new() -> Self { Self::default() }

    /// Record that `[start, stop)` was written at `ts_ns`.
    ///
    /// Existing ranges that are not newer than the write are trimmed or
    /// removed where they overlap it. Parts of the write that overlap a newer
    /// range are dropped and reported in the outcome.
    pub fn mark_written(&mut self, start: UnitOffset, stop: UnitOffset, ts_ns: TsNs) -> MarkOutcome {
        let mut outcome = MarkOutcome::default();
        if start >= stop {
            return outcome;
        }

        // ranges[lo..hi] are the ones overlapping the write.
        let lo = self.ranges.partition_point(|r| r.stop <= start);
        let hi = self.ranges.partition_point(|r| r.start < stop);

        let mut replacement = Vec::with_capacity(hi - lo + 2);
        let mut cursor = start;
        let mut right = None;
        for r in &self.ranges[lo..hi] {
            if r.ts_ns > ts_ns {
                if cursor < r.start {
                    replacement.push(WrittenRange::new(cursor, r.start, ts_ns));
                    outcome.accepted_bytes += r.start - cursor;
                }
                outcome.dropped_bytes += min(r.stop, stop) - max(r.start, start);
                replacement.push(*r);
                cursor = max(cursor, r.stop);
            } else {
                if r.start < start {
                    replacement.push(WrittenRange::new(r.start, start, r.ts_ns));
                }
                if r.stop > stop {
                    right = Some(WrittenRange::new(stop, r.stop, r.ts_ns));
                }
            }
        }
        if cursor < stop {
            replacement.push(WrittenRange::new(cursor, stop, ts_ns));
            outcome.accepted_bytes += stop - cursor;
        }
        replacement.extend(right);
        self.ranges.splice(lo..hi, replacement);

        if outcome.is_out_of_order() {
            self.out_of_order_writes += 1;
            warn!(
                "out of order write [{}, {})@{}, {} bytes are held by newer writes",
                start, stop, ts_ns, outcome.dropped_bytes
            );
        }
        outcome
    }

    /// The parts of `[start, stop)` a write at `ts_ns` would own, the ones
    /// not held by a newer range.
    pub fn accepted_pieces(&self, start: UnitOffset, stop: UnitOffset, ts_ns: TsNs) -> Vec<(UnitOffset, UnitOffset)> {
        let mut pieces = Vec::new();
        if start >= stop {
            return pieces;
        }
        let lo = self.ranges.partition_point(|r| r.stop <= start);
        let hi = self.ranges.partition_point(|r| r.start < stop);
        let mut cursor = start;
        for r in self.ranges[lo..hi].iter().filter(|r| r.ts_ns > ts_ns) {
            if cursor < r.start {
                pieces.push((cursor, r.start));
            }
            cursor = max(cursor, r.stop);
        }
        if cursor < stop {
            pieces.push((cursor, stop));
        }
        pieces
    }

    /// The ranges cover `[0, total_size)` without any gap.
    pub fn is_complete(&self, total_size: u64) -> bool {
        let mut covered = 0;
        for r in &self.ranges {
            if covered >= total_size {
                break;
            }
            if r.start > covered {
                return false;
            }
            covered = max(covered, r.stop);
        }
        covered >= total_size
    }

    /// Walk the valid ranges in offset order, each call starts over.
    pub fn iter(&self) -> impl Iterator<Item = &WrittenRange> + '_ { self.ranges.iter() }

    pub fn ranges(&self) -> &[WrittenRange] { &self.ranges }

    pub fn len(&self) -> usize { self.ranges.len() }

    pub fn is_empty(&self) -> bool { self.ranges.is_empty() }

    pub fn written_bytes(&self) -> u64 { self.ranges.iter().map(WrittenRange::size).sum() }

    /// How many writes lost bytes to newer writes.
    pub fn out_of_order_writes(&self) -> u64 { self.out_of_order_writes }
}

impl<'a> IntoIterator for &'a WrittenIntervalTracker {
    type IntoIter = std::slice::Iter<'a, WrittenRange>;
    type Item = &'a WrittenRange;

    fn into_iter(self) -> Self::IntoIter { self.ranges.iter() }
}
