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

use std::fmt::{Display, Formatter};

use kasane_common::{FileOffset, TsNs};
use kasane_types::{ContentRef, FileChunk};
use tracing::trace;

use crate::point::{sweep_points, Point};

/// VisibleInterval is a byte range of an object owned by exactly one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleInterval {
    pub start:          FileOffset,
    pub stop:           FileOffset,
    pub modified_ts_ns: TsNs,
    pub content:        ContentRef,
    /// Where `start` lands inside the chunk's content.
    pub chunk_offset:   u64,
    /// The full size of the owning chunk.
    pub chunk_size:     u64,
}

impl VisibleInterval {
    fn new(start: FileOffset, stop: FileOffset, chunk: &FileChunk) -> Self {
        Self {
            start,
            stop,
            modified_ts_ns: chunk.modified_ts_ns(),
            content: chunk.content().clone(),
            chunk_offset: start - chunk.offset(),
            chunk_size: chunk.size(),
        }
    }

    pub fn len(&self) -> u64 { self.stop - self.start }
}

impl Display for VisibleInterval {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {})@{} {}+{}",
            self.start, self.stop, self.modified_ts_ns, self.content, self.chunk_offset
        )
    }
}

/// Resolve the chunks of an object into the ranges a reader sees.
///
/// The result is sorted by `start` and never overlaps. Each byte belongs to
/// the newest chunk covering it. Between chunks with the same timestamp the
/// one that became visible first keeps the bytes until it ends.
///
/// The function is pure, any permutation of `chunks` gives the same result.
pub fn resolve_visible_intervals(chunks: &[FileChunk]) -> Vec<VisibleInterval> {
    let points = sweep_points(chunks);

    let mut visibles = Vec::new();
    // chunks covering the sweep position, the newest one at the tail.
    let mut active: Vec<&Point<'_>> = Vec::new();
    let mut prev_x: FileOffset = 0;
    for point in &points {
        if point.is_start {
            if let Some(last) = active.last() {
                if last.ts < point.ts {
                    push_visible(&mut visibles, prev_x, point.x, last.chunk);
                }
            }
            // equal timestamps go before the incumbent.
            let pos = active.partition_point(|p| p.ts < point.ts);
            if pos == active.len() {
                prev_x = point.x;
            }
            active.insert(pos, point);
        } else {
            let Some(pos) = active.iter().rposition(|p| p.id == point.id) else {
                debug_assert!(false, "stop point without start: {}", point.chunk);
                continue;
            };
            let was_last = pos + 1 == active.len();
            active.remove(pos);
            if was_last {
                push_visible(&mut visibles, prev_x, point.x, point.chunk);
                prev_x = point.x;
            }
        }
    }

    trace!(
        "resolved {} chunks into {} visible intervals",
        chunks.len(),
        visibles.len()
    );
    visibles
}

fn push_visible(
    visibles: &mut Vec<VisibleInterval>,
    start: FileOffset,
    stop: FileOffset,
    chunk: &FileChunk,
) {
    if start < stop {
        visibles.push(VisibleInterval::new(start, stop, chunk));
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};

    use super::*;

    fn chunk(id: &str, offset: u64, size: u64, ts: TsNs) -> FileChunk {
        FileChunk::new(ContentRef::new(id), offset, size, ts).unwrap()
    }

    fn ranges(visibles: &[VisibleInterval]) -> Vec<(u64, u64, TsNs)> {
        visibles
            .iter()
            .map(|v| (v.start, v.stop, v.modified_ts_ns))
            .collect()
    }

    #[test]
    fn empty() {
        assert!(resolve_visible_intervals(&[]).is_empty());
        assert!(resolve_visible_intervals(&[chunk("a", 5, 0, 1)]).is_empty());
    }

    #[test]
    fn newer_tail_overwrites() {
        let visibles = resolve_visible_intervals(&[chunk("a", 0, 10, 1), chunk("b", 5, 10, 2)]);
        assert_eq!(ranges(&visibles), vec![(0, 5, 1), (5, 15, 2)]);
        assert_eq!(visibles[1].chunk_offset, 0);
        assert_eq!(visibles[1].content.file_id, "b");
    }

    #[test]
    fn newer_head_keeps_overlap() {
        let visibles = resolve_visible_intervals(&[chunk("a", 0, 10, 2), chunk("b", 5, 10, 1)]);
        assert_eq!(ranges(&visibles), vec![(0, 10, 2), (10, 15, 1)]);
        // the second interval starts 5 bytes into chunk b.
        assert_eq!(visibles[1].chunk_offset, 5);
        assert_eq!(visibles[1].chunk_size, 10);
    }

    #[test]
    fn full_overwrites_out_of_order() {
        let visibles = resolve_visible_intervals(&[
            chunk("a", 0, 10, 1),
            chunk("c", 0, 10, 3),
            chunk("b", 0, 10, 2),
        ]);
        assert_eq!(ranges(&visibles), vec![(0, 10, 3)]);
        assert_eq!(visibles[0].content.file_id, "c");
    }

    #[test]
    fn nested() {
        let visibles = resolve_visible_intervals(&[
            chunk("base", 0, 20, 1),
            chunk("mid", 5, 5, 3),
            chunk("next", 10, 5, 2),
        ]);
        assert_eq!(
            ranges(&visibles),
            vec![(0, 5, 1), (5, 10, 3), (10, 15, 2), (15, 20, 1)]
        );
        assert_eq!(visibles[3].chunk_offset, 15);
    }

    #[test]
    fn older_inside_newer_is_hidden() {
        let visibles = resolve_visible_intervals(&[chunk("new", 0, 20, 5), chunk("old", 5, 5, 1)]);
        assert_eq!(ranges(&visibles), vec![(0, 20, 5)]);
    }

    #[test]
    fn adjacent_and_gaps() {
        let visibles = resolve_visible_intervals(&[
            chunk("a", 0, 10, 2),
            chunk("b", 10, 10, 1),
            chunk("c", 30, 5, 3),
        ]);
        assert_eq!(ranges(&visibles), vec![(0, 10, 2), (10, 20, 1), (30, 35, 3)]);
    }

    #[test]
    fn equal_timestamps_do_not_flicker() {
        let visibles = resolve_visible_intervals(&[chunk("b", 5, 10, 7), chunk("a", 0, 10, 7)]);
        assert_eq!(ranges(&visibles), vec![(0, 10, 7), (10, 15, 7)]);
        assert_eq!(visibles[0].content.file_id, "a");
        assert_eq!(visibles[1].content.file_id, "b");
        assert_eq!(visibles[1].chunk_offset, 5);

        // identical ranges, the first in identity order wins.
        let visibles = resolve_visible_intervals(&[chunk("y", 0, 10, 7), chunk("x", 0, 10, 7)]);
        assert_eq!(visibles.len(), 1);
        assert_eq!(visibles[0].content.file_id, "x");
    }

    fn random_chunks(rng: &mut StdRng, n: usize, unique_ts: bool) -> Vec<FileChunk> {
        let mut timestamps = (1..=n as i64).collect::<Vec<_>>();
        timestamps.shuffle(rng);
        (0..n)
            .map(|i| {
                let offset = rng.gen_range(0..200);
                let size = rng.gen_range(0..60);
                let ts = if unique_ts {
                    timestamps[i]
                } else {
                    rng.gen_range(1..4)
                };
                chunk(&format!("{i}"), offset, size, ts)
            })
            .collect()
    }

    // the newest chunk covering `x`. Among equal timestamps the one that
    // started first, ties on the start broken by content then size.
    fn owner_of(chunks: &[FileChunk], x: u64) -> Option<&FileChunk> {
        chunks
            .iter()
            .filter(|c| c.offset() <= x && x < c.stop())
            .min_by(|a, b| {
                b.modified_ts_ns()
                    .cmp(&a.modified_ts_ns())
                    .then(a.offset().cmp(&b.offset()))
                    .then_with(|| a.content().cmp(b.content()))
                    .then(a.size().cmp(&b.size()))
            })
    }

    #[test]
    fn newest_chunk_owns_every_byte() {
        let mut rng = StdRng::seed_from_u64(7);
        for round in 0..400 {
            let n = rng.gen_range(1..12);
            // every other round draws from three timestamps only.
            let chunks = random_chunks(&mut rng, n, round % 2 == 0);
            let visibles = resolve_visible_intervals(&chunks);

            for w in visibles.windows(2) {
                assert!(w[0].stop <= w[1].start, "overlap: {} {}", w[0], w[1]);
            }
            for v in &visibles {
                assert!(v.start < v.stop);
            }

            for x in 0..300u64 {
                let newest = owner_of(&chunks, x);
                let owner = visibles.iter().find(|v| v.start <= x && x < v.stop);
                match (newest, owner) {
                    (None, None) => {}
                    (Some(c), Some(v)) => {
                        assert_eq!(c.modified_ts_ns(), v.modified_ts_ns, "byte {x}");
                        assert_eq!(c.file_id(), v.content.file_id);
                        assert_eq!(x - v.start + v.chunk_offset, x - c.offset());
                    }
                    (c, v) => panic!("byte {x}: chunk {:?} visible {:?}", c, v),
                }
            }
        }
    }

    #[test]
    fn input_order_does_not_matter() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            let n = rng.gen_range(1..10);
            let mut chunks = random_chunks(&mut rng, n, false);
            // duplicates of the same write.
            chunks.push(chunks[0].clone());
            let expected = resolve_visible_intervals(&chunks);
            for _ in 0..5 {
                chunks.shuffle(&mut rng);
                assert_eq!(resolve_visible_intervals(&chunks), expected);
            }
        }
    }
}
