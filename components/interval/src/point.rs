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

use std::cmp::Ordering;

use kasane_common::{FileOffset, TsNs};
use kasane_types::FileChunk;

/// A start or stop boundary of one chunk on the sweep line.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Point<'a> {
    pub(crate) x:        FileOffset,
    pub(crate) ts:       TsNs,
    pub(crate) chunk:    &'a FileChunk,
    // the index of the chunk in the input, identifies it in the active set.
    pub(crate) id:       usize,
    pub(crate) is_start: bool,
}

impl<'a> Point<'a> {
    /// Position first, then the older point, then stop before start.
    ///
    /// The chunk itself breaks what is left so the order does not depend on
    /// how the caller listed the chunks.
    fn sweep_order(&self, other: &Self) -> Ordering {
        self.x
            .cmp(&other.x)
            .then(self.ts.cmp(&other.ts))
            .then(self.is_start.cmp(&other.is_start))
            .then_with(|| self.chunk.content().cmp(other.chunk.content()))
            .then(self.chunk.offset().cmp(&other.chunk.offset()))
            .then(self.chunk.size().cmp(&other.chunk.size()))
    }
}

/// Collect the boundaries of every non-empty chunk in sweep order.
pub(crate) fn sweep_points(chunks: &[FileChunk]) -> Vec<Point<'_>> {
    let mut points = Vec::with_capacity(chunks.len() * 2);
    for (id, chunk) in chunks.iter().enumerate() {
        if chunk.is_empty() {
            continue;
        }
        points.push(Point {
            x: chunk.offset(),
            ts: chunk.modified_ts_ns(),
            chunk,
            id,
            is_start: true,
        });
        points.push(Point {
            x: chunk.stop(),
            ts: chunk.modified_ts_ns(),
            chunk,
            id,
            is_start: false,
        });
    }
    points.sort_by(Point::sweep_order);
    points
}
