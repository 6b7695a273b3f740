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

use std::cmp::{max, min};

use kasane_common::{FileOffset, TsNs};
use kasane_types::{ContentRef, FileChunk};

use crate::visible::{resolve_visible_intervals, VisibleInterval};

/// ChunkView is the part of a visible interval that falls in a read window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkView {
    pub content:         ContentRef,
    /// Where to start reading inside the chunk's content.
    pub offset_in_chunk: u64,
    pub view_size:       u64,
    /// The logical offset the view starts at.
    pub view_offset:     FileOffset,
    pub chunk_size:      u64,
    pub modified_ts_ns:  TsNs,
}

impl ChunkView {
    pub fn view_stop(&self) -> FileOffset { self.view_offset + self.view_size }

    /// The view reads the whole chunk.
    pub fn is_full_chunk(&self) -> bool {
        self.offset_in_chunk == 0 && self.view_size == self.chunk_size
    }
}

/// Clip visible intervals to the read window `[offset, offset + size)`.
pub fn view_from_visible_intervals(
    visibles: &[VisibleInterval],
    offset: FileOffset,
    size: u64,
) -> Vec<ChunkView> {
    let stop = offset.saturating_add(size);
    visibles
        .iter()
        .filter_map(|v| {
            let start = max(offset, v.start);
            let end = min(stop, v.stop);
            (start < end).then(|| ChunkView {
                content:         v.content.clone(),
                offset_in_chunk: start - v.start + v.chunk_offset,
                view_size:       end - start,
                view_offset:     start,
                chunk_size:      v.chunk_size,
                modified_ts_ns:  v.modified_ts_ns,
            })
        })
        .collect()
}

pub fn resolve_chunk_views(chunks: &[FileChunk], offset: FileOffset, size: u64) -> Vec<ChunkView> {
    view_from_visible_intervals(&resolve_visible_intervals(chunks), offset, size)
}
