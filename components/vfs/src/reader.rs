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

use std::{cmp::min, sync::Arc};

use futures::future::try_join_all;
use kasane_common::FileOffset;
use kasane_interval::{resolve_chunk_views, ChunkView};
use kasane_types::{total_size, FileChunk};
use rangemap::RangeSet;
use snafu::ensure;
use tracing::{debug, instrument};

use crate::{
    content::ContentStoreRef,
    err::{Result, ShortFetchSnafu},
};

/// FileReader reads a file through an immutable snapshot of its chunk list.
///
/// Overlapping chunks are resolved so that every byte comes from the newest
/// chunk covering it. Bytes no chunk covers read as zero.
pub struct FileReader {
    chunks: Arc<[FileChunk]>,
    size:   u64,
    store:  ContentStoreRef,
}

impl FileReader {
    pub fn new(chunks: impl Into<Arc<[FileChunk]>>, store: ContentStoreRef) -> Self {
        let chunks = chunks.into();
        let size = total_size(&chunks);
        Self {
            chunks,
            size,
            store,
        }
    }

    /// The logical size of the file, the largest chunk stop.
    pub fn size(&self) -> u64 { self.size }

    pub fn chunks(&self) -> &[FileChunk] { &self.chunks }

    /// Read into `dst` starting at `offset`, returns how many bytes were read.
    ///
    /// The read stops at the end of the file. Any failed or short fetch fails
    /// the whole read, `dst` may be partially filled then.
    #[instrument(skip_all, fields(offset = offset, len = dst.len()))]
    pub async fn read(&self, offset: FileOffset, dst: &mut [u8]) -> Result<usize> {
        if offset >= self.size || dst.is_empty() {
            return Ok(0);
        }
        let read_len = min(dst.len() as u64, self.size - offset);
        let read_range = offset..offset + read_len;
        let views = resolve_chunk_views(&self.chunks, offset, read_len);

        let mut covered = RangeSet::new();
        for v in &views {
            covered.insert(v.view_offset..v.view_stop());
        }
        for hole in covered.gaps(&read_range) {
            debug!("read range {:?} finds hole {:?}", read_range, hole);
            dst[(hole.start - offset) as usize..(hole.end - offset) as usize].fill(0);
        }

        let fetched = try_join_all(views.iter().map(|v| self.fetch_view(v))).await?;
        for (v, data) in views.iter().zip(fetched) {
            let start = (v.view_offset - offset) as usize;
            dst[start..start + data.len()].copy_from_slice(&data);
        }
        Ok(read_len as usize)
    }

    async fn fetch_view(&self, view: &ChunkView) -> Result<bytes::Bytes> {
        let data = self
            .store
            .fetch(&view.content, view.offset_in_chunk, view.view_size)
            .await?;
        ensure!(
            data.len() as u64 >= view.view_size,
            ShortFetchSnafu {
                file_id:  view.content.file_id.clone(),
                expected: view.view_size,
                got:      data.len() as u64,
            }
        );
        Ok(data.slice(..view.view_size as usize))
    }
}
