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

use bytes::Bytes;
use kasane_common::{FileOffset, TsNs, MAX_LOGICAL_OFFSET};
use serde::{Deserialize, Serialize};
use snafu::{ensure, Location, Snafu};

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display(
        "chunk {} [{}, +{}) exceeds the logical offset space",
        file_id,
        offset,
        size
    ))]
    ChunkRangeOverflow {
        file_id:  String,
        offset:   u64,
        size:     u64,
        #[snafu(implicit)]
        location: Location,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// ContentRef points at the stored bytes of a chunk.
///
/// It is carried through the interval resolution untouched, only the
/// content store knows how to interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentRef {
    /// The opaque id of the underlying object.
    pub file_id:       String,
    pub cipher_key:    Option<Bytes>,
    pub is_compressed: bool,
}

impl ContentRef {
    pub fn new(file_id: impl Into<String>) -> Self {
        Self {
            file_id:       file_id.into(),
            cipher_key:    None,
            is_compressed: false,
        }
    }

    pub fn with_cipher_key(mut self, key: Bytes) -> Self {
        self.cipher_key = Some(key);
        self
    }

    pub fn with_compressed(mut self, is_compressed: bool) -> Self {
        self.is_compressed = is_compressed;
        self
    }
}

impl Display for ContentRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.file_id) }
}

/// FileChunk is one timestamped write of a logical object.
///
/// Chunks of the same object may overlap, the newer one wins on the
/// overlapped bytes. A chunk never changes after it was listed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawFileChunk")]
pub struct FileChunk {
    offset:         FileOffset,
    size:           u64,
    modified_ts_ns: TsNs,
    content:        ContentRef,
}

// decoded chunks go through the same range check as FileChunk::new.
#[derive(Deserialize)]
struct RawFileChunk {
    offset:         FileOffset,
    size:           u64,
    modified_ts_ns: TsNs,
    content:        ContentRef,
}

impl TryFrom<RawFileChunk> for FileChunk {
    type Error = Error;

    fn try_from(raw: RawFileChunk) -> Result<Self> {
        FileChunk::new(raw.content, raw.offset, raw.size, raw.modified_ts_ns)
    }
}

impl FileChunk {
    pub fn new(content: ContentRef, offset: FileOffset, size: u64, modified_ts_ns: TsNs) -> Result<Self> {
        ensure!(
            offset
                .checked_add(size)
                .is_some_and(|stop| stop <= MAX_LOGICAL_OFFSET),
            ChunkRangeOverflowSnafu {
                file_id: content.file_id.clone(),
                offset,
                size,
            }
        );
        Ok(Self {
            offset,
            size,
            modified_ts_ns,
            content,
        })
    }

    pub fn offset(&self) -> FileOffset { self.offset }

    pub fn size(&self) -> u64 { self.size }

    /// The exclusive end of the chunk in the logical object.
    pub fn stop(&self) -> FileOffset { self.offset + self.size }

    pub fn modified_ts_ns(&self) -> TsNs { self.modified_ts_ns }

    pub fn content(&self) -> &ContentRef { &self.content }

    pub fn file_id(&self) -> &str { &self.content.file_id }

    pub fn is_empty(&self) -> bool { self.size == 0 }
}

impl Display for FileChunk {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}[{}, {})@{}",
            self.content, self.offset, self.stop(), self.modified_ts_ns
        )
    }
}

/// The logical size of an object, the max stop of its chunks.
pub fn total_size(chunks: &[FileChunk]) -> u64 {
    chunks.iter().map(FileChunk::stop).max().unwrap_or(0)
}
