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

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use kasane_common::{FileOffset, TsNs};
use kasane_types::{ContentRef, FileChunk};
use kasane_utils::{
    object_storage::{ObjectStorage, ObjectStoragePath, ObjectStore},
    random_id,
};
use snafu::ResultExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::err::{InvalidChunkSnafu, ObjectStorageSnafu, Result};

pub type FlushSinkRef = Arc<dyn FlushSink>;

/// FlushSink receives the valid ranges of a storage unit when it is flushed.
///
/// `persist` is called once per range. The core never retries, a failed
/// call fails the flush.
#[async_trait]
pub trait FlushSink: Send + Sync {
    async fn persist(&self, data: Bytes, logical_offset: FileOffset, length: u64, ts_ns: TsNs) -> Result<()>;
}

/// ObjectStorageSink stores every flushed range as one object and keeps the
/// chunk list of the file it builds up.
pub struct ObjectStorageSink {
    object_storage: ObjectStorage,
    prefix:         String,
    chunks:         Mutex<Vec<FileChunk>>,
}

impl ObjectStorageSink {
    pub fn new(object_storage: ObjectStorage, prefix: impl Into<String>) -> Self {
        Self {
            object_storage,
            prefix: prefix.into(),
            chunks: Mutex::new(Vec::new()),
        }
    }

    fn object_key(&self, logical_offset: FileOffset) -> String {
        format!("{}/{:016x}_{:016x}", self.prefix, logical_offset, random_id())
    }

    /// The chunks persisted so far, in persist order.
    pub async fn chunks(&self) -> Vec<FileChunk> { self.chunks.lock().await.clone() }
}

#[async_trait]
impl FlushSink for ObjectStorageSink {
    async fn persist(&self, data: Bytes, logical_offset: FileOffset, length: u64, ts_ns: TsNs) -> Result<()> {
        debug_assert_eq!(data.len() as u64, length);
        let key = self.object_key(logical_offset);
        let chunk = FileChunk::new(ContentRef::new(key.clone()), logical_offset, length, ts_ns)
            .context(InvalidChunkSnafu)?;
        self.object_storage
            .put(&ObjectStoragePath::from(key.as_str()), data)
            .await
            .context(ObjectStorageSnafu)?;
        debug!("persisted {}", chunk);
        self.chunks.lock().await.push(chunk);
        Ok(())
    }
}
