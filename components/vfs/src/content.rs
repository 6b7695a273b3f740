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
use kasane_types::ContentRef;
use kasane_utils::object_storage::{ObjectStorage, ObjectStoragePath, ObjectStore};
use snafu::{ensure, ResultExt};
use tracing::debug;

use crate::err::{FetchFailedSnafu, Result, UnsupportedContentSnafu};

pub type ContentStoreRef = Arc<dyn ContentStore>;

/// ContentStore serves byte ranges of stored chunk content.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Fetch `[offset, offset + length)` of `content`. Returning fewer bytes
    /// than asked is allowed, the caller treats it as an error.
    async fn fetch(&self, content: &ContentRef, offset: u64, length: u64) -> Result<Bytes>;
}

/// ObjectContentStore reads chunk content stored as plain objects keyed by
/// the content's file id.
pub struct ObjectContentStore {
    object_storage: ObjectStorage,
}

impl ObjectContentStore {
    pub fn new(object_storage: ObjectStorage) -> Self { Self { object_storage } }
}

#[async_trait]
impl ContentStore for ObjectContentStore {
    async fn fetch(&self, content: &ContentRef, offset: u64, length: u64) -> Result<Bytes> {
        ensure!(
            content.cipher_key.is_none() && !content.is_compressed,
            UnsupportedContentSnafu {
                file_id: content.file_id.clone(),
            }
        );
        let path = ObjectStoragePath::from(content.file_id.as_str());
        let range = offset as usize..(offset + length) as usize;
        let data = self
            .object_storage
            .get_range(&path, range)
            .await
            .context(FetchFailedSnafu {
                file_id: content.file_id.clone(),
                offset,
                length,
            })?;
        debug!("fetched {} bytes of {} at {}", data.len(), content, offset);
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use kasane_utils::object_storage::new_memory_object_store;

    use super::*;
    use crate::err::Error;

    #[tokio::test]
    async fn fetch_range() {
        let object_storage = new_memory_object_store();
        object_storage
            .put(&ObjectStoragePath::from("c/1"), Bytes::from_static(b"0123456789"))
            .await
            .unwrap();
        let store = ObjectContentStore::new(object_storage);

        let data = store.fetch(&ContentRef::new("c/1"), 2, 5).await.unwrap();
        assert_eq!(data.as_ref(), b"23456");

        let err = store.fetch(&ContentRef::new("c/2"), 0, 1).await.unwrap_err();
        assert!(err.is_not_found());

        let compressed = ContentRef::new("c/1").with_compressed(true);
        let err = store.fetch(&compressed, 0, 1).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedContent { .. }));
    }
}
