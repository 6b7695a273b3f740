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
    cmp::min,
    fmt::{Debug, Formatter},
};

use async_trait::async_trait;
use kasane_utils::readable_size::ReadableSize;
use snafu::ensure;
use tokio::sync::RwLock;

use super::BlockDevice;
use crate::err::{DeviceOutOfRangeSnafu, Result};

/// MemoryDevice keeps the bytes in a growable buffer.
///
/// Bytes that were never written read as zero.
pub struct MemoryDevice {
    capacity: u64,
    buf:      RwLock<Vec<u8>>,
}

impl MemoryDevice {
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            buf: RwLock::new(Vec::new()),
        }
    }

    fn check_range(&self, offset: u64, len: usize) -> Result<()> {
        ensure!(
            offset
                .checked_add(len as u64)
                .is_some_and(|end| end <= self.capacity),
            DeviceOutOfRangeSnafu {
                device: "memory",
                offset,
                len,
            }
        );
        Ok(())
    }
}

impl Debug for MemoryDevice {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MemoryDevice {{ capacity: {} }}", ReadableSize(self.capacity))
    }
}

#[async_trait]
impl BlockDevice for MemoryDevice {
    async fn read_at(&self, offset: u64, dst: &mut [u8]) -> Result<()> {
        self.check_range(offset, dst.len())?;
        let guard = self.buf.read().await;
        let offset = offset as usize;
        let end = min(guard.len(), offset + dst.len());
        let copied = end.saturating_sub(offset);
        if copied > 0 {
            dst[..copied].copy_from_slice(&guard[offset..end]);
        }
        dst[copied..].fill(0);
        Ok(())
    }

    async fn write_at(&self, offset: u64, src: &[u8]) -> Result<()> {
        self.check_range(offset, src.len())?;
        let mut guard = self.buf.write().await;
        let offset = offset as usize;
        let end = offset + src.len();
        if guard.len() < end {
            guard.resize(end, 0);
        }
        guard[offset..end].copy_from_slice(src);
        Ok(())
    }

    fn capacity(&self) -> u64 { self.capacity }
}
