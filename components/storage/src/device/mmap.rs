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
    fmt::{Debug, Formatter},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use fmmap::tokio::{AsyncMmapFileExt, AsyncMmapFileMut, AsyncMmapFileMutExt, AsyncOptions};
use kasane_utils::{random_id, readable_size::ReadableSize};
use snafu::{ensure, ResultExt};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    sync::RwLock,
    time::Instant,
};
use tracing::{debug, instrument, warn};

use super::BlockDevice;
use crate::err::{DeviceIoSnafu, DeviceMmapSnafu, DeviceOutOfRangeSnafu, Result};

/// MmapDevice is a memory mapped swap file.
///
/// The file is private to the device and removed when the device drops.
pub struct MmapDevice {
    path:     PathBuf,
    capacity: u64,
    file:     RwLock<AsyncMmapFileMut>,
}

impl MmapDevice {
    /// Create a fresh swap file of `capacity` bytes inside `dir`.
    #[instrument(skip_all, fields(capacity = capacity))]
    pub async fn create<P: AsRef<Path>>(dir: P, capacity: usize) -> Result<Self> {
        let start = Instant::now();
        debug_assert!(capacity > 0, "empty swap file");
        tokio::fs::create_dir_all(dir.as_ref())
            .await
            .context(DeviceIoSnafu)?;
        let path = dir.as_ref().join(format!("kasane-swap-{}", random_id()));
        let mut file = AsyncOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .max_size(capacity as u64)
            .open_mmap_file_mut(&path)
            .await
            .context(DeviceMmapSnafu)?;
        file.truncate(capacity as u64)
            .await
            .context(DeviceMmapSnafu)?;
        debug!(
            "create swap file {} of {} finished, cost: {:?}",
            path.display(),
            ReadableSize(capacity as u64),
            start.elapsed()
        );
        Ok(Self {
            path,
            capacity: capacity as u64,
            file: RwLock::new(file),
        })
    }

    pub fn path(&self) -> &Path { &self.path }

    fn check_range(&self, offset: u64, len: usize) -> Result<()> {
        ensure!(
            offset
                .checked_add(len as u64)
                .is_some_and(|end| end <= self.capacity),
            DeviceOutOfRangeSnafu {
                device: self.path.display().to_string(),
                offset,
                len,
            }
        );
        Ok(())
    }
}

impl Debug for MmapDevice {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "MmapDevice {{ path: {}, capacity: {} }}",
            self.path.display(),
            ReadableSize(self.capacity)
        )
    }
}

#[async_trait]
impl BlockDevice for MmapDevice {
    async fn read_at(&self, offset: u64, dst: &mut [u8]) -> Result<()> {
        self.check_range(offset, dst.len())?;
        let guard = self.file.read().await;
        let mut reader = guard
            .range_reader(offset as usize, dst.len())
            .context(DeviceMmapSnafu)?;
        reader.read_exact(dst).await.context(DeviceIoSnafu)?;
        Ok(())
    }

    async fn write_at(&self, offset: u64, src: &[u8]) -> Result<()> {
        self.check_range(offset, src.len())?;
        let mut guard = self.file.write().await;
        let mut writer = guard
            .range_writer(offset as usize, src.len())
            .context(DeviceMmapSnafu)?;
        writer.write_all(src).await.context(DeviceIoSnafu)?;
        Ok(())
    }

    fn capacity(&self) -> u64 { self.capacity }
}

impl Drop for MmapDevice {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("failed to remove swap file {}: {}", self.path.display(), e);
        }
    }
}
