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

//! Physical backing of storage units.
//!
//! A device is a flat byte space addressed by physical offset, the
//! [SwapFile](crate::SwapFile) cuts it into fixed size slots.

mod memory;
mod mmap;

use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
pub use memory::MemoryDevice;
pub use mmap::MmapDevice;

use crate::{config::StorageConfig, err::Result};

pub type BlockDeviceRef = Arc<dyn BlockDevice>;

#[async_trait]
pub trait BlockDevice: Debug + Send + Sync {
    /// Fill `dst` with the bytes starting at `offset`.
    async fn read_at(&self, offset: u64, dst: &mut [u8]) -> Result<()>;

    async fn write_at(&self, offset: u64, src: &[u8]) -> Result<()>;

    /// The number of addressable bytes.
    fn capacity(&self) -> u64;
}

/// Build the device a [StorageConfig] asks for.
pub async fn open_device(config: &StorageConfig) -> Result<BlockDeviceRef> {
    if config.memory_only {
        return Ok(Arc::new(MemoryDevice::new(config.swap_capacity as u64)));
    }
    let device = MmapDevice::create(&config.swap_dir, config.swap_capacity).await?;
    Ok(Arc::new(device))
}
