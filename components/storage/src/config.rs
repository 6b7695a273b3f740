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

use std::path::PathBuf;

use kasane_common::{KASANE_DEBUG_SWAP_DIR, SWAP_CAPACITY, UNIT_SIZE};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    /// The size of one storage unit, writes are tracked per unit.
    pub unit_size:       usize,
    /// Where the swap file is created.
    pub swap_dir:        PathBuf,
    /// The total size of the swap file, it bounds how many units can be
    /// alive at the same time.
    pub swap_capacity:   usize,
    /// Keep the units in memory instead of a swap file.
    pub memory_only:     bool,
    /// How many units a page writer buffers before it flushes the fullest.
    pub max_dirty_units: usize,
}

impl StorageConfig {
    pub fn with_unit_size(mut self, unit_size: usize) -> Self {
        self.unit_size = unit_size;
        self
    }

    pub fn with_swap_dir(mut self, swap_dir: impl Into<PathBuf>) -> Self {
        self.swap_dir = swap_dir.into();
        self
    }

    pub fn with_swap_capacity(mut self, swap_capacity: usize) -> Self {
        self.swap_capacity = swap_capacity;
        self
    }

    pub fn with_memory_only(mut self, memory_only: bool) -> Self {
        self.memory_only = memory_only;
        self
    }

    pub fn with_max_dirty_units(mut self, max_dirty_units: usize) -> Self {
        self.max_dirty_units = max_dirty_units;
        self
    }

    pub fn max_units(&self) -> usize { self.swap_capacity / self.unit_size }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            unit_size:       UNIT_SIZE,                          // 2MiB
            swap_dir:        PathBuf::from(KASANE_DEBUG_SWAP_DIR),
            swap_capacity:   SWAP_CAPACITY,                      // 1GiB
            memory_only:     false,
            max_dirty_units: 16,
        }
    }
}
