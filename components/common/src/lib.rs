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

pub const KASANE: &str = "kasane";
pub const KASANE_LOG_ENV: &str = "KASANE_LOG";
pub const KASANE_DEBUG_SWAP_DIR: &str = "/tmp/kasane.swap";
pub const KASANE_DEBUG_OBJECT_STORAGE: &str = "/tmp/kasane.data";

// The size of one storage unit, a write buffer is divided into units.
pub const UNIT_SIZE: usize = 2 << 20; // 2 MiB

// The default capacity of a swap file.
pub const SWAP_CAPACITY: usize = 1 << 30; // 1 GiB

// Chunk offsets live in a signed 64-bit space on the wire.
pub const MAX_LOGICAL_OFFSET: u64 = i64::MAX as u64;

pub fn cal_unit_idx(offset: FileOffset, unit_size: UnitSize) -> LogicUnitIndex {
    offset / unit_size as u64
}

pub fn cal_unit_offset(offset: FileOffset, unit_size: UnitSize) -> UnitOffset {
    offset % unit_size as u64
}

/// Nanosecond write time, compared as a logical clock.
pub type TsNs = i64;
pub type FileOffset = u64;
pub type UnitSize = usize;
pub type UnitOffset = u64;
pub type LogicUnitIndex = u64;
/// The physical position of a unit inside its device.
pub type SlotIndex = u64;
