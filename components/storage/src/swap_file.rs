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
    fmt::{Display, Formatter},
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};

use crossbeam_queue::SegQueue;
use kasane_common::{LogicUnitIndex, SlotIndex, UnitSize};
use kasane_utils::readable_size::ReadableSize;
use snafu::OptionExt;
use tracing::debug;

use crate::{
    config::StorageConfig,
    device::{open_device, BlockDeviceRef},
    err::{Result, SwapFileFullSnafu},
    unit::SwapUnit,
};

/// SwapFile hands out fixed size slots of a device to storage units.
///
/// Released slots are reused before new ones are taken from the end of the
/// device.
pub struct SwapFile {
    device:       BlockDeviceRef,
    unit_size:    UnitSize,
    max_slots:    SlotIndex,
    // slots that were used and released.
    free_slots:   SegQueue<SlotIndex>,
    // the first slot that was never used.
    next_slot:    AtomicU64,
    active_units: AtomicUsize,
}

impl SwapFile {
    pub fn new(device: BlockDeviceRef, unit_size: UnitSize) -> Arc<Self> {
        debug_assert!(unit_size > 0, "invalid unit size");
        let max_slots = device.capacity() / unit_size as u64;
        let swap_file = Arc::new(Self {
            device,
            unit_size,
            max_slots,
            free_slots: SegQueue::new(),
            next_slot: AtomicU64::new(0),
            active_units: AtomicUsize::new(0),
        });
        debug!("{} initialized", swap_file);
        swap_file
    }

    pub async fn open(config: &StorageConfig) -> Result<Arc<Self>> {
        let device = open_device(config).await?;
        Ok(Self::new(device, config.unit_size))
    }

    /// Take a slot for the unit at `logic_idx`.
    pub fn new_unit(self: &Arc<Self>, logic_idx: LogicUnitIndex) -> Result<SwapUnit> {
        let slot = match self.free_slots.pop() {
            Some(slot) => slot,
            None => self
                .next_slot
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                    (n < self.max_slots).then_some(n + 1)
                })
                .ok()
                .context(SwapFileFullSnafu {
                    slots: self.max_slots,
                })?,
        };
        self.active_units.fetch_add(1, Ordering::AcqRel);
        debug!("unit {} takes slot {}", logic_idx, slot);
        Ok(SwapUnit::new(self.clone(), logic_idx, slot))
    }

    pub(crate) fn release_slot(&self, logic_idx: LogicUnitIndex, slot: SlotIndex) {
        debug!("unit {} releases slot {}", logic_idx, slot);
        self.active_units.fetch_sub(1, Ordering::AcqRel);
        self.free_slots.push(slot);
    }

    pub(crate) fn device(&self) -> &BlockDeviceRef { &self.device }

    pub fn unit_size(&self) -> UnitSize { self.unit_size }

    pub fn active_units(&self) -> usize { self.active_units.load(Ordering::Acquire) }

    pub fn max_units(&self) -> u64 { self.max_slots }
}

impl Display for SwapFile {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SwapFile {{ device: {:?}, unit_size: {}, active: {}, max: {} }}",
            self.device,
            ReadableSize(self.unit_size as u64),
            self.active_units(),
            self.max_slots,
        )
    }
}
