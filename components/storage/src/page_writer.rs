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
    cmp::{max, min},
    collections::BTreeMap,
    sync::Arc,
};

use kasane_common::{cal_unit_idx, cal_unit_offset, FileOffset, LogicUnitIndex, TsNs};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, instrument, warn};

use crate::{config::StorageConfig, err::Result, sink::FlushSinkRef, swap_file::SwapFile, unit::SwapUnit};

type Units = BTreeMap<LogicUnitIndex, Arc<SwapUnit>>;

/// PageWriter buffers the writes of one file in storage units.
///
/// A unit is flushed to the sink and dropped as soon as it is complete, when
/// room is needed for a new unit, or on [PageWriter::flush]. A unit that
/// fails to flush stays buffered and can be flushed again.
///
/// The unit map lock is held across a flush. A writer that finds its unit
/// sealed comes back through the map and either gets a fresh unit or the
/// old one, unsealed after a failed flush.
pub struct PageWriter {
    swap_file:       Arc<SwapFile>,
    sink:            FlushSinkRef,
    max_dirty_units: usize,
    units:           Mutex<Units>,
}

impl PageWriter {
    pub fn new(swap_file: Arc<SwapFile>, sink: FlushSinkRef, max_dirty_units: usize) -> Self {
        debug_assert!(max_dirty_units > 0, "page writer needs at least one unit");
        Self {
            swap_file,
            sink,
            max_dirty_units,
            units: Mutex::new(BTreeMap::new()),
        }
    }

    /// Open a swap file as `config` describes and buffer through it.
    pub async fn open(config: &StorageConfig, sink: FlushSinkRef) -> Result<Self> {
        let swap_file = SwapFile::open(config).await?;
        Ok(Self::new(swap_file, sink, config.max_dirty_units))
    }

    pub fn swap_file(&self) -> &Arc<SwapFile> { &self.swap_file }

    /// Write `data` at the logical `offset`, splitting it on unit boundaries.
    #[instrument(skip_all, fields(offset = offset, len = data.len(), ts_ns = ts_ns))]
    pub async fn write(&self, offset: FileOffset, data: &[u8], ts_ns: TsNs) -> Result<usize> {
        let unit_size = self.swap_file.unit_size();
        let mut total_write_len = 0;
        while total_write_len < data.len() {
            let pos = offset + total_write_len as u64;
            let unit_idx = cal_unit_idx(pos, unit_size);
            let unit_offset = cal_unit_offset(pos, unit_size) as usize;
            let len = min(data.len() - total_write_len, unit_size - unit_offset);
            self.write_to_unit(
                unit_idx,
                pos,
                &data[total_write_len..total_write_len + len],
                ts_ns,
            )
            .await?;
            total_write_len += len;
        }
        Ok(total_write_len)
    }

    async fn write_to_unit(&self, unit_idx: LogicUnitIndex, pos: FileOffset, src: &[u8], ts_ns: TsNs) -> Result<()> {
        let unit = loop {
            let unit = self.get_or_create_unit(unit_idx).await?;
            match unit.write_data_at(src, pos, ts_ns).await {
                Ok(_) => break unit,
                Err(e) if e.is_sealed() => {
                    debug!("unit {} was sealed under us, retry", unit_idx);
                }
                Err(e) => return Err(e),
            }
        };

        if unit.is_complete().await {
            drop(unit);
            let mut units = self.units.lock().await;
            if let Err(e) = self.flush_unit(&mut units, unit_idx).await {
                // the data stays buffered, the next flush tries again.
                warn!("failed to flush complete unit {}: {}", unit_idx, e);
            }
        }
        Ok(())
    }

    async fn get_or_create_unit(&self, unit_idx: LogicUnitIndex) -> Result<Arc<SwapUnit>> {
        let mut units = self.units.lock().await;
        if let Some(unit) = units.get(&unit_idx) {
            return Ok(unit.clone());
        }
        if units.len() >= self.max_dirty_units {
            self.evict_fullest(&mut units).await?;
        }
        // the swap file may run out of slots before max_dirty_units is hit.
        let unit = loop {
            match self.swap_file.new_unit(unit_idx) {
                Ok(unit) => break Arc::new(unit),
                Err(e) if e.is_swap_full() && !units.is_empty() => {
                    warn!("{}, evict a unit for unit {}", e, unit_idx);
                    self.evict_fullest(&mut units).await?;
                }
                Err(e) => return Err(e),
            }
        };
        units.insert(unit_idx, unit.clone());
        Ok(unit)
    }

    async fn evict_fullest(&self, units: &mut MutexGuard<'_, Units>) -> Result<()> {
        let mut fullest = None;
        for (idx, unit) in units.iter() {
            let written = unit.written_bytes().await;
            if fullest.map_or(true, |(_, most)| written > most) {
                fullest = Some((*idx, written));
            }
        }
        if let Some((idx, written)) = fullest {
            debug!("evict unit {} holding {} bytes", idx, written);
            self.flush_unit(units, idx).await?;
        }
        Ok(())
    }

    /// Seal the unit, save it and forget it. On failure the unit is unsealed
    /// and kept.
    async fn flush_unit(&self, units: &mut MutexGuard<'_, Units>, unit_idx: LogicUnitIndex) -> Result<()> {
        let Some(unit) = units.get(&unit_idx).cloned() else {
            // flushed by someone else.
            return Ok(());
        };
        unit.seal().await;
        match unit.save_content(self.sink.as_ref()).await {
            Ok(saved) => {
                units.remove(&unit_idx);
                debug!("unit {} flushed {} bytes", unit_idx, saved);
                Ok(())
            }
            Err(e) => {
                unit.unseal().await;
                Err(e)
            }
        }
    }

    /// Read the buffered bytes of `[offset, offset + dst.len())` written at or
    /// after `ts_ns` into `dst`.
    ///
    /// Returns the largest logical offset that was filled, 0 if nothing was.
    pub async fn read(&self, offset: FileOffset, dst: &mut [u8], ts_ns: TsNs) -> Result<FileOffset> {
        if dst.is_empty() {
            return Ok(0);
        }
        let unit_size = self.swap_file.unit_size();
        let first = cal_unit_idx(offset, unit_size);
        let last = cal_unit_idx(offset + dst.len() as u64 - 1, unit_size);
        let units = {
            let guard = self.units.lock().await;
            guard
                .range(first..=last)
                .map(|(_, unit)| unit.clone())
                .collect::<Vec<_>>()
        };

        let mut max_stop = 0;
        for unit in units {
            max_stop = max(max_stop, unit.read_data_at(dst, offset, ts_ns).await?);
        }
        Ok(max_stop)
    }

    /// Flush every buffered unit in offset order.
    ///
    /// Stops at the first failure, units that were not flushed stay buffered.
    #[instrument(skip_all)]
    pub async fn flush(&self) -> Result<()> {
        let mut units = self.units.lock().await;
        let indexes = units.keys().copied().collect::<Vec<_>>();
        for unit_idx in indexes {
            self.flush_unit(&mut units, unit_idx).await?;
        }
        Ok(())
    }

    pub async fn dirty_units(&self) -> usize { self.units.lock().await.len() }
}
