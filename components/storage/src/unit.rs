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
    fmt::{Debug, Formatter},
    sync::Arc,
};

use bytes::Bytes;
use kasane_common::{FileOffset, LogicUnitIndex, SlotIndex, TsNs};
use kasane_interval::{WrittenIntervalTracker, WrittenRange};
use snafu::ensure;
use tokio::sync::RwLock;
use tracing::{debug, error, instrument, warn};

use crate::{
    err::{OutOfUnitBoundsSnafu, Result, UnitSealedSnafu},
    sink::FlushSink,
    swap_file::SwapFile,
};

/// SwapUnit is one fixed size storage unit living in a slot of a
/// [SwapFile].
///
/// All access goes through one read/write lock: writes are exclusive,
/// reads, completeness checks and flushes share it. The slot goes back to the
/// swap file when the unit drops.
pub struct SwapUnit {
    swap_file: Arc<SwapFile>,
    logic_idx: LogicUnitIndex,
    slot:      SlotIndex,
    state:     RwLock<UnitState>,
}

#[derive(Default)]
struct UnitState {
    usage:               WrittenIntervalTracker,
    last_modified_ts_ns: TsNs,
    // a sealed unit is being flushed and takes no more writes.
    sealed:              bool,
}

impl SwapUnit {
    pub(crate) fn new(swap_file: Arc<SwapFile>, logic_idx: LogicUnitIndex, slot: SlotIndex) -> Self {
        Self {
            swap_file,
            logic_idx,
            slot,
            state: RwLock::new(UnitState::default()),
        }
    }

    pub fn logic_idx(&self) -> LogicUnitIndex { self.logic_idx }

    pub fn slot(&self) -> SlotIndex { self.slot }

    /// The logical offset of the first byte of the unit.
    pub fn unit_start(&self) -> FileOffset { self.logic_idx * self.unit_size() }

    fn unit_size(&self) -> u64 { self.swap_file.unit_size() as u64 }

    fn physical_offset(&self, inner_offset: u64) -> u64 {
        self.slot * self.unit_size() + inner_offset
    }

    /// Write `src` at the logical `offset`, the range must stay inside the
    /// unit.
    ///
    /// The range is only recorded after the device accepted the bytes, so a
    /// failed write can simply be retried.
    #[instrument(skip_all, fields(unit = self.logic_idx, offset = offset, len = src.len(), ts_ns = ts_ns))]
    pub async fn write_data_at(&self, src: &[u8], offset: FileOffset, ts_ns: TsNs) -> Result<usize> {
        if src.is_empty() {
            return Ok(0);
        }
        let unit_start = self.unit_start();
        ensure!(
            offset >= unit_start && offset - unit_start + src.len() as u64 <= self.unit_size(),
            OutOfUnitBoundsSnafu {
                unit_idx: self.logic_idx,
                offset,
                len: src.len(),
            }
        );
        let inner_offset = offset - unit_start;

        let mut state = self.state.write().await;
        ensure!(
            !state.sealed,
            UnitSealedSnafu {
                unit_idx: self.logic_idx,
            }
        );
        if state.last_modified_ts_ns > ts_ns {
            warn!(
                "unit {} receives older data, {}ns behind",
                self.logic_idx,
                state.last_modified_ts_ns - ts_ns
            );
        }

        // bytes held by newer writes must not be overwritten on the device.
        let stop = inner_offset + src.len() as u64;
        for (start, end) in state.usage.accepted_pieces(inner_offset, stop, ts_ns) {
            let piece = &src[(start - inner_offset) as usize..(end - inner_offset) as usize];
            if let Err(e) = self
                .swap_file
                .device()
                .write_at(self.physical_offset(start), piece)
                .await
            {
                error!("failed to write unit {} at {}: {}", self.logic_idx, start, e);
                return Err(e);
            }
            // pieces already on the device stay recorded if a later one fails.
            state.usage.mark_written(start, end, ts_ns);
            state.last_modified_ts_ns = max(state.last_modified_ts_ns, ts_ns);
        }
        // records the out-of-order part, the pieces are already in place.
        state.usage.mark_written(inner_offset, stop, ts_ns);
        state.last_modified_ts_ns = max(state.last_modified_ts_ns, ts_ns);
        Ok(src.len())
    }

    /// Copy the bytes of `[offset, offset + dst.len())` held by this unit
    /// into `dst`.
    ///
    /// Ranges older than `ts_ns` are skipped. Returns the largest logical
    /// offset that was filled, 0 if nothing was.
    pub async fn read_data_at(&self, dst: &mut [u8], offset: FileOffset, ts_ns: TsNs) -> Result<FileOffset> {
        let state = self.state.read().await;
        let unit_start = self.unit_start();
        let stop = offset + dst.len() as u64;
        let mut max_stop = 0;
        for r in state.usage.iter() {
            let logic_start = max(offset, unit_start + r.start);
            let logic_stop = min(stop, unit_start + r.stop);
            if logic_start >= logic_stop {
                continue;
            }
            if r.ts_ns < ts_ns {
                debug!(
                    "skip stale range {} of unit {}, {}ns behind",
                    r,
                    self.logic_idx,
                    ts_ns - r.ts_ns
                );
                continue;
            }
            let dst = &mut dst[(logic_start - offset) as usize..(logic_stop - offset) as usize];
            if let Err(e) = self
                .swap_file
                .device()
                .read_at(self.physical_offset(logic_start - unit_start), dst)
                .await
            {
                error!("failed to read unit {} at {}: {}", self.logic_idx, logic_start, e);
                return Err(e);
            }
            max_stop = max(max_stop, logic_stop);
        }
        Ok(max_stop)
    }

    /// Every byte of the unit has been written.
    pub async fn is_complete(&self) -> bool {
        self.state.read().await.usage.is_complete(self.unit_size())
    }

    /// Push every valid range to `sink`, once per range in offset order.
    ///
    /// The first failure stops the flush, nothing is marked as persisted
    /// here, the caller decides what to do with the unit.
    #[instrument(skip_all, fields(unit = self.logic_idx))]
    pub async fn save_content(&self, sink: &dyn FlushSink) -> Result<u64> {
        let state = self.state.read().await;
        let unit_start = self.unit_start();
        let mut saved = 0;
        for r in state.usage.iter() {
            let mut buf = vec![0u8; r.size() as usize];
            self.swap_file
                .device()
                .read_at(self.physical_offset(r.start), &mut buf)
                .await?;
            sink.persist(Bytes::from(buf), unit_start + r.start, r.size(), r.ts_ns)
                .await?;
            saved += r.size();
        }
        debug!(
            "unit {} saved {} bytes in {} ranges",
            self.logic_idx,
            saved,
            state.usage.len()
        );
        Ok(saved)
    }

    pub async fn seal(&self) { self.state.write().await.sealed = true; }

    pub async fn unseal(&self) { self.state.write().await.sealed = false; }

    pub async fn last_modified_ts_ns(&self) -> TsNs { self.state.read().await.last_modified_ts_ns }

    pub async fn written_ranges(&self) -> Vec<WrittenRange> {
        self.state.read().await.usage.ranges().to_vec()
    }

    pub async fn written_bytes(&self) -> u64 { self.state.read().await.usage.written_bytes() }

    pub async fn out_of_order_writes(&self) -> u64 {
        self.state.read().await.usage.out_of_order_writes()
    }
}

impl Debug for SwapUnit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SwapUnit {{ logic_idx: {}, slot: {} }}", self.logic_idx, self.slot)
    }
}

impl Drop for SwapUnit {
    fn drop(&mut self) { self.swap_file.release_slot(self.logic_idx, self.slot); }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use kasane_utils::logger::install_fmt_log;
    use snafu::ResultExt;
    use tokio::sync::Mutex;

    use super::*;
    use crate::{
        device::{BlockDevice, MemoryDevice},
        err::{DeviceIoSnafu, Error, FlushRejectedSnafu},
    };

    const UNIT: usize = 16;

    #[derive(Debug)]
    struct FlakyDevice {
        inner:          MemoryDevice,
        // writes that still succeed, then every write fails.
        healthy_writes: AtomicUsize,
    }

    #[async_trait]
    impl BlockDevice for FlakyDevice {
        async fn read_at(&self, offset: u64, dst: &mut [u8]) -> Result<()> {
            self.inner.read_at(offset, dst).await
        }

        async fn write_at(&self, offset: u64, src: &[u8]) -> Result<()> {
            let left = self
                .healthy_writes
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
            if left.is_err() {
                return Err(std::io::Error::other("disk is gone")).context(DeviceIoSnafu);
            }
            self.inner.write_at(offset, src).await
        }

        fn capacity(&self) -> u64 { self.inner.capacity() }
    }

    #[derive(Default)]
    struct CollectSink {
        saved:  Mutex<Vec<(Bytes, u64, u64, TsNs)>>,
        reject: AtomicBool,
    }

    #[async_trait]
    impl FlushSink for CollectSink {
        async fn persist(&self, data: Bytes, logical_offset: FileOffset, length: u64, ts_ns: TsNs) -> Result<()> {
            if self.reject.load(Ordering::Acquire) {
                return FlushRejectedSnafu {
                    offset: logical_offset,
                    len:    length,
                    reason: "sink closed",
                }
                .fail();
            }
            self.saved
                .lock()
                .await
                .push((data, logical_offset, length, ts_ns));
            Ok(())
        }
    }

    fn memory_swap_file() -> Arc<SwapFile> {
        SwapFile::new(Arc::new(MemoryDevice::new(4 * UNIT as u64)), UNIT)
    }

    #[tokio::test]
    async fn write_then_read() {
        install_fmt_log();

        let swap_file = memory_swap_file();
        let _other = swap_file.new_unit(0).unwrap();
        let unit = swap_file.new_unit(2).unwrap();
        assert_eq!(unit.slot(), 1);
        assert_eq!(unit.unit_start(), 32);

        unit.write_data_at(b"hello", 33, 1).await.unwrap();
        unit.write_data_at(b"HE", 33, 2).await.unwrap();

        let mut dst = vec![b'.'; 8];
        let max_stop = unit.read_data_at(&mut dst, 32, 0).await.unwrap();
        assert_eq!(max_stop, 38);
        assert_eq!(&dst, b".HEllo..");

        // only data written at or after ts 2.
        let mut dst = vec![b'.'; 8];
        let max_stop = unit.read_data_at(&mut dst, 32, 2).await.unwrap();
        assert_eq!(max_stop, 35);
        assert_eq!(&dst, b".HE.....");

        assert_eq!(unit.last_modified_ts_ns().await, 2);
        assert_eq!(
            unit.written_ranges().await,
            vec![WrittenRange::new(1, 3, 2), WrittenRange::new(3, 6, 1)]
        );
    }

    #[tokio::test]
    async fn out_of_bounds() {
        let swap_file = memory_swap_file();
        let unit = swap_file.new_unit(1).unwrap();
        let err = unit.write_data_at(b"hello", 14, 1).await.unwrap_err();
        assert!(matches!(err, Error::OutOfUnitBounds { unit_idx: 1, .. }));
        let err = unit.write_data_at(b"hello", 28, 1).await.unwrap_err();
        assert!(matches!(err, Error::OutOfUnitBounds { .. }));
        assert_eq!(unit.write_data_at(b"", 0, 1).await.unwrap(), 0);
        assert!(unit.written_ranges().await.is_empty());
    }

    #[tokio::test]
    async fn older_write_keeps_newer_bytes() {
        let swap_file = memory_swap_file();
        let unit = swap_file.new_unit(0).unwrap();
        unit.write_data_at(&[5u8; 10], 0, 5).await.unwrap();
        unit.write_data_at(&[1u8; 4], 8, 1).await.unwrap();
        assert_eq!(
            unit.written_ranges().await,
            vec![WrittenRange::new(0, 10, 5), WrittenRange::new(10, 12, 1)]
        );
        let mut dst = vec![0u8; 12];
        unit.read_data_at(&mut dst, 0, 0).await.unwrap();
        assert_eq!(&dst[..10], &[5u8; 10]);
        assert_eq!(&dst[10..], &[1u8; 2]);
        assert_eq!(unit.out_of_order_writes().await, 1);
        assert_eq!(unit.last_modified_ts_ns().await, 5);
    }

    #[tokio::test]
    async fn failed_write_is_not_recorded() {
        let device = Arc::new(FlakyDevice {
            inner:          MemoryDevice::new(4 * UNIT as u64),
            healthy_writes: AtomicUsize::new(0),
        });
        let swap_file = SwapFile::new(device.clone(), UNIT);
        let unit = swap_file.new_unit(0).unwrap();

        let err = unit.write_data_at(b"hello", 0, 1).await.unwrap_err();
        assert!(matches!(err, Error::DeviceIoError { .. }));
        assert!(unit.written_ranges().await.is_empty());

        device.healthy_writes.store(usize::MAX, Ordering::Release);
        unit.write_data_at(b"hello", 0, 1).await.unwrap();
        assert_eq!(unit.written_ranges().await, vec![WrittenRange::new(0, 5, 1)]);
    }

    #[tokio::test]
    async fn partly_failed_write_keeps_landed_pieces() {
        let device = Arc::new(FlakyDevice {
            inner:          MemoryDevice::new(4 * UNIT as u64),
            healthy_writes: AtomicUsize::new(usize::MAX),
        });
        let swap_file = SwapFile::new(device.clone(), UNIT);
        let unit = swap_file.new_unit(0).unwrap();
        unit.write_data_at(b"oooo", 0, 1).await.unwrap();
        unit.write_data_at(b"NN", 4, 9).await.unwrap();

        // pieces [0, 4) and [6, 10), the second one fails.
        device.healthy_writes.store(1, Ordering::Release);
        let err = unit.write_data_at(&[b'x'; 10], 0, 5).await.unwrap_err();
        assert!(matches!(err, Error::DeviceIoError { .. }));
        assert_eq!(
            unit.written_ranges().await,
            vec![WrittenRange::new(0, 4, 5), WrittenRange::new(4, 6, 9)]
        );

        let mut dst = vec![b'.'; 10];
        assert_eq!(unit.read_data_at(&mut dst, 0, 0).await.unwrap(), 6);
        assert_eq!(&dst, b"xxxxNN....");
        assert_eq!(unit.last_modified_ts_ns().await, 9);
    }

    #[tokio::test]
    async fn complete_and_save() {
        let swap_file = memory_swap_file();
        let unit = swap_file.new_unit(1).unwrap();
        unit.write_data_at(&[1u8; 8], 16, 1).await.unwrap();
        assert!(!unit.is_complete().await);
        unit.write_data_at(&[2u8; 8], 24, 2).await.unwrap();
        assert!(unit.is_complete().await);
        unit.write_data_at(&[3u8; 4], 20, 3).await.unwrap();
        assert!(unit.is_complete().await);

        let sink = CollectSink::default();
        assert_eq!(unit.save_content(&sink).await.unwrap(), 16);
        let saved = sink.saved.lock().await.clone();
        assert_eq!(
            saved
                .iter()
                .map(|(_, off, len, ts)| (*off, *len, *ts))
                .collect::<Vec<_>>(),
            vec![(16, 4, 1), (20, 4, 3), (24, 8, 2)]
        );
        assert_eq!(saved[1].0.as_ref(), &[3u8; 4]);

        // a second flush walks the ranges again.
        assert_eq!(unit.save_content(&sink).await.unwrap(), 16);
        assert_eq!(sink.saved.lock().await.len(), 6);
    }

    #[tokio::test]
    async fn rejected_save_propagates() {
        let swap_file = memory_swap_file();
        let unit = swap_file.new_unit(0).unwrap();
        unit.write_data_at(b"abc", 0, 1).await.unwrap();
        let sink = CollectSink::default();
        sink.reject.store(true, Ordering::Release);
        let err = unit.save_content(&sink).await.unwrap_err();
        assert!(matches!(err, Error::FlushRejected { offset: 0, len: 3, .. }));
        // bookkeeping is untouched.
        assert_eq!(unit.written_ranges().await, vec![WrittenRange::new(0, 3, 1)]);
    }

    #[tokio::test]
    async fn sealed_unit_rejects_writes() {
        let swap_file = memory_swap_file();
        let unit = swap_file.new_unit(0).unwrap();
        unit.seal().await;
        let err = unit.write_data_at(b"abc", 0, 1).await.unwrap_err();
        assert!(err.is_sealed());
        unit.unseal().await;
        unit.write_data_at(b"abc", 0, 1).await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_writers() {
        let swap_file = SwapFile::new(Arc::new(MemoryDevice::new(1 << 20)), 1 << 16);
        let unit = Arc::new(swap_file.new_unit(0).unwrap());
        let handles = (0..16u64)
            .map(|i| {
                let unit = unit.clone();
                tokio::spawn(async move {
                    let data = vec![i as u8; 4096];
                    unit.write_data_at(&data, i * 4096, i as i64 + 1)
                        .await
                        .unwrap();
                })
            })
            .collect::<Vec<_>>();
        futures::future::join_all(handles).await;
        assert!(unit.is_complete().await);

        let mut dst = vec![0u8; 1 << 16];
        unit.read_data_at(&mut dst, 0, 0).await.unwrap();
        for i in 0..16usize {
            assert!(dst[i * 4096..(i + 1) * 4096].iter().all(|b| *b == i as u8));
        }
    }
}
