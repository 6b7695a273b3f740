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

//! End to end checks: writes go through the page writer, get flushed to
//! object storage as chunks, and are read back through the chunk resolver.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use kasane_common::TsNs;
    use kasane_storage::{ObjectStorageSink, PageWriter, StorageConfig};
    use kasane_utils::{logger::install_fmt_log, object_storage::new_memory_object_store};
    use kasane_vfs::{FileReader, ObjectContentStore};
    use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};

    const UNIT: usize = 16;

    struct Harness {
        writer: PageWriter,
        sink:   Arc<ObjectStorageSink>,
        store:  Arc<ObjectContentStore>,
    }

    impl Harness {
        async fn new(config: &StorageConfig) -> Self {
            let object_storage = new_memory_object_store();
            let sink = Arc::new(ObjectStorageSink::new(object_storage.clone(), "files/1"));
            let writer = PageWriter::open(config, sink.clone()).await.unwrap();
            Self {
                writer,
                sink,
                store: Arc::new(ObjectContentStore::new(object_storage)),
            }
        }

        async fn reader(&self) -> FileReader {
            FileReader::new(self.sink.chunks().await, self.store.clone())
        }
    }

    fn memory_config() -> StorageConfig {
        StorageConfig::default()
            .with_memory_only(true)
            .with_unit_size(UNIT)
            .with_swap_capacity(4 * UNIT)
            .with_max_dirty_units(4)
    }

    // every byte takes the value of the newest write covering it.
    struct ByteModel {
        bytes: Vec<Option<(TsNs, u8)>>,
    }

    impl ByteModel {
        fn new(size: usize) -> Self {
            Self {
                bytes: vec![None; size],
            }
        }

        fn write(&mut self, offset: usize, len: usize, ts: TsNs, value: u8) {
            for b in &mut self.bytes[offset..offset + len] {
                if b.map_or(true, |(old, _)| old < ts) {
                    *b = Some((ts, value));
                }
            }
        }

        fn size(&self) -> usize {
            self.bytes
                .iter()
                .rposition(Option::is_some)
                .map_or(0, |i| i + 1)
        }

        fn expected(&self) -> Vec<u8> {
            self.bytes[..self.size()]
                .iter()
                .map(|b| b.map_or(0, |(_, v)| v))
                .collect()
        }
    }

    #[tokio::test]
    async fn overwrite_then_read_back() {
        install_fmt_log();

        let h = Harness::new(&memory_config()).await;
        // units 0 and 1 complete and get flushed right away.
        h.writer.write(0, &[b'a'; 40], 1).await.unwrap();
        assert_eq!(h.sink.chunks().await.len(), 2);
        assert_eq!(h.writer.dirty_units().await, 1);

        h.writer.write(10, &[b'b'; 10], 3).await.unwrap();
        // older than the b write, only the part past it survives.
        h.writer.write(12, &[b'c'; 12], 2).await.unwrap();
        h.writer.flush().await.unwrap();
        assert_eq!(h.writer.dirty_units().await, 0);
        assert_eq!(h.writer.swap_file().active_units(), 0);

        let reader = h.reader().await;
        assert_eq!(reader.size(), 40);
        let mut dst = vec![0u8; 64];
        let n = reader.read(0, &mut dst).await.unwrap();
        assert_eq!(n, 40);

        let mut expected = vec![b'a'; 40];
        expected[10..20].fill(b'b');
        expected[20..24].fill(b'c');
        assert_eq!(&dst[..n], expected.as_slice());
    }

    #[tokio::test]
    async fn sparse_writes_leave_zero_holes() {
        let h = Harness::new(&memory_config()).await;
        h.writer.write(3, b"xy", 5).await.unwrap();
        h.writer.write(50, b"z", 6).await.unwrap();
        h.writer.flush().await.unwrap();

        let reader = h.reader().await;
        let mut dst = vec![b'.'; 51];
        assert_eq!(reader.read(0, &mut dst).await.unwrap(), 51);
        let mut expected = vec![0u8; 51];
        expected[3..5].copy_from_slice(b"xy");
        expected[50] = b'z';
        assert_eq!(dst, expected);
    }

    async fn random_writes(config: StorageConfig, seed: u64) {
        const FILE_SIZE: usize = 256;
        let mut rng = StdRng::seed_from_u64(seed);
        let h = Harness::new(&config).await;
        let mut model = ByteModel::new(FILE_SIZE);

        let mut timestamps = (1..=200).collect::<Vec<TsNs>>();
        timestamps.shuffle(&mut rng);
        for (i, ts) in timestamps.into_iter().enumerate() {
            let offset = rng.gen_range(0..FILE_SIZE - 1);
            let len = rng.gen_range(1..=40usize.min(FILE_SIZE - offset));
            let value = (i % 251) as u8 + 1;
            h.writer
                .write(offset as u64, &vec![value; len], ts)
                .await
                .unwrap();
            model.write(offset, len, ts, value);
        }
        h.writer.flush().await.unwrap();

        let reader = h.reader().await;
        assert_eq!(reader.size() as usize, model.size());
        let mut dst = vec![0u8; FILE_SIZE];
        let n = reader.read(0, &mut dst).await.unwrap();
        assert_eq!(&dst[..n], model.expected().as_slice(), "seed {}", seed);

        // a window in the middle agrees too.
        let expected = model.expected();
        let mut window = vec![0u8; 37];
        let n = reader.read(100, &mut window).await.unwrap();
        assert_eq!(n, expected.len().saturating_sub(100).min(37));
        assert_eq!(&window[..n], &expected[expected.len().min(100)..][..n]);
    }

    #[tokio::test]
    async fn random_writes_in_memory() {
        for seed in 0..8 {
            random_writes(memory_config().with_max_dirty_units(3), seed).await;
        }
    }

    #[tokio::test]
    async fn random_writes_through_swap_file() {
        install_fmt_log();

        let dir = tempfile::tempdir().unwrap();
        let config = memory_config()
            .with_memory_only(false)
            .with_swap_dir(dir.path());
        for seed in 100..104 {
            random_writes(config.clone(), seed).await;
        }
    }
}
