use std::ops::Range;
use std::sync::Arc;

use log::debug;

use crate::{error::ReadError, LinkedReadsDatastore, RefPair, Result};

/// Number of pairs a worker processes between calls to [`ParallelProcessor::on_batch_complete`]
pub const BATCH_SIZE: usize = 1024;

/// Trait for datastores that can process pairs in parallel
///
/// This is implemented by the **reader** not by the **processor**.
/// For the **processor**, see the [`ParallelProcessor`] trait.
pub trait ParallelReader {
    /// Processes every pair, splitting the pair range across `num_threads` workers
    ///
    /// A `num_threads` of 0 uses every available core.
    fn process_parallel<P: ParallelProcessor + Clone + 'static>(
        self,
        processor: P,
        num_threads: usize,
    ) -> Result<()>;

    /// Processes the pairs within a 0-based pair index range
    fn process_parallel_range<P: ParallelProcessor + Clone + 'static>(
        self,
        processor: P,
        num_threads: usize,
        range: Range<usize>,
    ) -> Result<()>;
}

/// Trait for types that can process pairs in parallel.
///
/// Each worker receives its own clone of the processor.
/// For the **reader**, see the [`ParallelReader`] trait.
pub trait ParallelProcessor: Send + Clone {
    /// Process a single pair
    fn process_pair(&mut self, pair: RefPair<'_>) -> Result<()>;

    /// Called when a thread finishes processing a batch
    /// Default implementation does nothing
    fn on_batch_complete(&mut self) -> Result<()> {
        Ok(())
    }

    /// Set the thread ID for this processor
    ///
    /// Each thread calls this method with its own unique ID.
    #[allow(unused_variables)]
    fn set_tid(&mut self, tid: usize) {
        // Default implementation does nothing
    }

    /// Get the thread ID for this processor
    fn get_tid(&self) -> Option<usize> {
        None
    }
}

impl ParallelReader for LinkedReadsDatastore {
    fn process_parallel<P: ParallelProcessor + Clone + 'static>(
        self,
        processor: P,
        num_threads: usize,
    ) -> Result<()> {
        let num_pairs = self.num_pairs();
        self.process_parallel_range(processor, num_threads, 0..num_pairs)
    }

    fn process_parallel_range<P: ParallelProcessor + Clone + 'static>(
        self,
        processor: P,
        num_threads: usize,
        range: Range<usize>,
    ) -> Result<()> {
        let num_threads = if num_threads == 0 {
            num_cpus::get()
        } else {
            num_threads.min(num_cpus::get())
        };

        let num_pairs = self.num_pairs();
        if range.start >= num_pairs || range.end > num_pairs || range.start >= range.end {
            return Ok(());
        }

        let range_size = range.end - range.start;
        let pairs_per_thread = range_size.div_ceil(num_threads);
        debug!(
            "Processing {} pairs of {} on {} threads",
            range_size,
            self.name(),
            num_threads
        );

        let reader = Arc::new(self);

        let mut handles = Vec::new();
        for tid in 0..num_threads {
            let mut processor = processor.clone();
            let reader = reader.clone();
            processor.set_tid(tid);

            let handle = std::thread::spawn(move || -> Result<()> {
                let start_idx = range.start + tid * pairs_per_thread;
                let end_idx = (start_idx + pairs_per_thread).min(range.end);

                if start_idx >= end_idx {
                    return Ok(());
                }

                for batch_start in (start_idx..end_idx).step_by(BATCH_SIZE) {
                    let batch_end = (batch_start + BATCH_SIZE).min(end_idx);
                    for idx in batch_start..batch_end {
                        processor.process_pair(reader.get_pair(idx)?)?;
                    }
                    processor.on_batch_complete()?;
                }

                Ok(())
            });

            handles.push(handle);
        }

        for handle in handles {
            handle.join().map_err(|_| ReadError::WorkerPanic)??;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemorySource;
    use crate::tag::FnTagExtractor;
    use crate::LinkedReadsBuilder;
    use parking_lot::Mutex;

    #[derive(Clone, Default)]
    struct TagCounter {
        tid: Option<usize>,
        local: Vec<(u32, u64, u64)>,
        global: Arc<Mutex<Vec<(u32, u64, u64)>>>,
        batches: Arc<Mutex<usize>>,
    }
    impl ParallelProcessor for TagCounter {
        fn process_pair(&mut self, pair: RefPair<'_>) -> Result<()> {
            let mut dbuf = Vec::new();
            pair.decode_r1(&mut dbuf)?;
            assert_eq!(dbuf.len() as u64, pair.len1());
            self.local.push((pair.tag(), pair.len1(), pair.len2()));
            Ok(())
        }

        fn on_batch_complete(&mut self) -> Result<()> {
            self.global.lock().append(&mut self.local);
            *self.batches.lock() += 1;
            Ok(())
        }

        fn set_tid(&mut self, tid: usize) {
            self.tid = Some(tid);
        }

        fn get_tid(&self) -> Option<usize> {
            self.tid
        }
    }

    fn numeric_tag(id: &[u8]) -> u32 {
        std::str::from_utf8(id)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }

    fn build(dir: &std::path::Path, num_pairs: u32) -> anyhow::Result<LinkedReadsDatastore> {
        let mut r1 = InMemorySource::default();
        let mut r2 = InMemorySource::default();
        for i in 0..num_pairs {
            let tag = (i % 17) + 1;
            let id = tag.to_string();
            r1.push(id.as_bytes(), &vec![b'A'; (i % 50) as usize]);
            r2.push(id.as_bytes(), &vec![b'T'; (i % 30) as usize]);
        }
        let datastore = LinkedReadsBuilder::default()
            .max_read_length(64)
            .batch_size(500)
            .build(
                dir.join("parallel.lrds"),
                r1,
                r2,
                FnTagExtractor(numeric_tag),
            )?;
        Ok(datastore)
    }

    #[test]
    fn test_process_parallel_visits_every_pair() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let datastore = build(dir.path(), 3000)?;
        let mut expected = Vec::new();
        for idx in 0..datastore.num_pairs() {
            let pair = datastore.get_pair(idx)?;
            expected.push((pair.tag(), pair.len1(), pair.len2()));
        }

        let processor = TagCounter::default();
        datastore.process_parallel(processor.clone(), 4)?;

        let mut observed = processor.global.lock().clone();
        observed.sort_unstable();
        expected.sort_unstable();
        assert_eq!(observed, expected);
        assert!(*processor.batches.lock() >= 3);
        Ok(())
    }

    #[test]
    fn test_process_parallel_range() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let datastore = build(dir.path(), 100)?;

        let processor = TagCounter::default();
        datastore.process_parallel_range(processor.clone(), 0, 10..30)?;
        assert_eq!(processor.global.lock().len(), 20);
        Ok(())
    }

    #[test]
    fn test_process_parallel_empty_range() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let datastore = build(dir.path(), 10)?;

        let processor = TagCounter::default();
        datastore.process_parallel_range(processor.clone(), 2, 10..20)?;
        assert!(processor.global.lock().is_empty());
        Ok(())
    }
}
