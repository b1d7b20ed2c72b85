//! Partitioning: contiguous batches and the fixed-size streaming chunker.

/// Split `items` into contiguous batches of at most `batch_size` elements.
///
/// Concatenating the output in order reproduces `items`. Empty input yields no
/// batches, and a `batch_size` of zero is treated as one.
pub fn create_batches<T: Clone>(items: &[T], batch_size: usize) -> Vec<Vec<T>> {
    items
        .chunks(batch_size.max(1))
        .map(|chunk| chunk.to_vec())
        .collect()
}

/// Owning variant of [`create_batches`]; moves items instead of cloning them.
pub fn into_batches<T>(items: Vec<T>, batch_size: usize) -> Vec<Vec<T>> {
    let size = batch_size.max(1);
    let mut batches = Vec::with_capacity(items.len().div_ceil(size));
    let mut iter = items.into_iter();
    loop {
        let batch: Vec<T> = iter.by_ref().take(size).collect();
        if batch.is_empty() {
            break;
        }
        batches.push(batch);
    }
    batches
}

/// Outcome of pushing one item into a [`StreamingChunker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkAddResult {
    Added { count: usize },
    ShouldFlush { count: usize },
}

impl ChunkAddResult {
    pub fn should_flush(&self) -> bool {
        matches!(self, ChunkAddResult::ShouldFlush { .. })
    }
    pub fn count(&self) -> usize {
        match self {
            ChunkAddResult::Added { count } | ChunkAddResult::ShouldFlush { count } => *count,
        }
    }
}

/// Fixed-size buffer that signals when it is full.
///
/// The caller decides what a flush means (commit a chunk, emit a batch); the
/// chunker only tracks fill level and the number of flushes so far.
#[derive(Debug)]
pub struct StreamingChunker<T> {
    capacity: usize,
    buffer: Vec<T>,
    flushes: usize,
}

impl<T> StreamingChunker<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            buffer: Vec::new(),
            flushes: 0,
        }
    }

    pub fn push(&mut self, item: T) -> ChunkAddResult {
        self.buffer.push(item);
        let count = self.buffer.len();
        if count >= self.capacity {
            ChunkAddResult::ShouldFlush { count }
        } else {
            ChunkAddResult::Added { count }
        }
    }

    /// Take the buffered items. An empty buffer is not counted as a flush.
    pub fn flush(&mut self) -> Vec<T> {
        if self.buffer.is_empty() {
            return Vec::new();
        }
        self.flushes += 1;
        std::mem::take(&mut self.buffer)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
    pub fn capacity(&self) -> usize {
        self.capacity
    }
    pub fn flushes(&self) -> usize {
        self.flushes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_batching() {
        let items: Vec<i32> = (1..=10).collect();
        let batches = create_batches(&items, 3);
        assert_eq!(
            batches,
            vec![vec![1, 2, 3], vec![4, 5, 6], vec![7, 8, 9], vec![10]]
        );
    }

    #[test]
    fn test_partition_law() {
        for len in 0..40usize {
            let items: Vec<usize> = (0..len).collect();
            for size in 1..12usize {
                let batches = create_batches(&items, size);
                let flat: Vec<usize> = batches.iter().flatten().copied().collect();
                assert_eq!(flat, items, "len={} size={}", len, size);
                assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= size));

                let owned = into_batches(items.clone(), size);
                assert_eq!(owned, batches);
            }
        }
    }

    #[test]
    fn test_empty_input_yields_no_batches() {
        let items: Vec<i32> = Vec::new();
        assert!(create_batches(&items, 5).is_empty());
        assert!(into_batches(items, 5).is_empty());
    }

    #[test]
    fn test_oversized_batch_is_single_batch() {
        let items = vec!["a", "b", "c"];
        assert_eq!(create_batches(&items, 3).len(), 1);
        assert_eq!(create_batches(&items, 100), vec![items.clone()]);
    }

    #[test]
    fn test_zero_batch_size_is_clamped() {
        let items = vec![1, 2];
        assert_eq!(create_batches(&items, 0), vec![vec![1], vec![2]]);
    }

    #[test]
    fn test_chunker_flush_signal() {
        let mut chunker = StreamingChunker::new(3);
        assert!(!chunker.push(1).should_flush());
        assert!(!chunker.push(2).should_flush());
        let result = chunker.push(3);
        assert!(result.should_flush());
        assert_eq!(result.count(), 3);

        assert_eq!(chunker.flush(), vec![1, 2, 3]);
        assert!(chunker.is_empty());
        assert_eq!(chunker.flushes(), 1);
    }

    #[test]
    fn test_chunker_empty_flush_not_counted() {
        let mut chunker: StreamingChunker<u8> = StreamingChunker::new(0);
        assert_eq!(chunker.capacity(), 1);
        assert!(chunker.flush().is_empty());
        assert_eq!(chunker.flushes(), 0);
    }

    #[test]
    fn test_huge_capacity_does_not_preallocate() {
        let mut chunker = StreamingChunker::new(usize::MAX / 2);
        for i in 0..5 {
            assert!(!chunker.push(i).should_flush());
        }
        assert_eq!(chunker.flush(), vec![0, 1, 2, 3, 4]);
        assert_eq!(into_batches(vec![1, 2, 3], usize::MAX), vec![vec![1, 2, 3]]);
    }
}
