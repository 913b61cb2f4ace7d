/// Inclusive 1-based item range a chunk asks the model for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChunkRange {
    pub(crate) start: u32,
    pub(crate) end: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Chunk {
    pub(crate) index: u32,
    /// `None` for the single unframed call of a small document.
    pub(crate) range: Option<ChunkRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChunkPlan {
    expected: u32,
    chunk_size: u32,
}

impl ChunkPlan {
    pub(crate) fn new(expected: u32, chunk_size: u32) -> Self {
        Self { expected, chunk_size: chunk_size.max(1) }
    }

    pub(crate) fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    pub(crate) fn is_chunked(&self) -> bool {
        self.expected > self.chunk_size
    }

    pub(crate) fn total_chunks(&self) -> u32 {
        if self.is_chunked() {
            self.expected.div_ceil(self.chunk_size)
        } else {
            1
        }
    }

    pub(crate) fn chunk(&self, index: u32) -> Option<Chunk> {
        if index >= self.total_chunks() {
            return None;
        }
        if !self.is_chunked() {
            return Some(Chunk { index, range: None });
        }

        let start = index * self.chunk_size + 1;
        let end = ((index + 1) * self.chunk_size).min(self.expected);
        Some(Chunk { index, range: Some(ChunkRange { start, end }) })
    }

    /// Chunk index a resume run starts from, given how many items are already stored.
    pub(crate) fn start_index_for_saved(&self, saved: u32) -> u32 {
        if self.is_chunked() {
            saved / self.chunk_size
        } else {
            0
        }
    }

    pub(crate) fn chunks_from(&self, start: u32) -> impl Iterator<Item = Chunk> + '_ {
        (start..self.total_chunks()).filter_map(|index| self.chunk(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_documents_are_not_chunked() {
        let plan = ChunkPlan::new(25, 30);
        assert!(!plan.is_chunked());
        assert_eq!(plan.total_chunks(), 1);
        assert_eq!(plan.chunk(0), Some(Chunk { index: 0, range: None }));
        assert_eq!(plan.chunk(1), None);
    }

    #[test]
    fn boundary_equal_to_chunk_size_is_unchunked() {
        assert!(!ChunkPlan::new(30, 30).is_chunked());
        assert_eq!(ChunkPlan::new(31, 30).total_chunks(), 2);
    }

    #[test]
    fn ranges_partition_expected_items() {
        for (expected, size) in [(31, 30), (45, 10), (100, 30), (61, 20), (7, 3)] {
            let plan = ChunkPlan::new(expected, size);
            let mut next = 1;
            for chunk in plan.chunks_from(0) {
                let range = chunk.range.expect("chunked plan has ranges");
                assert_eq!(range.start, next, "gap or overlap for {expected}/{size}");
                assert!(range.end >= range.start);
                assert!(range.end - range.start < size);
                next = range.end + 1;
            }
            assert_eq!(next, expected + 1, "ranges must cover 1..={expected}");
            assert_eq!(plan.total_chunks(), expected.div_ceil(size));
        }
    }

    #[test]
    fn resume_starts_after_saved_items() {
        let plan = ChunkPlan::new(100, 30);
        assert_eq!(plan.start_index_for_saved(0), 0);
        assert_eq!(plan.start_index_for_saved(29), 0);
        assert_eq!(plan.start_index_for_saved(60), 2);
        assert_eq!(plan.chunks_from(plan.start_index_for_saved(95)).count(), 1);
        assert_eq!(ChunkPlan::new(10, 30).start_index_for_saved(9), 0);
    }

    #[test]
    fn zero_chunk_size_is_clamped() {
        let plan = ChunkPlan::new(3, 0);
        assert_eq!(plan.chunk_size(), 1);
        assert_eq!(plan.total_chunks(), 3);
    }
}
