//! Independent random streams, one per grid cell.
//!
//! Every cell owns a private MT19937 stream seeded with `seed + index`, and one
//! extra stream (the last index) is reserved for the scheduler. Because no two
//! executing cells ever touch the same stream, a batch can run on any number of
//! threads and each stream still yields exactly the same sequence.

use rand::RngCore;
use rand_mt::Mt;

/// A single stream of the pool.
///
/// The 2.5 KB state block is only expanded on the first draw. Expansion depends
/// on nothing but the stream's seed, so laziness never changes the output.
#[derive(Clone, Debug)]
pub struct RngStream {
    seed: u32,
    mt: Option<Box<Mt>>,
}

impl RngStream {
    pub fn new(seed: u32) -> Self {
        Self { seed, mt: None }
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Whether this stream has been drawn from yet.
    pub fn is_materialized(&self) -> bool {
        self.mt.is_some()
    }

    #[inline]
    fn generator(&mut self) -> &mut Mt {
        let seed = self.seed;
        self.mt.get_or_insert_with(|| Box::new(Mt::new(seed)))
    }
}

impl RngCore for RngStream {
    #[inline]
    fn next_u32(&mut self) -> u32 {
        RngCore::next_u32(self.generator())
    }

    /// Two consecutive 32-bit outputs, the first in the high half.
    #[inline]
    fn next_u64(&mut self) -> u64 {
        RngCore::next_u64(self.generator())
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        RngCore::fill_bytes(self.generator(), dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        RngCore::try_fill_bytes(self.generator(), dest)
    }
}

/// Pool of `cells + 1` streams derived from one seed.
#[derive(Clone, Debug)]
pub struct RngPool {
    seed: u32,
    streams: Vec<RngStream>,
}

impl RngPool {
    /// Derive one stream per cell plus the reserved scheduler stream.
    pub fn new(seed: u32, cells: usize) -> Self {
        let streams = (0..=cells)
            .map(|i| RngStream::new(seed.wrapping_add(i as u32)))
            .collect();
        Self { seed, streams }
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Number of per-cell streams (the reserved stream is not counted).
    pub fn cells(&self) -> usize {
        self.streams.len() - 1
    }

    /// Index of the reserved scheduler stream.
    pub fn global_index(&self) -> usize {
        self.cells()
    }

    /// The reserved scheduler stream. Never handed to cell execution.
    pub fn global(&mut self) -> &mut RngStream {
        let idx = self.global_index();
        &mut self.streams[idx]
    }

    /// A single per-cell stream.
    pub fn stream(&mut self, index: usize) -> &mut RngStream {
        assert!(index < self.cells(), "stream {} is not a cell stream", index);
        &mut self.streams[index]
    }

    /// Disjoint mutable access to several per-cell streams at once.
    ///
    /// `indices` must be strictly increasing and below [`cells`](Self::cells);
    /// the returned borrows are in the same order.
    pub fn streams_for(&mut self, indices: &[usize]) -> Vec<&mut RngStream> {
        let cells = self.cells();
        let mut rest: &mut [RngStream] = &mut self.streams[..cells];
        let mut offset = 0;
        let mut out = Vec::with_capacity(indices.len());

        for &index in indices {
            assert!(
                index >= offset,
                "stream indices must be strictly increasing"
            );
            let tail = std::mem::take(&mut rest);
            let (_, tail) = tail.split_at_mut(index - offset);
            let (head, tail) = tail.split_at_mut(1);
            out.push(&mut head[0]);
            rest = tail;
            offset = index + 1;
        }

        out
    }

    /// How many streams have been drawn from so far.
    pub fn materialized(&self) -> usize {
        self.streams.iter().filter(|s| s.is_materialized()).count()
    }
}
