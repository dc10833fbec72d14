use std::mem;
use std::ops::Deref;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Process-wide bounded block allocator backing message payload storage.
///
/// The pool is the admission-control valve: when every block is handed
/// out, `acquire` returns `None` and the caller discards the incoming
/// message instead of growing without bound.  Block reservation is a
/// lock-free counter; freed buffers go through a mutex-guarded recycle
/// list so steady-state traffic reuses allocations.
pub struct BufferPool {
    block_size: usize,
    block_count: usize,
    blocks_in_use: AtomicUsize,
    recycled: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    pub fn new(block_size: usize, block_count: usize) -> Arc<BufferPool> {
        assert!(block_size > 0, "pool block size must be positive");

        Arc::new(BufferPool {
                     block_size: block_size,
                     block_count: block_count,
                     blocks_in_use: AtomicUsize::new(0),
                     recycled: Mutex::new(Vec::new()),
                 })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn capacity_bytes(&self) -> usize {
        self.block_size * self.block_count
    }

    pub fn blocks_in_use(&self) -> usize {
        self.blocks_in_use.load(Ordering::SeqCst)
    }

    pub fn bytes_in_use(&self) -> usize {
        self.blocks_in_use() * self.block_size
    }

    /// Reserve storage for `nbytes` payload bytes, rounded up to whole
    /// blocks (at least one, so every message owns pool storage).
    /// Returns `None` when the reservation would exceed the pool.
    pub fn acquire(pool: &Arc<BufferPool>, nbytes: usize) -> Option<PoolBuf> {
        let needed = pool.blocks_needed(nbytes);

        loop {
            let used = pool.blocks_in_use.load(Ordering::SeqCst);

            if used + needed > pool.block_count {
                return None;
            }

            if pool.blocks_in_use
                   .compare_and_swap(used, used + needed, Ordering::SeqCst) == used {
                break;
            }
        }

        let capacity = needed * pool.block_size;
        let data = {
            let mut recycled = pool.recycled.lock().expect("buffer pool lock poisoned");

            match recycled
                      .iter()
                      .position(|buf| buf.capacity() >= capacity) {
                Some(idx) => recycled.swap_remove(idx),
                None => Vec::with_capacity(capacity),
            }
        };

        Some(PoolBuf {
                 data: data,
                 blocks: needed,
                 pool: Arc::clone(pool),
             })
    }

    fn blocks_needed(&self, nbytes: usize) -> usize {
        if nbytes == 0 {
            1
        } else {
            (nbytes + self.block_size - 1) / self.block_size
        }
    }

    fn release(&self, blocks: usize, mut data: Vec<u8>) {
        data.clear();

        {
            let mut recycled = self.recycled.lock().expect("buffer pool lock poisoned");

            if recycled.len() < self.block_count {
                recycled.push(data);
            }
        }

        self.blocks_in_use.fetch_sub(blocks, Ordering::SeqCst);
    }
}

/// Storage drawn from a `BufferPool`.  Dropping the buffer returns its
/// blocks to the pool.
pub struct PoolBuf {
    data: Vec<u8>,
    blocks: usize,
    pool: Arc<BufferPool>,
}

impl PoolBuf {
    pub fn capacity(&self) -> usize {
        self.blocks * self.pool.block_size
    }

    pub fn blocks(&self) -> usize {
        self.blocks
    }

    /// Append payload bytes; the caller sized the reservation, so
    /// overrunning it is a bug.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        assert!(self.data.len() + bytes.len() <= self.capacity(),
                "pool buffer overrun");
        self.data.extend_from_slice(bytes);
    }
}

impl Deref for PoolBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for PoolBuf {
    fn drop(&mut self) {
        let data = mem::replace(&mut self.data, Vec::new());

        self.pool.release(self.blocks, data);
    }
}
