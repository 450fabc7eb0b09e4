//! Fixed-block memory pools
//!
//! [`BlockPool`] is the allocator core, shared with message queues. Free
//! blocks form a singly-linked list threaded through the first four bytes of
//! each block, so allocation and release are O(1) and need no storage besides
//! the blocks themselves and an in-use bitmap.
use alloc::{vec, vec::Vec};
use core::fmt;

use crate::{
    cfg::MemoryPoolAttr,
    error::KernelError,
    object::{MemoryPoolId, ObjectHeader, ThreadId},
    port::Port,
    state::Kernel,
    timeout::Timeout,
    wait::{Outcome, QueueRef, WaitQueue, WaitReason, WaitValue},
};

const NIL: u32 = u32::MAX;

/// A block allocated from a memory pool.
///
/// Blocks are not `Clone`: a block can be freed only once. Access its
/// contents through [`Kernel::memory_pool_block`] and
/// [`Kernel::memory_pool_block_mut`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Block {
    pool: MemoryPoolId,
    index: u32,
}

impl Block {
    /// Get the pool the block was allocated from.
    #[inline]
    pub fn pool(&self) -> MemoryPoolId {
        self.pool
    }

    /// Get the index of the block within its pool.
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }
}

/// Fixed-size block allocator over a contiguous byte buffer.
pub(crate) struct BlockPool {
    storage: Vec<u8>,
    block_size: usize,
    block_count: u32,
    /// The first free block, or `NIL`.
    free_head: u32,
    used: u32,
    in_use: Vec<bool>,
}

impl fmt::Debug for BlockPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockPool")
            .field("block_size", &self.block_size)
            .field("block_count", &self.block_count)
            .field("used", &self.used)
            .finish_non_exhaustive()
    }
}

impl BlockPool {
    /// Construct a pool of `block_count` blocks. `block_size` is rounded up to
    /// a multiple of four. Returns `None` if either is zero or the storage
    /// size overflows.
    pub(crate) fn new(block_count: u32, block_size: u32) -> Option<Self> {
        if block_count == 0 || block_count == NIL || block_size == 0 {
            return None;
        }
        let block_size = (block_size as usize).checked_add(3)? & !3;
        let len = block_size.checked_mul(block_count as usize)?;

        let mut this = Self {
            storage: vec![0; len],
            block_size,
            block_count,
            free_head: NIL,
            used: 0,
            in_use: vec![false; block_count as usize],
        };
        this.reset();
        Some(this)
    }

    /// Mark every block free.
    pub(crate) fn reset(&mut self) {
        for i in 0..self.block_count {
            let next = if i + 1 < self.block_count { i + 1 } else { NIL };
            self.set_next(i, next);
        }
        self.free_head = 0;
        self.used = 0;
        self.in_use.fill(false);
    }

    fn next_of(&self, index: u32) -> u32 {
        let start = index as usize * self.block_size;
        let mut bytes = [0; 4];
        bytes.copy_from_slice(&self.storage[start..start + 4]);
        u32::from_le_bytes(bytes)
    }

    fn set_next(&mut self, index: u32, next: u32) {
        let start = index as usize * self.block_size;
        self.storage[start..start + 4].copy_from_slice(&next.to_le_bytes());
    }

    pub(crate) fn alloc(&mut self) -> Option<u32> {
        let index = self.free_head;
        if index == NIL {
            return None;
        }
        self.free_head = self.next_of(index);
        self.in_use[index as usize] = true;
        self.used += 1;
        Some(index)
    }

    /// Return a block. Fails if `index` is out of range or not allocated.
    pub(crate) fn free(&mut self, index: u32) -> Result<(), KernelError> {
        match self.in_use.get_mut(index as usize) {
            Some(in_use) if *in_use => *in_use = false,
            _ => return Err(KernelError::InvalidParameter),
        }
        self.set_next(index, self.free_head);
        self.free_head = index;
        self.used -= 1;
        Ok(())
    }

    #[inline]
    pub(crate) fn block(&self, index: u32) -> &[u8] {
        let start = index as usize * self.block_size;
        &self.storage[start..start + self.block_size]
    }

    #[inline]
    pub(crate) fn block_mut(&mut self, index: u32) -> &mut [u8] {
        let start = index as usize * self.block_size;
        &mut self.storage[start..start + self.block_size]
    }

    #[inline]
    pub(crate) fn is_allocated(&self, index: u32) -> bool {
        self.in_use.get(index as usize).copied().unwrap_or(false)
    }

    #[inline]
    pub(crate) fn block_size(&self) -> usize {
        self.block_size
    }

    #[inline]
    pub(crate) fn capacity(&self) -> u32 {
        self.block_count
    }

    #[inline]
    pub(crate) fn used(&self) -> u32 {
        self.used
    }
}

/// *Memory pool control block* - the state data of a memory pool.
#[derive(Debug)]
pub(crate) struct MemoryPoolCb {
    pub(crate) header: ObjectHeader,
    pub(crate) wait_queue: WaitQueue,
    pub(crate) pool: BlockPool,
}

impl<P: Port> Kernel<P> {
    pub fn memory_pool_create(
        &mut self,
        attr: MemoryPoolAttr,
    ) -> Result<MemoryPoolId, KernelError> {
        self.expect_operational()?;
        let pool = BlockPool::new(attr.block_count, attr.block_size)
            .ok_or(KernelError::InvalidParameter)?;
        let memory_pool = self
            .memory_pools
            .insert(MemoryPoolCb {
                header: ObjectHeader {
                    name: attr.name,
                    safety_class: attr.safety_class,
                },
                wait_queue: WaitQueue::new(),
                pool,
            })
            .ok_or(KernelError::ResourceExhausted)?;
        log::debug!(
            "created {memory_pool:?} ({:?}, {} x {} bytes)",
            attr.name,
            attr.block_count,
            attr.block_size
        );
        Ok(memory_pool)
    }

    fn memory_pool_cb(&self, memory_pool: MemoryPoolId) -> Result<&MemoryPoolCb, KernelError> {
        self.memory_pools
            .get(memory_pool)
            .ok_or(KernelError::InvalidHandle)
    }

    /// Allocate a block, blocking until one is freed if the pool is exhausted.
    pub fn memory_pool_alloc(
        &mut self,
        memory_pool: MemoryPoolId,
        timeout: Timeout,
    ) -> Result<Outcome<Block>, KernelError> {
        self.expect_operational()?;
        let cb = self
            .memory_pools
            .get_mut(memory_pool)
            .ok_or(KernelError::InvalidHandle)?;

        if let Some(index) = cb.pool.alloc() {
            return Ok(Outcome::Done(Block {
                pool: memory_pool,
                index,
            }));
        }
        if timeout.is_no_wait() {
            return Err(KernelError::ResourceExhausted);
        }

        // The wake-upper hands over the block it frees
        let running = self.expect_waitable_context()?;
        Ok(Outcome::Blocked(self.wait_enter(
            running,
            WaitReason::MemoryPool(memory_pool),
            timeout,
        )))
    }

    /// Return a block to its pool. If a thread is waiting for a block, the
    /// block is handed over to it directly.
    pub fn memory_pool_free(&mut self, block: Block) -> Result<(), KernelError> {
        self.expect_operational()?;
        self.memory_pool_free_core(block)?;
        self.reschedule();
        Ok(())
    }

    pub(crate) fn memory_pool_free_core(&mut self, block: Block) -> Result<(), KernelError> {
        let cb = self
            .memory_pools
            .get_mut(block.pool)
            .ok_or(KernelError::InvalidHandle)?;
        if !cb.pool.is_allocated(block.index) {
            return Err(KernelError::InvalidParameter);
        }

        if let Some(waiter) = cb.wait_queue.first {
            log::trace!("{block:?} handed over to {waiter:?}");
            self.wait_exit(waiter, Ok(WaitValue::Block(block)));
            return Ok(());
        }

        cb.pool.free(block.index)
    }

    /// Return a block that was handed over to a thread that terminated before
    /// collecting it.
    pub(crate) fn reclaim_undelivered_block(&mut self, thread: ThreadId) {
        let cb = &mut self.threads[thread];
        if matches!(cb.wait_result, Ok(WaitValue::Block(_))) {
            if let Ok(WaitValue::Block(block)) =
                core::mem::replace(&mut cb.wait_result, Ok(WaitValue::None))
            {
                let _ = self.memory_pool_free_core(block);
            }
        }
    }

    /// Get the contents of an allocated block.
    pub fn memory_pool_block(&self, block: &Block) -> Result<&[u8], KernelError> {
        Ok(self.memory_pool_cb(block.pool)?.pool.block(block.index))
    }

    pub fn memory_pool_block_mut(&mut self, block: &Block) -> Result<&mut [u8], KernelError> {
        Ok(self
            .memory_pools
            .get_mut(block.pool)
            .ok_or(KernelError::InvalidHandle)?
            .pool
            .block_mut(block.index))
    }

    /// Get the number of blocks in a pool.
    pub fn memory_pool_capacity(&self, memory_pool: MemoryPoolId) -> Result<u32, KernelError> {
        Ok(self.memory_pool_cb(memory_pool)?.pool.capacity())
    }

    /// Get the block size of a pool, rounded up to a multiple of four bytes.
    pub fn memory_pool_block_size(&self, memory_pool: MemoryPoolId) -> Result<u32, KernelError> {
        Ok(self.memory_pool_cb(memory_pool)?.pool.block_size() as u32)
    }

    /// Get the number of allocated blocks.
    pub fn memory_pool_count(&self, memory_pool: MemoryPoolId) -> Result<u32, KernelError> {
        Ok(self.memory_pool_cb(memory_pool)?.pool.used())
    }

    /// Get the number of free blocks.
    pub fn memory_pool_space(&self, memory_pool: MemoryPoolId) -> Result<u32, KernelError> {
        let pool = &self.memory_pool_cb(memory_pool)?.pool;
        Ok(pool.capacity() - pool.used())
    }

    /// Delete a memory pool. Waiters wake up with
    /// [`KernelError::ObjectDeleted`]; outstanding blocks become invalid.
    pub fn memory_pool_delete(&mut self, memory_pool: MemoryPoolId) -> Result<(), KernelError> {
        self.expect_operational()?;
        let cb = self.memory_pool_cb(memory_pool)?;
        self.check_class(cb.header.safety_class)?;
        self.memory_pool_destroy(memory_pool);
        self.reschedule();
        Ok(())
    }

    pub(crate) fn memory_pool_destroy(&mut self, memory_pool: MemoryPoolId) {
        self.wait_queue_wake_all(QueueRef::MemoryPool(memory_pool), KernelError::ObjectDeleted);
        self.memory_pools.remove(memory_pool);
        log::debug!("deleted {memory_pool:?}");
    }
}
