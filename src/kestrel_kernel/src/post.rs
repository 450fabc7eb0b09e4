//! Interrupt-context requests
//!
//! Interrupt handlers can't borrow the [`Kernel`]. Instead they stage requests
//! through an [`IsrContext`] into a lock-free ring, and [`Kernel::dispatch`]
//! applies them before it makes the scheduling decision. Kernel structures
//! are thus only ever mutated by the single owner of the `Kernel`.
//!
//! The ring is a bounded multi-producer, single-consumer queue in which every
//! slot carries a sequence number. A slot whose sequence equals the producer
//! position is free to claim; one whose sequence is one past the consumer
//! position holds a published value. Nested interrupt handlers may produce
//! concurrently.
use alloc::{boxed::Box, sync::Arc};
use arrayvec::ArrayVec;
use core::{
    cell::UnsafeCell,
    fmt,
    mem::MaybeUninit,
    sync::atomic::{AtomicU32, AtomicUsize, Ordering},
};

use crate::{
    error::{Fault, KernelError},
    memory_pool::Block,
    object::{EventFlagsId, MessageQueueId, SemaphoreId, ThreadId},
    port::Port,
    state::Kernel,
};

/// The maximum size of a message posted by [`IsrContext::message_queue_put`].
pub const ISR_MESSAGE_MAX: usize = 16;

#[derive(Debug)]
pub(crate) enum PostAction {
    SemaphoreRelease(SemaphoreId),
    EventFlagsSet(EventFlagsId, u32),
    ThreadFlagsSet(ThreadId, u32),
    MessagePut {
        queue: MessageQueueId,
        priority: u8,
        payload: ArrayVec<u8, ISR_MESSAGE_MAX>,
    },
    MemoryPoolFree(Block),
}

struct Slot {
    seq: AtomicUsize,
    value: UnsafeCell<MaybeUninit<PostAction>>,
}

pub(crate) struct PostQueue {
    slots: Box<[Slot]>,
    /// The consumer position.
    head: AtomicUsize,
    /// The producer position.
    tail: AtomicUsize,
    pending_ticks: AtomicU32,
    /// Requests rejected because the ring was full, not yet reported.
    dropped: AtomicUsize,
    pend_hook: Option<fn()>,
}

// Safety: A slot's value is accessed only by the producer that claimed the
// slot (before publishing it) and then by the single consumer (after
// observing the publication), as arbitrated by `seq`.
unsafe impl Sync for PostQueue {}

impl fmt::Debug for PostQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostQueue")
            .field("capacity", &self.slots.len())
            .field("head", &self.head.load(Ordering::Relaxed))
            .field("tail", &self.tail.load(Ordering::Relaxed))
            .field("pending_ticks", &self.pending_ticks.load(Ordering::Relaxed))
            .finish()
    }
}

impl PostQueue {
    pub(crate) fn new(capacity: usize, pend_hook: Option<fn()>) -> Self {
        let slots = (0..capacity.max(1))
            .map(|i| Slot {
                seq: AtomicUsize::new(i),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect();
        Self {
            slots,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            pending_ticks: AtomicU32::new(0),
            dropped: AtomicUsize::new(0),
            pend_hook,
        }
    }

    /// Enqueue `action`. Gives it back if the ring is full.
    fn push(&self, action: PostAction) -> Result<(), PostAction> {
        let cap = self.slots.len();
        let mut pos = self.tail.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[pos % cap];
            let seq = slot.seq.load(Ordering::Acquire);
            let diff = seq.wrapping_sub(pos) as isize;

            if diff == 0 {
                match self.tail.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // Safety: The CAS gave us exclusive access to the
                        // slot until `seq` is updated
                        unsafe { (*slot.value.get()).write(action) };
                        slot.seq.store(pos.wrapping_add(1), Ordering::Release);
                        return Ok(());
                    }
                    Err(actual) => pos = actual,
                }
            } else if diff < 0 {
                // The consumer hasn't released this slot yet
                return Err(action);
            } else {
                pos = self.tail.load(Ordering::Relaxed);
            }
        }
    }

    /// Dequeue the oldest published action.
    ///
    /// # Safety
    ///
    /// There must be at most one consumer at a time.
    unsafe fn pop(&self) -> Option<PostAction> {
        let cap = self.slots.len();
        let pos = self.head.load(Ordering::Relaxed);
        let slot = &self.slots[pos % cap];
        let seq = slot.seq.load(Ordering::Acquire);
        if seq != pos.wrapping_add(1) {
            return None;
        }

        // Safety: The slot was published by a producer, and we are the only
        // consumer
        let action = unsafe { (*slot.value.get()).assume_init_read() };
        slot.seq.store(pos.wrapping_add(cap), Ordering::Release);
        self.head.store(pos.wrapping_add(1), Ordering::Relaxed);
        Some(action)
    }

    /// Return `true` if there's anything for the kernel to process.
    pub(crate) fn has_work(&self) -> bool {
        self.head.load(Ordering::Relaxed) != self.tail.load(Ordering::Relaxed)
            || self.pending_ticks.load(Ordering::Relaxed) != 0
            || self.dropped.load(Ordering::Relaxed) != 0
    }

    #[inline]
    fn pend(&self) {
        if let Some(hook) = self.pend_hook {
            hook();
        }
    }
}

impl Drop for PostQueue {
    fn drop(&mut self) {
        // Safety: `&mut self` rules out any other consumer
        while unsafe { self.pop() }.is_some() {}
    }
}

/// A handle for interrupt handlers to request kernel services.
///
/// Requests are applied in order at the next [`Kernel::dispatch`]. They are
/// validated only then: a request that fails (e.g., because the object was
/// deleted) is discarded with a warning.
#[derive(Clone)]
pub struct IsrContext {
    queue: Arc<PostQueue>,
}

impl fmt::Debug for IsrContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IsrContext").field(&*self.queue).finish()
    }
}

impl IsrContext {
    fn post(&self, action: PostAction) -> Result<(), KernelError> {
        match self.queue.push(action) {
            Ok(()) => {
                self.queue.pend();
                Ok(())
            }
            Err(_) => {
                self.queue.dropped.fetch_add(1, Ordering::Relaxed);
                Err(KernelError::ResourceExhausted)
            }
        }
    }

    pub fn semaphore_release(&self, semaphore: SemaphoreId) -> Result<(), KernelError> {
        self.post(PostAction::SemaphoreRelease(semaphore))
    }

    pub fn event_flags_set(&self, event_flags: EventFlagsId, flags: u32) -> Result<(), KernelError> {
        self.post(PostAction::EventFlagsSet(event_flags, flags))
    }

    pub fn thread_flags_set(&self, thread: ThreadId, flags: u32) -> Result<(), KernelError> {
        self.post(PostAction::ThreadFlagsSet(thread, flags))
    }

    /// Post a message of up to [`ISR_MESSAGE_MAX`] bytes. It's discarded if
    /// the queue turns out to be full when the request is applied.
    pub fn message_queue_put(
        &self,
        queue: MessageQueueId,
        msg: &[u8],
        priority: u8,
    ) -> Result<(), KernelError> {
        let payload = ArrayVec::try_from(msg).map_err(|_| KernelError::InvalidParameter)?;
        self.post(PostAction::MessagePut {
            queue,
            priority,
            payload,
        })
    }

    pub fn memory_pool_free(&self, block: Block) -> Result<(), KernelError> {
        self.post(PostAction::MemoryPoolFree(block))
    }

    /// Announce a tick. Ticks are counted, so they can't overflow the ring.
    pub fn tick(&self) {
        self.queue.pending_ticks.fetch_add(1, Ordering::AcqRel);
        self.queue.pend();
    }
}

impl<P: Port> Kernel<P> {
    /// Get a handle for interrupt handlers.
    pub fn isr_context(&self) -> IsrContext {
        IsrContext {
            queue: Arc::clone(&self.post),
        }
    }

    /// Apply the staged interrupt requests and ticks.
    pub(crate) fn process_post_queue(&mut self) {
        let dropped = self.post.dropped.swap(0, Ordering::Relaxed);
        if dropped > 0 {
            log::warn!("{dropped} interrupt request(s) dropped");
            self.port.fault(Fault::IsrQueueOverflow { dropped });
        }

        loop {
            // Safety: `&mut self` makes us the only consumer
            let Some(action) = (unsafe { self.post.pop() }) else {
                break;
            };
            log::trace!("applying {action:?}");

            let result = match action {
                PostAction::SemaphoreRelease(semaphore) => {
                    self.semaphore_release_core(semaphore)
                }
                PostAction::EventFlagsSet(event_flags, flags) => self
                    .event_flags_set_core(event_flags, flags)
                    .map(drop),
                PostAction::ThreadFlagsSet(thread, flags) => {
                    self.thread_flags_set_core(thread, flags).map(drop)
                }
                PostAction::MessagePut {
                    queue,
                    priority,
                    payload,
                } => self.message_queue_put_core(queue, &payload, priority),
                PostAction::MemoryPoolFree(block) => self.memory_pool_free_core(block),
            };

            if let Err(e) = result {
                log::warn!("interrupt request failed: {e}");
            }
        }

        let ticks = self.post.pending_ticks.swap(0, Ordering::AcqRel);
        for _ in 0..ticks {
            self.tick_core();
        }
    }
}
