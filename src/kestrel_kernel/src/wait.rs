//! Wait queues and the blocking protocol
//!
//! A thread that has to block is put in the `Blocked` (no deadline) or
//! `Delayed` (with deadline) state, linked into the wait queue of the object it
//! waits for (if any), and its deadline is registered in the time base. The
//! thread that wakes it up completes the operation on its behalf and leaves the
//! result in the waiter's control block, from which [`Pending::resolve`]
//! collects it once the waiter runs again.
//!
//! Wait queues are ordered by effective priority, FIFO within a priority.
use alloc::vec::Vec;
use core::{fmt, marker::PhantomData};

use crate::{
    error::KernelError,
    event_flags::FlagsWait,
    memory_pool::Block,
    object::{
        EventFlagsId, MemoryPoolId, MessageQueueId, MutexId, SemaphoreId, ThreadId,
    },
    port::Port,
    state::Kernel,
    thread::{ThreadArena, ThreadState},
    timeout::Timeout,
    utils::intrusive_list::{InconsistentError, ListAccessor, ListHead},
};

pub(crate) type WaitQueue = ListHead<ThreadId>;

/// What a waiting thread is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitReason {
    Delay,
    Suspended,
    Join(ThreadId),
    ThreadFlags {
        flags: u32,
        options: FlagsWait,
    },
    EventFlags {
        object: EventFlagsId,
        flags: u32,
        options: FlagsWait,
    },
    Mutex(MutexId),
    Semaphore(SemaphoreId),
    MemoryPool(MemoryPoolId),
    MessageGet(MessageQueueId),
    /// The message to send is parked in the thread's message slot.
    MessagePut(MessageQueueId),
    /// The timer-service thread waiting for expired timers.
    TimerService,
}

/// Identifies a wait queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QueueRef {
    Join(ThreadId),
    EventFlags(EventFlagsId),
    Mutex(MutexId),
    Semaphore(SemaphoreId),
    MemoryPool(MemoryPoolId),
    /// Shared by receivers and senders. Only one of them can be waiting at a
    /// time.
    MessageQueue(MessageQueueId),
}

impl WaitReason {
    /// Get the wait queue a thread waiting for `self` is linked into.
    pub(crate) fn queue(self) -> Option<QueueRef> {
        match self {
            Self::Delay | Self::Suspended | Self::ThreadFlags { .. } | Self::TimerService => None,
            Self::Join(t) => Some(QueueRef::Join(t)),
            Self::EventFlags { object, .. } => Some(QueueRef::EventFlags(object)),
            Self::Mutex(m) => Some(QueueRef::Mutex(m)),
            Self::Semaphore(s) => Some(QueueRef::Semaphore(s)),
            Self::MemoryPool(p) => Some(QueueRef::MemoryPool(p)),
            Self::MessageGet(q) | Self::MessagePut(q) => Some(QueueRef::MessageQueue(q)),
        }
    }
}

/// The value delivered to a woken thread.
#[derive(Debug, PartialEq, Eq)]
pub enum WaitValue {
    None,
    /// The flags pattern that satisfied the wait.
    Flags(u32),
    Block(Block),
    /// The priority of a received message. The body is in the thread's message
    /// slot.
    Message(u8),
}

/// Implemented by the result types of blocking operations.
pub trait FromWake: Sized {
    #[doc(hidden)]
    fn from_wake(value: WaitValue) -> Option<Self>;
}

impl FromWake for () {
    fn from_wake(value: WaitValue) -> Option<Self> {
        match value {
            WaitValue::None => Some(()),
            _ => None,
        }
    }
}

impl FromWake for u32 {
    fn from_wake(value: WaitValue) -> Option<Self> {
        match value {
            WaitValue::Flags(x) => Some(x),
            _ => None,
        }
    }
}

impl FromWake for Block {
    fn from_wake(value: WaitValue) -> Option<Self> {
        match value {
            WaitValue::Block(x) => Some(x),
            _ => None,
        }
    }
}

/// The result of a [`Kernel::message_queue_get`] that had to block. Collect
/// it with [`Pending::resolve_into`].
#[derive(Debug)]
pub struct Received;

/// The result of a potentially blocking service.
#[must_use = "a blocked operation completes only through its `Pending`"]
#[derive(Debug)]
pub enum Outcome<T, W = T> {
    /// The operation completed without blocking.
    Done(T),
    /// The calling thread was blocked. The operation completes when the
    /// thread is woken up.
    Blocked(Pending<W>),
}

impl<T, W> Outcome<T, W> {
    #[inline]
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked(_))
    }

    #[inline]
    pub fn done(self) -> Option<T> {
        match self {
            Self::Done(x) => Some(x),
            Self::Blocked(_) => None,
        }
    }

    #[inline]
    pub fn pending(self) -> Option<Pending<W>> {
        match self {
            Self::Done(_) => None,
            Self::Blocked(x) => Some(x),
        }
    }
}

/// A blocked operation of `thread`. Its result becomes available once the
/// thread is woken up.
pub struct Pending<T> {
    thread: ThreadId,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pending").field(&self.thread).finish()
    }
}

impl<T> Pending<T> {
    #[inline]
    pub(crate) fn new(thread: ThreadId) -> Self {
        Self {
            thread,
            _phantom: PhantomData,
        }
    }

    /// Get the blocked thread.
    #[inline]
    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    /// Return `true` if the thread was woken up and the result can be
    /// collected.
    pub fn is_ready<P: Port>(&self, kernel: &Kernel<P>) -> bool {
        kernel
            .threads
            .get(self.thread)
            .map_or(false, |t| t.wait.is_none())
    }

    fn take_result<P: Port>(&self, kernel: &mut Kernel<P>) -> Result<WaitValue, KernelError> {
        let cb = kernel
            .threads
            .get_mut(self.thread)
            .ok_or(KernelError::BadContext)?;
        if cb.wait.is_some() || cb.st == ThreadState::Terminated {
            return Err(KernelError::BadContext);
        }
        core::mem::replace(&mut cb.wait_result, Ok(WaitValue::None))
    }
}

impl<T: FromWake> Pending<T> {
    /// Collect the result of the operation.
    ///
    /// Fails with [`KernelError::BadContext`] if the thread is still waiting.
    pub fn resolve<P: Port>(self, kernel: &mut Kernel<P>) -> Result<T, KernelError> {
        let value = self.take_result(kernel)?;
        T::from_wake(value).ok_or(KernelError::BadContext)
    }
}

impl Pending<Received> {
    /// Collect a received message into `buf` and return its priority.
    pub fn resolve_into<P: Port>(
        self,
        kernel: &mut Kernel<P>,
        buf: &mut [u8],
    ) -> Result<u8, KernelError> {
        let WaitValue::Message(priority) = self.take_result(kernel)? else {
            return Err(KernelError::BadContext);
        };
        let msg = &kernel.threads[self.thread].msg.buf;
        buf.get_mut(..msg.len())
            .ok_or(KernelError::InvalidParameter)?
            .copy_from_slice(msg);
        Ok(priority)
    }
}

type WaitList<'a, C> = ListAccessor<'a, ThreadId, ThreadArena<C>>;

impl<P: Port> Kernel<P> {
    fn wait_queue_head_mut(&mut self, queue: QueueRef) -> Option<&mut WaitQueue> {
        match queue {
            QueueRef::Join(t) => self.threads.get_mut(t).map(|t| &mut t.join_queue),
            QueueRef::EventFlags(x) => self.event_flags.get_mut(x).map(|x| &mut x.wait_queue),
            QueueRef::Mutex(x) => self.mutexes.get_mut(x).map(|x| &mut x.wait_queue),
            QueueRef::Semaphore(x) => self.semaphores.get_mut(x).map(|x| &mut x.wait_queue),
            QueueRef::MemoryPool(x) => self.memory_pools.get_mut(x).map(|x| &mut x.wait_queue),
            QueueRef::MessageQueue(x) => {
                self.message_queues.get_mut(x).map(|x| &mut x.wait_queue)
            }
        }
    }

    /// Run `f` on the list accessor of a wait queue. Returns `None` if the
    /// owning object doesn't exist or the list is corrupted.
    fn with_wait_queue<R>(
        &mut self,
        queue: QueueRef,
        f: impl FnOnce(&mut WaitList<'_, P::Context>) -> Result<R, InconsistentError>,
    ) -> Option<R> {
        // The head is moved out because a join queue lives in the same arena
        // as the waiters
        let mut head = *self.wait_queue_head_mut(queue)?;
        let result = f(&mut ListAccessor::new(&mut head, &mut self.threads));
        if let Some(slot) = self.wait_queue_head_mut(queue) {
            *slot = head;
        }

        match result {
            Ok(x) => Some(x),
            Err(InconsistentError) => {
                self.corrupted("wait queue");
                None
            }
        }
    }

    /// Link `thread` into `queue` after the waiters of the same or higher
    /// effective priority.
    fn wait_queue_insert(&mut self, queue: QueueRef, thread: ThreadId) {
        let priority = self.threads[thread].effective_priority;
        self.with_wait_queue(queue, |list| {
            let mut cursor = list.front();
            while let Some(t) = cursor {
                if list.pool()[t].effective_priority < priority {
                    break;
                }
                cursor = list.next(t)?;
            }
            list.insert(thread, cursor)
        });
    }

    fn wait_queue_remove(&mut self, queue: QueueRef, thread: ThreadId) {
        self.with_wait_queue(queue, |list| list.remove(thread));
    }

    /// Get the first (highest-priority) waiter of `queue`.
    pub(crate) fn wait_queue_first(&mut self, queue: QueueRef) -> Option<ThreadId> {
        self.wait_queue_head_mut(queue)?.first
    }

    /// Get the waiters of `queue` in queue order.
    pub(crate) fn wait_queue_snapshot(&mut self, queue: QueueRef) -> Vec<ThreadId> {
        self.with_wait_queue(queue, |list| {
            let mut out = Vec::new();
            let mut cursor = list.front();
            while let Some(t) = cursor {
                out.push(t);
                cursor = list.next(t)?;
            }
            Ok(out)
        })
        .unwrap_or_default()
    }

    /// Move a waiting thread to the position matching its (changed)
    /// effective priority.
    pub(crate) fn wait_queue_reposition(&mut self, thread: ThreadId) {
        if let Some(queue) = self.threads[thread].wait.and_then(WaitReason::queue) {
            self.wait_queue_remove(queue, thread);
            self.wait_queue_insert(queue, thread);
        }
    }

    /// Block the running thread `thread`.
    pub(crate) fn wait_enter<T>(
        &mut self,
        thread: ThreadId,
        reason: WaitReason,
        timeout: Timeout,
    ) -> Pending<T> {
        self.wait_enter_thread(thread, reason, timeout);
        Pending::new(thread)
    }

    /// Put `thread`, which must not be in the ready queue, into the waiting
    /// state.
    pub(crate) fn wait_enter_thread(
        &mut self,
        thread: ThreadId,
        reason: WaitReason,
        timeout: Timeout,
    ) {
        let cb = &mut self.threads[thread];
        cb.wait = Some(reason);
        cb.st = if timeout.is_forever() {
            ThreadState::Blocked
        } else {
            ThreadState::Delayed
        };
        // The result delivered if the deadline passes first
        cb.wait_result = match reason {
            WaitReason::Delay | WaitReason::Suspended => Ok(WaitValue::None),
            _ => Err(KernelError::Timeout),
        };

        if let Some(queue) = reason.queue() {
            self.wait_queue_insert(queue, thread);
        }
        if !timeout.is_forever() {
            self.timeout_arm(thread, timeout.as_ticks());
        }
        log::trace!("{thread:?} waits for {reason:?} ({timeout:?})");

        self.reschedule();
    }

    /// Wake up a waiting thread with `result`. Does nothing if the thread
    /// isn't waiting. The caller is responsible for rescheduling.
    pub(crate) fn wait_exit(&mut self, thread: ThreadId, result: Result<WaitValue, KernelError>) {
        let Some(reason) = self.threads[thread].wait.take() else {
            return;
        };
        if let Some(queue) = reason.queue() {
            self.wait_queue_remove(queue, thread);
        }
        self.timeout_disarm(thread);
        log::trace!("{thread:?} woken from {reason:?} with {result:?}");

        self.threads[thread].wait_result = result;
        self.make_ready(thread);

        // The owner may have inherited the departing waiter's priority
        if let WaitReason::Mutex(mutex) = reason {
            self.mutex_reevaluate_owner(mutex);
        }
    }

    /// Wake up every waiter of `queue` with `result`.
    pub(crate) fn wait_queue_wake_all(&mut self, queue: QueueRef, result: KernelError) {
        for thread in self.wait_queue_snapshot(queue) {
            self.wait_exit(thread, Err(result));
        }
    }
}
