//! Static configuration mechanism for the kernel
//!
//! [`KernelConfig`] sizes the object arenas and the internal queues and tunes
//! the time base. The attribute records in this module (`ThreadAttr`,
//! `MutexAttr`, ...) are passed to the respective `*_create` services.
use core::num::NonZeroU32;

use crate::thread::Priority;

mod event_flags;
mod memory_pool;
mod message_queue;
mod mutex;
mod semaphore;
mod thread;
mod timer;
pub use self::{
    event_flags::*, memory_pool::*, message_queue::*, mutex::*, semaphore::*, thread::*,
    timer::*,
};

/// Kernel-wide configuration, consumed by [`Kernel::new`](crate::Kernel::new).
///
/// # Examples
///
/// ```
/// use core::num::NonZeroU32;
/// use kestrel_kernel::KernelConfig;
///
/// const CFG: KernelConfig = KernelConfig::new()
///     .max_threads(8)
///     .round_robin(NonZeroU32::new(10))
///     .isr_queue_len(32);
/// assert_eq!(CFG.tick_freq_hz(), 1000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    pub(crate) max_threads: usize,
    pub(crate) max_mutexes: usize,
    pub(crate) max_semaphores: usize,
    pub(crate) max_event_flags: usize,
    pub(crate) max_memory_pools: usize,
    pub(crate) max_message_queues: usize,
    pub(crate) max_timers: usize,
    pub(crate) tick_freq_hz: u32,
    pub(crate) robin_slice: Option<NonZeroU32>,
    pub(crate) isr_queue_len: usize,
    pub(crate) timer_queue_len: usize,
    pub(crate) timer_thread_priority: Priority,
    pub(crate) timer_thread_stack_size: usize,
    pub(crate) idle_thread_stack_size: usize,
    pub(crate) default_stack_size: usize,
    pub(crate) stack_check: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelConfig {
    pub const fn new() -> Self {
        Self {
            max_threads: 16,
            max_mutexes: 16,
            max_semaphores: 16,
            max_event_flags: 16,
            max_memory_pools: 8,
            max_message_queues: 8,
            max_timers: 16,
            tick_freq_hz: 1000,
            robin_slice: NonZeroU32::new(5),
            isr_queue_len: 16,
            timer_queue_len: 4,
            timer_thread_priority: Priority::HIGH,
            timer_thread_stack_size: 512,
            idle_thread_stack_size: 256,
            default_stack_size: 1024,
            stack_check: true,
        }
    }

    /// Set the number of application threads. The idle and timer-service
    /// threads are accounted for separately.
    pub const fn max_threads(mut self, n: usize) -> Self {
        self.max_threads = n;
        self
    }

    pub const fn max_mutexes(mut self, n: usize) -> Self {
        self.max_mutexes = n;
        self
    }

    pub const fn max_semaphores(mut self, n: usize) -> Self {
        self.max_semaphores = n;
        self
    }

    pub const fn max_event_flags(mut self, n: usize) -> Self {
        self.max_event_flags = n;
        self
    }

    pub const fn max_memory_pools(mut self, n: usize) -> Self {
        self.max_memory_pools = n;
        self
    }

    pub const fn max_message_queues(mut self, n: usize) -> Self {
        self.max_message_queues = n;
        self
    }

    pub const fn max_timers(mut self, n: usize) -> Self {
        self.max_timers = n;
        self
    }

    pub const fn tick_freq_hz(&self) -> u32 {
        self.tick_freq_hz
    }

    /// Set the tick frequency. Only used by
    /// [`Kernel::ticks_from_millis`](crate::Kernel::ticks_from_millis); the
    /// kernel never programs the tick timer itself.
    pub const fn with_tick_freq_hz(mut self, hz: u32) -> Self {
        self.tick_freq_hz = hz;
        self
    }

    /// Set the round-robin time slice in ticks. `None` disables time slicing.
    pub const fn round_robin(mut self, slice: Option<NonZeroU32>) -> Self {
        self.robin_slice = slice;
        self
    }

    /// Set the capacity of the staging queue for requests posted from
    /// interrupt context.
    pub const fn isr_queue_len(mut self, n: usize) -> Self {
        self.isr_queue_len = n;
        self
    }

    /// Set the number of timer expirations that can be pending for the timer
    /// service thread.
    pub const fn timer_queue_len(mut self, n: usize) -> Self {
        self.timer_queue_len = n;
        self
    }

    pub const fn timer_thread_priority(mut self, priority: Priority) -> Self {
        self.timer_thread_priority = priority;
        self
    }

    pub const fn timer_thread_stack_size(mut self, size: usize) -> Self {
        self.timer_thread_stack_size = size;
        self
    }

    pub const fn idle_thread_stack_size(mut self, size: usize) -> Self {
        self.idle_thread_stack_size = size;
        self
    }

    /// Set the stack size used when a [`ThreadAttr`] doesn't specify one.
    pub const fn default_stack_size(mut self, size: usize) -> Self {
        self.default_stack_size = size;
        self
    }

    /// Enable or disable the stack watermark check performed on every context
    /// switch.
    pub const fn stack_check(mut self, enable: bool) -> Self {
        self.stack_check = enable;
        self
    }
}
