//! The time base: the tick counter, wait deadlines, and tick processing
//!
//! Deadlines are kept in a binary min-heap ordered by `(deadline, seq)`, so
//! entries with equal deadlines expire in the order they were armed. Each
//! waiting thread remembers the position of its entry, which lets a woken
//! thread withdraw its deadline in logarithmic time.
//!
//! The tick counter is 64 bits wide internally and never wraps in practice.
//! [`Kernel::tick_count`] exposes its lower 32 bits.
use alloc::vec::Vec;
use core::fmt;

use crate::{
    error::KernelError,
    object::ThreadId,
    port::Port,
    state::{Kernel, KernelState},
    thread::ThreadArena,
    utils::binary_heap::{BinaryHeap, BinaryHeapCtx},
    wait::WaitValue,
};

/// A wait duration in ticks.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timeout(u32);

impl Timeout {
    /// Fail with [`KernelError::ResourceExhausted`] instead of blocking.
    pub const NO_WAIT: Self = Self(0);
    /// Wait without a deadline.
    pub const FOREVER: Self = Self(u32::MAX);

    #[inline]
    pub const fn ticks(ticks: u32) -> Self {
        Self(ticks)
    }

    #[inline]
    pub const fn is_no_wait(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_forever(self) -> bool {
        self.0 == u32::MAX
    }

    #[inline]
    pub const fn as_ticks(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::NO_WAIT => f.write_str("NO_WAIT"),
            Self::FOREVER => f.write_str("FOREVER"),
            Self(ticks) => write!(f, "{ticks} ticks"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct DelayEntry {
    deadline: u64,
    seq: u64,
    thread: ThreadId,
}

pub(crate) struct TimeBase {
    pub(crate) now: u64,
    heap: Vec<DelayEntry>,
    seq: u64,
}

impl fmt::Debug for TimeBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeBase")
            .field("now", &self.now)
            .field("armed", &self.heap.len())
            .finish()
    }
}

impl TimeBase {
    pub(crate) const fn new() -> Self {
        Self {
            now: 0,
            heap: Vec::new(),
            seq: 0,
        }
    }

    /// Get the earliest armed deadline.
    #[inline]
    pub(crate) fn next_deadline(&self) -> Option<u64> {
        self.heap.first().map(|e| e.deadline)
    }
}

/// Orders the delay heap and tracks the positions in `ThreadCb::timeout_pos`.
struct DelayHeapCtx<'a, C> {
    threads: &'a mut ThreadArena<C>,
}

impl<C> BinaryHeapCtx<DelayEntry> for DelayHeapCtx<'_, C> {
    #[inline]
    fn lt(&mut self, x: &DelayEntry, y: &DelayEntry) -> bool {
        (x.deadline, x.seq) < (y.deadline, y.seq)
    }

    #[inline]
    fn on_move(&mut self, e: &DelayEntry, new_index: usize) {
        self.threads[e.thread].timeout_pos = Some(new_index);
    }
}

impl<P: Port> Kernel<P> {
    /// Get the number of ticks since [`Self::start`], modulo 2³².
    #[inline]
    pub fn tick_count(&self) -> u32 {
        self.time.now as u32
    }

    #[inline]
    pub fn tick_count64(&self) -> u64 {
        self.time.now
    }

    #[inline]
    pub fn tick_freq_hz(&self) -> u32 {
        self.cfg.tick_freq_hz
    }

    /// Convert milliseconds to ticks, rounding up.
    pub fn ticks_from_millis(&self, ms: u32) -> u32 {
        let ticks = (ms as u64 * self.cfg.tick_freq_hz as u64).div_ceil(1000);
        ticks.min(u32::MAX as u64 - 1) as u32
    }

    /// Register a deadline `ticks` ticks from now for `thread`.
    pub(crate) fn timeout_arm(&mut self, thread: ThreadId, ticks: u32) {
        self.timeout_disarm(thread);
        let entry = DelayEntry {
            deadline: self.time.now + ticks as u64,
            seq: self.time.seq,
            thread,
        };
        self.time.seq += 1;
        self.time.heap.heap_push(
            entry,
            DelayHeapCtx {
                threads: &mut self.threads,
            },
        );
    }

    /// Withdraw the deadline of `thread`, if any.
    pub(crate) fn timeout_disarm(&mut self, thread: ThreadId) {
        if let Some(pos) = self.threads[thread].timeout_pos.take() {
            self.time.heap.heap_remove(
                pos,
                DelayHeapCtx {
                    threads: &mut self.threads,
                },
            );
        }
    }

    /// Announce a tick. Called by the port's tick interrupt handler, or
    /// staged through [`IsrContext::tick`](crate::IsrContext::tick).
    pub fn tick(&mut self) -> Result<(), KernelError> {
        if !matches!(self.state, KernelState::Running | KernelState::Locked) {
            return Err(KernelError::BadContext);
        }
        self.tick_core();
        self.reschedule();
        Ok(())
    }

    pub(crate) fn tick_core(&mut self) {
        self.time.now += 1;
        self.expire_deadlines();
        self.timer_tick();
        #[cfg(feature = "watchdog")]
        self.watchdog_tick(1);
        self.round_robin_tick();
    }

    /// Process `ticks` ticks at once after a low-power sleep. Round-robin
    /// slices are not charged for the sleep.
    pub(crate) fn advance_time(&mut self, ticks: u32) {
        self.time.now += ticks as u64;
        self.expire_deadlines();
        self.timer_tick();
        #[cfg(feature = "watchdog")]
        self.watchdog_tick(ticks);
    }

    /// Wake up every thread whose deadline has passed, in deadline order.
    fn expire_deadlines(&mut self) {
        while let Some(entry) = self.time.heap.first().copied() {
            if entry.deadline > self.time.now {
                break;
            }
            self.time.heap.heap_pop(DelayHeapCtx {
                threads: &mut self.threads,
            });
            self.threads[entry.thread].timeout_pos = None;

            let result = core::mem::replace(
                &mut self.threads[entry.thread].wait_result,
                Ok(WaitValue::None),
            );
            log::trace!("deadline of {:?} passed", entry.thread);
            self.wait_exit(entry.thread, result);
        }
    }

    /// Charge the running thread's time slice and rotate it behind its peers
    /// once the slice runs out.
    fn round_robin_tick(&mut self) {
        let Some(slice) = self.cfg.robin_slice else {
            return;
        };
        let Some(running) = self.running else {
            return;
        };
        let cb = &mut self.threads[running];
        if cb.st != crate::ThreadState::Running {
            return;
        }
        cb.slice_left = cb.slice_left.saturating_sub(1);
        if cb.slice_left > 0 {
            return;
        }
        cb.slice_left = slice.get();

        let priority = cb.effective_priority;
        if self.ready.has_ready_thread_at(priority) {
            log::trace!("time slice of {running:?} expired");
            self.requeue_running(running);
            self.request_dispatch();
        }
    }

    #[cfg(feature = "watchdog")]
    fn watchdog_tick(&mut self, ticks: u32) {
        if self.watchdogs_armed == 0 {
            return;
        }
        let expired = self
            .threads
            .keys_where(|t| t.watchdog != 0 && t.watchdog <= ticks);
        for cb in self.threads.values_mut() {
            if cb.watchdog > ticks {
                cb.watchdog -= ticks;
            }
        }
        for thread in expired {
            let reload = self.port.watchdog_alarm(thread);
            if reload != 0 {
                self.threads[thread].watchdog = reload;
            } else {
                log::warn!("watchdog of {thread:?} expired");
                self.watchdog_disarm(thread);
                self.terminate_thread(thread, Err(KernelError::WatchdogExpired));
            }
        }
    }
}
