//! Software timers
//!
//! Armed timers are kept in a min-heap ordered by expiration tick. The tick
//! handler moves expired timers to a bounded FIFO and wakes up the
//! timer-service thread, which runs their callbacks one at a time. A callback
//! that takes long delays every timer behind it.
use alloc::{collections::VecDeque, vec::Vec};
use core::fmt;

use crate::{
    cfg::TimerAttr,
    error::{Fault, KernelError},
    object::{ObjectHeader, ThreadId, TimerId},
    port::Port,
    state::Kernel,
    timeout::Timeout,
    utils::{
        binary_heap::{BinaryHeap, BinaryHeapCtx},
        Arena,
    },
    wait::{WaitReason, WaitValue},
};

/// A timer callback. Runs on the timer-service thread with the argument given
/// in [`TimerAttr`].
///
/// Callbacks may use the services that don't block. Blocking services and
/// services that act on the calling thread fail with
/// [`KernelError::BadContext`].
pub type TimerCallback<P> = fn(&mut Kernel<P>, usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Disarm after the first expiration.
    OneShot,
    /// Rearm after every expiration.
    Periodic,
}

/// *Timer control block* - the state data of a software timer.
pub(crate) struct TimerCb<P: Port> {
    pub(crate) header: ObjectHeader,
    callback: TimerCallback<P>,
    arg: usize,
    kind: TimerKind,
    period: u32,
    /// The expiration tick. `Some(_)` iff the timer is running.
    deadline: Option<u64>,
    /// The position of the timer in the expiration heap.
    heap_pos: Option<usize>,
}

impl<P: Port> fmt::Debug for TimerCb<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerCb")
            .field("header", &self.header)
            .field("callback", &(self.callback as *const ()))
            .field("arg", &self.arg)
            .field("kind", &self.kind)
            .field("period", &self.period)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy)]
struct TimerEntry {
    deadline: u64,
    seq: u64,
    timer: TimerId,
}

/// The expiration heap and the callback queue.
#[derive(Debug)]
pub(crate) struct TimerService {
    heap: Vec<TimerEntry>,
    seq: u64,
    /// Expired timers whose callbacks haven't run yet.
    pending: VecDeque<TimerId>,
    pending_cap: usize,
    /// The timer-service thread. `None` until the kernel is started.
    pub(crate) thread: Option<ThreadId>,
}

impl TimerService {
    pub(crate) fn new(queue_len: usize) -> Self {
        Self {
            heap: Vec::new(),
            seq: 0,
            pending: VecDeque::with_capacity(queue_len),
            pending_cap: queue_len,
            thread: None,
        }
    }

    /// Get the earliest expiration tick.
    #[inline]
    pub(crate) fn next_deadline(&self) -> Option<u64> {
        self.heap.first().map(|e| e.deadline)
    }
}

struct TimerHeapCtx<'a, P: Port> {
    timers: &'a mut Arena<TimerId, TimerCb<P>>,
}

impl<P: Port> BinaryHeapCtx<TimerEntry> for TimerHeapCtx<'_, P> {
    #[inline]
    fn lt(&mut self, x: &TimerEntry, y: &TimerEntry) -> bool {
        (x.deadline, x.seq) < (y.deadline, y.seq)
    }

    #[inline]
    fn on_move(&mut self, e: &TimerEntry, new_index: usize) {
        self.timers[e.timer].heap_pos = Some(new_index);
    }
}

impl<P: Port> Kernel<P> {
    pub fn timer_create(&mut self, attr: TimerAttr<P>) -> Result<TimerId, KernelError> {
        self.expect_operational()?;
        let timer = self
            .timers
            .insert(TimerCb {
                header: ObjectHeader {
                    name: attr.name,
                    safety_class: attr.safety_class,
                },
                callback: attr.callback,
                arg: attr.arg,
                kind: attr.kind,
                period: 0,
                deadline: None,
                heap_pos: None,
            })
            .ok_or(KernelError::ResourceExhausted)?;
        log::debug!("created {timer:?} ({:?}, {:?})", attr.name, attr.kind);
        Ok(timer)
    }

    fn timer_cb(&self, timer: TimerId) -> Result<&TimerCb<P>, KernelError> {
        self.timers.get(timer).ok_or(KernelError::InvalidHandle)
    }

    /// Start or restart a timer to expire `ticks` ticks from now (and every
    /// `ticks` ticks after that, if it's periodic).
    pub fn timer_start(&mut self, timer: TimerId, ticks: u32) -> Result<(), KernelError> {
        self.expect_operational()?;
        let cb = self.timer_cb(timer)?;
        self.check_class(cb.header.safety_class)?;
        if ticks == 0 || Timeout::ticks(ticks).is_forever() {
            return Err(KernelError::InvalidParameter);
        }

        self.timer_disarm(timer);
        self.timers[timer].period = ticks;
        self.timer_arm(timer, self.time.now + ticks as u64);
        log::trace!("{timer:?} started ({ticks} ticks)");
        Ok(())
    }

    /// Stop a running timer. An expiration already queued for the
    /// timer-service thread is discarded.
    pub fn timer_stop(&mut self, timer: TimerId) -> Result<(), KernelError> {
        self.expect_operational()?;
        let cb = self.timer_cb(timer)?;
        self.check_class(cb.header.safety_class)?;
        if cb.deadline.is_none() {
            return Err(KernelError::ResourceExhausted);
        }

        self.timer_disarm(timer);
        self.timer_service.pending.retain(|&t| t != timer);
        log::trace!("{timer:?} stopped");
        Ok(())
    }

    pub fn timer_is_running(&self, timer: TimerId) -> Result<bool, KernelError> {
        Ok(self.timer_cb(timer)?.deadline.is_some())
    }

    pub fn timer_delete(&mut self, timer: TimerId) -> Result<(), KernelError> {
        self.expect_operational()?;
        let cb = self.timer_cb(timer)?;
        self.check_class(cb.header.safety_class)?;
        self.timer_destroy(timer);
        Ok(())
    }

    pub(crate) fn timer_destroy(&mut self, timer: TimerId) {
        self.timer_disarm(timer);
        self.timer_service.pending.retain(|&t| t != timer);
        self.timers.remove(timer);
        log::debug!("deleted {timer:?}");
    }

    fn timer_arm(&mut self, timer: TimerId, deadline: u64) {
        let entry = TimerEntry {
            deadline,
            seq: self.timer_service.seq,
            timer,
        };
        self.timer_service.seq += 1;
        self.timers[timer].deadline = Some(deadline);
        self.timer_service.heap.heap_push(
            entry,
            TimerHeapCtx {
                timers: &mut self.timers,
            },
        );
    }

    fn timer_disarm(&mut self, timer: TimerId) {
        let cb = &mut self.timers[timer];
        cb.deadline = None;
        if let Some(pos) = cb.heap_pos.take() {
            self.timer_service.heap.heap_remove(
                pos,
                TimerHeapCtx {
                    timers: &mut self.timers,
                },
            );
        }
    }

    /// Queue the callbacks of the expired timers and rearm the periodic ones.
    pub(crate) fn timer_tick(&mut self) {
        let now = self.time.now;
        let mut expired_any = false;

        while let Some(entry) = self.timer_service.heap.first().copied() {
            if entry.deadline > now {
                break;
            }
            self.timer_service.heap.heap_pop(TimerHeapCtx {
                timers: &mut self.timers,
            });
            let cb = &mut self.timers[entry.timer];
            cb.heap_pos = None;
            cb.deadline = None;

            if cb.kind == TimerKind::Periodic {
                // Rearm before the callback runs. Periods missed during a
                // long sleep are skipped.
                let mut next = entry.deadline + cb.period as u64;
                if next <= now {
                    next = now + cb.period as u64;
                }
                self.timer_arm(entry.timer, next);
            }

            if self.timer_service.pending.len() >= self.timer_service.pending_cap {
                log::warn!("callback queue full, expiration of {:?} dropped", entry.timer);
                self.port.fault(Fault::TimerQueueOverflow(entry.timer));
            } else {
                self.timer_service.pending.push_back(entry.timer);
                expired_any = true;
            }
        }

        if !expired_any {
            return;
        }
        if let Some(thread) = self.timer_service.thread {
            if self.threads[thread].wait == Some(WaitReason::TimerService) {
                self.wait_exit(thread, Ok(WaitValue::None));
            }
        }
    }

    /// Run the callbacks of the expired timers, then park the timer-service
    /// thread until the next expiration.
    ///
    /// The port calls this whenever the timer-service thread is dispatched.
    pub fn run_timer_service(&mut self) -> Result<(), KernelError> {
        self.expect_operational()?;
        let thread = self.timer_service.thread.ok_or(KernelError::BadContext)?;
        if self.running != Some(thread) || self.in_timer_callback {
            return Err(KernelError::BadContext);
        }

        while let Some(timer) = self.timer_service.pending.pop_front() {
            let Some(cb) = self.timers.get(timer) else {
                continue;
            };
            let (callback, arg) = (cb.callback, cb.arg);
            log::trace!("running the callback of {timer:?}");

            self.in_timer_callback = true;
            callback(self, arg);
            self.in_timer_callback = false;
        }

        if self.threads[thread].st == crate::ThreadState::Running {
            self.wait_enter_thread(thread, WaitReason::TimerService, Timeout::FOREVER);
        }
        Ok(())
    }
}
