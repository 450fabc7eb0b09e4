//! Threads
use alloc::vec::Vec;
use core::fmt;

use crate::{
    cfg::ThreadAttr,
    error::KernelError,
    object::{MutexId, ObjectHeader, SafetyClass, ThreadId},
    port::{Port, Switch, ThreadEntry},
    state::{Kernel, KernelState},
    timeout::Timeout,
    utils::{
        intrusive_list::{Link, Linked},
        Arena,
    },
    wait::{Outcome, QueueRef, WaitReason, WaitValue},
};

pub(crate) mod readyqueue;

pub(crate) type ThreadArena<C> = Arena<ThreadId, ThreadCb<C>>;

/// A thread priority. Higher values are more urgent.
///
/// The valid range is [`Priority::IDLE`] through [`Priority::MAX`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(u8);

impl Priority {
    pub const IDLE: Self = Self(1);
    pub const LOW: Self = Self(8);
    pub const BELOW_NORMAL: Self = Self(16);
    pub const NORMAL: Self = Self(24);
    pub const ABOVE_NORMAL: Self = Self(32);
    pub const HIGH: Self = Self(40);
    pub const REALTIME: Self = Self(48);
    /// The highest priority available to threads. Levels above it are
    /// reserved for interrupt-context bookkeeping.
    pub const MAX: Self = Self(55);

    /// Construct a `Priority`. Returns `None` if `level` is outside
    /// `1..=55`.
    pub const fn new(level: u8) -> Option<Self> {
        if level >= Self::IDLE.0 && level <= Self::MAX.0 {
            Some(Self(level))
        } else {
            None
        }
    }

    #[inline]
    pub const fn get(self) -> u8 {
        self.0
    }

    #[inline]
    pub(crate) const fn from_level(level: u8) -> Self {
        Self(level)
    }

    #[inline]
    pub(crate) const fn level(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Priority({})", self.0)
    }
}

/// The state of a thread.
///
#[doc = svgbobdoc::transform!(
/// ```svgbob
///                     .-----------.   wait with timeout   .---------.
///      create    .--->|  Running  |---------------------->| Delayed |
///         |      |    '-----------'                       '---------'
///         v      |      |   |  wait forever                 |
///    .---------. |      |   '-----------------.             |
///    |  Ready  |-'      |                     v             |
///    '---------'<-------+---------------.-----------.       |
///         ^   preempted |               |  Blocked  |       |
///         |             |               '-----------'       |
///         |             | exit/kill           |             |
///         |             v                     |             |
///         |      .------------.               |             |
///         |      | Terminated |               |             |
///         |      '------------'               |             |
///         '-----------------------------------+-------------'
///                  signaled, timed out, deleted, aborted
/// ```
)]
///
/// `Terminated` is absorbing: a joinable thread stays there until it's
/// joined, detached, or deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Ready,
    Running,
    /// Waiting without a deadline (or suspended).
    Blocked,
    /// Waiting with a deadline.
    Delayed,
    Terminated,
}

/// A delivered message and its priority, parked in the thread while it waits
/// on a message queue.
#[derive(Debug, Default)]
pub(crate) struct MessageSlot {
    pub(crate) buf: Vec<u8>,
    pub(crate) priority: u8,
}

/// *Thread control block* - the state data of a thread.
pub(crate) struct ThreadCb<C> {
    pub(crate) header: ObjectHeader,
    pub(crate) entry: ThreadEntry,
    pub(crate) context: Option<C>,
    pub(crate) stack_size: usize,

    pub(crate) base_priority: Priority,
    /// `base_priority` raised by priority inheritance.
    pub(crate) effective_priority: Priority,

    pub(crate) st: ThreadState,

    /// Links in a ready-queue level or in a wait queue. A thread is in at
    /// most one of them at a time.
    pub(crate) link: Option<Link<ThreadId>>,

    /// What the thread is waiting for, if it's `Blocked` or `Delayed`.
    pub(crate) wait: Option<WaitReason>,
    /// The result delivered by the wake-upper, collected by
    /// [`crate::Pending::resolve`].
    pub(crate) wait_result: Result<WaitValue, KernelError>,
    /// The position of the thread's entry in the delay heap.
    pub(crate) timeout_pos: Option<usize>,

    /// The last mutex in the singly-linked list of the mutexes held by the
    /// thread, continued by `MutexCb::prev_mutex_held`.
    pub(crate) last_mutex_held: Option<MutexId>,

    /// Threads waiting for this thread to terminate.
    pub(crate) join_queue: crate::wait::WaitQueue,
    pub(crate) joinable: bool,
    pub(crate) exit_result: Result<(), KernelError>,

    pub(crate) flags: u32,

    /// Ticks left in the round-robin time slice.
    pub(crate) slice_left: u32,

    #[cfg(feature = "watchdog")]
    pub(crate) watchdog: u32,

    pub(crate) msg: MessageSlot,
}

impl<C> Linked<ThreadId> for ThreadCb<C> {
    #[inline]
    fn link(&mut self) -> &mut Option<Link<ThreadId>> {
        &mut self.link
    }
}

impl<C> fmt::Debug for ThreadCb<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadCb")
            .field("header", &self.header)
            .field("entry", &self.entry)
            .field("base_priority", &self.base_priority)
            .field("effective_priority", &self.effective_priority)
            .field("st", &self.st)
            .field("wait", &self.wait)
            .field("last_mutex_held", &self.last_mutex_held)
            .field("joinable", &self.joinable)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

impl<P: Port> Kernel<P> {
    /// Create a thread in the `Ready` state.
    pub fn thread_create(&mut self, attr: ThreadAttr) -> Result<ThreadId, KernelError> {
        self.expect_operational()?;
        if attr.stack_size == Some(0) {
            return Err(KernelError::InvalidParameter);
        }
        if self.threads.len() >= self.cfg.max_threads + self.system_thread_count() {
            return Err(KernelError::ResourceExhausted);
        }

        let entry = ThreadEntry::User {
            entry: attr.entry,
            arg: attr.arg,
        };
        let stack_size = attr.stack_size.unwrap_or(self.cfg.default_stack_size);
        let header = ObjectHeader {
            name: attr.name,
            safety_class: attr.safety_class,
        };
        let thread = self.spawn(entry, header, attr.priority, stack_size, attr.joinable)?;
        self.make_ready(thread);
        log::debug!("created {thread:?} ({:?}) at {:?}", attr.name, attr.priority);

        self.reschedule();
        Ok(thread)
    }

    fn system_thread_count(&self) -> usize {
        self.idle_thread.is_some() as usize + self.timer_service.thread.is_some() as usize
    }

    /// Create the idle thread (`Ready`) or the timer-service thread (parked).
    pub(crate) fn spawn_system_thread(
        &mut self,
        entry: ThreadEntry,
    ) -> Result<ThreadId, KernelError> {
        let (name, priority, stack_size) = match entry {
            ThreadEntry::Idle => ("idle", Priority::IDLE, self.cfg.idle_thread_stack_size),
            _ => (
                "timer",
                self.cfg.timer_thread_priority,
                self.cfg.timer_thread_stack_size,
            ),
        };
        let header = ObjectHeader {
            name: Some(name),
            safety_class: SafetyClass::HIGHEST,
        };
        let thread = self.spawn(entry, header, priority, stack_size, false)?;

        if entry == ThreadEntry::TimerService {
            self.wait_enter_thread(thread, WaitReason::TimerService, Timeout::FOREVER);
        } else {
            self.make_ready(thread);
        }
        Ok(thread)
    }

    fn spawn(
        &mut self,
        entry: ThreadEntry,
        header: ObjectHeader,
        priority: Priority,
        stack_size: usize,
        joinable: bool,
    ) -> Result<ThreadId, KernelError> {
        let slice = self.cfg.robin_slice.map_or(0, |s| s.get());
        let port = &mut self.port;
        self.threads
            .insert_with(|thread| ThreadCb {
                header,
                entry,
                context: Some(port.initialize_context(thread, entry, stack_size)),
                stack_size,
                base_priority: priority,
                effective_priority: priority,
                // Updated by the caller
                st: ThreadState::Ready,
                link: None,
                wait: None,
                wait_result: Ok(WaitValue::None),
                timeout_pos: None,
                last_mutex_held: None,
                join_queue: crate::wait::WaitQueue::new(),
                joinable,
                exit_result: Ok(()),
                flags: 0,
                slice_left: slice,
                #[cfg(feature = "watchdog")]
                watchdog: 0,
                msg: MessageSlot::default(),
            })
            .ok_or(KernelError::ResourceExhausted)
    }

    /// Get the calling thread.
    pub fn current_thread(&self) -> Result<ThreadId, KernelError> {
        if matches!(self.state, KernelState::Ready | KernelState::Error) {
            return Err(KernelError::BadContext);
        }
        self.running.ok_or(KernelError::BadContext)
    }

    pub(crate) fn thread_cb(&self, thread: ThreadId) -> Result<&ThreadCb<P::Context>, KernelError> {
        self.threads.get(thread).ok_or(KernelError::InvalidHandle)
    }

    pub fn thread_name(&self, thread: ThreadId) -> Result<Option<&'static str>, KernelError> {
        Ok(self.thread_cb(thread)?.header.name)
    }

    pub fn thread_state(&self, thread: ThreadId) -> Result<ThreadState, KernelError> {
        Ok(self.thread_cb(thread)?.st)
    }

    pub fn thread_stack_size(&self, thread: ThreadId) -> Result<usize, KernelError> {
        Ok(self.thread_cb(thread)?.stack_size)
    }

    /// Get the base priority of a thread.
    pub fn thread_priority(&self, thread: ThreadId) -> Result<Priority, KernelError> {
        Ok(self.thread_cb(thread)?.base_priority)
    }

    /// Get the priority a thread is currently scheduled at, which includes
    /// the priority inherited through the mutexes it holds.
    pub fn thread_effective_priority(&self, thread: ThreadId) -> Result<Priority, KernelError> {
        Ok(self.thread_cb(thread)?.effective_priority)
    }

    /// Change the base priority of a thread.
    pub fn thread_set_priority(
        &mut self,
        thread: ThreadId,
        priority: Priority,
    ) -> Result<(), KernelError> {
        self.expect_operational()?;
        let cb = self.thread_cb(thread)?;
        self.check_class(cb.header.safety_class)?;
        if cb.st == ThreadState::Terminated || self.is_system_thread(thread) {
            return Err(KernelError::ResourceExhausted);
        }

        self.threads[thread].base_priority = priority;
        let effective = self.evaluate_effective_priority(thread);
        self.set_effective_priority(thread, effective);
        log::trace!("{thread:?} priority set to {priority:?} (effective {effective:?})");

        self.reschedule();
        Ok(())
    }

    /// Let the other ready threads of the same priority run.
    pub fn thread_yield(&mut self) -> Result<(), KernelError> {
        let running = self.expect_thread_context()?;
        let priority = self.threads[running].effective_priority;
        if self.threads[running].st == ThreadState::Running
            && self.ready.has_ready_thread_at(priority)
        {
            self.requeue_running(running);
            self.request_dispatch();
        }
        Ok(())
    }

    /// Move the running thread to the back of its ready-queue level.
    pub(crate) fn requeue_running(&mut self, running: ThreadId) {
        self.make_ready(running);
        log::trace!("{running:?} requeued");
    }

    /// Suspend a thread until [`Self::thread_resume`].
    ///
    /// A thread suspending itself blocks. A suspended waiting thread has its
    /// wait cancelled; it receives [`KernelError::Aborted`] once resumed.
    pub fn thread_suspend(&mut self, thread: ThreadId) -> Result<Outcome<()>, KernelError> {
        self.expect_operational()?;
        let cb = self.thread_cb(thread)?;
        self.check_class(cb.header.safety_class)?;
        if self.is_system_thread(thread) {
            return Err(KernelError::InvalidParameter);
        }

        let st = cb.st;
        match st {
            ThreadState::Running => {
                let running = self.expect_waitable_context()?;
                let pending = self.wait_enter(running, WaitReason::Suspended, Timeout::FOREVER);
                return Ok(Outcome::Blocked(pending));
            }
            ThreadState::Ready => {
                // A woken thread that hasn't run yet keeps its result until
                // resumed
                let delivered = core::mem::replace(
                    &mut self.threads[thread].wait_result,
                    Ok(WaitValue::None),
                );
                self.ready_remove(thread);
                self.wait_enter_thread(thread, WaitReason::Suspended, Timeout::FOREVER);
                self.threads[thread].wait_result = delivered;
            }
            ThreadState::Blocked | ThreadState::Delayed => {
                if self.threads[thread].wait == Some(WaitReason::Suspended) {
                    return Err(KernelError::ResourceExhausted);
                }
                self.wait_exit(thread, Err(KernelError::Aborted));
                self.ready_remove(thread);
                self.wait_enter_thread(thread, WaitReason::Suspended, Timeout::FOREVER);
                self.threads[thread].wait_result = Err(KernelError::Aborted);
            }
            ThreadState::Terminated => return Err(KernelError::ResourceExhausted),
        }

        log::trace!("{thread:?} suspended");
        self.reschedule();
        Ok(Outcome::Done(()))
    }

    /// Resume a thread suspended by [`Self::thread_suspend`].
    pub fn thread_resume(&mut self, thread: ThreadId) -> Result<(), KernelError> {
        self.expect_operational()?;
        let cb = self.thread_cb(thread)?;
        self.check_class(cb.header.safety_class)?;
        if cb.wait != Some(WaitReason::Suspended) {
            return Err(KernelError::ResourceExhausted);
        }

        let result = core::mem::replace(&mut self.threads[thread].wait_result, Ok(WaitValue::None));
        self.wait_exit(thread, result);
        log::trace!("{thread:?} resumed");
        self.reschedule();
        Ok(())
    }

    /// Make a joinable thread detached. A detached thread's slot is freed as
    /// soon as it terminates.
    pub fn thread_detach(&mut self, thread: ThreadId) -> Result<(), KernelError> {
        self.expect_operational()?;
        let cb = self.thread_cb(thread)?;
        self.check_class(cb.header.safety_class)?;
        if !cb.joinable || !cb.join_queue.is_empty() {
            return Err(KernelError::ResourceExhausted);
        }

        if cb.st == ThreadState::Terminated {
            self.free_thread(thread);
        } else {
            self.threads[thread].joinable = false;
        }
        Ok(())
    }

    /// Wait for a joinable thread to terminate, and free its slot.
    ///
    /// Delivers the thread's exit cause: `Ok(())` for a normal exit or
    /// termination, [`KernelError::StackOverflow`] or
    /// [`KernelError::WatchdogExpired`] if a fault killed it, and
    /// [`KernelError::ObjectDeleted`] if it was deleted by a safety-class
    /// teardown.
    pub fn thread_join(
        &mut self,
        thread: ThreadId,
        timeout: Timeout,
    ) -> Result<Outcome<()>, KernelError> {
        self.expect_operational()?;
        let cb = self.thread_cb(thread)?;
        if !cb.joinable || self.running == Some(thread) {
            return Err(KernelError::ResourceExhausted);
        }

        if cb.st == ThreadState::Terminated {
            let exit_result = cb.exit_result;
            self.free_thread(thread);
            return exit_result.map(Outcome::Done);
        }

        if timeout.is_no_wait() {
            return Err(KernelError::ResourceExhausted);
        }
        let running = self.expect_waitable_context()?;
        Ok(Outcome::Blocked(self.wait_enter(
            running,
            WaitReason::Join(thread),
            timeout,
        )))
    }

    /// Terminate the calling thread normally.
    pub fn thread_exit(&mut self) -> Result<(), KernelError> {
        let running = self.expect_thread_context()?;
        if self.is_system_thread(running) {
            return Err(KernelError::BadContext);
        }
        self.terminate_thread(running, Ok(()));
        Ok(())
    }

    /// Terminate a thread. Its mutexes are released (see
    /// [`MutexOptions::ROBUST`](crate::cfg::MutexOptions::ROBUST)) and its
    /// joiners are woken.
    pub fn thread_terminate(&mut self, thread: ThreadId) -> Result<(), KernelError> {
        self.expect_operational()?;
        let cb = self.thread_cb(thread)?;
        self.check_class(cb.header.safety_class)?;
        if self.is_system_thread(thread) {
            return Err(KernelError::InvalidParameter);
        }
        if cb.st == ThreadState::Terminated {
            return Err(KernelError::ResourceExhausted);
        }
        self.terminate_thread(thread, Ok(()));
        Ok(())
    }

    /// Wake a waiting thread with [`KernelError::Aborted`].
    pub fn thread_abort_wait(&mut self, thread: ThreadId) -> Result<(), KernelError> {
        self.expect_operational()?;
        let cb = self.thread_cb(thread)?;
        self.check_class(cb.header.safety_class)?;
        let wait = cb.wait;
        match wait {
            Some(WaitReason::Suspended | WaitReason::TimerService) | None => {
                Err(KernelError::ResourceExhausted)
            }
            Some(_) => {
                self.wait_exit(thread, Err(KernelError::Aborted));
                self.reschedule();
                Ok(())
            }
        }
    }

    /// Count the threads that haven't terminated, including the idle and
    /// timer-service threads.
    pub fn thread_count(&self) -> usize {
        self.threads
            .iter()
            .filter(|(_, t)| t.st != ThreadState::Terminated)
            .count()
    }

    /// Write the handles of the threads that haven't terminated to `out`.
    /// Returns the number of handles written.
    pub fn thread_enumerate(&self, out: &mut [ThreadId]) -> usize {
        let live = self
            .threads
            .iter()
            .filter(|(_, t)| t.st != ThreadState::Terminated)
            .map(|(id, _)| id);
        out.iter_mut().zip(live).map(|(slot, id)| *slot = id).count()
    }

    /// Block the calling thread for `ticks` ticks. Returns `Done` right away
    /// if `ticks` is zero.
    pub fn delay(&mut self, ticks: u32) -> Result<Outcome<()>, KernelError> {
        self.expect_operational()?;
        if ticks == 0 {
            return Ok(Outcome::Done(()));
        }
        let running = self.expect_waitable_context()?;
        Ok(Outcome::Blocked(self.wait_enter(
            running,
            WaitReason::Delay,
            Timeout::ticks(ticks),
        )))
    }

    /// Block the calling thread until the tick count (as returned by
    /// [`Self::tick_count`]) reaches `tick`. The target must lie in the
    /// future, less than 2³¹ ticks away.
    pub fn delay_until(&mut self, tick: u32) -> Result<Outcome<()>, KernelError> {
        self.expect_operational()?;
        let delta = tick.wrapping_sub(self.tick_count());
        if delta == 0 || delta > i32::MAX as u32 {
            return Err(KernelError::InvalidParameter);
        }
        let running = self.expect_waitable_context()?;
        Ok(Outcome::Blocked(self.wait_enter(
            running,
            WaitReason::Delay,
            Timeout::ticks(delta),
        )))
    }

    #[inline]
    pub(crate) fn is_system_thread(&self, thread: ThreadId) -> bool {
        Some(thread) == self.idle_thread || Some(thread) == self.timer_service.thread
    }

    /// Transition `thread` to `Ready` and append it to the ready queue.
    pub(crate) fn make_ready(&mut self, thread: ThreadId) {
        self.threads[thread].st = ThreadState::Ready;
        if self.ready.push_back(&mut self.threads, thread).is_err() {
            self.corrupted("ready queue insertion");
        }
    }

    /// Remove a `Ready` thread from the ready queue.
    pub(crate) fn ready_remove(&mut self, thread: ThreadId) {
        if self.threads[thread].st == ThreadState::Ready
            && self.ready.remove(&mut self.threads, thread).is_err()
        {
            self.corrupted("ready queue removal");
        }
    }

    pub(crate) fn ready_pop_front(&mut self) -> Option<ThreadId> {
        match self.ready.pop_front(&mut self.threads) {
            Ok(thread) => thread,
            Err(_) => {
                self.corrupted("ready queue pop");
                None
            }
        }
    }

    pub(crate) fn set_running(&mut self, thread: ThreadId) {
        let slice = self.cfg.robin_slice.map_or(0, |s| s.get());
        let cb = &mut self.threads[thread];
        cb.st = ThreadState::Running;
        cb.slice_left = slice;
        self.running = Some(thread);
    }

    /// Return `true` if the next election will take the processor away from
    /// the running thread.
    pub(crate) fn is_switch_due(&self) -> bool {
        let Some(running) = self.running else {
            return false;
        };
        let cb = &self.threads[running];
        cb.st != ThreadState::Running || self.ready.has_ready_thread_above(cb.effective_priority)
    }

    /// Elect the thread to run next.
    ///
    /// The running thread keeps the processor unless a strictly
    /// higher-priority thread is ready, or it stopped running (blocked,
    /// requeued, or terminated). A preempted thread goes to the back of its
    /// ready-queue level.
    pub(crate) fn choose_next_running_thread(&mut self) -> Option<Switch> {
        let prev = self.running;
        let prev_priority = match prev {
            Some(p) if self.threads[p].st == ThreadState::Running => {
                Some(self.threads[p].effective_priority)
            }
            _ => None,
        };

        match (prev_priority, self.ready.highest_priority()) {
            (Some(current), Some(next)) if next <= current => return None,
            (Some(_), None) => return None,
            (None, None) => {
                self.corrupted("no ready thread (the idle thread must always be ready)");
                return None;
            }
            _ => {}
        }

        let next = self.ready_pop_front()?;
        if Some(next) == prev {
            // Requeued but nothing else to run at its level
            self.set_running(next);
            return None;
        }

        if let Some(p) = prev {
            if self.threads[p].st == ThreadState::Running {
                self.make_ready(p);
            }
        }
        self.set_running(next);
        log::trace!("switch {prev:?} -> {next:?}");

        Some(Switch {
            from: prev.filter(|&p| self.threads.contains(p)),
            to: next,
        })
    }

    /// Terminate `thread` with exit cause `cause`.
    ///
    /// The thread is removed from every list it is on, its mutexes are
    /// released, and its joiners are woken with `cause`. A detached thread's
    /// slot is freed; a joinable one stays `Terminated` unless it had a joiner.
    pub(crate) fn terminate_thread(&mut self, thread: ThreadId, cause: Result<(), KernelError>) {
        match self.threads[thread].st {
            ThreadState::Terminated => return,
            ThreadState::Ready => self.ready_remove(thread),
            ThreadState::Blocked | ThreadState::Delayed => {
                self.wait_exit(thread, Err(KernelError::Aborted));
                // `wait_exit` made it `Ready`
                self.ready_remove(thread);
            }
            ThreadState::Running => {}
        }

        let cb = &mut self.threads[thread];
        cb.st = ThreadState::Terminated;
        cb.exit_result = cause;
        if self.running == Some(thread) {
            self.running = None;
        }
        log::debug!("{thread:?} terminated ({cause:?})");

        self.abandon_held_mutexes(thread);
        self.reclaim_undelivered_block(thread);

        #[cfg(feature = "watchdog")]
        self.watchdog_disarm(thread);

        let joiners = self.wait_queue_snapshot(QueueRef::Join(thread));
        for &joiner in &joiners {
            self.wait_exit(joiner, cause.map(|()| WaitValue::None));
        }

        if !self.threads[thread].joinable || !joiners.is_empty() {
            self.free_thread(thread);
        }

        self.reschedule();
    }

    /// Release the slot of a thread.
    pub(crate) fn free_thread(&mut self, thread: ThreadId) {
        if let Some(cb) = self.threads.remove(thread) {
            if let Some(context) = cb.context {
                self.port.release_context(thread, context);
            }
        }
    }

    /// Arm, reload, or (`ticks == 0`) disarm the calling thread's watchdog.
    #[cfg(feature = "watchdog")]
    pub fn thread_feed_watchdog(&mut self, ticks: u32) -> Result<(), KernelError> {
        let running = self.expect_thread_context()?;
        let cb = &mut self.threads[running];
        match (cb.watchdog, ticks) {
            (0, 0) => {}
            (0, _) => self.watchdogs_armed += 1,
            (_, 0) => self.watchdogs_armed -= 1,
            _ => {}
        }
        cb.watchdog = ticks;
        Ok(())
    }

    #[cfg(feature = "watchdog")]
    pub(crate) fn watchdog_disarm(&mut self, thread: ThreadId) {
        let cb = &mut self.threads[thread];
        if cb.watchdog != 0 {
            cb.watchdog = 0;
            self.watchdogs_armed -= 1;
        }
    }
}
