//! The kernel context and the kernel state machine
use alloc::sync::Arc;
use core::fmt;

use crate::{
    cfg::KernelConfig,
    error::{Fault, KernelError},
    event_flags::EventFlagsCb,
    memory_pool::MemoryPoolCb,
    message_queue::MessageQueueCb,
    mutex::MutexCb,
    object::{EventFlagsId, MemoryPoolId, MessageQueueId, MutexId, SemaphoreId, ThreadId, TimerId},
    port::{Port, Switch},
    post::PostQueue,
    semaphore::SemaphoreCb,
    thread::{readyqueue::ReadyQueue, ThreadArena, ThreadState},
    timeout::TimeBase,
    timer::{TimerCb, TimerService},
    utils::Arena,
};

/// The global state of the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelState {
    /// Initialized by [`Kernel::new`] but not started. Objects can be created.
    Ready,
    /// Scheduling threads.
    Running,
    /// Scheduling is deferred by [`Kernel::lock`].
    Locked,
    /// The time base is stopped by [`Kernel::suspend`].
    Suspended,
    /// An internal invariant was violated. Every service fails with
    /// [`KernelError::BadContext`].
    Error,
}

/// The kernel context: every thread, object, list, and the time base.
///
/// All services are methods taking `&self` or `&mut self`, so the kernel's
/// bookkeeping always has exactly one mutator.
pub struct Kernel<P: Port> {
    pub(crate) port: P,
    pub(crate) cfg: KernelConfig,
    pub(crate) state: KernelState,
    /// A dispatch was requested and hasn't been performed yet.
    pub(crate) dispatch_pending: bool,
    /// The thread the CPU is (or will be, once the port completes a pending
    /// switch) executing. `None` after the running thread terminated itself.
    pub(crate) running: Option<ThreadId>,
    pub(crate) idle_thread: Option<ThreadId>,
    /// Set while [`Kernel::run_timer_service`] runs a callback.
    pub(crate) in_timer_callback: bool,
    pub(crate) ready: ReadyQueue,
    pub(crate) time: TimeBase,
    pub(crate) threads: ThreadArena<P::Context>,
    pub(crate) mutexes: Arena<MutexId, MutexCb>,
    pub(crate) semaphores: Arena<SemaphoreId, SemaphoreCb>,
    pub(crate) event_flags: Arena<EventFlagsId, EventFlagsCb>,
    pub(crate) memory_pools: Arena<MemoryPoolId, MemoryPoolCb>,
    pub(crate) message_queues: Arena<MessageQueueId, MessageQueueCb>,
    pub(crate) timers: Arena<TimerId, TimerCb<P>>,
    pub(crate) timer_service: TimerService,
    pub(crate) post: Arc<PostQueue>,
    /// The number of threads with an armed watchdog.
    #[cfg(feature = "watchdog")]
    pub(crate) watchdogs_armed: usize,
}

impl<P: Port + fmt::Debug> fmt::Debug for Kernel<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("port", &self.port)
            .field("state", &self.state)
            .field("dispatch_pending", &self.dispatch_pending)
            .field("running", &self.running)
            .field("tick", &self.time.now)
            .field("ready", &self.ready)
            .field("threads", &self.threads.len())
            .field("mutexes", &self.mutexes)
            .field("semaphores", &self.semaphores)
            .field("event_flags", &self.event_flags)
            .field("memory_pools", &self.memory_pools)
            .field("message_queues", &self.message_queues)
            .finish_non_exhaustive()
    }
}

impl<P: Port> Kernel<P> {
    /// Construct a kernel in the [`KernelState::Ready`] state.
    pub fn new(port: P, cfg: KernelConfig) -> Self {
        let post = Arc::new(PostQueue::new(cfg.isr_queue_len, port.isr_pend_hook()));
        Self {
            port,
            cfg,
            state: KernelState::Ready,
            dispatch_pending: false,
            running: None,
            idle_thread: None,
            in_timer_callback: false,
            ready: ReadyQueue::new(),
            time: TimeBase::new(),
            // The idle and timer-service threads are not counted
            threads: Arena::with_capacity(cfg.max_threads + 2),
            mutexes: Arena::with_capacity(cfg.max_mutexes),
            semaphores: Arena::with_capacity(cfg.max_semaphores),
            event_flags: Arena::with_capacity(cfg.max_event_flags),
            memory_pools: Arena::with_capacity(cfg.max_memory_pools),
            message_queues: Arena::with_capacity(cfg.max_message_queues),
            timers: Arena::with_capacity(cfg.max_timers),
            timer_service: TimerService::new(cfg.timer_queue_len),
            post,
            #[cfg(feature = "watchdog")]
            watchdogs_armed: 0,
        }
    }

    /// Start scheduling.
    ///
    /// Creates the idle thread and the timer-service thread, elects the first
    /// thread to run, and returns it. The port should start executing the
    /// returned thread without saving any context.
    pub fn start(&mut self) -> Result<Switch, KernelError> {
        if self.state != KernelState::Ready {
            return Err(KernelError::BadContext);
        }

        let idle = self.spawn_system_thread(crate::port::ThreadEntry::Idle)?;
        self.idle_thread = Some(idle);

        let timer_thread = self.spawn_system_thread(crate::port::ThreadEntry::TimerService)?;
        self.timer_service.thread = Some(timer_thread);

        self.state = KernelState::Running;
        self.dispatch_pending = false;

        let Some(first) = self.ready_pop_front() else {
            self.corrupted("no thread to start with");
            return Err(KernelError::BadContext);
        };
        self.set_running(first);
        log::debug!("kernel started with {first:?}");

        Ok(Switch {
            from: None,
            to: first,
        })
    }

    #[inline]
    pub fn state(&self) -> KernelState {
        self.state
    }

    #[inline]
    pub fn config(&self) -> &KernelConfig {
        &self.cfg
    }

    #[inline]
    pub fn port(&self) -> &P {
        &self.port
    }

    #[inline]
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Get the saved context of a thread, for use by the port's switch code.
    pub fn thread_context(&self, thread: ThreadId) -> Option<&P::Context> {
        self.threads.get(thread)?.context.as_ref()
    }

    pub fn thread_context_mut(&mut self, thread: ThreadId) -> Option<&mut P::Context> {
        self.threads.get_mut(thread)?.context.as_mut()
    }

    /// Return `true` if a dispatch was requested and hasn't been performed
    /// yet.
    #[inline]
    pub fn is_dispatch_pending(&self) -> bool {
        self.dispatch_pending || self.post.has_work()
    }

    /// Defer dispatching. Returns the previous lock state.
    pub fn lock(&mut self) -> Result<bool, KernelError> {
        match self.state {
            KernelState::Locked => Ok(true),
            KernelState::Running => {
                self.state = KernelState::Locked;
                Ok(false)
            }
            _ => Err(KernelError::BadContext),
        }
    }

    /// Resume dispatching. A dispatch requested while the kernel was locked is
    /// forwarded to the port now. Returns the previous lock state.
    pub fn unlock(&mut self) -> Result<bool, KernelError> {
        match self.state {
            KernelState::Running => Ok(false),
            KernelState::Locked => {
                self.state = KernelState::Running;
                if self.dispatch_pending {
                    self.port.request_dispatch();
                }
                Ok(true)
            }
            _ => Err(KernelError::BadContext),
        }
    }

    /// Restore the lock state returned by [`Self::lock`] or [`Self::unlock`].
    /// Returns the new lock state.
    pub fn restore_lock(&mut self, locked: bool) -> Result<bool, KernelError> {
        if locked {
            self.lock()?;
        } else {
            self.unlock()?;
        }
        Ok(locked)
    }

    /// The CPU-level switch entry point. The port calls this from its switch
    /// handler after [`Port::request_dispatch`].
    ///
    /// Applies the requests staged by interrupt handlers, checks the stack of
    /// the outgoing thread, and elects the highest-priority ready thread.
    /// Returns `None` if the current thread should keep running.
    pub fn dispatch(&mut self) -> Option<Switch> {
        if self.state != KernelState::Running {
            return None;
        }

        // Suppress the port notifications caused by the work below; this pass
        // covers them
        self.dispatch_pending = true;
        self.process_post_queue();

        if self.cfg.stack_check && self.is_switch_due() {
            if let Some(prev) = self.running {
                let intact = match self.threads.get(prev).and_then(|t| t.context.as_ref()) {
                    Some(context) => self.port.stack_intact(context),
                    None => true,
                };
                if !intact {
                    log::warn!("stack overflow detected in {prev:?}");
                    self.port.fault(Fault::StackOverflow(prev));
                    self.terminate_thread(prev, Err(KernelError::StackOverflow));
                }
            }
        }

        self.dispatch_pending = false;
        self.choose_next_running_thread()
    }

    /// Request a dispatch if the running thread is no longer the one that
    /// should run.
    pub(crate) fn reschedule(&mut self) {
        if !matches!(self.state, KernelState::Running | KernelState::Locked) {
            return;
        }

        let needs_dispatch = match self.running {
            Some(running) => {
                let thread = &self.threads[running];
                thread.st != ThreadState::Running
                    || self.ready.has_ready_thread_above(thread.effective_priority)
            }
            None => true,
        };

        if needs_dispatch {
            self.request_dispatch();
        }
    }

    pub(crate) fn request_dispatch(&mut self) {
        let already_pending = self.dispatch_pending;
        self.dispatch_pending = true;
        if self.state == KernelState::Running && !already_pending {
            self.port.request_dispatch();
        }
    }

    /// Record a violated internal invariant. The kernel stops serving
    /// requests.
    #[cold]
    pub(crate) fn corrupted(&mut self, what: &'static str) {
        if self.state != KernelState::Error {
            log::error!("kernel invariant violated: {what}");
            self.state = KernelState::Error;
            self.port.fault(Fault::InvariantViolation(what));
        }
    }

    /// Check that the kernel is able to serve requests.
    #[inline]
    pub(crate) fn expect_operational(&self) -> Result<(), KernelError> {
        if self.state == KernelState::Error {
            Err(KernelError::BadContext)
        } else {
            Ok(())
        }
    }

    /// Check that the caller is a thread, and return it.
    pub(crate) fn expect_thread_context(&self) -> Result<ThreadId, KernelError> {
        if !matches!(self.state, KernelState::Running | KernelState::Locked)
            || self.in_timer_callback
        {
            return Err(KernelError::BadContext);
        }
        self.running.ok_or(KernelError::BadContext)
    }

    /// Check that the caller is a thread that may block, and return it.
    pub(crate) fn expect_waitable_context(&self) -> Result<ThreadId, KernelError> {
        if self.state != KernelState::Running || self.in_timer_callback {
            return Err(KernelError::BadContext);
        }
        let running = self.running.ok_or(KernelError::BadContext)?;
        if Some(running) == self.idle_thread || self.threads[running].st != ThreadState::Running {
            return Err(KernelError::BadContext);
        }
        Ok(running)
    }

    /// Stop the time base for a low-power sleep. Returns the number of ticks
    /// until the nearest deadline (`u32::MAX` if there is none).
    pub fn suspend(&mut self) -> Result<u32, KernelError> {
        if self.state != KernelState::Running {
            return Err(KernelError::BadContext);
        }
        self.state = KernelState::Suspended;

        let next = [self.time.next_deadline(), self.timer_service.next_deadline()]
            .into_iter()
            .flatten()
            .min();
        let ticks = match next {
            Some(deadline) => deadline
                .saturating_sub(self.time.now)
                .min(u32::MAX as u64 - 1) as u32,
            None => u32::MAX,
        };
        log::debug!("kernel suspended, next deadline in {ticks} ticks");
        Ok(ticks)
    }

    /// Restart the time base after `sleep_ticks` ticks of sleep, expiring
    /// everything that fell due in the meantime.
    pub fn resume(&mut self, sleep_ticks: u32) -> Result<(), KernelError> {
        if self.state != KernelState::Suspended {
            return Err(KernelError::BadContext);
        }
        self.state = KernelState::Running;
        log::debug!("kernel resumed after {sleep_ticks} ticks");

        if sleep_ticks > 0 {
            self.advance_time(sleep_ticks);
        }
        self.reschedule();
        Ok(())
    }
}
