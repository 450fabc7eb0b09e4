//! Simulation environment for driving the Kestrel kernel on a hosted
//! environment.
//!
//! No thread code is actually executed. [`SimPort`] records the requests the
//! kernel makes of a port, and [`Sim`] performs the dispatches a real port's
//! switch handler would. The calling code plays the role of whichever thread
//! is running, so a test reads as a sequence of service calls made by the
//! threads in the order the scheduler lets them run.
#![deny(unsafe_op_in_unsafe_fn)]
use kestrel_kernel::{
    Fault, Kernel, KernelConfig, KernelError, KernelState, Port, Switch, ThreadEntry, ThreadId,
    ThreadState,
};
use slab::Slab;

/// The byte pattern the simulated stacks are filled with.
pub const STACK_FILL: u8 = 0xcc;

/// The number of bytes at the limit end of each stack checked by
/// [`Port::stack_intact`].
pub const STACK_WATERMARK_LEN: usize = 16;

/// The saved context of a simulated thread.
#[derive(Debug)]
pub struct SimContext {
    thread: ThreadId,
    entry: ThreadEntry,
    /// The key of the thread's stack in [`SimPort::stacks`].
    stack: usize,
}

impl SimContext {
    #[inline]
    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    #[inline]
    pub fn entry(&self) -> ThreadEntry {
        self.entry
    }
}

/// A [`Port`] that records what the kernel asks of it.
#[derive(Debug, Default)]
pub struct SimPort {
    dispatch_requests: usize,
    faults: Vec<Fault>,
    /// The value returned by [`Port::watchdog_alarm`].
    watchdog_reload: u32,
    watchdog_alarms: Vec<ThreadId>,
    stacks: Slab<Vec<u8>>,
}

impl SimPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the pending dispatch requests. Returns `true` if there were
    /// any.
    pub fn take_dispatch_request(&mut self) -> bool {
        std::mem::take(&mut self.dispatch_requests) != 0
    }

    /// Get the faults reported so far.
    pub fn faults(&self) -> &[Fault] {
        &self.faults
    }

    pub fn take_faults(&mut self) -> Vec<Fault> {
        std::mem::take(&mut self.faults)
    }

    /// Set the reload value returned from watchdog alarms. Zero (the default)
    /// lets the kernel terminate the thread.
    pub fn set_watchdog_reload(&mut self, ticks: u32) {
        self.watchdog_reload = ticks;
    }

    pub fn watchdog_alarms(&self) -> &[ThreadId] {
        &self.watchdog_alarms
    }

    /// Get the number of live simulated stacks.
    pub fn stack_count(&self) -> usize {
        self.stacks.len()
    }

    /// Overwrite the watermark of a thread's stack, as a runaway thread
    /// would.
    pub fn clobber_stack(&mut self, context: &SimContext) {
        self.clobber(context.stack);
    }

    fn clobber(&mut self, stack: usize) {
        if let Some(stack) = self.stacks.get_mut(stack) {
            for byte in stack.iter_mut().take(STACK_WATERMARK_LEN) {
                *byte = 0;
            }
        }
    }
}

impl Port for SimPort {
    type Context = SimContext;

    fn initialize_context(
        &mut self,
        thread: ThreadId,
        entry: ThreadEntry,
        stack_size: usize,
    ) -> SimContext {
        let stack = self.stacks.insert(vec![STACK_FILL; stack_size]);
        log::trace!("initialize_context({thread:?}, {entry:?}, {stack_size})");
        SimContext {
            thread,
            entry,
            stack,
        }
    }

    fn release_context(&mut self, thread: ThreadId, context: SimContext) {
        log::trace!("release_context({thread:?})");
        if self.stacks.contains(context.stack) {
            self.stacks.remove(context.stack);
        }
    }

    fn request_dispatch(&mut self) {
        log::trace!("request_dispatch");
        self.dispatch_requests += 1;
    }

    fn stack_intact(&self, context: &SimContext) -> bool {
        self.stacks.get(context.stack).map_or(true, |stack| {
            stack
                .iter()
                .take(STACK_WATERMARK_LEN)
                .all(|&b| b == STACK_FILL)
        })
    }

    fn watchdog_alarm(&mut self, thread: ThreadId) -> u32 {
        log::trace!("watchdog_alarm({thread:?})");
        self.watchdog_alarms.push(thread);
        self.watchdog_reload
    }

    fn fault(&mut self, fault: Fault) {
        log::warn!("fault: {fault}");
        self.faults.push(fault);
    }
}

/// Initialize `env_logger` for a test. Can be called any number of times.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A kernel on a [`SimPort`] plus the switch handler that drives it.
#[derive(Debug)]
pub struct Sim {
    pub kernel: Kernel<SimPort>,
    switches: Vec<Switch>,
}

impl Sim {
    pub fn new(cfg: KernelConfig) -> Self {
        init_logger();
        Self {
            kernel: Kernel::new(SimPort::new(), cfg),
            switches: Vec::new(),
        }
    }

    /// Start the kernel and return the first thread to run.
    pub fn start(&mut self) -> Result<ThreadId, KernelError> {
        let first = self.kernel.start()?;
        self.switches.push(first);
        self.switch();
        self.current().ok_or(KernelError::BadContext)
    }

    /// Perform the pending dispatches, running the timer service whenever its
    /// thread is elected. Returns the thread running afterwards.
    pub fn switch(&mut self) -> Option<ThreadId> {
        loop {
            while self.kernel.state() == KernelState::Running {
                let requested = self.kernel.port_mut().take_dispatch_request();
                if !requested && !self.kernel.is_dispatch_pending() {
                    break;
                }
                if let Some(switch) = self.kernel.dispatch() {
                    log::trace!("switch {switch:?}");
                    self.switches.push(switch);
                }
            }

            let Some(current) = self.current() else { break };
            if !self.is_timer_thread(current)
                || self.kernel.thread_state(current) != Ok(ThreadState::Running)
            {
                break;
            }
            if let Err(e) = self.kernel.run_timer_service() {
                log::warn!("run_timer_service failed: {e}");
                break;
            }
        }
        self.current()
    }

    fn is_timer_thread(&self, thread: ThreadId) -> bool {
        self.kernel
            .thread_context(thread)
            .map_or(false, |c| c.entry == ThreadEntry::TimerService)
    }

    /// Get the running thread.
    pub fn current(&self) -> Option<ThreadId> {
        self.kernel.current_thread().ok()
    }

    /// Announce one tick from the tick interrupt, then dispatch.
    pub fn tick(&mut self) -> Option<ThreadId> {
        self.kernel.isr_context().tick();
        self.switch()
    }

    /// Announce `ticks` ticks one by one, dispatching after each.
    pub fn advance(&mut self, ticks: u32) -> Option<ThreadId> {
        for _ in 0..ticks {
            self.tick();
        }
        self.current()
    }

    /// Get the context switches performed so far, oldest first.
    pub fn take_switches(&mut self) -> Vec<Switch> {
        std::mem::take(&mut self.switches)
    }

    /// Clobber the stack watermark of `thread`.
    pub fn clobber_stack(&mut self, thread: ThreadId) {
        let Some(stack) = self.kernel.thread_context(thread).map(|c| c.stack) else {
            return;
        };
        self.kernel.port_mut().clobber(stack);
    }
}
