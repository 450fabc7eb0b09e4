//! The interface between the kernel and the target-specific code
use crate::{error::Fault, object::ThreadId};

/// What a thread executes when the port first switches to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadEntry {
    /// An application thread.
    User { entry: fn(usize), arg: usize },
    /// The idle thread. The port runs its low-power loop here. The idle thread
    /// never blocks.
    Idle,
    /// The timer-service thread. Whenever it's dispatched, the port calls
    /// [`Kernel::run_timer_service`](crate::Kernel::run_timer_service).
    TimerService,
}

/// The outcome of [`Kernel::dispatch`](crate::Kernel::dispatch): save the
/// context of `from` (if any) and restore the context of `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Switch {
    /// The previously running thread, or `None` if it no longer exists.
    pub from: Option<ThreadId>,
    pub to: ThreadId,
}

/// Implemented by a port to provide the CPU-level mechanisms the kernel
/// requests but does not perform itself.
///
/// The kernel calls these methods from within its services; they must not
/// call back into the kernel.
pub trait Port: Sized + 'static {
    /// The saved register/stack context of a thread.
    type Context;

    /// Set up the execution context for a new thread.
    fn initialize_context(
        &mut self,
        thread: ThreadId,
        entry: ThreadEntry,
        stack_size: usize,
    ) -> Self::Context;

    /// Release the resources of a thread's context. Called when the thread's
    /// slot is freed.
    fn release_context(&mut self, thread: ThreadId, context: Self::Context) {
        let _ = (thread, context);
    }

    /// Pend a context switch. The port must eventually call
    /// [`Kernel::dispatch`](crate::Kernel::dispatch) from its switch handler,
    /// typically a lowest-priority exception.
    fn request_dispatch(&mut self);

    /// Get the function an [`IsrContext`](crate::IsrContext) calls after
    /// staging a request, to pend a context switch from interrupt context.
    /// Queried once, by [`Kernel::new`](crate::Kernel::new).
    fn isr_pend_hook(&self) -> Option<fn()> {
        None
    }

    /// Check the stack watermark of an outgoing thread. Only consulted when
    /// stack checking is enabled in [`KernelConfig`](crate::KernelConfig).
    fn stack_intact(&self, context: &Self::Context) -> bool {
        let _ = context;
        true
    }

    /// Called when a thread's watchdog expires. Returning a non-zero tick
    /// count reloads the watchdog; returning zero terminates the thread.
    fn watchdog_alarm(&mut self, thread: ThreadId) -> u32 {
        let _ = thread;
        0
    }

    /// Report a fault. See [`Fault`] for how the kernel proceeds after each
    /// kind.
    fn fault(&mut self, fault: Fault) {
        log::error!("{fault}");
    }
}
