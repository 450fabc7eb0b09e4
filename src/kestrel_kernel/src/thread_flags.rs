//! Thread flags: a set of event flags built into every thread
use crate::{
    error::KernelError,
    event_flags::{check_flags, poll_flags, FlagsWait},
    object::ThreadId,
    port::Port,
    state::Kernel,
    thread::ThreadState,
    timeout::Timeout,
    wait::{Outcome, WaitReason, WaitValue},
};

impl<P: Port> Kernel<P> {
    /// Set flags of a thread. Returns the thread's flags right after setting.
    pub fn thread_flags_set(&mut self, thread: ThreadId, flags: u32) -> Result<u32, KernelError> {
        self.expect_operational()?;
        let value = self.thread_flags_set_core(thread, flags)?;
        self.reschedule();
        Ok(value)
    }

    pub(crate) fn thread_flags_set_core(
        &mut self,
        thread: ThreadId,
        flags: u32,
    ) -> Result<u32, KernelError> {
        let flags = check_flags(flags)?;
        let cb = self
            .threads
            .get_mut(thread)
            .ok_or(KernelError::InvalidHandle)?;
        if cb.st == ThreadState::Terminated {
            return Err(KernelError::ResourceExhausted);
        }
        cb.flags |= flags;
        let value = cb.flags;

        if let Some(WaitReason::ThreadFlags {
            flags: wanted,
            options,
        }) = cb.wait
        {
            if let Some(observed) = poll_flags(&mut cb.flags, wanted, options) {
                self.wait_exit(thread, Ok(WaitValue::Flags(observed)));
            }
        }

        Ok(value)
    }

    /// Clear flags of the calling thread. Returns the flags before clearing.
    pub fn thread_flags_clear(&mut self, flags: u32) -> Result<u32, KernelError> {
        let running = self.expect_thread_context()?;
        let flags = check_flags(flags)?;
        let cb = &mut self.threads[running];
        let previous = cb.flags;
        cb.flags &= !flags;
        Ok(previous)
    }

    /// Get the flags of the calling thread.
    pub fn thread_flags_get(&self) -> Result<u32, KernelError> {
        let running = self.expect_thread_context()?;
        Ok(self.threads[running].flags)
    }

    /// Wait for flags of the calling thread.
    pub fn thread_flags_wait(
        &mut self,
        flags: u32,
        options: FlagsWait,
        timeout: Timeout,
    ) -> Result<Outcome<u32>, KernelError> {
        let running = self.expect_thread_context()?;
        let flags = check_flags(flags)?;

        if let Some(observed) = poll_flags(&mut self.threads[running].flags, flags, options) {
            return Ok(Outcome::Done(observed));
        }
        if timeout.is_no_wait() {
            return Err(KernelError::ResourceExhausted);
        }

        let running = self.expect_waitable_context()?;
        let reason = WaitReason::ThreadFlags { flags, options };
        Ok(Outcome::Blocked(self.wait_enter(running, reason, timeout)))
    }
}
