//! Semaphores
use core::fmt;

use crate::{
    cfg::SemaphoreAttr,
    error::KernelError,
    object::{ObjectHeader, SemaphoreId},
    port::Port,
    state::Kernel,
    timeout::Timeout,
    wait::{Outcome, QueueRef, WaitQueue, WaitReason, WaitValue},
};

/// *Semaphore control block* - the state data of a counting semaphore.
pub(crate) struct SemaphoreCb {
    pub(crate) header: ObjectHeader,
    pub(crate) value: u32,
    pub(crate) max_value: u32,
    pub(crate) wait_queue: WaitQueue,
}

impl fmt::Debug for SemaphoreCb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SemaphoreCb")
            .field("header", &self.header)
            .field("value", &self.value)
            .field("max_value", &self.max_value)
            .field("wait_queue", &self.wait_queue)
            .finish()
    }
}

/// Take a token if one is available.
#[inline]
fn poll_core(value: &mut u32) -> bool {
    if *value > 0 {
        *value -= 1;
        true
    } else {
        false
    }
}

impl<P: Port> Kernel<P> {
    pub fn semaphore_create(&mut self, attr: SemaphoreAttr) -> Result<SemaphoreId, KernelError> {
        self.expect_operational()?;
        if attr.max == 0 || attr.initial > attr.max {
            return Err(KernelError::InvalidParameter);
        }
        let semaphore = self
            .semaphores
            .insert(SemaphoreCb {
                header: ObjectHeader {
                    name: attr.name,
                    safety_class: attr.safety_class,
                },
                value: attr.initial,
                max_value: attr.max,
                wait_queue: WaitQueue::new(),
            })
            .ok_or(KernelError::ResourceExhausted)?;
        log::debug!(
            "created {semaphore:?} ({:?}, {}/{})",
            attr.name,
            attr.initial,
            attr.max
        );
        Ok(semaphore)
    }

    /// Take a token from a semaphore, blocking until one is available.
    pub fn semaphore_acquire(
        &mut self,
        semaphore: SemaphoreId,
        timeout: Timeout,
    ) -> Result<Outcome<()>, KernelError> {
        self.expect_operational()?;
        let cb = self
            .semaphores
            .get_mut(semaphore)
            .ok_or(KernelError::InvalidHandle)?;

        if poll_core(&mut cb.value) {
            return Ok(Outcome::Done(()));
        }
        if timeout.is_no_wait() {
            return Err(KernelError::ResourceExhausted);
        }

        // The current state does not satisfy the wait condition. The
        // wake-upper is responsible for handing over a token.
        let running = self.expect_waitable_context()?;
        Ok(Outcome::Blocked(self.wait_enter(
            running,
            WaitReason::Semaphore(semaphore),
            timeout,
        )))
    }

    /// Return a token to a semaphore. Fails with
    /// [`KernelError::ResourceExhausted`] if the count is already at its
    /// maximum.
    pub fn semaphore_release(&mut self, semaphore: SemaphoreId) -> Result<(), KernelError> {
        self.expect_operational()?;
        self.semaphore_release_core(semaphore)?;
        self.reschedule();
        Ok(())
    }

    pub(crate) fn semaphore_release_core(
        &mut self,
        semaphore: SemaphoreId,
    ) -> Result<(), KernelError> {
        let cb = self
            .semaphores
            .get_mut(semaphore)
            .ok_or(KernelError::InvalidHandle)?;

        if let Some(waiter) = cb.wait_queue.first {
            // Hand the token over to the first waiter directly
            self.wait_exit(waiter, Ok(WaitValue::None));
            return Ok(());
        }

        if cb.value >= cb.max_value {
            return Err(KernelError::ResourceExhausted);
        }
        cb.value += 1;
        Ok(())
    }

    /// Get the number of available tokens.
    pub fn semaphore_count(&self, semaphore: SemaphoreId) -> Result<u32, KernelError> {
        Ok(self
            .semaphores
            .get(semaphore)
            .ok_or(KernelError::InvalidHandle)?
            .value)
    }

    /// Delete a semaphore. Waiters wake up with
    /// [`KernelError::ObjectDeleted`].
    pub fn semaphore_delete(&mut self, semaphore: SemaphoreId) -> Result<(), KernelError> {
        self.expect_operational()?;
        let cb = self
            .semaphores
            .get(semaphore)
            .ok_or(KernelError::InvalidHandle)?;
        self.check_class(cb.header.safety_class)?;
        self.semaphore_destroy(semaphore);
        self.reschedule();
        Ok(())
    }

    pub(crate) fn semaphore_destroy(&mut self, semaphore: SemaphoreId) {
        self.wait_queue_wake_all(QueueRef::Semaphore(semaphore), KernelError::ObjectDeleted);
        self.semaphores.remove(semaphore);
        log::debug!("deleted {semaphore:?}");
    }
}
