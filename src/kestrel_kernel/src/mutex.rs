//! ~~Mutices~~ Mutexes
//!
//! The mutexes held by a thread form a singly-linked list starting at
//! `ThreadCb::last_mutex_held` and continuing through
//! `MutexCb::prev_mutex_held`. The list is walked to compute the thread's
//! effective priority, which is the maximum of its base priority and the
//! priority of the first (highest-priority) waiter of each held mutex that has
//! [`MutexOptions::PRIO_INHERIT`].
use core::fmt;

use crate::{
    cfg::{MutexAttr, MutexOptions},
    error::KernelError,
    object::{MutexId, ObjectHeader, ThreadId},
    port::Port,
    state::Kernel,
    thread::{Priority, ThreadState},
    timeout::Timeout,
    wait::{Outcome, QueueRef, WaitQueue, WaitReason, WaitValue},
};

/// *Mutex control block* - the state data of a mutex.
pub(crate) struct MutexCb {
    pub(crate) header: ObjectHeader,
    pub(crate) options: MutexOptions,
    pub(crate) wait_queue: WaitQueue,

    /// The thread that currently owns the mutex lock.
    pub(crate) owner: Option<ThreadId>,
    /// Zero iff `owner` is `None`.
    pub(crate) lock_count: u8,

    /// The previous element in the singly-linked list headed by
    /// `ThreadCb::last_mutex_held`.
    pub(crate) prev_mutex_held: Option<MutexId>,
}

impl fmt::Debug for MutexCb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutexCb")
            .field("header", &self.header)
            .field("options", &self.options)
            .field("wait_queue", &self.wait_queue)
            .field("owner", &self.owner)
            .field("lock_count", &self.lock_count)
            .field("prev_mutex_held", &self.prev_mutex_held)
            .finish()
    }
}

impl<P: Port> Kernel<P> {
    pub fn mutex_create(&mut self, attr: MutexAttr) -> Result<MutexId, KernelError> {
        self.expect_operational()?;
        let mutex = self
            .mutexes
            .insert(MutexCb {
                header: ObjectHeader {
                    name: attr.name,
                    safety_class: attr.safety_class,
                },
                options: attr.options,
                wait_queue: WaitQueue::new(),
                owner: None,
                lock_count: 0,
                prev_mutex_held: None,
            })
            .ok_or(KernelError::ResourceExhausted)?;
        log::debug!("created {mutex:?} ({:?}, {:?})", attr.name, attr.options);
        Ok(mutex)
    }

    /// Acquire a mutex.
    ///
    /// Fails with [`KernelError::OwnershipViolation`] if the caller already
    /// owns a non-recursive mutex or the lock count would exceed 255. A thread
    /// blocked here receives [`KernelError::OwnerLost`] if the owner
    /// terminates while holding a non-robust mutex.
    pub fn mutex_acquire(
        &mut self,
        mutex: MutexId,
        timeout: Timeout,
    ) -> Result<Outcome<()>, KernelError> {
        self.expect_operational()?;
        let running = self.expect_thread_context()?;
        let cb = self
            .mutexes
            .get_mut(mutex)
            .ok_or(KernelError::InvalidHandle)?;

        let owner = cb.owner;
        match owner {
            None => {
                self.mutex_lock_core(mutex, running);
                self.mutex_reevaluate_owner(mutex);
                return Ok(Outcome::Done(()));
            }
            Some(owner) if owner == running => {
                if !cb.options.contains(MutexOptions::RECURSIVE) || cb.lock_count == u8::MAX {
                    return Err(KernelError::OwnershipViolation);
                }
                cb.lock_count += 1;
                return Ok(Outcome::Done(()));
            }
            Some(_) => {}
        }

        if timeout.is_no_wait() {
            return Err(KernelError::ResourceExhausted);
        }

        // The wake-upper is responsible for giving us the ownership
        let running = self.expect_waitable_context()?;
        let pending = self.wait_enter(running, WaitReason::Mutex(mutex), timeout);
        self.mutex_reevaluate_owner(mutex);
        Ok(Outcome::Blocked(pending))
    }

    /// Release a mutex held by the calling thread.
    pub fn mutex_release(&mut self, mutex: MutexId) -> Result<(), KernelError> {
        self.expect_operational()?;
        let running = self.expect_thread_context()?;
        let cb = self
            .mutexes
            .get_mut(mutex)
            .ok_or(KernelError::InvalidHandle)?;

        if cb.owner != Some(running) {
            return Err(KernelError::OwnershipViolation);
        }

        cb.lock_count -= 1;
        if cb.lock_count > 0 {
            return Ok(());
        }

        // Remove `mutex` from the list of the mutexes held by the thread and
        // lower the thread's effective priority. This may cause preemption.
        self.mutex_unlink_held(running, mutex);
        let effective = self.evaluate_effective_priority(running);
        self.set_effective_priority(running, effective);

        self.mutex_unlock_unchecked(mutex);
        self.reschedule();
        Ok(())
    }

    /// Get the thread owning a mutex.
    pub fn mutex_owner(&self, mutex: MutexId) -> Result<Option<ThreadId>, KernelError> {
        Ok(self
            .mutexes
            .get(mutex)
            .ok_or(KernelError::InvalidHandle)?
            .owner)
    }

    /// Delete a mutex. Waiters wake up with [`KernelError::ObjectDeleted`].
    pub fn mutex_delete(&mut self, mutex: MutexId) -> Result<(), KernelError> {
        self.expect_operational()?;
        let cb = self.mutexes.get(mutex).ok_or(KernelError::InvalidHandle)?;
        self.check_class(cb.header.safety_class)?;
        self.mutex_destroy(mutex);
        self.reschedule();
        Ok(())
    }

    pub(crate) fn mutex_destroy(&mut self, mutex: MutexId) {
        self.wait_queue_wake_all(QueueRef::Mutex(mutex), KernelError::ObjectDeleted);

        if let Some(owner) = self.mutexes[mutex].owner {
            self.mutex_unlink_held(owner, mutex);
            self.mutexes.remove(mutex);
            let effective = self.evaluate_effective_priority(owner);
            self.set_effective_priority(owner, effective);
        } else {
            self.mutexes.remove(mutex);
        }
        log::debug!("deleted {mutex:?}");
    }

    /// Give the ownership of the free `mutex` to `thread`. The caller should
    /// call [`Self::mutex_reevaluate_owner`] afterwards.
    fn mutex_lock_core(&mut self, mutex: MutexId, thread: ThreadId) {
        debug_assert!(matches!(
            self.threads[thread].st,
            ThreadState::Running | ThreadState::Ready
        ));

        // Push `mutex` to the list of the mutexes held by the thread
        let prev_mutex_held = self.threads[thread].last_mutex_held.replace(mutex);

        let cb = &mut self.mutexes[mutex];
        debug_assert!(cb.owner.is_none());
        cb.owner = Some(thread);
        cb.lock_count = 1;
        cb.prev_mutex_held = prev_mutex_held;
    }

    /// Pass the mutex to its next waiter, or mark it free if there's none.
    ///
    /// Doesn't touch the previous owner's held-mutex list or priority, and
    /// doesn't reschedule.
    fn mutex_unlock_unchecked(&mut self, mutex: MutexId) {
        let cb = &mut self.mutexes[mutex];
        cb.owner = None;
        cb.lock_count = 0;
        cb.prev_mutex_held = None;

        if let Some(next) = self.wait_queue_first(QueueRef::Mutex(mutex)) {
            self.wait_exit(next, Ok(WaitValue::None));
            self.mutex_lock_core(mutex, next);
            self.mutex_reevaluate_owner(mutex);
            log::trace!("{mutex:?} handed over to {next:?}");
        }
    }

    /// Remove `mutex` from the held-mutex list of `thread`.
    fn mutex_unlink_held(&mut self, thread: ThreadId, mutex: MutexId) {
        let prev = self.mutexes[mutex].prev_mutex_held.take();

        if self.threads[thread].last_mutex_held == Some(mutex) {
            self.threads[thread].last_mutex_held = prev;
            return;
        }

        let mut cursor = self.threads[thread].last_mutex_held;
        while let Some(held) = cursor {
            let held_cb = &mut self.mutexes[held];
            if held_cb.prev_mutex_held == Some(mutex) {
                held_cb.prev_mutex_held = prev;
                return;
            }
            cursor = held_cb.prev_mutex_held;
        }

        self.corrupted("mutex missing from its owner's held list");
    }

    /// Release every mutex held by a terminating thread.
    ///
    /// A robust mutex is passed to its next waiter. A non-robust one is freed
    /// and its waiters wake up with [`KernelError::OwnerLost`].
    ///
    /// This method doesn't restore the thread's effective priority, and
    /// doesn't reschedule.
    pub(crate) fn abandon_held_mutexes(&mut self, thread: ThreadId) {
        let mut cursor = self.threads[thread].last_mutex_held.take();
        while let Some(mutex) = cursor {
            cursor = self.mutexes[mutex].prev_mutex_held;
            log::debug!("{mutex:?} abandoned by {thread:?}");

            if self.mutexes[mutex].options.contains(MutexOptions::ROBUST) {
                self.mutex_unlock_unchecked(mutex);
            } else {
                let cb = &mut self.mutexes[mutex];
                cb.owner = None;
                cb.lock_count = 0;
                cb.prev_mutex_held = None;
                self.wait_queue_wake_all(QueueRef::Mutex(mutex), KernelError::OwnerLost);
            }
        }
    }

    /// Reevaluate the effective priority of `thread`. (This method doesn't
    /// update `ThreadCb::effective_priority`.)
    pub(crate) fn evaluate_effective_priority(&self, thread: ThreadId) -> Priority {
        let cb = &self.threads[thread];
        let mut effective = cb.base_priority;
        let mut cursor = cb.last_mutex_held;

        while let Some(mutex) = cursor {
            let mutex_cb = &self.mutexes[mutex];
            if mutex_cb.options.contains(MutexOptions::PRIO_INHERIT) {
                // Wait queues are sorted by effective priority
                if let Some(waiter) = mutex_cb.wait_queue.first {
                    effective = effective.max(self.threads[waiter].effective_priority);
                }
            }
            cursor = mutex_cb.prev_mutex_held;
        }

        effective
    }

    /// Recompute the effective priority of the owner of `mutex`, if any.
    pub(crate) fn mutex_reevaluate_owner(&mut self, mutex: MutexId) {
        if let Some(owner) = self.mutexes.get(mutex).and_then(|cb| cb.owner) {
            let effective = self.evaluate_effective_priority(owner);
            self.set_effective_priority(owner, effective);
        }
    }

    /// Update the effective priority of `thread`, keeping the ready queue and
    /// wait queues sorted. The change propagates to the owner of the mutex
    /// the thread is waiting for.
    pub(crate) fn set_effective_priority(&mut self, thread: ThreadId, priority: Priority) {
        let cb = &self.threads[thread];
        if cb.effective_priority == priority {
            return;
        }
        log::trace!(
            "{thread:?} effective priority {:?} -> {priority:?}",
            cb.effective_priority
        );

        let st = cb.st;
        match st {
            ThreadState::Ready => {
                self.ready_remove(thread);
                self.threads[thread].effective_priority = priority;
                self.make_ready(thread);
            }
            ThreadState::Blocked | ThreadState::Delayed => {
                let wait = cb.wait;
                self.threads[thread].effective_priority = priority;
                self.wait_queue_reposition(thread);
                if let Some(WaitReason::Mutex(mutex)) = wait {
                    self.mutex_reevaluate_owner(mutex);
                }
            }
            ThreadState::Running | ThreadState::Terminated => {
                self.threads[thread].effective_priority = priority;
            }
        }
    }
}
