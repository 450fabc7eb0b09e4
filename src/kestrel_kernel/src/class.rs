//! Safety classes and class-wide teardown
use crate::{
    error::KernelError,
    object::{ObjectKinds, SafetyClass, ThreadId},
    port::Port,
    state::{Kernel, KernelState},
    thread::ThreadState,
};

/// How [`Kernel::destroy_class`] treats the calling thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownMode {
    /// Skip the calling thread even if it's in the target class.
    Graceful,
    /// Terminate the calling thread too (last), if it's in the target class.
    Force,
}

impl<P: Port> Kernel<P> {
    /// Check that the caller may act on an object of safety class `target`.
    ///
    /// Timer callbacks and the code running before [`Kernel::start`] are
    /// unrestricted.
    pub(crate) fn check_class(&self, target: SafetyClass) -> Result<(), KernelError> {
        if self.in_timer_callback || self.state == KernelState::Ready {
            return Ok(());
        }
        let Some(running) = self.running else {
            return Ok(());
        };
        match self.threads.get(running) {
            Some(cb) if cb.header.safety_class < target => Err(KernelError::SafetyClass),
            _ => Ok(()),
        }
    }

    /// Get the safety class of the caller, `HIGHEST` if unrestricted.
    fn caller_class(&self) -> SafetyClass {
        if self.in_timer_callback || self.state == KernelState::Ready {
            return SafetyClass::HIGHEST;
        }
        self.running
            .and_then(|t| self.threads.get(t))
            .map_or(SafetyClass::HIGHEST, |cb| cb.header.safety_class)
    }

    /// Delete every object of the selected kinds whose safety class is
    /// `class` or lower. Returns the number of objects deleted.
    ///
    /// Threads go first, so that they don't observe the deletion of the
    /// objects they're waiting on. The idle and timer-service threads are
    /// never affected. Waiters of the deleted objects (those outside the
    /// target set) wake up with [`KernelError::ObjectDeleted`].
    pub fn destroy_class(
        &mut self,
        class: SafetyClass,
        kinds: ObjectKinds,
        mode: TeardownMode,
    ) -> Result<usize, KernelError> {
        self.expect_operational()?;
        if self.caller_class() < class {
            return Err(KernelError::SafetyClass);
        }
        log::debug!("destroying {kinds:?} of class <= {class:?} ({mode:?})");

        let mut count = 0;
        let caller = self.running.filter(|_| !self.in_timer_callback);
        let mut terminate_caller = false;

        if kinds.contains(ObjectKinds::THREAD) {
            let targets = self
                .threads
                .keys_where(|cb| cb.header.safety_class <= class);
            for thread in targets {
                if self.is_system_thread(thread) {
                    continue;
                }
                if Some(thread) == caller {
                    terminate_caller = mode == TeardownMode::Force;
                    continue;
                }
                self.destroy_thread(thread);
                count += 1;
            }
        }

        if kinds.contains(ObjectKinds::TIMER) {
            for timer in self.timers.keys_where(|cb| cb.header.safety_class <= class) {
                self.timer_destroy(timer);
                count += 1;
            }
        }
        if kinds.contains(ObjectKinds::MUTEX) {
            for mutex in self.mutexes.keys_where(|cb| cb.header.safety_class <= class) {
                self.mutex_destroy(mutex);
                count += 1;
            }
        }
        if kinds.contains(ObjectKinds::SEMAPHORE) {
            for semaphore in self.semaphores.keys_where(|cb| cb.header.safety_class <= class) {
                self.semaphore_destroy(semaphore);
                count += 1;
            }
        }
        if kinds.contains(ObjectKinds::EVENT_FLAGS) {
            for event_flags in self.event_flags.keys_where(|cb| cb.header.safety_class <= class) {
                self.event_flags_destroy(event_flags);
                count += 1;
            }
        }
        if kinds.contains(ObjectKinds::MEMORY_POOL) {
            for pool in self.memory_pools.keys_where(|cb| cb.header.safety_class <= class) {
                self.memory_pool_destroy(pool);
                count += 1;
            }
        }
        if kinds.contains(ObjectKinds::MESSAGE_QUEUE) {
            for queue in self.message_queues.keys_where(|cb| cb.header.safety_class <= class) {
                self.message_queue_destroy(queue);
                count += 1;
            }
        }

        if terminate_caller {
            if let Some(caller) = caller {
                self.destroy_thread(caller);
                count += 1;
            }
        }

        log::debug!("{count} object(s) destroyed");
        self.reschedule();
        Ok(count)
    }

    /// Terminate a thread (if it hasn't yet) and release its slot regardless
    /// of joinability.
    fn destroy_thread(&mut self, thread: ThreadId) {
        let Some(cb) = self.threads.get(thread) else {
            return;
        };
        if cb.st != ThreadState::Terminated {
            self.terminate_thread(thread, Err(KernelError::ObjectDeleted));
        }
        if self.threads.contains(thread) {
            self.free_thread(thread);
        }
    }
}
