//! Event flags
use core::fmt;

use crate::{
    cfg::EventFlagsAttr,
    error::KernelError,
    object::{EventFlagsId, ObjectHeader},
    port::Port,
    state::Kernel,
    timeout::Timeout,
    wait::{Outcome, QueueRef, WaitQueue, WaitReason, WaitValue},
};

/// The bits usable as flags. The most significant bit is reserved.
pub(crate) const FLAGS_MASK: u32 = 0x7fff_ffff;

bitflags::bitflags! {
    /// Options for [`Kernel::event_flags_wait`] and
    /// [`Kernel::thread_flags_wait`]. The empty set waits for any of the
    /// requested flags and leaves them set.
    pub struct FlagsWait: u8 {
        /// Wait for all of the requested flags.
        const ALL = 1 << 0;
        /// Clear the requested flags when the wait is satisfied.
        const CLEAR = 1 << 1;
    }
}

/// Check a flags pattern against a wait condition. Returns the pattern to
/// deliver to the waiter, clearing the requested bits in `current` if asked
/// to.
pub(crate) fn poll_flags(current: &mut u32, wanted: u32, options: FlagsWait) -> Option<u32> {
    let satisfied = if options.contains(FlagsWait::ALL) {
        *current & wanted == wanted
    } else {
        *current & wanted != 0
    };

    if !satisfied {
        return None;
    }

    let observed = *current;
    if options.contains(FlagsWait::CLEAR) {
        *current &= !wanted;
    }
    Some(observed)
}

#[inline]
pub(crate) fn check_flags(flags: u32) -> Result<u32, KernelError> {
    if flags == 0 || flags & !FLAGS_MASK != 0 {
        Err(KernelError::InvalidParameter)
    } else {
        Ok(flags)
    }
}

/// *Event flags control block* - the state data of an event flags object.
pub(crate) struct EventFlagsCb {
    pub(crate) header: ObjectHeader,
    pub(crate) value: u32,
    pub(crate) wait_queue: WaitQueue,
}

impl fmt::Debug for EventFlagsCb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventFlagsCb")
            .field("header", &self.header)
            .field("value", &format_args!("{:#010x}", self.value))
            .field("wait_queue", &self.wait_queue)
            .finish()
    }
}

impl<P: Port> Kernel<P> {
    pub fn event_flags_create(
        &mut self,
        attr: EventFlagsAttr,
    ) -> Result<EventFlagsId, KernelError> {
        self.expect_operational()?;
        if attr.initial & !FLAGS_MASK != 0 {
            return Err(KernelError::InvalidParameter);
        }
        let event_flags = self
            .event_flags
            .insert(EventFlagsCb {
                header: ObjectHeader {
                    name: attr.name,
                    safety_class: attr.safety_class,
                },
                value: attr.initial,
                wait_queue: WaitQueue::new(),
            })
            .ok_or(KernelError::ResourceExhausted)?;
        log::debug!("created {event_flags:?} ({:?})", attr.name);
        Ok(event_flags)
    }

    /// Set flags and wake up every waiter whose condition is now satisfied, in
    /// wait-queue order. Returns the flags right after setting, before any
    /// waiter clears them.
    pub fn event_flags_set(
        &mut self,
        event_flags: EventFlagsId,
        flags: u32,
    ) -> Result<u32, KernelError> {
        self.expect_operational()?;
        let value = self.event_flags_set_core(event_flags, flags)?;
        self.reschedule();
        Ok(value)
    }

    pub(crate) fn event_flags_set_core(
        &mut self,
        event_flags: EventFlagsId,
        flags: u32,
    ) -> Result<u32, KernelError> {
        let flags = check_flags(flags)?;
        let cb = self
            .event_flags
            .get_mut(event_flags)
            .ok_or(KernelError::InvalidHandle)?;
        cb.value |= flags;
        let value = cb.value;

        for waiter in self.wait_queue_snapshot(QueueRef::EventFlags(event_flags)) {
            let Some(WaitReason::EventFlags {
                flags: wanted,
                options,
                ..
            }) = self.threads[waiter].wait
            else {
                continue;
            };
            let current = &mut self.event_flags[event_flags].value;
            if let Some(observed) = poll_flags(current, wanted, options) {
                self.wait_exit(waiter, Ok(WaitValue::Flags(observed)));
            }
        }

        Ok(value)
    }

    /// Clear flags. Returns the flags before clearing.
    pub fn event_flags_clear(
        &mut self,
        event_flags: EventFlagsId,
        flags: u32,
    ) -> Result<u32, KernelError> {
        self.expect_operational()?;
        let flags = check_flags(flags)?;
        let cb = self
            .event_flags
            .get_mut(event_flags)
            .ok_or(KernelError::InvalidHandle)?;
        let previous = cb.value;
        cb.value &= !flags;
        Ok(previous)
    }

    pub fn event_flags_get(&self, event_flags: EventFlagsId) -> Result<u32, KernelError> {
        Ok(self
            .event_flags
            .get(event_flags)
            .ok_or(KernelError::InvalidHandle)?
            .value)
    }

    /// Wait for flags. Delivers the flags pattern observed when the condition
    /// was satisfied, before the requested flags are cleared.
    pub fn event_flags_wait(
        &mut self,
        event_flags: EventFlagsId,
        flags: u32,
        options: FlagsWait,
        timeout: Timeout,
    ) -> Result<Outcome<u32>, KernelError> {
        self.expect_operational()?;
        let flags = check_flags(flags)?;
        let cb = self
            .event_flags
            .get_mut(event_flags)
            .ok_or(KernelError::InvalidHandle)?;

        if let Some(observed) = poll_flags(&mut cb.value, flags, options) {
            return Ok(Outcome::Done(observed));
        }
        if timeout.is_no_wait() {
            return Err(KernelError::ResourceExhausted);
        }

        let running = self.expect_waitable_context()?;
        let reason = WaitReason::EventFlags {
            object: event_flags,
            flags,
            options,
        };
        Ok(Outcome::Blocked(self.wait_enter(running, reason, timeout)))
    }

    /// Delete an event flags object. Waiters wake up with
    /// [`KernelError::ObjectDeleted`].
    pub fn event_flags_delete(&mut self, event_flags: EventFlagsId) -> Result<(), KernelError> {
        self.expect_operational()?;
        let cb = self
            .event_flags
            .get(event_flags)
            .ok_or(KernelError::InvalidHandle)?;
        self.check_class(cb.header.safety_class)?;
        self.event_flags_destroy(event_flags);
        self.reschedule();
        Ok(())
    }

    pub(crate) fn event_flags_destroy(&mut self, event_flags: EventFlagsId) {
        self.wait_queue_wake_all(QueueRef::EventFlags(event_flags), KernelError::ObjectDeleted);
        self.event_flags.remove(event_flags);
        log::debug!("deleted {event_flags:?}");
    }
}
