//! Thread ready queue implementation (internal use only).
//!
//! One FIFO list per priority level plus a bitmap of the non-empty levels.
//! Threads are always appended to the back of their level, so threads of equal
//! priority run in the order they became ready.
use core::fmt;

use crate::{
    object::ThreadId,
    thread::{Priority, ThreadArena},
    utils::{
        intrusive_list::{InconsistentError, ListAccessor, ListHead},
        PrioBitmap,
    },
};

const NUM_LEVELS: usize = Priority::MAX.get() as usize + 1;

const _: () = assert!(NUM_LEVELS <= PrioBitmap::LEN);

pub(crate) struct ReadyQueue {
    levels: [ListHead<ThreadId>; NUM_LEVELS],
    bitmap: PrioBitmap,
}

impl fmt::Debug for ReadyQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadyQueue")
            .field("bitmap", &self.bitmap)
            .finish_non_exhaustive()
    }
}

impl ReadyQueue {
    pub(crate) const fn new() -> Self {
        Self {
            levels: [ListHead::new(); NUM_LEVELS],
            bitmap: PrioBitmap::new(),
        }
    }

    /// The priority of the highest-priority ready thread.
    #[inline]
    pub(crate) fn highest_priority(&self) -> Option<Priority> {
        self.bitmap
            .find_highest()
            .map(|level| Priority::from_level(level as u8))
    }

    /// Return `true` iff there is a ready thread whose priority is strictly
    /// higher than `priority`.
    #[inline]
    pub(crate) fn has_ready_thread_above(&self, priority: Priority) -> bool {
        self.highest_priority().map_or(false, |p| p > priority)
    }

    /// Return `true` iff there is a ready thread at exactly `priority`.
    #[inline]
    pub(crate) fn has_ready_thread_at(&self, priority: Priority) -> bool {
        self.bitmap.get(priority.level())
    }

    /// Append `thread` to the back of the level of its effective priority.
    pub(crate) fn push_back<C>(
        &mut self,
        threads: &mut ThreadArena<C>,
        thread: ThreadId,
    ) -> Result<(), InconsistentError> {
        let level = threads[thread].effective_priority.level();
        ListAccessor::new(&mut self.levels[level], threads).push_back(thread)?;
        self.bitmap.set(level);
        Ok(())
    }

    /// Remove `thread`, which must have been inserted with its current
    /// effective priority.
    pub(crate) fn remove<C>(
        &mut self,
        threads: &mut ThreadArena<C>,
        thread: ThreadId,
    ) -> Result<(), InconsistentError> {
        let level = threads[thread].effective_priority.level();
        let mut accessor = ListAccessor::new(&mut self.levels[level], threads);
        accessor.remove(thread)?;
        if accessor.is_empty() {
            self.bitmap.clear(level);
        }
        Ok(())
    }

    /// Remove and return the first thread of the highest non-empty level.
    pub(crate) fn pop_front<C>(
        &mut self,
        threads: &mut ThreadArena<C>,
    ) -> Result<Option<ThreadId>, InconsistentError> {
        let Some(level) = self.bitmap.find_highest() else {
            return Ok(None);
        };
        let mut accessor = ListAccessor::new(&mut self.levels[level], threads);
        let thread = accessor.pop_front()?.ok_or(InconsistentError)?;
        if accessor.is_empty() {
            self.bitmap.clear(level);
        }
        Ok(Some(thread))
    }
}
