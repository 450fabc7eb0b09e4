//! Intrusive doubly linked list backed by a container implementing
//! `core::ops::IndexMut`.
//!
//! Elements are referenced by index (a typed handle), never by pointer, so a
//! list head is a plain value that can live in any control block.
use core::{fmt, ops};

/// Circular linked list header.
#[derive(Copy, Clone, PartialEq, Eq)]
pub(crate) struct ListHead<Index> {
    pub(crate) first: Option<Index>,
}

impl<Index> Default for ListHead<Index> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Index: fmt::Debug> fmt::Debug for ListHead<Index> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ListHead({:?})", &self.first)
    }
}

impl<Index> ListHead<Index> {
    pub(crate) const fn new() -> Self {
        Self { first: None }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.first.is_none()
    }
}

/// Links to neighbor items.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct Link<Index> {
    pub(crate) prev: Index,
    pub(crate) next: Index,
}

/// An element that can be linked into a list.
pub(crate) trait Linked<Index> {
    fn link(&mut self) -> &mut Option<Link<Index>>;
}

/// An error type indicating inconsistency in a linked list structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct InconsistentError;

/// Accessor to a linked list whose elements are stored in `Pool`.
pub(crate) struct ListAccessor<'a, Index, Pool: ?Sized> {
    head: &'a mut ListHead<Index>,
    pool: &'a mut Pool,
}

impl<'a, Index, Pool, Element> ListAccessor<'a, Index, Pool>
where
    Pool: ops::IndexMut<Index, Output = Element> + ?Sized,
    Element: Linked<Index>,
    Index: Copy + PartialEq,
{
    #[inline]
    pub(crate) fn new(head: &'a mut ListHead<Index>, pool: &'a mut Pool) -> Self {
        Self { head, pool }
    }

    #[inline]
    fn link_of<'b>(&'b mut self, item: Index) -> &'b mut Option<Link<Index>>
    where
        Element: 'b,
    {
        self.pool[item].link()
    }

    #[inline]
    pub(crate) fn pool(&self) -> &Pool {
        &*self.pool
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_empty()
    }

    #[inline]
    pub(crate) fn front(&self) -> Option<Index> {
        self.head.first
    }

    pub(crate) fn back(&mut self) -> Result<Option<Index>, InconsistentError> {
        match self.head.first {
            Some(first) => Ok(Some(self.link_of(first).ok_or(InconsistentError)?.prev)),
            None => Ok(None),
        }
    }

    /// Get the element following `item`, or `None` if `item` is the last one.
    pub(crate) fn next(&mut self, item: Index) -> Result<Option<Index>, InconsistentError> {
        let next = self.link_of(item).ok_or(InconsistentError)?.next;
        Ok(if Some(next) == self.head.first {
            None
        } else {
            Some(next)
        })
    }

    /// Insert `item` before the position `p` (if `at` is `Some(p)`) or to the
    /// the list's back (if `at` is `None`).
    pub(crate) fn insert(&mut self, item: Index, at: Option<Index>) -> Result<(), InconsistentError> {
        if self.link_of(item).is_some() {
            // Already linked
            return Err(InconsistentError);
        }

        let Some(first) = self.head.first else {
            debug_assert!(at.is_none());
            *self.link_of(item) = Some(Link {
                prev: item,
                next: item,
            });
            self.head.first = Some(item);
            return Ok(());
        };

        let next = at.unwrap_or(first);
        let prev = self.link_of(next).ok_or(InconsistentError)?.prev;
        self.link_of(prev).as_mut().ok_or(InconsistentError)?.next = item;
        self.link_of(next).as_mut().ok_or(InconsistentError)?.prev = item;
        *self.link_of(item) = Some(Link { prev, next });

        if at == Some(first) {
            self.head.first = Some(item);
        }

        Ok(())
    }

    #[inline]
    pub(crate) fn push_back(&mut self, item: Index) -> Result<(), InconsistentError> {
        self.insert(item, None)
    }

    #[inline]
    pub(crate) fn push_front(&mut self, item: Index) -> Result<(), InconsistentError> {
        let at = self.front();
        self.insert(item, at)
    }

    /// Remove `item` from the list.
    pub(crate) fn remove(&mut self, item: Index) -> Result<Index, InconsistentError> {
        let link = self.link_of(item).ok_or(InconsistentError)?;

        if self.head.first == Some(item) {
            if link.next == item {
                // The list just became empty
                self.head.first = None;
                *self.link_of(item) = None;
                return Ok(item);
            }

            self.head.first = Some(link.next);
        }

        self.link_of(link.prev).as_mut().ok_or(InconsistentError)?.next = link.next;
        self.link_of(link.next).as_mut().ok_or(InconsistentError)?.prev = link.prev;
        *self.link_of(item) = None;

        Ok(item)
    }

    #[inline]
    pub(crate) fn pop_front(&mut self) -> Result<Option<Index>, InconsistentError> {
        match self.front() {
            Some(item) => self.remove(item).map(Some),
            None => Ok(None),
        }
    }
}
