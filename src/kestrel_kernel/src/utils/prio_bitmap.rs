//! Provides `PrioBitmap`, a bit array tracking the non-empty ready buckets.
use core::fmt;

/// A 64-entry bit array supporting constant-time "highest set bit" lookup.
///
/// All methods panic when the given bit position is out of range.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PrioBitmap {
    bits: u64,
}

impl PrioBitmap {
    pub(crate) const LEN: usize = u64::BITS as usize;

    pub(crate) const fn new() -> Self {
        Self { bits: 0 }
    }

    /// Get the bit at the specified position.
    #[inline]
    pub(crate) fn get(&self, i: usize) -> bool {
        assert!(i < Self::LEN);
        self.bits & (1 << i) != 0
    }

    /// Clear the bit at the specified position.
    #[inline]
    pub(crate) fn clear(&mut self, i: usize) {
        assert!(i < Self::LEN);
        self.bits &= !(1 << i);
    }

    /// Set the bit at the specified position.
    #[inline]
    pub(crate) fn set(&mut self, i: usize) {
        assert!(i < Self::LEN);
        self.bits |= 1 << i;
    }

    /// Get the position of the highest set bit.
    #[inline]
    pub(crate) fn find_highest(&self) -> Option<usize> {
        if self.bits == 0 {
            None
        } else {
            Some(Self::LEN - 1 - self.bits.leading_zeros() as usize)
        }
    }
}

impl fmt::Debug for PrioBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries((0..Self::LEN).filter(|&i| self.get(i)))
            .finish()
    }
}
