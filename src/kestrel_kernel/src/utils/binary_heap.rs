//! Binary min-heap over a `Vec` with a contextful comparator and position
//! tracking
//!
//! Every time an element lands at a new index, [`BinaryHeapCtx::on_move`] is
//! called so that the owner of the element can remember where it is. This
//! makes removal of an arbitrary element (e.g., a cancelled timeout) O(log n).
use alloc::vec::Vec;

/// Context type for [`BinaryHeap`]'s operations.
pub(crate) trait BinaryHeapCtx<Element> {
    /// Return `true` iff `x < y`.
    fn lt(&mut self, x: &Element, y: &Element) -> bool;

    /// Called when the element `e` is moved to the new position `new_index`.
    fn on_move(&mut self, e: &Element, new_index: usize) {
        let _ = (e, new_index);
    }
}

impl<T: Ord> BinaryHeapCtx<T> for () {
    fn lt(&mut self, x: &T, y: &T) -> bool {
        *x < *y
    }
}

/// Min-heap operations on a `Vec`.
pub(crate) trait BinaryHeap {
    type Element;

    /// Remove the least item from the heap and return it.
    fn heap_pop(&mut self, ctx: impl BinaryHeapCtx<Self::Element>) -> Option<Self::Element>;

    /// Remove the item at the specified position and return it.
    fn heap_remove(
        &mut self,
        i: usize,
        ctx: impl BinaryHeapCtx<Self::Element>,
    ) -> Option<Self::Element>;

    /// Push an item onto the heap and return its position.
    fn heap_push(&mut self, item: Self::Element, ctx: impl BinaryHeapCtx<Self::Element>) -> usize;
}

impl<T> BinaryHeap for Vec<T> {
    type Element = T;

    fn heap_pop(&mut self, ctx: impl BinaryHeapCtx<T>) -> Option<T> {
        self.heap_remove(0, ctx)
    }

    fn heap_remove(&mut self, i: usize, mut ctx: impl BinaryHeapCtx<T>) -> Option<T> {
        if i >= self.len() {
            return None;
        }

        // Move the last item into the hole at `i`
        let item = self.swap_remove(i);
        if i < self.len() {
            ctx.on_move(&self[i], i);
            if i > 0 && ctx.lt(&self[i], &self[(i - 1) / 2]) {
                sift_up(self, i, &mut ctx);
            } else {
                sift_down(self, i, &mut ctx);
            }
        }
        Some(item)
    }

    fn heap_push(&mut self, item: T, mut ctx: impl BinaryHeapCtx<T>) -> usize {
        self.push(item);
        let i = self.len() - 1;
        ctx.on_move(&self[i], i);
        sift_up(self, i, &mut ctx)
    }
}

/// Move the element at `pos` up the heap while it's less than its parent.
/// Returns its final position.
fn sift_up<T>(this: &mut [T], mut pos: usize, ctx: &mut impl BinaryHeapCtx<T>) -> usize {
    while pos > 0 {
        let parent = (pos - 1) / 2;
        if !ctx.lt(&this[pos], &this[parent]) {
            break;
        }
        this.swap(pos, parent);
        ctx.on_move(&this[pos], pos);
        ctx.on_move(&this[parent], parent);
        pos = parent;
    }
    pos
}

/// Move the element at `pos` down the heap while one of its children is less
/// than it.
fn sift_down<T>(this: &mut [T], mut pos: usize, ctx: &mut impl BinaryHeapCtx<T>) {
    let end = this.len();
    loop {
        let mut child = 2 * pos + 1;
        if child >= end {
            break;
        }

        // Compare with the lesser of the two children
        let right = child + 1;
        if right < end && ctx.lt(&this[right], &this[child]) {
            child = right;
        }

        if !ctx.lt(&this[child], &this[pos]) {
            break;
        }

        this.swap(pos, child);
        ctx.on_move(&this[pos], pos);
        ctx.on_move(&this[child], child);
        pos = child;
    }
}
