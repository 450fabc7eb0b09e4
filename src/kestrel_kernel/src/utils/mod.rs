//! Utility
//!
//! **This module is exempt from the API stability guarantee**, but it's not
//! exposed anyway.
pub(crate) mod arena;
pub(crate) mod binary_heap;
pub(crate) mod intrusive_list;
pub(crate) mod prio_bitmap;

pub(crate) use self::{arena::Arena, prio_bitmap::PrioBitmap};
