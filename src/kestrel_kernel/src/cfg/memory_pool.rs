use crate::object::SafetyClass;

/// The attributes of a fixed-block memory pool, passed to
/// [`Kernel::memory_pool_create`](crate::Kernel::memory_pool_create).
#[derive(Debug, Clone, Copy)]
pub struct MemoryPoolAttr {
    pub(crate) name: Option<&'static str>,
    pub(crate) block_count: u32,
    pub(crate) block_size: u32,
    pub(crate) safety_class: SafetyClass,
}

impl MemoryPoolAttr {
    /// Construct a `MemoryPoolAttr` for `block_count` blocks of `block_size`
    /// bytes each. The block size is rounded up to a multiple of four bytes.
    pub const fn new(block_count: u32, block_size: u32) -> Self {
        Self {
            name: None,
            block_count,
            block_size,
            safety_class: SafetyClass::LOWEST,
        }
    }

    pub const fn name(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    pub const fn safety_class(mut self, class: SafetyClass) -> Self {
        self.safety_class = class;
        self
    }
}
