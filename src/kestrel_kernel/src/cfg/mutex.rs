use crate::object::SafetyClass;

bitflags::bitflags! {
    /// Mutex behavior options.
    pub struct MutexOptions: u8 {
        /// The owner may acquire the mutex again; each acquisition must be
        /// matched by a release.
        const RECURSIVE = 1 << 0;
        /// The owner inherits the priority of its highest-priority waiter.
        const PRIO_INHERIT = 1 << 1;
        /// If the owner terminates, ownership passes to the next waiter
        /// instead of failing every waiter with `OwnerLost`.
        const ROBUST = 1 << 2;
    }
}

/// The attributes of a mutex, passed to
/// [`Kernel::mutex_create`](crate::Kernel::mutex_create).
#[derive(Debug, Clone, Copy)]
pub struct MutexAttr {
    pub(crate) name: Option<&'static str>,
    pub(crate) options: MutexOptions,
    pub(crate) safety_class: SafetyClass,
}

impl Default for MutexAttr {
    fn default() -> Self {
        Self::new()
    }
}

impl MutexAttr {
    /// Construct a `MutexAttr` for a non-recursive mutex with priority
    /// inheritance.
    pub const fn new() -> Self {
        Self {
            name: None,
            options: MutexOptions::PRIO_INHERIT,
            safety_class: SafetyClass::LOWEST,
        }
    }

    pub const fn name(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    pub const fn options(mut self, options: MutexOptions) -> Self {
        self.options = options;
        self
    }

    pub const fn safety_class(mut self, class: SafetyClass) -> Self {
        self.safety_class = class;
        self
    }
}
