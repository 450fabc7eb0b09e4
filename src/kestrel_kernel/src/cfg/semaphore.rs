use crate::object::SafetyClass;

/// The attributes of a counting semaphore, passed to
/// [`Kernel::semaphore_create`](crate::Kernel::semaphore_create).
#[derive(Debug, Clone, Copy)]
pub struct SemaphoreAttr {
    pub(crate) name: Option<&'static str>,
    pub(crate) initial: u32,
    pub(crate) max: u32,
    pub(crate) safety_class: SafetyClass,
}

impl SemaphoreAttr {
    /// Construct a `SemaphoreAttr`. `initial` must not exceed `max`, and `max`
    /// must be non-zero.
    pub const fn new(initial: u32, max: u32) -> Self {
        Self {
            name: None,
            initial,
            max,
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
