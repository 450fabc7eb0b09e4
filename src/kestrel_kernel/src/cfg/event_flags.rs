use crate::object::SafetyClass;

/// The attributes of an event flags object, passed to
/// [`Kernel::event_flags_create`](crate::Kernel::event_flags_create).
#[derive(Debug, Clone, Copy, Default)]
pub struct EventFlagsAttr {
    pub(crate) name: Option<&'static str>,
    pub(crate) initial: u32,
    pub(crate) safety_class: SafetyClass,
}

impl EventFlagsAttr {
    pub const fn new() -> Self {
        Self {
            name: None,
            initial: 0,
            safety_class: SafetyClass::LOWEST,
        }
    }

    pub const fn name(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    /// Specify the initial bit pattern.
    pub const fn initial(mut self, flags: u32) -> Self {
        self.initial = flags;
        self
    }

    pub const fn safety_class(mut self, class: SafetyClass) -> Self {
        self.safety_class = class;
        self
    }
}
