use crate::object::SafetyClass;

/// The attributes of a message queue, passed to
/// [`Kernel::message_queue_create`](crate::Kernel::message_queue_create).
#[derive(Debug, Clone, Copy)]
pub struct MessageQueueAttr {
    pub(crate) name: Option<&'static str>,
    pub(crate) capacity: u32,
    pub(crate) msg_size: u32,
    pub(crate) safety_class: SafetyClass,
}

impl MessageQueueAttr {
    /// Construct a `MessageQueueAttr` for a queue holding up to `capacity`
    /// messages of exactly `msg_size` bytes.
    pub const fn new(capacity: u32, msg_size: u32) -> Self {
        Self {
            name: None,
            capacity,
            msg_size,
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
