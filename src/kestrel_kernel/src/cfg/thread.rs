use crate::{object::SafetyClass, thread::Priority};

/// The attributes of a thread, passed to
/// [`Kernel::thread_create`](crate::Kernel::thread_create).
///
/// # Examples
///
/// ```
/// use kestrel_kernel::{cfg::ThreadAttr, Priority};
///
/// fn worker(_: usize) {}
///
/// let attr = ThreadAttr::new(worker)
///     .arg(42)
///     .priority(Priority::ABOVE_NORMAL)
///     .name("worker")
///     .joinable(true);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ThreadAttr {
    pub(crate) entry: fn(usize),
    pub(crate) arg: usize,
    pub(crate) priority: Priority,
    pub(crate) name: Option<&'static str>,
    pub(crate) stack_size: Option<usize>,
    pub(crate) joinable: bool,
    pub(crate) safety_class: SafetyClass,
}

impl ThreadAttr {
    /// Construct a `ThreadAttr` for a detached thread with
    /// [`Priority::NORMAL`].
    pub const fn new(entry: fn(usize)) -> Self {
        Self {
            entry,
            arg: 0,
            priority: Priority::NORMAL,
            name: None,
            stack_size: None,
            joinable: false,
            safety_class: SafetyClass::LOWEST,
        }
    }

    /// Specify the parameter to the entry point.
    pub const fn arg(mut self, arg: usize) -> Self {
        self.arg = arg;
        self
    }

    /// Specify the base priority.
    pub const fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub const fn name(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    pub const fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    /// A joinable thread stays `Terminated` after it exits until another
    /// thread joins or detaches it.
    pub const fn joinable(mut self, joinable: bool) -> Self {
        self.joinable = joinable;
        self
    }

    pub const fn safety_class(mut self, class: SafetyClass) -> Self {
        self.safety_class = class;
        self
    }
}
