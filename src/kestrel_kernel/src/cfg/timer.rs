use core::fmt;

use crate::{
    object::SafetyClass,
    port::Port,
    timer::{TimerCallback, TimerKind},
};

/// The attributes of a software timer, passed to
/// [`Kernel::timer_create`](crate::Kernel::timer_create).
pub struct TimerAttr<P: Port> {
    pub(crate) callback: TimerCallback<P>,
    pub(crate) arg: usize,
    pub(crate) kind: TimerKind,
    pub(crate) name: Option<&'static str>,
    pub(crate) safety_class: SafetyClass,
}

impl<P: Port> Clone for TimerAttr<P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P: Port> Copy for TimerAttr<P> {}

impl<P: Port> fmt::Debug for TimerAttr<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerAttr")
            .field("callback", &(self.callback as *const ()))
            .field("arg", &self.arg)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("safety_class", &self.safety_class)
            .finish()
    }
}

impl<P: Port> TimerAttr<P> {
    pub fn new(callback: TimerCallback<P>, kind: TimerKind) -> Self {
        Self {
            callback,
            arg: 0,
            kind,
            name: None,
            safety_class: SafetyClass::LOWEST,
        }
    }

    /// Specify the parameter passed to the callback.
    pub fn arg(mut self, arg: usize) -> Self {
        self.arg = arg;
        self
    }

    pub fn name(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    pub fn safety_class(mut self, class: SafetyClass) -> Self {
        self.safety_class = class;
        self
    }
}
