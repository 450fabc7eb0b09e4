//! Error and fault taxonomy
use core::fmt;

use crate::object::ThreadId;

/// The macro to define [`KernelError`] and its numeric result codes.
macro_rules! define_kernel_error {
    (
        $( #[$meta:meta] )*
        pub enum KernelError {
            $(
                $( #[$vmeta:meta] )*
                $vname:ident = $vd:expr
            ),* $(,)*
        }
    ) => {
        $( #[$meta] )*
        pub enum KernelError {
            $(
                $( #[$vmeta] )*
                $vname = $vd
            ),*
        }

        impl KernelError {
            /// Get the short name of the error.
            ///
            /// # Examples
            ///
            /// ```
            /// use kestrel_kernel::KernelError;
            /// assert_eq!(KernelError::OwnerLost.as_str(), "OwnerLost");
            /// ```
            pub fn as_str(self) -> &'static str {
                match self {
                    $(
                        Self::$vname => stringify!($vname),
                    )*
                }
            }

            /// Convert a numeric result code back to a `KernelError`.
            pub fn from_code(code: ResultCode) -> Option<Self> {
                match code {
                    $(
                        x if x == $vd => Some(Self::$vname),
                    )*
                    _ => None,
                }
            }
        }
    };
}

/// The numeric representation of a service result. `0` means success and
/// every [`KernelError`] maps to a distinct negative value.
pub type ResultCode = i8;

define_kernel_error! {
    /// Error type of every kernel service.
    ///
    /// Timeouts and resource exhaustion are ordinary results: the kernel keeps
    /// running after returning any of these.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
    #[repr(i8)]
    pub enum KernelError {
        /// The operation did not complete within the specified timeout.
        #[error("the operation timed out")]
        Timeout = -2,
        /// The object is unavailable: a pool or queue is full or empty, a
        /// semaphore is at its maximum, or a one-shot request was rejected.
        ///
        /// Also returned when the target is not in a state the operation
        /// applies to, e.g., changing the priority of a terminated thread,
        /// resuming a thread that isn't suspended, or stopping a timer that
        /// isn't running.
        #[error("the resource is exhausted")]
        ResourceExhausted = -3,
        /// A parameter is invalid in a way not covered by other error codes.
        #[error("invalid parameter")]
        InvalidParameter = -4,
        /// The current context disallows the operation (interrupt or timer
        /// callback context, kernel locked, kernel not running, idle thread).
        #[error("the current context disallows the operation")]
        BadContext = -6,
        /// The caller's safety class is lower than the target's.
        #[error("safety class violation")]
        SafetyClass = -7,
        /// The handle does not refer to a live object.
        #[error("invalid object handle")]
        InvalidHandle = -10,
        /// The caller does not own the mutex, would deadlock on itself, or has
        /// exceeded the recursion limit.
        #[error("ownership violation")]
        OwnershipViolation = -11,
        /// The waited object was deleted.
        #[error("the object was deleted while waiting")]
        ObjectDeleted = -12,
        /// The owner of a mutex terminated while holding it.
        #[error("the mutex owner terminated")]
        OwnerLost = -13,
        /// The wait was aborted by another thread.
        #[error("the wait was aborted")]
        Aborted = -14,
        /// The thread's stack overflowed.
        #[error("stack overflow")]
        StackOverflow = -15,
        /// The thread's watchdog expired.
        #[error("watchdog expired")]
        WatchdogExpired = -16,
    }
}

impl KernelError {
    /// Get the numeric result code.
    #[inline]
    pub fn as_code(self) -> ResultCode {
        self as ResultCode
    }
}

impl fmt::Debug for KernelError {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conditions reported to [`Port::fault`](crate::Port::fault).
///
/// `InvariantViolation` is fatal: the kernel enters
/// [`KernelState::Error`](crate::KernelState::Error) and refuses every further
/// service. The others are reported, and the kernel recovers as documented on
/// each variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// A thread's stack watermark was found clobbered when switching away from
    /// it. The thread is terminated.
    StackOverflow(ThreadId),
    /// Interrupt handlers posted more requests than the staging queue holds.
    /// The excess requests were dropped.
    IsrQueueOverflow { dropped: usize },
    /// More timers expired than the timer-service queue holds. The expiry was
    /// dropped.
    TimerQueueOverflow(crate::object::TimerId),
    /// A kernel data structure was found inconsistent.
    InvariantViolation(&'static str),
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StackOverflow(thread) => write!(f, "stack overflow in {thread:?}"),
            Self::IsrQueueOverflow { dropped } => {
                write!(f, "ISR queue overflow ({dropped} requests dropped)")
            }
            Self::TimerQueueOverflow(timer) => write!(f, "timer queue overflow at {timer:?}"),
            Self::InvariantViolation(what) => write!(f, "kernel invariant violated: {what}"),
        }
    }
}
