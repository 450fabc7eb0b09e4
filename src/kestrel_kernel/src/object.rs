//! The object registry: handles, kind tags, and safety classes
use core::{fmt, hash::Hash, num::NonZeroU32};

use crate::{error::KernelError, port::Port, state::Kernel};

/// A raw object identifier.
///
/// The lower 16 bits hold the index of the object's slot in its arena, and the
/// upper 16 bits hold the generation of the slot at the time the object was
/// created. The generation is never zero, so an `Id` is never zero either.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(NonZeroU32);

impl Id {
    /// Construct an `Id`. Returns `None` if `generation` is zero.
    #[inline]
    pub const fn new(index: u16, generation: u16) -> Option<Self> {
        match NonZeroU32::new(((generation as u32) << 16) | index as u32) {
            Some(x) if generation != 0 => Some(Self(x)),
            _ => None,
        }
    }

    #[inline]
    pub const fn get(self) -> NonZeroU32 {
        self.0
    }

    /// Get the slot index.
    #[inline]
    pub const fn index(self) -> usize {
        (self.0.get() & 0xffff) as usize
    }

    #[inline]
    pub const fn generation(self) -> u16 {
        (self.0.get() >> 16) as u16
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.index(), self.generation())
    }
}

/// Implemented by the typed handles of every kernel object kind.
pub trait ObjectId: Copy + Eq + Hash + fmt::Debug + Into<ObjectRef> + 'static {
    /// The kind of the objects referenced by this handle type.
    const KIND: ObjectKind;

    fn from_raw(id: Id) -> Self;
    fn raw(self) -> Id;
}

macro_rules! define_object_id {
    (
        $(
            $( #[$meta:meta] )*
            pub struct $Name:ident => $Kind:ident;
        )*
    ) => {
        $(
            $( #[$meta] )*
            #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $Name(Id);

            impl $Name {
                /// Get the raw identifier.
                #[inline]
                pub const fn id(self) -> Id {
                    self.0
                }
            }

            impl ObjectId for $Name {
                const KIND: ObjectKind = ObjectKind::$Kind;

                #[inline]
                fn from_raw(id: Id) -> Self {
                    Self(id)
                }

                #[inline]
                fn raw(self) -> Id {
                    self.0
                }
            }

            impl fmt::Debug for $Name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, concat!(stringify!($Name), "({:?})"), self.0)
                }
            }

            impl From<$Name> for ObjectRef {
                #[inline]
                fn from(x: $Name) -> Self {
                    Self::$Kind(x)
                }
            }
        )*

        /// A kind-tagged reference to any kernel object.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ObjectRef {
            $( $Kind($Name), )*
        }

        impl ObjectRef {
            pub fn kind(self) -> ObjectKind {
                match self {
                    $( Self::$Kind(_) => ObjectKind::$Kind, )*
                }
            }

            pub fn id(self) -> Id {
                match self {
                    $( Self::$Kind(x) => x.0, )*
                }
            }
        }
    };
}

define_object_id! {
    /// A handle to a thread.
    pub struct ThreadId => Thread;
    /// A handle to a software timer.
    pub struct TimerId => Timer;
    /// A handle to an event flags object.
    pub struct EventFlagsId => EventFlags;
    /// A handle to a mutex.
    pub struct MutexId => Mutex;
    /// A handle to a counting semaphore.
    pub struct SemaphoreId => Semaphore;
    /// A handle to a fixed-block memory pool.
    pub struct MemoryPoolId => MemoryPool;
    /// A handle to a message queue.
    pub struct MessageQueueId => MessageQueue;
}

/// The kind tag of a kernel object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Thread,
    Timer,
    EventFlags,
    Mutex,
    Semaphore,
    MemoryPool,
    MessageQueue,
}

impl ObjectKind {
    /// The [`ObjectKinds`] set containing only `self`.
    pub const fn as_set(self) -> ObjectKinds {
        match self {
            Self::Thread => ObjectKinds::THREAD,
            Self::Timer => ObjectKinds::TIMER,
            Self::EventFlags => ObjectKinds::EVENT_FLAGS,
            Self::Mutex => ObjectKinds::MUTEX,
            Self::Semaphore => ObjectKinds::SEMAPHORE,
            Self::MemoryPool => ObjectKinds::MEMORY_POOL,
            Self::MessageQueue => ObjectKinds::MESSAGE_QUEUE,
        }
    }
}

bitflags::bitflags! {
    /// A set of object kinds, used to select the targets of
    /// [`Kernel::destroy_class`](crate::Kernel::destroy_class).
    pub struct ObjectKinds: u8 {
        const THREAD = 1 << 0;
        const TIMER = 1 << 1;
        const EVENT_FLAGS = 1 << 2;
        const MUTEX = 1 << 3;
        const SEMAPHORE = 1 << 4;
        const MEMORY_POOL = 1 << 5;
        const MESSAGE_QUEUE = 1 << 6;
    }
}

/// A criticality partition tag attached to every kernel object.
///
/// A thread may not delete or control an object of a higher safety class than
/// its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SafetyClass(u8);

impl SafetyClass {
    pub const LOWEST: Self = Self(0);
    pub const HIGHEST: Self = Self(15);

    /// Construct a `SafetyClass`. Returns `None` if `class > 15`.
    #[inline]
    pub const fn new(class: u8) -> Option<Self> {
        if class <= Self::HIGHEST.0 {
            Some(Self(class))
        } else {
            None
        }
    }

    #[inline]
    pub const fn get(self) -> u8 {
        self.0
    }
}

/// The fields shared by every kernel object.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ObjectHeader {
    pub(crate) name: Option<&'static str>,
    pub(crate) safety_class: SafetyClass,
}

impl<P: Port> Kernel<P> {
    fn object_header(&self, object: ObjectRef) -> Option<&ObjectHeader> {
        match object {
            ObjectRef::Thread(x) => self.threads.get(x).map(|cb| &cb.header),
            ObjectRef::Timer(x) => self.timers.get(x).map(|cb| &cb.header),
            ObjectRef::EventFlags(x) => self.event_flags.get(x).map(|cb| &cb.header),
            ObjectRef::Mutex(x) => self.mutexes.get(x).map(|cb| &cb.header),
            ObjectRef::Semaphore(x) => self.semaphores.get(x).map(|cb| &cb.header),
            ObjectRef::MemoryPool(x) => self.memory_pools.get(x).map(|cb| &cb.header),
            ObjectRef::MessageQueue(x) => self.message_queues.get(x).map(|cb| &cb.header),
        }
    }

    /// Return `true` if `object` refers to a live object. A terminated thread
    /// is live until it's joined, detached, or deleted.
    pub fn object_exists(&self, object: impl Into<ObjectRef>) -> bool {
        self.object_header(object.into()).is_some()
    }

    pub fn object_kind(&self, object: impl Into<ObjectRef>) -> Result<ObjectKind, KernelError> {
        let object = object.into();
        self.object_header(object)
            .map(|_| object.kind())
            .ok_or(KernelError::InvalidHandle)
    }

    pub fn object_name(
        &self,
        object: impl Into<ObjectRef>,
    ) -> Result<Option<&'static str>, KernelError> {
        self.object_header(object.into())
            .map(|header| header.name)
            .ok_or(KernelError::InvalidHandle)
    }

    pub fn object_safety_class(
        &self,
        object: impl Into<ObjectRef>,
    ) -> Result<SafetyClass, KernelError> {
        self.object_header(object.into())
            .map(|header| header.safety_class)
            .ok_or(KernelError::InvalidHandle)
    }

    /// Count the live objects of a kind, including the idle and timer-service
    /// threads.
    pub fn object_count(&self, kind: ObjectKind) -> usize {
        match kind {
            ObjectKind::Thread => self.threads.len(),
            ObjectKind::Timer => self.timers.len(),
            ObjectKind::EventFlags => self.event_flags.len(),
            ObjectKind::Mutex => self.mutexes.len(),
            ObjectKind::Semaphore => self.semaphores.len(),
            ObjectKind::MemoryPool => self.memory_pools.len(),
            ObjectKind::MessageQueue => self.message_queues.len(),
        }
    }
}
