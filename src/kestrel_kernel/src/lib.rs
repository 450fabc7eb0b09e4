#![doc = include_str!("./lib.md")]
#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all)]
#![allow(clippy::module_inception)]

extern crate alloc;

pub mod cfg;
mod class;
mod error;
mod event_flags;
mod memory_pool;
mod message_queue;
mod mutex;
mod object;
mod port;
mod post;
mod semaphore;
mod state;
mod thread;
mod thread_flags;
mod timeout;
mod timer;
mod utils;
mod wait;

pub use self::{
    cfg::KernelConfig,
    class::TeardownMode,
    error::{Fault, KernelError, ResultCode},
    event_flags::FlagsWait,
    memory_pool::Block,
    object::{
        EventFlagsId, Id, MemoryPoolId, MessageQueueId, MutexId, ObjectId, ObjectKind,
        ObjectKinds, ObjectRef, SafetyClass, SemaphoreId, ThreadId, TimerId,
    },
    port::{Port, Switch, ThreadEntry},
    post::{IsrContext, ISR_MESSAGE_MAX},
    state::{Kernel, KernelState},
    thread::{Priority, ThreadState},
    timeout::Timeout,
    timer::{TimerCallback, TimerKind},
    wait::{FromWake, Outcome, Pending, Received},
};
