//! Message queues
//!
//! Message bodies are stored in a [`BlockPool`] with one block per slot. The
//! queue itself is a ring of block indices ordered by descending message
//! priority, FIFO within a priority.
//!
//! A queue has one wait queue. Receivers wait on it only while the queue is
//! empty, and senders only while it's full, so its waiters are never mixed.
use alloc::collections::VecDeque;
use core::fmt;

use crate::{
    cfg::MessageQueueAttr,
    error::KernelError,
    memory_pool::BlockPool,
    object::{MessageQueueId, ObjectHeader, ThreadId},
    port::Port,
    state::Kernel,
    timeout::Timeout,
    wait::{Outcome, QueueRef, Received, WaitQueue, WaitReason, WaitValue},
};

#[derive(Debug, Clone, Copy)]
struct Entry {
    index: u32,
    priority: u8,
}

/// *Message queue control block* - the state data of a message queue.
pub(crate) struct MessageQueueCb {
    pub(crate) header: ObjectHeader,
    pub(crate) wait_queue: WaitQueue,
    pool: BlockPool,
    msg_size: usize,
    queue: VecDeque<Entry>,
}

impl fmt::Debug for MessageQueueCb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageQueueCb")
            .field("header", &self.header)
            .field("wait_queue", &self.wait_queue)
            .field("msg_size", &self.msg_size)
            .field("count", &self.queue.len())
            .field("capacity", &self.pool.capacity())
            .finish()
    }
}

impl MessageQueueCb {
    /// Store a message in a free slot. Fails if the queue is full.
    fn enqueue(&mut self, msg: &[u8], priority: u8) -> Result<(), KernelError> {
        let index = self.pool.alloc().ok_or(KernelError::ResourceExhausted)?;
        self.pool.block_mut(index)[..msg.len()].copy_from_slice(msg);

        // After the last message of the same or higher priority
        let at = self
            .queue
            .iter()
            .position(|e| e.priority < priority)
            .unwrap_or(self.queue.len());
        self.queue.insert(at, Entry { index, priority });
        Ok(())
    }

    /// Remove the first message, copying it to `buf`.
    fn dequeue(&mut self, buf: &mut [u8]) -> Option<u8> {
        let entry = self.queue.pop_front()?;
        buf[..self.msg_size].copy_from_slice(&self.pool.block(entry.index)[..self.msg_size]);
        // The index came from `alloc`, so this can't fail
        let _ = self.pool.free(entry.index);
        Some(entry.priority)
    }
}

impl<P: Port> Kernel<P> {
    pub fn message_queue_create(
        &mut self,
        attr: MessageQueueAttr,
    ) -> Result<MessageQueueId, KernelError> {
        self.expect_operational()?;
        let pool =
            BlockPool::new(attr.capacity, attr.msg_size).ok_or(KernelError::InvalidParameter)?;
        let queue = self
            .message_queues
            .insert(MessageQueueCb {
                header: ObjectHeader {
                    name: attr.name,
                    safety_class: attr.safety_class,
                },
                wait_queue: WaitQueue::new(),
                pool,
                msg_size: attr.msg_size as usize,
                queue: VecDeque::with_capacity(attr.capacity as usize),
            })
            .ok_or(KernelError::ResourceExhausted)?;
        log::debug!(
            "created {queue:?} ({:?}, {} x {} bytes)",
            attr.name,
            attr.capacity,
            attr.msg_size
        );
        Ok(queue)
    }

    fn message_queue_cb(&self, queue: MessageQueueId) -> Result<&MessageQueueCb, KernelError> {
        self.message_queues
            .get(queue)
            .ok_or(KernelError::InvalidHandle)
    }

    /// Send a message. `msg` must be exactly the queue's message size.
    ///
    /// If a receiver is waiting, the message is handed over to it directly.
    /// Otherwise it's stored in priority order, blocking the caller while the
    /// queue is full.
    pub fn message_queue_put(
        &mut self,
        queue: MessageQueueId,
        msg: &[u8],
        priority: u8,
        timeout: Timeout,
    ) -> Result<Outcome<()>, KernelError> {
        self.expect_operational()?;
        match self.message_queue_put_core(queue, msg, priority) {
            Ok(()) => {
                self.reschedule();
                return Ok(Outcome::Done(()));
            }
            Err(KernelError::ResourceExhausted) if !timeout.is_no_wait() => {}
            Err(e) => return Err(e),
        }

        // The receiver that makes room is responsible for storing our message
        let running = self.expect_waitable_context()?;
        let slot = &mut self.threads[running].msg;
        slot.buf.clear();
        slot.buf.extend_from_slice(msg);
        slot.priority = priority;
        Ok(Outcome::Blocked(self.wait_enter(
            running,
            WaitReason::MessagePut(queue),
            timeout,
        )))
    }

    pub(crate) fn message_queue_put_core(
        &mut self,
        queue: MessageQueueId,
        msg: &[u8],
        priority: u8,
    ) -> Result<(), KernelError> {
        let cb = self
            .message_queues
            .get_mut(queue)
            .ok_or(KernelError::InvalidHandle)?;
        if msg.len() != cb.msg_size {
            return Err(KernelError::InvalidParameter);
        }

        let receiver = cb
            .wait_queue
            .first
            .filter(|&t| matches!(self.threads[t].wait, Some(WaitReason::MessageGet(_))));

        match receiver {
            Some(receiver) => {
                let slot = &mut self.threads[receiver].msg;
                slot.buf.clear();
                slot.buf.extend_from_slice(msg);
                slot.priority = priority;
                log::trace!("message handed over to {receiver:?}");
                self.wait_exit(receiver, Ok(WaitValue::Message(priority)));
                Ok(())
            }
            None => cb.enqueue(msg, priority),
        }
    }

    /// Receive the highest-priority message into `buf`, which must be at
    /// least as large as the queue's message size. Returns the message
    /// priority.
    pub fn message_queue_get(
        &mut self,
        queue: MessageQueueId,
        buf: &mut [u8],
        timeout: Timeout,
    ) -> Result<Outcome<u8, Received>, KernelError> {
        self.expect_operational()?;
        let cb = self
            .message_queues
            .get_mut(queue)
            .ok_or(KernelError::InvalidHandle)?;
        if buf.len() < cb.msg_size {
            return Err(KernelError::InvalidParameter);
        }

        if let Some(priority) = cb.dequeue(buf) {
            self.message_queue_admit_sender(queue);
            self.reschedule();
            return Ok(Outcome::Done(priority));
        }
        if timeout.is_no_wait() {
            return Err(KernelError::ResourceExhausted);
        }

        // The sender is responsible for delivering a message
        let running = self.expect_waitable_context()?;
        Ok(Outcome::Blocked(self.wait_enter(
            running,
            WaitReason::MessageGet(queue),
            timeout,
        )))
    }

    /// Store the message of the first blocked sender, if any, and wake it up.
    /// Returns `false` if there's no sender to admit or no room.
    fn message_queue_admit_sender(&mut self, queue: MessageQueueId) -> bool {
        let Some(sender) = self.message_queue_blocked_sender(queue) else {
            return false;
        };
        let slot = &self.threads[sender].msg;
        let cb = &mut self.message_queues[queue];
        if cb.enqueue(&slot.buf, slot.priority).is_err() {
            return false;
        }
        self.wait_exit(sender, Ok(WaitValue::None));
        true
    }

    fn message_queue_blocked_sender(&self, queue: MessageQueueId) -> Option<ThreadId> {
        self.message_queues
            .get(queue)?
            .wait_queue
            .first
            .filter(|&t| matches!(self.threads[t].wait, Some(WaitReason::MessagePut(_))))
    }

    /// Get the number of queued messages.
    pub fn message_queue_count(&self, queue: MessageQueueId) -> Result<u32, KernelError> {
        Ok(self.message_queue_cb(queue)?.queue.len() as u32)
    }

    /// Get the number of free slots.
    pub fn message_queue_space(&self, queue: MessageQueueId) -> Result<u32, KernelError> {
        let cb = self.message_queue_cb(queue)?;
        Ok(cb.pool.capacity() - cb.queue.len() as u32)
    }

    pub fn message_queue_capacity(&self, queue: MessageQueueId) -> Result<u32, KernelError> {
        Ok(self.message_queue_cb(queue)?.pool.capacity())
    }

    pub fn message_queue_msg_size(&self, queue: MessageQueueId) -> Result<u32, KernelError> {
        Ok(self.message_queue_cb(queue)?.msg_size as u32)
    }

    /// Discard every queued message. Blocked senders then deposit their
    /// messages in wait-queue order.
    pub fn message_queue_reset(&mut self, queue: MessageQueueId) -> Result<(), KernelError> {
        self.expect_operational()?;
        let cb = self.message_queue_cb(queue)?;
        self.check_class(cb.header.safety_class)?;

        let cb = &mut self.message_queues[queue];
        cb.queue.clear();
        cb.pool.reset();
        log::debug!("{queue:?} reset");

        while self.message_queue_admit_sender(queue) {}
        self.reschedule();
        Ok(())
    }

    /// Delete a message queue. Waiters wake up with
    /// [`KernelError::ObjectDeleted`].
    pub fn message_queue_delete(&mut self, queue: MessageQueueId) -> Result<(), KernelError> {
        self.expect_operational()?;
        let cb = self.message_queue_cb(queue)?;
        self.check_class(cb.header.safety_class)?;
        self.message_queue_destroy(queue);
        self.reschedule();
        Ok(())
    }

    pub(crate) fn message_queue_destroy(&mut self, queue: MessageQueueId) {
        self.wait_queue_wake_all(QueueRef::MessageQueue(queue), KernelError::ObjectDeleted);
        self.message_queues.remove(queue);
        log::debug!("deleted {queue:?}");
    }
}
