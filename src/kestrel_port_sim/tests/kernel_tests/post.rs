//! Requests posted from interrupt context.
use kestrel_kernel::{
    cfg::{EventFlagsAttr, MemoryPoolAttr, MessageQueueAttr, SemaphoreAttr},
    Fault, KernelConfig, KernelError, Timeout, ISR_MESSAGE_MAX,
};

use crate::{spawn, start_with_main, start_with_main_cfg};

/// A release posted by an interrupt handler takes effect at the next
/// dispatch, where it wakes up the waiter.
#[test]
fn semaphore_release() {
    let (mut sim, main) = start_with_main(10);
    let s = sim.kernel.semaphore_create(SemaphoreAttr::new(0, 1)).unwrap();
    let isr = sim.kernel.isr_context();

    let hi = spawn(&mut sim, 20, "hi");
    let pending = sim
        .kernel
        .semaphore_acquire(s, Timeout::FOREVER)
        .unwrap()
        .pending()
        .unwrap();
    assert_eq!(sim.switch(), Some(main));

    isr.semaphore_release(s).unwrap();
    assert!(sim.kernel.is_dispatch_pending());
    assert_eq!(sim.kernel.semaphore_count(s), Ok(0));
    assert_eq!(sim.switch(), Some(hi));
    assert_eq!(pending.resolve(&mut sim.kernel), Ok(()));
}

/// Requests are applied in the order they were posted.
#[test]
fn flags_in_order() {
    let (mut sim, main) = start_with_main(10);
    let ef = sim.kernel.event_flags_create(EventFlagsAttr::new()).unwrap();
    let isr = sim.kernel.isr_context();

    isr.event_flags_set(ef, 0b0011).unwrap();
    isr.thread_flags_set(main, 0b1000).unwrap();
    isr.event_flags_set(ef, 0b0100).unwrap();
    assert_eq!(sim.kernel.event_flags_get(ef), Ok(0));

    assert_eq!(sim.switch(), Some(main));
    assert_eq!(sim.kernel.event_flags_get(ef), Ok(0b0111));
    assert_eq!(sim.kernel.thread_flags_get(), Ok(0b1000));
}

#[test]
fn message_and_block() {
    let (mut sim, _main) = start_with_main(10);
    let q = sim
        .kernel
        .message_queue_create(MessageQueueAttr::new(2, 4))
        .unwrap();
    let pool = sim
        .kernel
        .memory_pool_create(MemoryPoolAttr::new(1, 8))
        .unwrap();
    let isr = sim.kernel.isr_context();

    assert_eq!(
        isr.message_queue_put(q, &[0; ISR_MESSAGE_MAX + 1], 0),
        Err(KernelError::InvalidParameter)
    );
    isr.message_queue_put(q, b"irq!", 2).unwrap();

    let block = sim
        .kernel
        .memory_pool_alloc(pool, Timeout::NO_WAIT)
        .unwrap()
        .done()
        .unwrap();
    isr.memory_pool_free(block).unwrap();

    sim.switch();
    assert_eq!(sim.kernel.message_queue_count(q), Ok(1));
    assert_eq!(sim.kernel.memory_pool_space(pool), Ok(1));

    let mut buf = [0; 4];
    assert_eq!(
        sim.kernel
            .message_queue_get(q, &mut buf, Timeout::NO_WAIT)
            .unwrap()
            .done(),
        Some(2)
    );
    assert_eq!(&buf, b"irq!");
}

/// A request that fails when applied is discarded.
#[test]
fn stale_request_discarded() {
    let (mut sim, main) = start_with_main(10);
    let s = sim.kernel.semaphore_create(SemaphoreAttr::new(0, 1)).unwrap();
    let isr = sim.kernel.isr_context();

    isr.semaphore_release(s).unwrap();
    sim.kernel.semaphore_delete(s).unwrap();
    assert_eq!(sim.switch(), Some(main));
    assert!(!sim.kernel.is_dispatch_pending());
    assert!(sim.kernel.port().faults().is_empty());
}

#[test]
fn overflow() {
    let (mut sim, _main) = start_with_main_cfg(10, KernelConfig::new().isr_queue_len(2));
    let s = sim.kernel.semaphore_create(SemaphoreAttr::new(0, 8)).unwrap();
    let isr = sim.kernel.isr_context();

    isr.semaphore_release(s).unwrap();
    isr.semaphore_release(s).unwrap();
    assert_eq!(isr.semaphore_release(s), Err(KernelError::ResourceExhausted));
    assert_eq!(isr.semaphore_release(s), Err(KernelError::ResourceExhausted));

    sim.switch();
    assert_eq!(sim.kernel.semaphore_count(s), Ok(2));
    assert_eq!(
        sim.kernel.port_mut().take_faults(),
        [Fault::IsrQueueOverflow { dropped: 2 }]
    );

    // Room again
    isr.semaphore_release(s).unwrap();
    sim.switch();
    assert_eq!(sim.kernel.semaphore_count(s), Ok(3));
}

/// Ticks announced from the tick interrupt are counted rather than queued,
/// so they never overflow.
#[test]
fn ticks_coalesce() {
    let (mut sim, main) = start_with_main_cfg(10, KernelConfig::new().isr_queue_len(1));
    let isr = sim.kernel.isr_context();

    let _ = sim.kernel.delay(50).unwrap();
    sim.switch();
    for _ in 0..50 {
        isr.tick();
    }
    assert_eq!(sim.kernel.tick_count(), 0);
    assert_eq!(sim.switch(), Some(main));
    assert_eq!(sim.kernel.tick_count(), 50);
    assert!(sim.kernel.port().faults().is_empty());
}
