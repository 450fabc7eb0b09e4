//! Message queues.
use kestrel_kernel::{cfg::MessageQueueAttr, KernelError, Timeout};

use crate::{spawn, start_with_main};

#[test]
fn round_trip() {
    let (mut sim, _main) = start_with_main(10);
    let q = sim
        .kernel
        .message_queue_create(MessageQueueAttr::new(1, 5))
        .unwrap();

    sim.kernel
        .message_queue_put(q, b"hello", 0, Timeout::NO_WAIT)
        .unwrap()
        .done()
        .unwrap();
    let mut buf = [0; 5];
    assert_eq!(
        sim.kernel
            .message_queue_get(q, &mut buf, Timeout::NO_WAIT)
            .unwrap()
            .done(),
        Some(0)
    );
    assert_eq!(&buf, b"hello");
}

/// `b` (priority 5) is received before `a` (priority 1) despite arriving
/// later.
#[test]
fn priority_order() {
    let (mut sim, _main) = start_with_main(10);
    let q = sim
        .kernel
        .message_queue_create(MessageQueueAttr::new(2, 1))
        .unwrap();

    let _ = sim.kernel.message_queue_put(q, b"a", 1, Timeout::NO_WAIT).unwrap();
    let _ = sim.kernel.message_queue_put(q, b"b", 5, Timeout::NO_WAIT).unwrap();
    assert_eq!(sim.kernel.message_queue_count(q), Ok(2));
    assert_eq!(
        sim.kernel.message_queue_put(q, b"c", 9, Timeout::NO_WAIT).err(),
        Some(KernelError::ResourceExhausted)
    );

    let mut buf = [0; 1];
    let priority = sim
        .kernel
        .message_queue_get(q, &mut buf, Timeout::NO_WAIT)
        .unwrap()
        .done();
    assert_eq!((priority, &buf), (Some(5), b"b"));
    let priority = sim
        .kernel
        .message_queue_get(q, &mut buf, Timeout::NO_WAIT)
        .unwrap()
        .done();
    assert_eq!((priority, &buf), (Some(1), b"a"));
    assert_eq!(
        sim.kernel
            .message_queue_get(q, &mut buf, Timeout::NO_WAIT)
            .err(),
        Some(KernelError::ResourceExhausted)
    );
}

#[test]
fn fifo_within_priority() {
    let (mut sim, _main) = start_with_main(10);
    let q = sim
        .kernel
        .message_queue_create(MessageQueueAttr::new(4, 1))
        .unwrap();

    for (msg, priority) in [(b"1", 3), (b"2", 3), (b"3", 7), (b"4", 3)] {
        let _ = sim
            .kernel
            .message_queue_put(q, msg, priority, Timeout::NO_WAIT)
            .unwrap();
    }

    let mut received = Vec::new();
    let mut buf = [0; 1];
    while let Ok(outcome) = sim.kernel.message_queue_get(q, &mut buf, Timeout::NO_WAIT) {
        assert!(!outcome.is_blocked());
        received.push(buf[0]);
    }
    assert_eq!(received, b"3124");
}

/// A message sent to a waiting receiver is handed over directly.
#[test]
fn put_and_dispatch() {
    let (mut sim, main) = start_with_main(10);
    let q = sim
        .kernel
        .message_queue_create(MessageQueueAttr::new(2, 4))
        .unwrap();

    let hi = spawn(&mut sim, 20, "hi");
    let mut buf = [0; 4];
    let pending = sim
        .kernel
        .message_queue_get(q, &mut buf, Timeout::FOREVER)
        .unwrap()
        .pending()
        .unwrap();
    assert_eq!(sim.switch(), Some(main));

    let _ = sim
        .kernel
        .message_queue_put(q, b"ping", 3, Timeout::NO_WAIT)
        .unwrap();
    assert_eq!(sim.switch(), Some(hi));
    assert_eq!(sim.kernel.message_queue_count(q), Ok(0));
    assert_eq!(pending.resolve_into(&mut sim.kernel, &mut buf), Ok(3));
    assert_eq!(&buf, b"ping");
}

/// A sender blocked on a full queue deposits its message once a receiver
/// makes room.
#[test]
fn blocked_sender() {
    let (mut sim, main) = start_with_main(10);
    let q = sim
        .kernel
        .message_queue_create(MessageQueueAttr::new(1, 1))
        .unwrap();
    let _ = sim.kernel.message_queue_put(q, b"x", 0, Timeout::NO_WAIT).unwrap();

    let hi = spawn(&mut sim, 20, "hi");
    let pending = sim
        .kernel
        .message_queue_put(q, b"y", 0, Timeout::FOREVER)
        .unwrap()
        .pending()
        .unwrap();
    assert_eq!(sim.switch(), Some(main));

    let mut buf = [0; 1];
    let _ = sim
        .kernel
        .message_queue_get(q, &mut buf, Timeout::NO_WAIT)
        .unwrap();
    assert_eq!(&buf, b"x");
    assert_eq!(sim.switch(), Some(hi));
    assert_eq!(pending.resolve(&mut sim.kernel), Ok(()));
    assert_eq!(sim.kernel.message_queue_count(q), Ok(1));

    let _ = sim
        .kernel
        .message_queue_get(q, &mut buf, Timeout::NO_WAIT)
        .unwrap();
    assert_eq!(&buf, b"y");
}

#[test]
fn reset_admits_blocked_sender() {
    let (mut sim, main) = start_with_main(10);
    let q = sim
        .kernel
        .message_queue_create(MessageQueueAttr::new(1, 1))
        .unwrap();
    let _ = sim.kernel.message_queue_put(q, b"x", 0, Timeout::NO_WAIT).unwrap();

    let hi = spawn(&mut sim, 20, "hi");
    let _ = sim
        .kernel
        .message_queue_put(q, b"y", 0, Timeout::FOREVER)
        .unwrap();
    assert_eq!(sim.switch(), Some(main));

    sim.kernel.message_queue_reset(q).unwrap();
    assert_eq!(sim.switch(), Some(hi));
    let mut buf = [0; 1];
    let _ = sim
        .kernel
        .message_queue_get(q, &mut buf, Timeout::NO_WAIT)
        .unwrap();
    assert_eq!(&buf, b"y");
}

#[test]
fn size_checks() {
    let (mut sim, _main) = start_with_main(10);
    let q = sim
        .kernel
        .message_queue_create(MessageQueueAttr::new(2, 4))
        .unwrap();
    assert_eq!(sim.kernel.message_queue_capacity(q), Ok(2));
    assert_eq!(sim.kernel.message_queue_msg_size(q), Ok(4));
    assert_eq!(sim.kernel.message_queue_space(q), Ok(2));

    assert_eq!(
        sim.kernel.message_queue_put(q, b"toolong", 0, Timeout::NO_WAIT).err(),
        Some(KernelError::InvalidParameter)
    );
    let mut small = [0; 2];
    assert_eq!(
        sim.kernel
            .message_queue_get(q, &mut small, Timeout::NO_WAIT)
            .err(),
        Some(KernelError::InvalidParameter)
    );
}
