//! Event flags and thread flags.
use kestrel_kernel::{
    cfg::EventFlagsAttr, FlagsWait, KernelError, Switch, ThreadState, Timeout,
};

use crate::{spawn, start_with_main};

#[test]
fn poll() {
    let (mut sim, _main) = start_with_main(10);
    let ef = sim
        .kernel
        .event_flags_create(EventFlagsAttr::new().initial(0b0101))
        .unwrap();

    assert_eq!(
        sim.kernel
            .event_flags_wait(ef, 0b0011, FlagsWait::empty(), Timeout::NO_WAIT)
            .unwrap()
            .done(),
        Some(0b0101)
    );
    assert_eq!(
        sim.kernel
            .event_flags_wait(ef, 0b0011, FlagsWait::ALL, Timeout::NO_WAIT)
            .err(),
        Some(KernelError::ResourceExhausted)
    );
    assert_eq!(
        sim.kernel
            .event_flags_wait(ef, 0b0101, FlagsWait::ALL | FlagsWait::CLEAR, Timeout::NO_WAIT)
            .unwrap()
            .done(),
        Some(0b0101)
    );
    assert_eq!(sim.kernel.event_flags_get(ef), Ok(0));

    assert_eq!(sim.kernel.event_flags_set(ef, 0b1100), Ok(0b1100));
    assert_eq!(sim.kernel.event_flags_clear(ef, 0b0100), Ok(0b1100));
    assert_eq!(sim.kernel.event_flags_get(ef), Ok(0b1000));

    // The top bit is reserved
    assert_eq!(
        sim.kernel.event_flags_set(ef, 0x8000_0000),
        Err(KernelError::InvalidParameter)
    );
}

/// One `set` releases every waiter it satisfies, highest priority first.
///
/// 1. `lo` waits for `0b10`, `mid` for `0b01`, and `hi` for `0b01` with
///    auto-clear.
/// 2. `main` sets `0b11`. `hi` is satisfied first and consumes `0b01`, so
///    `mid` keeps waiting, and `lo` is satisfied by the remaining `0b10`.
#[test]
fn set_wakes_all_matching() {
    let (mut sim, main) = start_with_main(10);
    let ef = sim.kernel.event_flags_create(EventFlagsAttr::new()).unwrap();

    let lo = spawn(&mut sim, 20, "lo");
    let pending_lo = sim
        .kernel
        .event_flags_wait(ef, 0b10, FlagsWait::empty(), Timeout::FOREVER)
        .unwrap()
        .pending()
        .unwrap();
    assert_eq!(sim.switch(), Some(main));

    let mid = spawn(&mut sim, 25, "mid");
    let _pending_mid = sim
        .kernel
        .event_flags_wait(ef, 0b01, FlagsWait::empty(), Timeout::FOREVER)
        .unwrap()
        .pending()
        .unwrap();
    assert_eq!(sim.switch(), Some(main));

    let hi = spawn(&mut sim, 30, "hi");
    let pending_hi = sim
        .kernel
        .event_flags_wait(ef, 0b01, FlagsWait::CLEAR, Timeout::FOREVER)
        .unwrap()
        .pending()
        .unwrap();
    assert_eq!(sim.switch(), Some(main));
    sim.take_switches();

    assert_eq!(sim.kernel.event_flags_set(ef, 0b11), Ok(0b11));
    assert_eq!(sim.kernel.thread_state(hi), Ok(ThreadState::Ready));
    assert_eq!(sim.kernel.thread_state(lo), Ok(ThreadState::Ready));
    assert_eq!(sim.kernel.thread_state(mid), Ok(ThreadState::Blocked));
    assert_eq!(sim.kernel.event_flags_get(ef), Ok(0b10));

    assert_eq!(sim.switch(), Some(hi));
    assert_eq!(pending_hi.resolve(&mut sim.kernel), Ok(0b11));
    sim.kernel.thread_exit().unwrap();
    assert_eq!(sim.switch(), Some(lo));
    assert_eq!(pending_lo.resolve(&mut sim.kernel), Ok(0b10));
    sim.kernel.thread_exit().unwrap();
    assert_eq!(sim.switch(), Some(main));

    assert_eq!(
        sim.take_switches(),
        [
            Switch {
                from: Some(main),
                to: hi
            },
            Switch {
                from: None,
                to: lo
            },
            Switch {
                from: None,
                to: main
            },
        ]
    );
    assert_eq!(sim.kernel.thread_state(mid), Ok(ThreadState::Blocked));
}

/// 1. `a` waits for any of `0b11`, and `b` waits for all of `0b11` with
///    auto-clear.
/// 2. `main` sets `0b01`, waking up only `a`.
/// 3. `main` sets `0b10`, waking up `b`, which clears both bits.
#[test]
fn set_and_dispatch() {
    let (mut sim, main) = start_with_main(10);
    let ef = sim.kernel.event_flags_create(EventFlagsAttr::new()).unwrap();

    let a = spawn(&mut sim, 20, "a");
    let pending_a = sim
        .kernel
        .event_flags_wait(ef, 0b11, FlagsWait::empty(), Timeout::FOREVER)
        .unwrap()
        .pending()
        .unwrap();
    assert_eq!(sim.switch(), Some(main));

    let b = spawn(&mut sim, 20, "b");
    let pending_b = sim
        .kernel
        .event_flags_wait(ef, 0b11, FlagsWait::ALL | FlagsWait::CLEAR, Timeout::FOREVER)
        .unwrap()
        .pending()
        .unwrap();
    assert_eq!(sim.switch(), Some(main));

    assert_eq!(sim.kernel.event_flags_set(ef, 0b01), Ok(0b01));
    assert_eq!(sim.switch(), Some(a));
    assert_eq!(pending_a.resolve(&mut sim.kernel), Ok(0b01));
    assert_eq!(sim.kernel.thread_state(b), Ok(ThreadState::Blocked));
    sim.kernel.thread_exit().unwrap();
    assert_eq!(sim.switch(), Some(main));

    assert_eq!(sim.kernel.event_flags_set(ef, 0b10), Ok(0b11));
    assert_eq!(sim.switch(), Some(b));
    assert_eq!(pending_b.resolve(&mut sim.kernel), Ok(0b11));
    assert_eq!(sim.kernel.event_flags_get(ef), Ok(0));
}

#[test]
fn wait_timeout_and_delete() {
    let (mut sim, main) = start_with_main(10);
    let ef = sim.kernel.event_flags_create(EventFlagsAttr::new()).unwrap();

    let a = spawn(&mut sim, 20, "a");
    let pending = sim
        .kernel
        .event_flags_wait(ef, 1, FlagsWait::empty(), Timeout::ticks(2))
        .unwrap()
        .pending()
        .unwrap();
    assert_eq!(sim.switch(), Some(main));
    assert_eq!(sim.advance(2), Some(a));
    assert_eq!(pending.resolve(&mut sim.kernel), Err(KernelError::Timeout));

    let pending = sim
        .kernel
        .event_flags_wait(ef, 1, FlagsWait::empty(), Timeout::FOREVER)
        .unwrap()
        .pending()
        .unwrap();
    assert_eq!(sim.switch(), Some(main));
    sim.kernel.event_flags_delete(ef).unwrap();
    assert_eq!(sim.switch(), Some(a));
    assert_eq!(
        pending.resolve(&mut sim.kernel),
        Err(KernelError::ObjectDeleted)
    );
}

#[test]
fn thread_flags() {
    let (mut sim, main) = start_with_main(10);

    let a = spawn(&mut sim, 20, "a");
    let pending = sim
        .kernel
        .thread_flags_wait(0b110, FlagsWait::ALL | FlagsWait::CLEAR, Timeout::FOREVER)
        .unwrap()
        .pending()
        .unwrap();
    assert_eq!(sim.switch(), Some(main));

    assert_eq!(sim.kernel.thread_flags_set(a, 0b010), Ok(0b010));
    assert_eq!(sim.switch(), Some(main));
    assert_eq!(sim.kernel.thread_flags_set(a, 0b101), Ok(0b111));
    assert_eq!(sim.switch(), Some(a));
    assert_eq!(pending.resolve(&mut sim.kernel), Ok(0b111));
    assert_eq!(sim.kernel.thread_flags_get(), Ok(0b001));

    assert_eq!(sim.kernel.thread_flags_clear(0b001), Ok(0b001));
    assert_eq!(sim.kernel.thread_flags_get(), Ok(0));
    assert_eq!(
        sim.kernel
            .thread_flags_wait(1, FlagsWait::empty(), Timeout::NO_WAIT)
            .err(),
        Some(KernelError::ResourceExhausted)
    );
}
