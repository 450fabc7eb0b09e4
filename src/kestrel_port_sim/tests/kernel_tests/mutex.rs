//! Mutex ownership, priority inheritance, and owner termination.
use kestrel_kernel::{
    cfg::{MutexAttr, MutexOptions},
    KernelError, Timeout,
};

use crate::{prio, spawn, start_with_main};

/// 1. `a` (priority 5) locks the mutex and activates `b` (priority 8).
/// 2. `b` starts waiting for the mutex, switching to `a`, which now runs at
///    priority 8.
/// 3. `a` unlocks the mutex. `b` takes the ownership and preempts `a`, which
///    is back at priority 5.
#[test]
fn inherit_and_restore() {
    let (mut sim, a) = start_with_main(5);
    let m = sim.kernel.mutex_create(MutexAttr::new().name("m")).unwrap();

    assert_eq!(
        sim.kernel.mutex_acquire(m, Timeout::FOREVER).unwrap().done(),
        Some(())
    );

    let b = spawn(&mut sim, 8, "b");
    assert_eq!(sim.current(), Some(b));

    let pending = sim
        .kernel
        .mutex_acquire(m, Timeout::FOREVER)
        .unwrap()
        .pending()
        .unwrap(); // start waiting, switching to `a`
    assert_eq!(sim.switch(), Some(a));
    assert_eq!(sim.kernel.thread_effective_priority(a), Ok(prio(8)));
    assert_eq!(sim.kernel.thread_priority(a), Ok(prio(5)));

    sim.kernel.mutex_release(m).unwrap(); // unblock `b`
    assert_eq!(sim.switch(), Some(b));
    assert_eq!(pending.resolve(&mut sim.kernel), Ok(()));
    assert_eq!(sim.kernel.mutex_owner(m), Ok(Some(b)));
    assert_eq!(sim.kernel.thread_effective_priority(a), Ok(prio(5)));
    assert_eq!(sim.kernel.thread_effective_priority(b), Ok(prio(8)));
}

#[test]
fn no_inheritance_without_option() {
    let (mut sim, a) = start_with_main(5);
    let m = sim
        .kernel
        .mutex_create(MutexAttr::new().options(MutexOptions::empty()))
        .unwrap();
    let _ = sim.kernel.mutex_acquire(m, Timeout::FOREVER).unwrap();

    spawn(&mut sim, 8, "b");
    let _ = sim.kernel.mutex_acquire(m, Timeout::FOREVER).unwrap();
    assert_eq!(sim.switch(), Some(a));
    assert_eq!(sim.kernel.thread_effective_priority(a), Ok(prio(5)));
}

#[test]
fn ownership_checks() {
    let (mut sim, _a) = start_with_main(5);
    let m = sim.kernel.mutex_create(MutexAttr::new()).unwrap();

    // Releasing a mutex nobody owns
    assert_eq!(
        sim.kernel.mutex_release(m),
        Err(KernelError::OwnershipViolation)
    );

    let _ = sim.kernel.mutex_acquire(m, Timeout::FOREVER).unwrap();
    // Non-recursive
    assert_eq!(
        sim.kernel.mutex_acquire(m, Timeout::FOREVER).err(),
        Some(KernelError::OwnershipViolation)
    );

    let b = spawn(&mut sim, 8, "b");
    assert_eq!(sim.current(), Some(b));
    assert_eq!(
        sim.kernel.mutex_release(m),
        Err(KernelError::OwnershipViolation)
    );
    assert_eq!(
        sim.kernel.mutex_acquire(m, Timeout::NO_WAIT).err(),
        Some(KernelError::ResourceExhausted)
    );
}

#[test]
fn recursive() {
    let (mut sim, a) = start_with_main(5);
    let m = sim
        .kernel
        .mutex_create(MutexAttr::new().options(MutexOptions::RECURSIVE))
        .unwrap();

    for _ in 0..3 {
        let _ = sim.kernel.mutex_acquire(m, Timeout::FOREVER).unwrap();
    }
    for _ in 0..2 {
        sim.kernel.mutex_release(m).unwrap();
        assert_eq!(sim.kernel.mutex_owner(m), Ok(Some(a)));
    }
    sim.kernel.mutex_release(m).unwrap();
    assert_eq!(sim.kernel.mutex_owner(m), Ok(None));
}

#[test]
fn recursion_limit() {
    let (mut sim, _a) = start_with_main(5);
    let m = sim
        .kernel
        .mutex_create(MutexAttr::new().options(MutexOptions::RECURSIVE))
        .unwrap();

    for _ in 0..255 {
        let _ = sim.kernel.mutex_acquire(m, Timeout::FOREVER).unwrap();
    }
    assert_eq!(
        sim.kernel.mutex_acquire(m, Timeout::FOREVER).err(),
        Some(KernelError::OwnershipViolation)
    );
}

/// A waiter that times out stops boosting the owner.
#[test]
fn waiter_timeout_restores_owner_priority() {
    let (mut sim, a) = start_with_main(5);
    let m = sim.kernel.mutex_create(MutexAttr::new()).unwrap();
    let _ = sim.kernel.mutex_acquire(m, Timeout::FOREVER).unwrap();

    let b = spawn(&mut sim, 8, "b");
    let pending = sim
        .kernel
        .mutex_acquire(m, Timeout::ticks(3))
        .unwrap()
        .pending()
        .unwrap();
    assert_eq!(sim.switch(), Some(a));
    assert_eq!(sim.kernel.thread_effective_priority(a), Ok(prio(8)));

    assert_eq!(sim.advance(2), Some(a));
    assert_eq!(sim.advance(1), Some(b));
    assert_eq!(pending.resolve(&mut sim.kernel), Err(KernelError::Timeout));
    assert_eq!(sim.kernel.thread_effective_priority(a), Ok(prio(5)));
    assert_eq!(sim.kernel.mutex_owner(m), Ok(Some(a)));
}

/// Inheritance propagates through a thread that is itself blocked on a
/// mutex.
#[test]
fn transitive_inheritance() {
    let (mut sim, a) = start_with_main(3);
    let m1 = sim.kernel.mutex_create(MutexAttr::new().name("m1")).unwrap();
    let m2 = sim.kernel.mutex_create(MutexAttr::new().name("m2")).unwrap();
    let _ = sim.kernel.mutex_acquire(m1, Timeout::FOREVER).unwrap();

    // `b` holds `m2` and waits for `m1`
    let b = spawn(&mut sim, 6, "b");
    let _ = sim.kernel.mutex_acquire(m2, Timeout::FOREVER).unwrap();
    let _ = sim.kernel.mutex_acquire(m1, Timeout::FOREVER).unwrap();
    assert_eq!(sim.switch(), Some(a));
    assert_eq!(sim.kernel.thread_effective_priority(a), Ok(prio(6)));

    // `c` waits for `m2`
    spawn(&mut sim, 9, "c");
    let _ = sim.kernel.mutex_acquire(m2, Timeout::FOREVER).unwrap();
    assert_eq!(sim.switch(), Some(a));
    assert_eq!(sim.kernel.thread_effective_priority(b), Ok(prio(9)));
    assert_eq!(sim.kernel.thread_effective_priority(a), Ok(prio(9)));

    // Releasing `m1` passes it to `b`, which runs at 9
    sim.kernel.mutex_release(m1).unwrap();
    assert_eq!(sim.switch(), Some(b));
    assert_eq!(sim.kernel.thread_effective_priority(a), Ok(prio(3)));
}

#[test]
fn owner_terminated() {
    let (mut sim, _main) = start_with_main(3);
    let m = sim.kernel.mutex_create(MutexAttr::new()).unwrap();

    let a = spawn(&mut sim, 5, "a");
    let _ = sim.kernel.mutex_acquire(m, Timeout::FOREVER).unwrap();
    let b = spawn(&mut sim, 8, "b");
    let pending = sim
        .kernel
        .mutex_acquire(m, Timeout::FOREVER)
        .unwrap()
        .pending()
        .unwrap();
    assert_eq!(sim.switch(), Some(a));

    sim.kernel.thread_exit().unwrap(); // abandon `m`
    assert_eq!(sim.switch(), Some(b));
    assert_eq!(pending.resolve(&mut sim.kernel), Err(KernelError::OwnerLost));
    assert_eq!(sim.kernel.mutex_owner(m), Ok(None));

    // The mutex is usable again
    assert_eq!(
        sim.kernel.mutex_acquire(m, Timeout::NO_WAIT).unwrap().done(),
        Some(())
    );
}

#[test]
fn robust_owner_terminated() {
    let (mut sim, _main) = start_with_main(3);
    let m = sim
        .kernel
        .mutex_create(
            MutexAttr::new().options(MutexOptions::PRIO_INHERIT | MutexOptions::ROBUST),
        )
        .unwrap();

    let a = spawn(&mut sim, 5, "a");
    let _ = sim.kernel.mutex_acquire(m, Timeout::FOREVER).unwrap();
    let b = spawn(&mut sim, 8, "b");
    let pending = sim
        .kernel
        .mutex_acquire(m, Timeout::FOREVER)
        .unwrap()
        .pending()
        .unwrap();
    assert_eq!(sim.switch(), Some(a));

    sim.kernel.thread_exit().unwrap();
    assert_eq!(sim.switch(), Some(b));
    assert_eq!(pending.resolve(&mut sim.kernel), Ok(()));
    assert_eq!(sim.kernel.mutex_owner(m), Ok(Some(b)));
}

#[test]
fn delete_wakes_waiters() {
    let (mut sim, a) = start_with_main(5);
    let m = sim.kernel.mutex_create(MutexAttr::new()).unwrap();
    let _ = sim.kernel.mutex_acquire(m, Timeout::FOREVER).unwrap();

    let b = spawn(&mut sim, 8, "b");
    let pending = sim
        .kernel
        .mutex_acquire(m, Timeout::FOREVER)
        .unwrap()
        .pending()
        .unwrap();
    assert_eq!(sim.switch(), Some(a));

    sim.kernel.mutex_delete(m).unwrap();
    assert_eq!(sim.switch(), Some(b));
    assert_eq!(
        pending.resolve(&mut sim.kernel),
        Err(KernelError::ObjectDeleted)
    );
    assert_eq!(sim.kernel.thread_effective_priority(a), Ok(prio(5)));
    assert_eq!(sim.kernel.mutex_owner(m), Err(KernelError::InvalidHandle));
}
