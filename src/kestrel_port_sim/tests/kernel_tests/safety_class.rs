//! Safety-class checks and class-wide teardown.
use kestrel_kernel::{
    cfg::{EventFlagsAttr, MutexAttr, SemaphoreAttr, ThreadAttr, TimerAttr},
    FlagsWait, Kernel, KernelConfig, KernelError, ObjectKinds, ObjectRef, SafetyClass, TeardownMode,
    ThreadId, Timeout, TimerKind,
};
use kestrel_port_sim::{Sim, SimPort};

use crate::{prio, start_with_main, thread_body};

fn class(level: u8) -> SafetyClass {
    SafetyClass::new(level).unwrap()
}

fn nop(_: &mut Kernel<SimPort>, _: usize) {}

/// Start a [`Sim`] running `main` with the given safety class.
fn start_with_class(level: u8, safety_class: u8) -> (Sim, ThreadId) {
    let mut sim = Sim::new(KernelConfig::new());
    let main = sim
        .kernel
        .thread_create(
            ThreadAttr::new(thread_body)
                .priority(prio(level))
                .name("main")
                .safety_class(class(safety_class)),
        )
        .unwrap();
    assert_eq!(sim.start().unwrap(), main);
    (sim, main)
}

fn create_in_class(sim: &mut Sim, level: u8, name: &'static str, safety_class: u8) -> ThreadId {
    let thread = sim
        .kernel
        .thread_create(
            ThreadAttr::new(thread_body)
                .priority(prio(level))
                .name(name)
                .safety_class(class(safety_class)),
        )
        .unwrap();
    sim.switch();
    thread
}

#[test]
fn lower_class_is_refused() {
    let (mut sim, _main) = start_with_main(10);
    let m = sim
        .kernel
        .mutex_create(MutexAttr::new().safety_class(class(3)))
        .unwrap();
    let t = sim
        .kernel
        .timer_create(TimerAttr::new(nop, TimerKind::OneShot).safety_class(class(3)))
        .unwrap();
    let x = create_in_class(&mut sim, 5, "x", 3);
    assert_eq!(sim.kernel.object_safety_class(x), Ok(class(3)));

    assert_eq!(sim.kernel.mutex_delete(m), Err(KernelError::SafetyClass));
    assert_eq!(sim.kernel.timer_start(t, 10), Err(KernelError::SafetyClass));
    assert_eq!(sim.kernel.thread_terminate(x), Err(KernelError::SafetyClass));
    assert_eq!(
        sim.kernel.thread_set_priority(x, prio(6)),
        Err(KernelError::SafetyClass)
    );
    assert_eq!(
        sim.kernel
            .destroy_class(class(3), ObjectKinds::all(), TeardownMode::Graceful),
        Err(KernelError::SafetyClass)
    );

    // Using the object is still allowed
    assert_eq!(
        sim.kernel.mutex_acquire(m, Timeout::NO_WAIT).unwrap().done(),
        Some(())
    );
}

/// 1. `sup` (class 10) owns the partition. `w` (class 2) holds `m` and waits
///    on `e` (class 5). `waiter` (class 8) waits on `s` (class 2).
/// 2. `sup` tears down class 2 and below. `w`, `m`, `s`, and the timer are
///    deleted. `waiter` wakes up with `ObjectDeleted`.
#[test]
fn destroy_graceful() {
    let (mut sim, sup) = start_with_class(30, 10);
    let s = sim
        .kernel
        .semaphore_create(SemaphoreAttr::new(0, 1).safety_class(class(2)))
        .unwrap();
    let m = sim
        .kernel
        .mutex_create(MutexAttr::new().safety_class(class(2)))
        .unwrap();
    let e = sim
        .kernel
        .event_flags_create(EventFlagsAttr::new().safety_class(class(5)))
        .unwrap();
    let t = sim
        .kernel
        .timer_create(TimerAttr::new(nop, TimerKind::Periodic).safety_class(class(1)))
        .unwrap();
    sim.kernel.timer_start(t, 1000).unwrap();

    let waiter = create_in_class(&mut sim, 40, "waiter", 8);
    assert_eq!(sim.current(), Some(waiter));
    let pending = sim
        .kernel
        .semaphore_acquire(s, Timeout::FOREVER)
        .unwrap()
        .pending()
        .unwrap();
    assert_eq!(sim.switch(), Some(sup));

    let w = create_in_class(&mut sim, 20, "w", 2);
    let _ = sim.kernel.delay(1).unwrap();
    assert_eq!(sim.switch(), Some(w));
    let _ = sim.kernel.mutex_acquire(m, Timeout::FOREVER).unwrap();
    let _ = sim
        .kernel
        .event_flags_wait(e, 1, FlagsWait::empty(), Timeout::FOREVER)
        .unwrap();
    sim.switch();
    assert_eq!(sim.tick(), Some(sup));

    assert_eq!(
        sim.kernel
            .destroy_class(class(2), ObjectKinds::all(), TeardownMode::Graceful),
        Ok(4)
    );
    let deleted: [ObjectRef; 4] = [w.into(), m.into(), s.into(), t.into()];
    for object in deleted {
        assert!(!sim.kernel.object_exists(object));
    }
    assert!(sim.kernel.object_exists(e));
    assert!(sim.kernel.object_exists(sup));

    assert_eq!(sim.switch(), Some(waiter));
    assert_eq!(
        pending.resolve(&mut sim.kernel),
        Err(KernelError::ObjectDeleted)
    );
}

#[test]
fn destroy_selected_kinds() {
    let (mut sim, _sup) = start_with_class(30, 10);
    let s = sim.kernel.semaphore_create(SemaphoreAttr::new(0, 1)).unwrap();
    let m = sim.kernel.mutex_create(MutexAttr::new()).unwrap();
    let x = create_in_class(&mut sim, 5, "x", 0);

    assert_eq!(
        sim.kernel
            .destroy_class(class(0), ObjectKinds::SEMAPHORE, TeardownMode::Graceful),
        Ok(1)
    );
    assert!(!sim.kernel.object_exists(s));
    assert!(sim.kernel.object_exists(m));
    assert!(sim.kernel.object_exists(x));
}

#[test]
fn destroy_force_includes_caller() {
    let (mut sim, main) = start_with_class(10, 3);
    let x = create_in_class(&mut sim, 5, "x", 2);

    assert_eq!(
        sim.kernel
            .destroy_class(class(3), ObjectKinds::THREAD, TeardownMode::Graceful),
        Ok(1)
    );
    assert!(!sim.kernel.object_exists(x));
    assert_eq!(sim.switch(), Some(main));

    assert_eq!(
        sim.kernel
            .destroy_class(class(3), ObjectKinds::THREAD, TeardownMode::Force),
        Ok(1)
    );
    assert!(!sim.kernel.object_exists(main));
    let current = sim.switch().unwrap();
    assert_eq!(sim.kernel.thread_name(current), Ok(Some("idle")));
    // The timer service survives too
    assert_eq!(sim.kernel.thread_count(), 2);
}
