//! Random create/delete sequences never leak or resurrect objects.
use kestrel_kernel::{
    cfg::{EventFlagsAttr, MemoryPoolAttr, MutexAttr, SemaphoreAttr},
    KernelConfig, ObjectKind, ObjectRef,
};
use quickcheck_macros::quickcheck;

use crate::start_with_main_cfg;

#[derive(Debug)]
enum Cmd {
    Create(ObjectKind),
    Delete(usize),
    DeleteStale(usize),
}

fn interpret(bytecode: &[u8]) -> impl Iterator<Item = Cmd> + '_ {
    bytecode.chunks_exact(2).map(|instr| {
        let arg = instr[1] as usize;
        match instr[0] % 8 {
            0 => Cmd::Create(ObjectKind::Mutex),
            1 => Cmd::Create(ObjectKind::Semaphore),
            2 => Cmd::Create(ObjectKind::EventFlags),
            3 => Cmd::Create(ObjectKind::MemoryPool),
            4 | 5 | 6 => Cmd::Delete(arg),
            _ => Cmd::DeleteStale(arg),
        }
    })
}

#[quickcheck]
fn create_delete_matches_reference(bytecode: Vec<u8>) -> bool {
    const CAP: usize = 4;
    let cfg = KernelConfig::new()
        .max_mutexes(CAP)
        .max_semaphores(CAP)
        .max_event_flags(CAP)
        .max_memory_pools(CAP);
    let (mut sim, _main) = start_with_main_cfg(10, cfg);
    let kernel = &mut sim.kernel;

    let mut live: Vec<ObjectRef> = Vec::new();
    let mut dead: Vec<ObjectRef> = Vec::new();
    let kinds = [
        ObjectKind::Mutex,
        ObjectKind::Semaphore,
        ObjectKind::EventFlags,
        ObjectKind::MemoryPool,
    ];

    for cmd in interpret(&bytecode) {
        log::trace!("    {cmd:?}");
        match cmd {
            Cmd::Create(kind) => {
                let created: Option<ObjectRef> = match kind {
                    ObjectKind::Mutex => kernel.mutex_create(MutexAttr::new()).ok().map(Into::into),
                    ObjectKind::Semaphore => kernel
                        .semaphore_create(SemaphoreAttr::new(0, 1))
                        .ok()
                        .map(Into::into),
                    ObjectKind::EventFlags => kernel
                        .event_flags_create(EventFlagsAttr::new())
                        .ok()
                        .map(Into::into),
                    _ => kernel
                        .memory_pool_create(MemoryPoolAttr::new(2, 8))
                        .ok()
                        .map(Into::into),
                };
                let count = live.iter().filter(|o| o.kind() == kind).count();
                match created {
                    Some(object) => {
                        assert!(count < CAP);
                        assert!(!live.contains(&object));
                        live.push(object);
                    }
                    None => assert_eq!(count, CAP),
                }
            }
            Cmd::Delete(i) => {
                if live.is_empty() {
                    continue;
                }
                let object = live.swap_remove(i % live.len());
                let result = match object {
                    ObjectRef::Mutex(x) => kernel.mutex_delete(x),
                    ObjectRef::Semaphore(x) => kernel.semaphore_delete(x),
                    ObjectRef::EventFlags(x) => kernel.event_flags_delete(x),
                    ObjectRef::MemoryPool(x) => kernel.memory_pool_delete(x),
                    _ => unreachable!(),
                };
                assert_eq!(result, Ok(()));
                dead.push(object);
            }
            Cmd::DeleteStale(i) => {
                if dead.is_empty() {
                    continue;
                }
                let object = dead[i % dead.len()];
                assert!(!kernel.object_exists(object));
                assert!(kernel.object_kind(object).is_err());
            }
        }

        for &kind in &kinds {
            let count = live.iter().filter(|o| o.kind() == kind).count();
            assert_eq!(kernel.object_count(kind), count);
        }
        for &object in &live {
            assert_eq!(kernel.object_kind(object), Ok(object.kind()));
        }
    }

    true
}

#[test]
fn object_queries() {
    let (mut sim, main) = start_with_main_cfg(10, KernelConfig::new());
    let m = sim
        .kernel
        .mutex_create(MutexAttr::new().name("lock"))
        .unwrap();

    assert!(sim.kernel.object_exists(m));
    assert_eq!(sim.kernel.object_kind(m), Ok(ObjectKind::Mutex));
    assert_eq!(sim.kernel.object_name(m), Ok(Some("lock")));
    assert_eq!(sim.kernel.object_name(main), Ok(Some("main")));
    // `main`, idle, and the timer service
    assert_eq!(sim.kernel.object_count(ObjectKind::Thread), 3);

    sim.kernel.mutex_delete(m).unwrap();
    assert!(!sim.kernel.object_exists(m));
    assert_eq!(
        sim.kernel.object_name(m),
        Err(kestrel_kernel::KernelError::InvalidHandle)
    );
}
