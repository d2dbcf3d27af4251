//! 多线程并发分配协程 ID 的唯一性测试

use std::cell::UnsafeCell;
use std::sync::Arc;

use qfiber::{Fiber, Mutex, ScopedLock, State, Thread};

/// 跨线程共享的 ID 收集器，互斥性由自带的锁保证
struct IdSink {
    lock: Mutex,
    ids: UnsafeCell<Vec<u64>>,
}

unsafe impl Sync for IdSink {}

#[test]
fn concurrent_ids_are_unique_and_increasing() {
    const THREADS: usize = 4;
    const FIBERS_PER_THREAD: usize = 64;

    let sink = Arc::new(IdSink {
        lock: Mutex::new(),
        ids: UnsafeCell::new(Vec::new()),
    });

    let mut threads = Vec::new();
    for t in 0..THREADS {
        let sink = Arc::clone(&sink);
        let thread = Thread::spawn(
            move || {
                let mut local = Vec::with_capacity(FIBERS_PER_THREAD);
                for _ in 0..FIBERS_PER_THREAD {
                    let fiber = Fiber::new(|| {}, 16 * 1024, false);
                    local.push(fiber.id());
                    fiber.swap_in().unwrap();
                    assert_eq!(fiber.state(), State::Term);
                }
                // 单线程内按创建顺序严格递增
                for pair in local.windows(2) {
                    assert!(pair[0] < pair[1]);
                }
                let _guard = ScopedLock::new(&sink.lock);
                unsafe { (*sink.ids.get()).extend_from_slice(&local) };
            },
            &format!("ids-{t}"),
        )
        .unwrap();
        threads.push(thread);
    }

    for thread in &threads {
        thread.join().unwrap();
    }

    let mut ids = unsafe { (*sink.ids.get()).clone() };
    assert_eq!(ids.len(), THREADS * FIBERS_PER_THREAD);

    // 本进程只有这一个测试在分配用户协程 ID，分配器从 1 起步：
    // 并发分配下既不允许碰撞，也不允许空洞
    ids.sort_unstable();
    let expected: Vec<u64> = (1..=(THREADS * FIBERS_PER_THREAD) as u64).collect();
    assert_eq!(ids, expected);
}
