//! 线程与锁的端到端测试

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

use qfiber::{RWMutex, ReadScopedLock, Thread, WriteScopedLock};

/// 写锁保护的共享计数器
struct Counter {
    lock: RWMutex,
    value: UnsafeCell<u64>,
}

unsafe impl Sync for Counter {}

#[test]
fn write_locked_counter_has_no_lost_updates() {
    const THREADS: usize = 5;
    const INCREMENTS: usize = 100_000;

    let counter = Arc::new(Counter {
        lock: RWMutex::new(),
        value: UnsafeCell::new(0),
    });

    let mut threads = Vec::new();
    for i in 0..THREADS {
        let c = Arc::clone(&counter);
        let thread = Thread::spawn(
            move || {
                for _ in 0..INCREMENTS {
                    let _guard = WriteScopedLock::new(&c.lock);
                    unsafe { *c.value.get() += 1 };
                }
            },
            &format!("name_{i}"),
        )
        .unwrap();
        threads.push(thread);
    }

    for thread in &threads {
        thread.join().unwrap();
    }

    assert_eq!(unsafe { *counter.value.get() }, (THREADS * INCREMENTS) as u64);
}

#[test]
fn readers_overlap_and_writer_excludes() {
    const READERS: usize = 4;

    let rw = Arc::new(RWMutex::new());
    let active_readers = Arc::new(AtomicUsize::new(0));
    let max_readers = Arc::new(AtomicUsize::new(0));
    let writer_done = Arc::new(AtomicBool::new(false));
    // 所有读者持锁后集合一次，释放前再集合一次
    let acquired = Arc::new(Barrier::new(READERS + 1));
    let release = Arc::new(Barrier::new(READERS + 1));

    let mut readers = Vec::new();
    for i in 0..READERS {
        let rw = Arc::clone(&rw);
        let active = Arc::clone(&active_readers);
        let max = Arc::clone(&max_readers);
        let done = Arc::clone(&writer_done);
        let acquired = Arc::clone(&acquired);
        let release = Arc::clone(&release);
        readers.push(
            Thread::spawn(
                move || {
                    let guard = ReadScopedLock::new(&*rw);
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max.fetch_max(now, Ordering::SeqCst);
                    acquired.wait();
                    // 读锁尚未释放，写者不可能已经完成
                    assert!(!done.load(Ordering::SeqCst));
                    release.wait();
                    active.fetch_sub(1, Ordering::SeqCst);
                    drop(guard);
                },
                &format!("reader-{i}"),
            )
            .unwrap(),
        );
    }

    // 全部读者同时持有读锁
    acquired.wait();
    assert_eq!(active_readers.load(Ordering::SeqCst), READERS);

    let writer = {
        let rw = Arc::clone(&rw);
        let active = Arc::clone(&active_readers);
        let done = Arc::clone(&writer_done);
        Thread::spawn(
            move || {
                let _guard = WriteScopedLock::new(&*rw);
                // 写锁持有期间不存在任何读者
                assert_eq!(active.load(Ordering::SeqCst), 0);
                done.store(true, Ordering::SeqCst);
            },
            "writer",
        )
        .unwrap()
    };

    release.wait();

    for reader in &readers {
        reader.join().unwrap();
    }
    writer.join().unwrap();

    assert!(writer_done.load(Ordering::SeqCst));
    assert_eq!(max_readers.load(Ordering::SeqCst), READERS);
}

#[test]
fn thread_identity_is_final_after_spawn() {
    let reported = Arc::new(AtomicUsize::new(0));
    let r = Arc::clone(&reported);
    let thread = Thread::spawn(
        move || {
            r.store(qfiber::thread::os_thread_id() as usize, Ordering::Release);
            assert_eq!(Thread::name(), "handshake");
        },
        "handshake",
    )
    .unwrap();

    // 构造返回即为最终值，靠握手保证而不是时序
    assert_eq!(thread.thread_name(), "handshake");
    let seen = thread.os_id();
    assert_ne!(seen, 0);

    thread.join().unwrap();
    // 句柄记录的线程号与子线程自报的一致
    assert_eq!(reported.load(Ordering::Acquire) as u64, seen);
}
