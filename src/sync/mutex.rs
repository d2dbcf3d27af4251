//! 互斥锁
//!
//! 排他锁及其作用域守卫。守卫内部维护"当前持有"标记，
//! 重复 lock/unlock 幂等，析构时沿任何退出路径释放且不会重复解锁

use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_utils::Backoff;
use parking_lot::lock_api::RawMutex as _;

/// 排他锁接口
///
/// [`ScopedLock`] 通过该接口对各种互斥实现生效
pub trait RawLock {
    /// 上锁
    fn lock(&self);

    /// 解锁
    ///
    /// 必须与本线程先前的 `lock` 配对，守卫负责保证
    fn unlock(&self);
}

/// 互斥锁
pub struct Mutex {
    raw: parking_lot::RawMutex,
}

impl Mutex {
    /// 创建互斥锁
    pub const fn new() -> Self {
        Self {
            raw: parking_lot::RawMutex::INIT,
        }
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl RawLock for Mutex {
    #[inline]
    fn lock(&self) {
        self.raw.lock();
    }

    #[inline]
    fn unlock(&self) {
        unsafe { self.raw.unlock() }
    }
}

/// 自旋锁
///
/// 短临界区用，竞争时退避自旋而不陷入内核
pub struct SpinLock {
    locked: AtomicBool,
}

impl SpinLock {
    /// 创建自旋锁
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }
}

impl Default for SpinLock {
    fn default() -> Self {
        Self::new()
    }
}

impl RawLock for SpinLock {
    fn lock(&self) {
        let backoff = Backoff::new();
        loop {
            if self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
            while self.locked.load(Ordering::Relaxed) {
                backoff.snooze();
            }
        }
    }

    #[inline]
    fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

/// 空互斥锁
///
/// 接口相同、实现为空的可替换变体，单线程构建下消除加锁开销
#[derive(Default)]
pub struct NullMutex;

impl NullMutex {
    /// 创建空锁
    pub const fn new() -> Self {
        Self
    }
}

impl RawLock for NullMutex {
    #[inline]
    fn lock(&self) {}

    #[inline]
    fn unlock(&self) {}
}

/// 排他锁作用域守卫
///
/// 构造即上锁，析构时若仍持有则解锁。显式 `unlock` 后可以
/// 再次 `lock`，重复调用幂等
pub struct ScopedLock<'a, T: RawLock> {
    lock: &'a T,
    held: bool,
}

impl<'a, T: RawLock> ScopedLock<'a, T> {
    /// 上锁并创建守卫
    pub fn new(lock: &'a T) -> Self {
        lock.lock();
        Self { lock, held: true }
    }

    /// 上锁，已持有时为空操作
    pub fn lock(&mut self) {
        if !self.held {
            self.lock.lock();
            self.held = true;
        }
    }

    /// 解锁，未持有时为空操作
    pub fn unlock(&mut self) {
        if self.held {
            self.lock.unlock();
            self.held = false;
        }
    }

    /// 是否当前持有锁
    #[inline]
    pub fn is_held(&self) -> bool {
        self.held
    }
}

impl<T: RawLock> Drop for ScopedLock<'_, T> {
    fn drop(&mut self) {
        self.unlock();
    }
}
