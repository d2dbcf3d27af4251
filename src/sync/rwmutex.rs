//! 读写锁
//!
//! 共享读/排他写锁，配套独立的读守卫与写守卫。任意数量的读守卫
//! 可以同时持有；写守卫排斥一切并发读写

use parking_lot::lock_api::RawRwLock as _;

/// 读写锁接口
///
/// 读写守卫通过该接口对真实实现与空实现生效
pub trait RawSharedLock {
    /// 读上锁（共享）
    fn read_lock(&self);

    /// 读解锁
    ///
    /// 必须与本线程先前的 `read_lock` 配对，守卫负责保证
    fn read_unlock(&self);

    /// 写上锁（排他）
    fn write_lock(&self);

    /// 写解锁
    ///
    /// 必须与本线程先前的 `write_lock` 配对，守卫负责保证
    fn write_unlock(&self);
}

/// 读写锁
pub struct RWMutex {
    raw: parking_lot::RawRwLock,
}

impl RWMutex {
    /// 创建读写锁
    pub const fn new() -> Self {
        Self {
            raw: parking_lot::RawRwLock::INIT,
        }
    }
}

impl Default for RWMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl RawSharedLock for RWMutex {
    #[inline]
    fn read_lock(&self) {
        self.raw.lock_shared();
    }

    #[inline]
    fn read_unlock(&self) {
        unsafe { self.raw.unlock_shared() }
    }

    #[inline]
    fn write_lock(&self) {
        self.raw.lock_exclusive();
    }

    #[inline]
    fn write_unlock(&self) {
        unsafe { self.raw.unlock_exclusive() }
    }
}

/// 空读写锁
///
/// 接口相同、实现为空的可替换变体
#[derive(Default)]
pub struct NullRWMutex;

impl NullRWMutex {
    /// 创建空读写锁
    pub const fn new() -> Self {
        Self
    }
}

impl RawSharedLock for NullRWMutex {
    #[inline]
    fn read_lock(&self) {}

    #[inline]
    fn read_unlock(&self) {}

    #[inline]
    fn write_lock(&self) {}

    #[inline]
    fn write_unlock(&self) {}
}

/// 读作用域守卫
pub struct ReadScopedLock<'a, T: RawSharedLock> {
    lock: &'a T,
    held: bool,
}

impl<'a, T: RawSharedLock> ReadScopedLock<'a, T> {
    /// 读上锁并创建守卫
    pub fn new(lock: &'a T) -> Self {
        lock.read_lock();
        Self { lock, held: true }
    }

    /// 读上锁，已持有时为空操作
    pub fn lock(&mut self) {
        if !self.held {
            self.lock.read_lock();
            self.held = true;
        }
    }

    /// 解锁，未持有时为空操作
    pub fn unlock(&mut self) {
        if self.held {
            self.lock.read_unlock();
            self.held = false;
        }
    }

    /// 是否当前持有锁
    #[inline]
    pub fn is_held(&self) -> bool {
        self.held
    }
}

impl<T: RawSharedLock> Drop for ReadScopedLock<'_, T> {
    fn drop(&mut self) {
        self.unlock();
    }
}

/// 写作用域守卫
pub struct WriteScopedLock<'a, T: RawSharedLock> {
    lock: &'a T,
    held: bool,
}

impl<'a, T: RawSharedLock> WriteScopedLock<'a, T> {
    /// 写上锁并创建守卫
    pub fn new(lock: &'a T) -> Self {
        lock.write_lock();
        Self { lock, held: true }
    }

    /// 写上锁，已持有时为空操作
    pub fn lock(&mut self) {
        if !self.held {
            self.lock.write_lock();
            self.held = true;
        }
    }

    /// 解锁，未持有时为空操作
    pub fn unlock(&mut self) {
        if self.held {
            self.lock.write_unlock();
            self.held = false;
        }
    }

    /// 是否当前持有锁
    #[inline]
    pub fn is_held(&self) -> bool {
        self.held
    }
}

impl<T: RawSharedLock> Drop for WriteScopedLock<'_, T> {
    fn drop(&mut self) {
        self.unlock();
    }
}
