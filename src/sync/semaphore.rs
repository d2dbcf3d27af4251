//! 计数信号量
//!
//! 封装 POSIX 无名信号量。底层原语构造/析构失败没有合法的
//! 半构造状态，直接终止；存活对象上的等待/通知失败交由调用方

use std::cell::UnsafeCell;

use super::SyncError;

/// 计数信号量
///
/// `wait` 阻塞到计数大于零后减一，`notify` 加一并唤醒一个等待者
pub struct Semaphore {
    sem: UnsafeCell<libc::sem_t>,
}

// sem_t 本身就是跨线程原语
unsafe impl Send for Semaphore {}
unsafe impl Sync for Semaphore {}

impl Semaphore {
    /// 创建信号量，初始计数为 `count`
    pub fn new(count: u32) -> Self {
        let sem = UnsafeCell::new(unsafe { std::mem::zeroed() });
        let ret = unsafe { libc::sem_init(sem.get(), 0, count) };
        if ret != 0 {
            crate::diag::precondition_failed("sem_init failed");
        }
        Self { sem }
    }

    /// 获取信号量，计数为零时阻塞
    ///
    /// 被信号打断时自动重试
    pub fn wait(&self) -> Result<(), SyncError> {
        loop {
            let ret = unsafe { libc::sem_wait(self.sem.get()) };
            if ret == 0 {
                return Ok(());
            }
            let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
            if errno == libc::EINTR {
                continue;
            }
            return Err(SyncError::SemWait { errno });
        }
    }

    /// 释放信号量，唤醒一个等待者
    pub fn notify(&self) -> Result<(), SyncError> {
        let ret = unsafe { libc::sem_post(self.sem.get()) };
        if ret != 0 {
            let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
            return Err(SyncError::SemNotify { errno });
        }
        Ok(())
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            libc::sem_destroy(self.sem.get());
        }
    }
}
