//! 同步原语模块
//!
//! 互斥锁、自旋锁、读写锁、计数信号量及其作用域守卫，
//! 用于保护跨线程共享的计数器和注册表。
//!
//! 约束：任何锁都不得跨协程挂起点持有——让出前必须释放，
//! 否则下一个换入的协程若竞争同一把锁会直接死锁

pub mod mutex;
pub mod rwmutex;
pub mod semaphore;

use thiserror::Error;

pub use mutex::{Mutex, NullMutex, RawLock, ScopedLock, SpinLock};
pub use rwmutex::{NullRWMutex, RWMutex, RawSharedLock, ReadScopedLock, WriteScopedLock};
pub use semaphore::Semaphore;

/// 同步原语运行期错误
///
/// 底层原语构造/析构失败是致命的，不会以错误值形式出现
#[derive(Debug, Error)]
pub enum SyncError {
    /// 等待信号量失败
    #[error("sem_wait failed (errno {errno})")]
    SemWait { errno: i32 },
    /// 通知信号量失败
    #[error("sem_post failed (errno {errno})")]
    SemNotify { errno: i32 },
}

/// 默认互斥锁，`null-locks` 特性下切换为空实现，调用点不变
#[cfg(not(feature = "null-locks"))]
pub type DefaultMutex = Mutex;

/// 默认互斥锁（空实现）
#[cfg(feature = "null-locks")]
pub type DefaultMutex = NullMutex;

/// 默认读写锁，`null-locks` 特性下切换为空实现，调用点不变
#[cfg(not(feature = "null-locks"))]
pub type DefaultRWMutex = RWMutex;

/// 默认读写锁（空实现）
#[cfg(feature = "null-locks")]
pub type DefaultRWMutex = NullRWMutex;
