//! qfiber —— 有栈协程与线程同步原语
//!
//! 核心组件：
//! - Fiber: 协作式有栈协程，独立调用栈 + 显式换入/换出
//! - Thread: 操作系统线程句柄，带启动握手
//! - sync: 互斥锁、自旋锁、读写锁、信号量及作用域守卫
//!
//! 线程之间抢占式并行；线程内协程严格串行，只在显式的
//! swap 调用处切换。协程不跨线程迁移。本库不包含调度器，
//! 外部调度器作为协作方按自己的策略调用换入/换出

pub mod config;
pub(crate) mod diag;
pub mod fiber;
pub mod sync;
pub mod thread;

pub use fiber::{Fiber, FiberError, FiberId, State};
pub use sync::{
    DefaultMutex, DefaultRWMutex, Mutex, NullMutex, NullRWMutex, RWMutex, RawLock,
    RawSharedLock, ReadScopedLock, ScopedLock, Semaphore, SpinLock, SyncError,
    WriteScopedLock,
};
pub use thread::{Thread, ThreadError};
