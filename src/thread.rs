//! 线程模块
//!
//! 包装操作系统线程，通过启动信号量保证构造返回时
//! 子线程的线程本地身份（名字、OS 线程号）已经就位

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use thiserror::Error;

use crate::sync::Semaphore;

/// 未命名线程的占位名
pub const UNNAMED: &str = "UNKNOWN";

/// 线程操作错误
#[derive(Debug, Error)]
pub enum ThreadError {
    /// 系统线程创建失败
    #[error("thread spawn failed: {0}")]
    Spawn(#[source] std::io::Error),
    /// 等待线程结束失败
    #[error("thread join failed: {name}")]
    Join { name: String },
    /// 启动握手失败
    #[error("thread startup handshake failed: {0}")]
    Handshake(#[source] crate::sync::SyncError),
}

thread_local! {
    /// 当前线程所属的句柄
    static CURRENT: RefCell<Option<Arc<Thread>>> = const { RefCell::new(None) };
    /// 当前线程名缓存
    static NAME: RefCell<String> = RefCell::new(String::from(UNNAMED));
}

/// 线程句柄
///
/// 构造即启动。构造函数阻塞在就绪信号量上，返回后
/// `os_id`/`thread_name` 反映子线程安装完成的最终值
pub struct Thread {
    /// OS 线程句柄，join 时取走
    handle: Mutex<Option<JoinHandle<()>>>,
    /// OS 级线程号，由子线程在握手前写入
    os_id: AtomicU64,
    /// 线程名，`set_name` 在所属线程内调用时同步更新
    name: Mutex<String>,
    /// 就绪信号量
    ready: Semaphore,
}

impl Thread {
    /// 创建并启动线程
    ///
    /// 空名字替换为 [`UNNAMED`]。创建失败时对象不成立，
    /// 立即以错误返回
    pub fn spawn<F>(cb: F, name: &str) -> Result<Arc<Self>, ThreadError>
    where
        F: FnOnce() + Send + 'static,
    {
        let name = if name.is_empty() { UNNAMED } else { name };

        let thread = Arc::new(Self {
            handle: Mutex::new(None),
            os_id: AtomicU64::new(0),
            name: Mutex::new(name.to_string()),
            ready: Semaphore::new(0),
        });

        let entry = Arc::clone(&thread);
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || Self::run(entry, cb))
            .map_err(ThreadError::Spawn)?;

        *thread.handle.lock() = Some(handle);

        // 等子线程装好线程本地身份，消除启动竞态
        thread.ready.wait().map_err(ThreadError::Handshake)?;
        Ok(thread)
    }

    /// 子线程入口：安装身份，握手，然后执行回调
    fn run<F>(this: Arc<Self>, cb: F)
    where
        F: FnOnce(),
    {
        let name = this.name.lock().clone();
        this.os_id.store(os_thread_id(), Ordering::Release);
        CURRENT.with(|c| *c.borrow_mut() = Some(Arc::clone(&this)));
        NAME.with(|n| *n.borrow_mut() = name.clone());
        set_os_thread_name(&name);

        if this.ready.notify().is_err() {
            // 握手失败时构造方收不到信号，没有继续执行的意义
            tracing::error!(target: "qfiber", "thread {} handshake notify failed", name);
            std::process::abort();
        }
        drop(this);

        cb();
    }

    /// 等待线程结束
    ///
    /// 已结束或已 join 过时为幂等空操作
    pub fn join(&self) -> Result<(), ThreadError> {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                let name = self.name.lock().clone();
                tracing::error!(target: "qfiber", "Thread join fail--name= {}", name);
                return Err(ThreadError::Join { name });
            }
        }
        Ok(())
    }

    /// 获取 OS 级线程号
    #[inline]
    pub fn os_id(&self) -> u64 {
        self.os_id.load(Ordering::Acquire)
    }

    /// 获取句柄中存储的线程名
    pub fn thread_name(&self) -> String {
        self.name.lock().clone()
    }

    /// 获取当前线程所属的句柄
    ///
    /// 当前线程不是由 [`Thread::spawn`] 创建时返回 None
    pub fn current() -> Option<Arc<Self>> {
        CURRENT.with(|c| c.borrow().clone())
    }

    /// 获取当前线程名
    pub fn name() -> String {
        NAME.with(|n| n.borrow().clone())
    }

    /// 设置当前线程名
    ///
    /// 空名字直接忽略；若当前线程属于某个句柄，同时更新
    /// 句柄中存储的名字
    pub fn set_name(name: &str) {
        if name.is_empty() {
            return;
        }
        if let Some(thread) = Self::current() {
            *thread.name.lock() = name.to_string();
        }
        NAME.with(|n| *n.borrow_mut() = name.to_string());
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        // 未 join 的线程分离运行，句柄析构不阻塞进程
        let _ = self.handle.lock().take();
    }
}

impl std::fmt::Debug for Thread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thread")
            .field("name", &self.thread_name())
            .field("os_id", &self.os_id())
            .finish()
    }
}

/// 获取 OS 级线程号
#[cfg(target_os = "linux")]
pub fn os_thread_id() -> u64 {
    unsafe { libc::syscall(libc::SYS_gettid) as u64 }
}

/// 获取 OS 级线程号
#[cfg(all(unix, not(target_os = "linux")))]
pub fn os_thread_id() -> u64 {
    unsafe { libc::pthread_self() as u64 }
}

/// 按 UTF-8 边界把线程名截到 `max` 字节以内
///
/// 内核的限制是字节数而不是字符数，超限会让 setname 整体失败
fn truncate_name(name: &str, max: usize) -> &str {
    let mut end = name.len().min(max);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// 设置 OS 级线程名，超长部分截断（内核限制 15 字节）
#[cfg(target_os = "linux")]
fn set_os_thread_name(name: &str) {
    if let Ok(cname) = std::ffi::CString::new(truncate_name(name, 15)) {
        unsafe {
            libc::pthread_setname_np(libc::pthread_self(), cname.as_ptr());
        }
    }
}

#[cfg(all(unix, not(target_os = "linux")))]
fn set_os_thread_name(_name: &str) {}
