//! 协程模块
//!
//! 有栈协作式协程：独立调用栈 + 显式挂起/恢复。
//!
//! 每个线程首次使用时惰性创建一个根协程，代表线程原生栈；
//! `swap_in`/`swap_out` 始终在当前协程与根协程之间交接控制权。
//! 协程不跨线程迁移，只在创建/上次运行它的线程上换入换出，
//! 切换只发生在显式调用处，线程内没有任何抢占

pub mod context;
pub mod stack;

use std::any::Any;
use std::cell::{Cell, RefCell, UnsafeCell};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

use crate::config;
use crate::diag::precondition;
use context::{EntryFn, ExecutionContext};
use stack::Stack;

/// 协程 ID 类型
pub type FiberId = u64;

/// 协程回调类型
type FiberFn = Box<dyn FnOnce()>;

/// 协程运行期错误
///
/// 仅覆盖存活对象上的操作失败；构造期失败与前置条件违例
/// 都是致命的，不会以错误值形式出现
#[derive(Debug, Error)]
pub enum FiberError {
    /// 上下文切换失败
    #[error("swapcontext failed (errno {errno})")]
    ContextSwap { errno: i32 },
}

/// 协程状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
    /// 初始化完毕，尚未运行
    Init = 0,
    /// 主动挂起，等待显式恢复
    Hold = 1,
    /// 正在运行
    Exec = 2,
    /// 回调正常返回
    Term = 3,
    /// 已让出，可以再次调度
    Ready = 4,
    /// 回调内发生未恢复的失败
    Except = 5,
}

/// 协程 ID 分配器，进程内单调递增，0 保留给根协程
static NEXT_FIBER_ID: AtomicU64 = AtomicU64::new(1);

/// 存活协程计数，构造加一、析构减一，用于诊断与泄漏检测
static LIVE_FIBERS: AtomicU64 = AtomicU64::new(0);

thread_local! {
    /// 当前线程正在运行的协程
    static CURRENT: RefCell<Option<Rc<Fiber>>> = const { RefCell::new(None) };
    /// 当前线程的根协程，首次使用时惰性创建
    static ROOT: RefCell<Option<Rc<Fiber>>> = const { RefCell::new(None) };
}

/// 协程
///
/// 通过 `Rc<Fiber>` 持有，不跨线程共享（`!Send`）。所有可变
/// 状态都只在所属线程上访问，内部可变性借助 `Cell`/`RefCell`
pub struct Fiber {
    /// 协程唯一 ID
    id: FiberId,
    /// 协程状态
    state: Cell<State>,
    /// 独占的协程栈，根协程为 None
    stack: Option<Stack>,
    /// 执行上下文
    ///
    /// 切换时需要同时取得两个协程的上下文指针，借用期横跨
    /// 整个挂起区间，因此放进 UnsafeCell 以裸指针操作
    ctx: UnsafeCell<ExecutionContext>,
    /// 入口回调，进入协程时取出消费
    cb: RefCell<Option<FiberFn>>,
    /// 是否安装调用者模式入口
    ///
    /// 为外部调度器的调用约定预留，本库内两种入口行为一致
    use_caller: bool,
}

impl Fiber {
    /// 创建用户协程
    ///
    /// `stack_size` 为 0 时读取 `fiber.stack_size` 配置快照。
    /// 栈分配或上下文捕获失败属于构造期失败，直接终止
    pub fn new<F>(cb: F, stack_size: usize, use_caller: bool) -> Rc<Self>
    where
        F: FnOnce() + 'static,
    {
        let id = NEXT_FIBER_ID.fetch_add(1, Ordering::Relaxed);
        LIVE_FIBERS.fetch_add(1, Ordering::Relaxed);

        let size = if stack_size == 0 {
            config::fiber_stack_size()
        } else {
            stack_size
        };
        let stack = Stack::alloc(size);

        let mut ctx = ExecutionContext::capture();
        let entry: EntryFn = if use_caller {
            Self::caller_entry
        } else {
            Self::main_entry
        };
        ctx.bind_stack(&stack, entry);

        tracing::debug!(target: "qfiber", "Fiber::new id={} stack={}", id, size);

        Rc::new(Self {
            id,
            state: Cell::new(State::Init),
            stack: Some(stack),
            ctx: UnsafeCell::new(ctx),
            cb: RefCell::new(Some(Box::new(cb))),
            use_caller,
        })
    }

    /// 创建根协程，包装调用线程当前的执行流
    fn new_root() -> Self {
        LIVE_FIBERS.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(target: "qfiber", "Fiber::new root");
        Self {
            id: 0,
            state: Cell::new(State::Exec),
            stack: None,
            ctx: UnsafeCell::new(ExecutionContext::capture()),
            cb: RefCell::new(None),
            use_caller: false,
        }
    }

    /// 取得当前线程的根协程，不存在时创建并注册
    fn ensure_root() -> Rc<Self> {
        if let Some(root) = ROOT.with(|r| r.borrow().clone()) {
            return root;
        }
        let root = Rc::new(Self::new_root());
        ROOT.with(|r| *r.borrow_mut() = Some(root.clone()));
        CURRENT.with(|c| {
            let mut cur = c.borrow_mut();
            if cur.is_none() {
                *cur = Some(root.clone());
            }
        });
        root
    }

    /// 获取当前线程正在运行的协程
    ///
    /// 线程上还没有协程时返回惰性创建的根协程
    pub fn current() -> Rc<Self> {
        if let Some(cur) = CURRENT.with(|c| c.borrow().clone()) {
            return cur;
        }
        Self::ensure_root()
    }

    /// 获取当前协程 ID
    ///
    /// 线程上还没有任何协程运行过时返回 0，不会触发根协程创建
    pub fn current_id() -> FiberId {
        CURRENT.with(|c| c.borrow().as_ref().map_or(0, |f| f.id))
    }

    /// 获取存活协程总数
    pub fn total() -> u64 {
        LIVE_FIBERS.load(Ordering::Relaxed)
    }

    /// 获取协程 ID
    #[inline]
    pub fn id(&self) -> FiberId {
        self.id
    }

    /// 获取协程状态
    #[inline]
    pub fn state(&self) -> State {
        self.state.get()
    }

    /// 获取栈大小，根协程为 0
    #[inline]
    pub fn stack_size(&self) -> usize {
        self.stack.as_ref().map_or(0, |s| s.size())
    }

    /// 是否为根协程
    #[inline]
    pub fn is_root(&self) -> bool {
        self.stack.is_none()
    }

    /// 换入：恢复本协程执行
    ///
    /// 仅允许 Init/Hold/Ready 状态（恢复 Exec/Term/Except 是致命的
    /// 前置条件违例）。保存根协程上下文并恢复本协程，调用同步阻塞，
    /// 直到控制权通过后续切换回到调用方才返回
    pub fn swap_in(self: &Rc<Self>) -> Result<(), FiberError> {
        let prev = self.state.get();
        precondition!(
            matches!(prev, State::Init | State::Hold | State::Ready),
            "swap_in on a fiber that is not resumable"
        );

        let root = Self::ensure_root();
        let prev_current =
            CURRENT.with(|c| c.borrow_mut().replace(self.clone()));
        self.state.set(State::Exec);

        let save = root.ctx.get();
        let restore = self.ctx.get();
        let ret = unsafe { ExecutionContext::swap(&mut *save, &*restore) };
        if ret.is_err() {
            // 切换未发生，撤销状态变更；调用方不一定是根协程，
            // 恢复的是换入前的当前协程而不是根协程
            self.state.set(prev);
            CURRENT.with(|c| *c.borrow_mut() = prev_current);
        }
        ret
    }

    /// 换出：保存本协程上下文并恢复根协程
    ///
    /// 状态由调用方在换出前设置（让出助手或入口收尾）
    fn swap_out(&self) -> Result<(), FiberError> {
        let root = Self::ensure_root();
        CURRENT.with(|c| *c.borrow_mut() = Some(root.clone()));

        let save = self.ctx.get();
        let restore = root.ctx.get();
        unsafe { ExecutionContext::swap(&mut *save, &*restore) }
    }

    /// 当前协程让出并置为 Ready
    ///
    /// 这是仅有的两个挂起点之一，线程内不存在隐式抢占
    pub fn yield_to_ready() -> Result<(), FiberError> {
        Self::yield_with(State::Ready)
    }

    /// 当前协程让出并置为 Hold
    pub fn yield_to_hold() -> Result<(), FiberError> {
        Self::yield_with(State::Hold)
    }

    fn yield_with(next: State) -> Result<(), FiberError> {
        let cur = Self::current();
        precondition!(!cur.is_root(), "yield outside of a fiber");
        precondition!(
            cur.state.get() == State::Exec,
            "yield from a fiber that is not executing"
        );

        cur.state.set(next);
        let ret = cur.swap_out();
        if ret.is_err() {
            // 切换未发生，协程仍在运行
            cur.state.set(State::Exec);
            CURRENT.with(|c| *c.borrow_mut() = Some(cur.clone()));
        }
        ret
    }

    /// 重置协程：复用既有栈，安装新的回调与入口
    ///
    /// 仅允许 Init/Term/Except 状态；Hold/Ready/Exec 下重置以及
    /// 重置根协程都是致命的前置条件违例
    pub fn reset<F>(&self, cb: F)
    where
        F: FnOnce() + 'static,
    {
        let Some(stack) = &self.stack else {
            crate::diag::precondition_failed("reset on the root fiber");
        };
        precondition!(
            matches!(self.state.get(), State::Init | State::Term | State::Except),
            "reset on a live fiber"
        );

        let entry: EntryFn = if self.use_caller {
            Self::caller_entry
        } else {
            Self::main_entry
        };
        // 重置只在协程未运行时发生，当前线程独占上下文
        unsafe {
            let ctx = &mut *self.ctx.get();
            *ctx = ExecutionContext::capture();
            ctx.bind_stack(stack, entry);
        }
        *self.cb.borrow_mut() = Some(Box::new(cb));
        self.state.set(State::Init);
    }

    /// 协程入口（普通模式）
    extern "C" fn main_entry() {
        Self::run_entry();
    }

    /// 协程入口（调用者模式）
    ///
    /// 行为与 [`Self::main_entry`] 一致，独立入口保留给外部调度器
    /// 区分返回目标的调用约定
    extern "C" fn caller_entry() {
        Self::run_entry();
    }

    /// 入口公共逻辑：消费回调，收尾后切回恢复者
    fn run_entry() {
        let cur = Self::current();
        let cb = cur.cb.borrow_mut().take();
        let Some(cb) = cb else {
            crate::diag::precondition_failed("fiber entered without a callback");
        };

        match catch_unwind(AssertUnwindSafe(cb)) {
            Ok(()) => {
                cur.state.set(State::Term);
                tracing::debug!(target: "qfiber", "fiber {} finished", cur.id);
            }
            Err(err) => {
                // 回调内的未恢复失败不波及宿主线程，协程留在
                // Except 状态供诊断检视
                cur.state.set(State::Except);
                tracing::error!(
                    target: "qfiber",
                    "fiber {} failed: {}\nbacktrace:\n{}",
                    cur.id,
                    panic_message(err.as_ref()),
                    crate::diag::backtrace_string()
                );
            }
        }

        // 切回前释放本地强引用，协程的存活由创建者的句柄保证
        let raw = Rc::as_ptr(&cur);
        drop(cur);
        let ret = unsafe { (*raw).swap_out() };
        if let Err(e) = ret {
            tracing::error!(target: "qfiber", "terminal swap_out failed: {}", e);
            std::process::abort();
        }
        unreachable!("fiber resumed after termination");
    }
}

impl Drop for Fiber {
    fn drop(&mut self) {
        LIVE_FIBERS.fetch_sub(1, Ordering::Relaxed);

        if self.stack.is_some() {
            // 持栈协程只能在 Init/Term/Except 下释放
            let st = self.state.get();
            if !matches!(st, State::Init | State::Term | State::Except) {
                crate::diag::precondition_failed("dropping a live fiber");
            }
        } else {
            // 根协程：回调必须已消费，状态保持 Exec
            if self.cb.borrow().is_some() || self.state.get() != State::Exec {
                crate::diag::precondition_failed("root fiber dropped in invalid state");
            }
            let this = self as *const Fiber;
            // 线程退出时 CURRENT 可能已析构，尽力清理即可
            let _ = CURRENT.try_with(|c| {
                if let Ok(mut cur) = c.try_borrow_mut() {
                    if cur.as_deref().is_some_and(|f| std::ptr::eq(f, this)) {
                        *cur = None;
                    }
                }
            });
        }

        tracing::debug!(target: "qfiber", "Fiber::drop id={} total={}", self.id, Self::total());
    }
}

impl std::fmt::Debug for Fiber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fiber")
            .field("id", &self.id)
            .field("state", &self.state.get())
            .field("stack_size", &self.stack_size())
            .finish()
    }
}

/// 提取 panic 载荷中的文本
fn panic_message(err: &(dyn Any + Send)) -> &str {
    if let Some(s) = err.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = err.downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    }
}
