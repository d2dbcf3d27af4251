//! 协程执行上下文
//!
//! 封装平台相关的寄存器上下文保存/恢复（POSIX ucontext），
//! 协程模块其余部分不感知底层机制

#[cfg(not(unix))]
compile_error!("qfiber only supports unix platforms (ucontext backend)");

use std::mem::MaybeUninit;
use std::ptr;

use super::stack::Stack;
use super::FiberError;

/// 协程入口函数类型
///
/// 入口不携带参数，通过线程本地的当前协程槽取得自身
pub type EntryFn = extern "C" fn();

/// 执行上下文
///
/// 独占持有一份 `ucontext_t`。glibc 的 `uc_mcontext.fpregs` 指向
/// 结构体自身内部，捕获后不允许移动，因此放在堆上
pub struct ExecutionContext {
    inner: Box<libc::ucontext_t>,
}

impl ExecutionContext {
    /// 捕获当前执行状态
    ///
    /// 构造期的 `getcontext` 失败无法得到合法对象，直接终止
    pub fn capture() -> Self {
        let mut inner: Box<MaybeUninit<libc::ucontext_t>> = Box::new(MaybeUninit::zeroed());
        let ret = unsafe { libc::getcontext(inner.as_mut_ptr()) };
        if ret != 0 {
            crate::diag::precondition_failed("getcontext failed");
        }
        // getcontext 成功后内容已完整初始化
        let inner = unsafe { Box::from_raw(Box::into_raw(inner) as *mut libc::ucontext_t) };
        Self { inner }
    }

    /// 将上下文绑定到指定栈与入口函数
    ///
    /// 之后恢复该上下文时会在 `stack` 上从 `entry` 开始执行
    pub fn bind_stack(&mut self, stack: &Stack, entry: EntryFn) {
        self.inner.uc_link = ptr::null_mut();
        self.inner.uc_stack.ss_sp = stack.base() as *mut libc::c_void;
        self.inner.uc_stack.ss_size = stack.size();
        self.inner.uc_stack.ss_flags = 0;
        unsafe {
            libc::makecontext(&mut *self.inner, entry, 0);
        }
    }

    /// 上下文切换
    ///
    /// 保存当前执行状态到 `save` 并恢复 `restore`，调用在控制权
    /// 切回之前不会返回。存活对象上的切换失败交由调用方处理
    ///
    /// # Safety
    ///
    /// `restore` 必须是已捕获的上下文，且绑定的栈（如有）仍然存活；
    /// 两个上下文都只能在其所属线程上使用
    pub unsafe fn swap(save: &mut ExecutionContext, restore: &ExecutionContext) -> Result<(), FiberError> {
        let ret = libc::swapcontext(
            &mut *save.inner,
            &*restore.inner as *const libc::ucontext_t,
        );
        if ret != 0 {
            let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
            return Err(FiberError::ContextSwap { errno });
        }
        Ok(())
    }
}
