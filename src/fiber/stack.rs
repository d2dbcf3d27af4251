//! 协程栈管理
//!
//! 为协程分配/释放独占的定长栈内存

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::diag::precondition;

/// 协程栈
///
/// 由单个协程独占，析构时释放。根协程复用线程原生栈，不持有本结构
pub struct Stack {
    /// 栈底（低地址）
    base: NonNull<u8>,
    /// 分配大小
    size: usize,
}

impl Stack {
    /// 栈对齐：16 字节
    const ALIGNMENT: usize = 16;

    /// 分配指定大小的栈
    ///
    /// 分配失败属于构造期资源失败，直接终止
    pub fn alloc(size: usize) -> Self {
        precondition!(size > 0, "fiber stack size must be non-zero");
        let layout = match Layout::from_size_align(size, Self::ALIGNMENT) {
            Ok(l) => l,
            Err(_) => crate::diag::precondition_failed("invalid fiber stack layout"),
        };

        let base = unsafe {
            let ptr = alloc::alloc(layout);
            if ptr.is_null() {
                alloc::handle_alloc_error(layout);
            }
            NonNull::new_unchecked(ptr)
        };

        Self { base, size }
    }

    /// 获取栈底地址
    #[inline]
    pub fn base(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// 获取栈顶地址（高地址，初始栈指针位置）
    #[inline]
    pub fn top(&self) -> *mut u8 {
        unsafe { self.base.as_ptr().add(self.size) }
    }

    /// 获取分配大小
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        if let Ok(layout) = Layout::from_size_align(self.size, Self::ALIGNMENT) {
            unsafe {
                alloc::dealloc(self.base.as_ptr(), layout);
            }
        }
    }
}
