//! 诊断模块
//!
//! 前置条件断言与回溯输出。库本身只通过 `tracing` 发出分级日志记录，
//! 不做任何格式化和路由，由外部日志子系统决定去向

use std::backtrace::Backtrace;

/// 捕获当前调用栈的文本形式
///
/// 捕获本身不会失败；运行环境未启用回溯时返回占位文本，
/// 不会因此影响进程
pub(crate) fn backtrace_string() -> String {
    Backtrace::force_capture().to_string()
}

/// 前置条件失败，发出错误日志并终止
///
/// 对应不可恢复的使用错误（恢复已终止的协程、销毁存活协程等），
/// 不是可重试的运行时条件
pub(crate) fn precondition_failed(what: &str) -> ! {
    tracing::error!(
        target: "qfiber",
        "ASSERTION: {}\nbacktrace:\n{}",
        what,
        backtrace_string()
    );
    panic!("precondition violated: {what}");
}

/// 前置条件断言
///
/// 条件不满足时输出带回溯的错误日志并 panic
macro_rules! precondition {
    ($cond:expr, $what:expr) => {
        if !$cond {
            $crate::diag::precondition_failed($what);
        }
    };
}

pub(crate) use precondition;
