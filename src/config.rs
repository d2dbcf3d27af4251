//! 配置项模块
//!
//! 维护库内可配置的命名参数。取值在首次读取时固定为快照，
//! 之后修改外部环境不会影响已创建的对象

use std::sync::OnceLock;

/// 协程栈默认大小：128KB
pub const DEFAULT_STACK_SIZE: usize = 128 * 1024;

/// `fiber.stack_size` 对应的环境变量名
pub const STACK_SIZE_ENV: &str = "QFIBER_STACK_SIZE";

/// 栈大小快照
static STACK_SIZE: OnceLock<usize> = OnceLock::new();

/// 获取协程默认栈大小（字节）
///
/// 首次调用时读取环境变量 `QFIBER_STACK_SIZE`，缺失或非法时
/// 回退到 [`DEFAULT_STACK_SIZE`]，之后的调用都返回同一快照
pub fn fiber_stack_size() -> usize {
    *STACK_SIZE.get_or_init(|| {
        std::env::var(STACK_SIZE_ENV)
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|&v| v > 0)
            .unwrap_or(DEFAULT_STACK_SIZE)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_size_snapshot() {
        let first = fiber_stack_size();
        assert!(first > 0);
        // 快照语义：重复读取返回同一个值
        assert_eq!(fiber_stack_size(), first);
    }
}
