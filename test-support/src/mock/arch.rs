//! 架构相关操作的 Mock 实现

use core::sync::atomic::{AtomicBool, Ordering};

/// Mock 架构操作
///
/// 用一个原子布尔值模拟本地 CPU 的中断使能位。
pub struct MockArchOps {
    pub interrupt_state: AtomicBool,
}

impl MockArchOps {
    pub const fn new() -> Self {
        Self {
            interrupt_state: AtomicBool::new(true),
        }
    }
}

impl sync::ArchOps for MockArchOps {
    unsafe fn read_and_disable_interrupts(&self) -> usize {
        self.interrupt_state.swap(false, Ordering::SeqCst) as usize
    }

    unsafe fn restore_interrupts(&self, flags: usize) {
        self.interrupt_state.store(flags != 0, Ordering::SeqCst);
    }
}

/// 全局 Mock 实例
pub static MOCK_ARCH_OPS: MockArchOps = MockArchOps::new();

/// 向 sync crate 注册 Mock 架构操作
pub fn register_sync_mock() {
    // SAFETY: MOCK_ARCH_OPS 是 'static 的
    unsafe { sync::register_arch_ops(&MOCK_ARCH_OPS) };
}
