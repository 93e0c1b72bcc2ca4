//! 内存管理相关操作的 Mock 实现
//!
//! 注意：这里不直接依赖 `vm` crate（避免循环依赖）。
//! `vm` crate 在 `cfg(test)` 下为这些类型实现其 trait（例如 `ArchVmOps` / `VmConfig`）。

use core::sync::atomic::{AtomicUsize, Ordering};

/// Mock 的内存管理架构操作
///
/// 默认实现采用"恒等映射"（vaddr == paddr），测试把一块堆内存的地址
/// 直接当作物理内存交给帧分配器。
pub struct MockVmOps {
    /// 已执行的单页 TLB 刷新次数
    pub tlb_flushes: AtomicUsize,
}

impl MockVmOps {
    pub const fn new() -> Self {
        Self {
            tlb_flushes: AtomicUsize::new(0),
        }
    }

    /// 将物理地址转换为虚拟地址（测试默认：恒等映射）
    pub fn paddr_to_vaddr(&self, paddr: usize) -> usize {
        paddr
    }

    /// 刷新单页 TLB（测试默认：只计数）
    pub fn flush_tlb(&self, _vaddr: usize) {
        self.tlb_flushes.fetch_add(1, Ordering::Relaxed);
    }
}

/// 全局 Mock 实例
pub static MOCK_VM_OPS: MockVmOps = MockVmOps::new();

/// Mock 的内存管理配置
pub struct MockVmConfig;

impl MockVmConfig {
    pub const fn new() -> Self {
        Self
    }

    pub fn page_size(&self) -> usize {
        4096
    }

    /// 用户地址空间上界（Sv39 低半区）
    pub fn user_space_end(&self) -> usize {
        0x40_0000_0000
    }
}

/// 全局 Mock 实例
pub static MOCK_VM_CONFIG: MockVmConfig = MockVmConfig::new();
