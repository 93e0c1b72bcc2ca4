//! 架构相关内存管理操作 trait 定义和注册

use core::sync::atomic::{AtomicUsize, Ordering};

/// 架构相关内存管理操作
///
/// 此 trait 抽象了架构特定的内存操作，包括地址转换和 TLB 管理。
/// os crate 需要为具体架构实现此 trait。
pub trait ArchVmOps: Send + Sync {
    /// 将物理地址转换为虚拟地址（直接映射区域）
    fn paddr_to_vaddr(&self, paddr: usize) -> usize;

    /// 刷新单个用户虚拟页的 TLB 条目
    fn flush_tlb(&self, vaddr: usize);
}

static ARCH_OPS_DATA: AtomicUsize = AtomicUsize::new(0);
static ARCH_OPS_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册架构操作实现
///
/// # Safety
/// 必须在单线程环境下调用；重复注册时必须传入同一个实例
pub unsafe fn register_arch_ops(ops: &'static dyn ArchVmOps) {
    let ptr = ops as *const dyn ArchVmOps;
    // SAFETY: 将 fat pointer 拆分为 data 和 vtable 两部分存储
    let (data, vtable) =
        unsafe { core::mem::transmute::<*const dyn ArchVmOps, (usize, usize)>(ptr) };
    ARCH_OPS_VTABLE.store(vtable, Ordering::Release);
    ARCH_OPS_DATA.store(data, Ordering::Release);
}

/// 获取已注册的架构操作实现
///
/// # Panics
/// 如果尚未调用 [`register_arch_ops`] 注册实现，则 panic
#[inline]
pub fn arch_ops() -> &'static dyn ArchVmOps {
    let data = ARCH_OPS_DATA.load(Ordering::Acquire);
    let vtable = ARCH_OPS_VTABLE.load(Ordering::Acquire);
    if data == 0 {
        panic!("vm: ArchVmOps not registered");
    }
    // SAFETY: 重组 fat pointer
    unsafe { &*core::mem::transmute::<(usize, usize), *const dyn ArchVmOps>((data, vtable)) }
}
