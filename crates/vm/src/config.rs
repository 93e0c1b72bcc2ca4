//! 虚拟内存配置 trait 定义和注册

use core::sync::atomic::{AtomicUsize, Ordering};

/// 虚拟内存配置常量
///
/// 此 trait 提供虚拟内存子系统所需的配置常量。
/// os crate 需要实现此 trait 并注册。
pub trait VmConfig: Send + Sync {
    /// 页大小（通常为 4096）
    fn page_size(&self) -> usize;

    /// 用户地址空间上界（不包含），mmap 区域不能越过此地址
    fn user_space_end(&self) -> usize;
}

static CONFIG_DATA: AtomicUsize = AtomicUsize::new(0);
static CONFIG_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册配置实现
///
/// # Safety
/// 必须在单线程环境下调用；重复注册时必须传入同一个实例
pub unsafe fn register_config(config: &'static dyn VmConfig) {
    let ptr = config as *const dyn VmConfig;
    // SAFETY: 将 fat pointer 拆分为 data 和 vtable 两部分存储
    let (data, vtable) =
        unsafe { core::mem::transmute::<*const dyn VmConfig, (usize, usize)>(ptr) };
    CONFIG_VTABLE.store(vtable, Ordering::Release);
    CONFIG_DATA.store(data, Ordering::Release);
}

/// 获取已注册的配置实现
///
/// # Panics
/// 如果尚未调用 [`register_config`] 注册实现，则 panic
#[inline]
pub fn vm_config() -> &'static dyn VmConfig {
    let data = CONFIG_DATA.load(Ordering::Acquire);
    let vtable = CONFIG_VTABLE.load(Ordering::Acquire);
    if data == 0 {
        panic!("vm: VmConfig not registered");
    }
    // SAFETY: 重组 fat pointer
    unsafe { &*core::mem::transmute::<(usize, usize), *const dyn VmConfig>((data, vtable)) }
}

/// 获取页大小
#[inline]
pub(crate) fn page_size() -> usize {
    vm_config().page_size()
}
