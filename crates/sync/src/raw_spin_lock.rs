//! 关中断自旋锁的底层实现
//!
//! [`RawSpinLock`] 实现 `lock_api::RawMutex`，上层的 [`crate::SpinLock`]
//! 只是 `lock_api::Mutex` 的类型别名。

use crate::arch_ops;
use core::{
    hint,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};
use lock_api::{GuardNoSend, RawMutex};

/// 自旋锁结构体，提供互斥访问临界区的能力。
///
/// 加锁时先在本地 CPU 禁用中断，再原子地获取锁；
/// 之前的中断状态保存在锁内部，解锁时恢复。
/// 不可重入 (即不能嵌套获取同一把锁)。
///
/// 嵌套持有多把锁时必须按获取的逆序释放，否则中断状态会被错误恢复。
#[derive(Debug)]
pub struct RawSpinLock {
    lock: AtomicBool,
    /// 获取锁之前的中断状态，仅由持锁者读写
    saved_flags: AtomicUsize,
}

impl RawSpinLock {
    /// 创建一个新的 RawSpinLock 实例。
    pub const fn new() -> Self {
        RawSpinLock {
            lock: AtomicBool::new(false),
            saved_flags: AtomicUsize::new(0),
        }
    }

    /// 检查锁是否被占用 (仅用于调试/测试)
    pub fn is_held(&self) -> bool {
        self.lock.load(Ordering::Relaxed)
    }
}

impl Default for RawSpinLock {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl RawMutex for RawSpinLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = RawSpinLock::new();

    // 中断状态属于本地 CPU，guard 不能跨线程移动
    type GuardMarker = GuardNoSend;

    fn lock(&self) {
        // SAFETY: 恢复操作在 unlock 中与之配对
        let flags = unsafe { arch_ops().read_and_disable_interrupts() };

        while self
            .lock
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            hint::spin_loop();
        }

        self.saved_flags.store(flags, Ordering::Relaxed);
    }

    fn try_lock(&self) -> bool {
        // SAFETY: 失败时立即恢复，成功时在 unlock 中恢复
        let flags = unsafe { arch_ops().read_and_disable_interrupts() };

        if self
            .lock
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            self.saved_flags.store(flags, Ordering::Relaxed);
            true
        } else {
            // SAFETY: flags 来自上面的 read_and_disable_interrupts
            unsafe { arch_ops().restore_interrupts(flags) };
            false
        }
    }

    unsafe fn unlock(&self) {
        let flags = self.saved_flags.load(Ordering::Relaxed);
        self.lock.store(false, Ordering::Release);
        // SAFETY: flags 来自与本次 unlock 配对的 lock/try_lock
        unsafe { arch_ops().restore_interrupts(flags) };
    }

    fn is_locked(&self) -> bool {
        self.is_held()
    }
}
