//! 帧表模块
//!
//! 帧表是全局的物理帧列表，记录每个正在使用的帧被多少个虚拟页引用，
//! 以及其中一个"代表页"（写回或解除映射时据此找到虚拟地址）。
//!
//! ## 引用计数
//!
//! 所有引用计数的修改都集中在这里：
//!
//! - [`FrameTable::alloc`]：分配新帧，引用计数为 1
//! - [`FrameTable::share`]：又一个页绑定到已驻留的帧，引用计数加 1
//! - [`FrameTable::release`]：一个页不再使用该帧，引用计数减 1，
//!   减到 0 时把帧移出帧表并归还分配器
//!
//! 因此调用点不会忘记递减，也不会重复释放同一帧。
//! 帧表内部由自旋锁保护，上述操作彼此原子。

use crate::address::{Ppn, Vpn};
use crate::error::{VmError, VmResult};
use crate::frame_allocator::FrameAllocator;
use alloc::collections::btree_map::BTreeMap;
use alloc::sync::Arc;
use lazy_static::lazy_static;
use sync::SpinLock;

/// 帧的代表页：哪个地址空间的哪个虚拟页
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameOwner {
    /// 地址空间标识
    pub asid: usize,
    /// 虚拟页号
    pub vpn: Vpn,
}

/// 帧表中的一个物理帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    ppn: Ppn,
    ref_count: usize,
    owner: Option<FrameOwner>,
}

impl Frame {
    /// 物理页号
    pub fn ppn(&self) -> Ppn {
        self.ppn
    }

    /// 当前引用该帧的页数
    pub fn ref_count(&self) -> usize {
        self.ref_count
    }

    /// 代表页；代表页被换出或销毁后为 None
    pub fn owner(&self) -> Option<FrameOwner> {
        self.owner
    }
}

/// [`FrameTable::release`] 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRelease {
    /// 帧仍被其他页共享，携带剩余的引用计数
    Shared(usize),
    /// 最后一个引用已释放，帧已归还分配器
    Freed,
}

struct FrameTableInner {
    allocator: FrameAllocator,
    frames: BTreeMap<Ppn, Frame>,
}

/// 全局帧表
pub struct FrameTable {
    inner: SpinLock<FrameTableInner>,
}

impl FrameTable {
    /// 创建一个空帧表，分配总是失败直到调用 [`FrameTable::init`]
    pub fn new() -> Self {
        FrameTable {
            inner: SpinLock::new(FrameTableInner {
                allocator: FrameAllocator::new(),
                frames: BTreeMap::new(),
            }),
        }
    }

    /// 创建一个管理 `[start_addr, end_addr)` 物理内存的帧表
    pub fn with_range(start_addr: usize, end_addr: usize) -> Self {
        let table = Self::new();
        table.init(start_addr, end_addr);
        table
    }

    /// 设置可用的物理内存范围
    ///
    /// 只能在帧表中没有帧时调用。
    pub fn init(&self, start_addr: usize, end_addr: usize) {
        let mut inner = self.inner.lock();
        debug_assert!(inner.frames.is_empty(), "FrameTable::init: frames in use");
        inner.allocator.init(start_addr, end_addr);
    }

    /// 分配一个清零的帧并加入帧表，引用计数为 1，代表页为 `owner`
    ///
    /// 物理内存耗尽时返回 None；选择牺牲帧由调用者负责。
    pub fn alloc(&self, owner: FrameOwner) -> Option<Ppn> {
        let mut inner = self.inner.lock();
        let ppn = inner.allocator.alloc_frame()?;
        inner.frames.insert(
            ppn,
            Frame {
                ppn,
                ref_count: 1,
                owner: Some(owner),
            },
        );
        Some(ppn)
    }

    /// 又一个页绑定到已驻留的帧，返回新的引用计数
    pub fn share(&self, ppn: Ppn) -> VmResult<usize> {
        let mut inner = self.inner.lock();
        let frame = inner.frames.get_mut(&ppn).ok_or(VmError::NotPresent)?;
        frame.ref_count += 1;
        Ok(frame.ref_count)
    }

    /// `owner` 页不再使用该帧
    ///
    /// 引用计数减到 0 时帧被移出帧表并归还分配器；
    /// 否则若 `owner` 是代表页，则清除代表页。
    pub fn release(&self, ppn: Ppn, owner: FrameOwner) -> VmResult<FrameRelease> {
        let mut inner = self.inner.lock();
        let frame = inner.frames.get_mut(&ppn).ok_or(VmError::NotPresent)?;
        frame.ref_count -= 1;
        if frame.ref_count > 0 {
            if frame.owner == Some(owner) {
                frame.owner = None;
            }
            return Ok(FrameRelease::Shared(frame.ref_count));
        }

        inner.frames.remove(&ppn);
        inner.allocator.dealloc_frame(ppn);
        Ok(FrameRelease::Freed)
    }

    /// 若 `owner` 是帧的代表页则清除它，返回是否清除
    pub fn clear_owner(&self, ppn: Ppn, owner: FrameOwner) -> bool {
        let mut inner = self.inner.lock();
        match inner.frames.get_mut(&ppn) {
            Some(frame) if frame.owner == Some(owner) => {
                frame.owner = None;
                true
            }
            _ => false,
        }
    }

    /// 帧的快照
    pub fn get(&self, ppn: Ppn) -> Option<Frame> {
        self.inner.lock().frames.get(&ppn).cloned()
    }

    /// 帧的引用计数；帧不在帧表中时为 None
    pub fn ref_count(&self, ppn: Ppn) -> Option<usize> {
        self.inner.lock().frames.get(&ppn).map(|f| f.ref_count)
    }

    /// 帧的代表页
    pub fn owner(&self, ppn: Ppn) -> Option<FrameOwner> {
        self.inner.lock().frames.get(&ppn).and_then(|f| f.owner)
    }

    /// 帧是否在帧表中
    pub fn contains(&self, ppn: Ppn) -> bool {
        self.inner.lock().frames.contains_key(&ppn)
    }

    /// 帧表中的帧数
    pub fn len(&self) -> usize {
        self.inner.lock().frames.len()
    }

    /// 帧表是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 获取分配器的当前状态
    /// # 返回值
    /// - 总帧数
    /// - 已分配的帧数
    /// - 空闲的帧数
    pub fn stats(&self) -> (usize, usize, usize) {
        let inner = self.inner.lock();
        (
            inner.allocator.total_frames(),
            inner.allocator.allocated_frames(),
            inner.allocator.free_frames(),
        )
    }
}

impl Default for FrameTable {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static! {
    /// 内核全局帧表
    static ref FRAME_TABLE: Arc<FrameTable> = Arc::new(FrameTable::new());
}

/// 使用可用的物理内存范围初始化全局帧表。
///
/// # 参数
///
/// * `start_addr` - 可用物理内存的起始地址
/// * `end_addr` - 可用物理内存的结束地址
pub fn init_frame_table(start_addr: usize, end_addr: usize) {
    FRAME_TABLE.init(start_addr, end_addr);
}

/// 获取全局帧表
pub fn frame_table() -> Arc<FrameTable> {
    FRAME_TABLE.clone()
}
