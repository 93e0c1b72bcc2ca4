//! 帧分配器模块
//!
//! 本模块提供物理内存帧的分配功能。
//!
//! ## 分配策略（位图）
//!
//! 分配器使用位图（bitmap）跟踪每个物理帧的分配状态：
//!
//! - **bitmap**：每个 bit 表示一个物理帧（0=空闲，1=已分配）
//! - **last_alloc_hint**：上次分配位置提示，利用局部性加速查找
//!
//! 单帧分配从 last_alloc_hint 开始循环查找第一个空闲位；
//! 释放时直接清除对应 bit，O(1) 操作。
//!
//! 分配器本身不记录帧的归属与引用计数，这些由 [`crate::frame_table::FrameTable`]
//! 统一管理；分配器实例也由帧表持有，而不是全局单例。

use crate::address::{Paddr, PageNum, Ppn, UsizeConvert};
use crate::arch_ops::arch_ops;
use crate::config::page_size;
use alloc::vec::Vec;

// ============================================================================
// 辅助函数
// ============================================================================

/// 通过直接映射区域访问一个物理帧的全部字节。
///
/// # Safety
/// `ppn` 必须是一个已分配的帧，并且调用者在返回的切片存活期间
/// 不会通过其他途径访问同一帧。
pub(crate) unsafe fn frame_bytes<'a>(ppn: Ppn) -> &'a mut [u8] {
    let va = arch_ops().paddr_to_vaddr(ppn.start_addr().as_usize());
    unsafe { core::slice::from_raw_parts_mut(va as *mut u8, page_size()) }
}

/// 将指定的物理页帧清零。
fn clear_frame(ppn: Ppn) {
    // SAFETY: 帧刚被分配，尚未交给任何页
    unsafe { frame_bytes(ppn) }.fill(0);
}

// ============================================================================
// 位图帧分配器
// ============================================================================

/// 物理帧分配器。
/// 采用位图策略跟踪每个物理帧的分配状态。
#[derive(Debug)]
pub struct FrameAllocator {
    /// 物理帧的起始 Ppn。
    start: Ppn,
    /// 物理帧的结束 Ppn (不包含)。
    end: Ppn,
    /// 位图数据（每个 bit 表示一个帧：0=空闲，1=已分配）。
    bitmap: Vec<u64>,
    /// 总帧数。
    total_frames: usize,
    /// 已分配帧数（用于快速统计）。
    allocated_count: usize,
    /// 上次分配的位置提示（用于加速单帧分配）。
    last_alloc_hint: usize,
}

impl FrameAllocator {
    /// 创建一个未初始化的帧分配器，分配总是失败直到调用 [`FrameAllocator::init`]。
    pub const fn new() -> Self {
        FrameAllocator {
            start: Ppn(usize::MAX),
            end: Ppn(usize::MAX),
            bitmap: Vec::new(),
            total_frames: 0,
            allocated_count: 0,
            last_alloc_hint: 0,
        }
    }

    /// 初始化帧分配器，设置可用的物理内存范围。
    ///
    /// 起始地址向上取整、结束地址向下取整到页边界。
    pub fn init(&mut self, start_addr: usize, end_addr: usize) {
        let start = Ppn::from_addr_ceil(Paddr::from_usize(start_addr));
        let end = Ppn::from_addr_floor(Paddr::from_usize(end_addr));

        self.start = start;
        self.end = end;
        self.total_frames = end.as_usize().saturating_sub(start.as_usize());
        self.bitmap = alloc::vec![0u64; self.total_frames.div_ceil(64)];
        self.allocated_count = 0;
        self.last_alloc_hint = 0;
    }

    /// 检查帧是否空闲
    #[inline]
    fn is_free(&self, frame_idx: usize) -> bool {
        let word_idx = frame_idx / 64;
        let bit_idx = frame_idx % 64;
        (self.bitmap[word_idx] & (1u64 << bit_idx)) == 0
    }

    /// 标记帧为已分配
    #[inline]
    fn mark_allocated(&mut self, frame_idx: usize) {
        self.bitmap[frame_idx / 64] |= 1u64 << (frame_idx % 64);
    }

    /// 标记帧为空闲
    #[inline]
    fn mark_free(&mut self, frame_idx: usize) {
        self.bitmap[frame_idx / 64] &= !(1u64 << (frame_idx % 64));
    }

    /// 分配一个物理帧，返回的帧已清零。
    pub fn alloc_frame(&mut self) -> Option<Ppn> {
        let bitmap_len = self.bitmap.len();
        if bitmap_len == 0 {
            return None;
        }

        // 循环查找：[hint, end) + [0, hint)
        for offset in 0..bitmap_len {
            let idx = (self.last_alloc_hint + offset) % bitmap_len;
            let word = self.bitmap[idx];

            if word == u64::MAX {
                continue;
            }

            let frame_idx = idx * 64 + (!word).trailing_zeros() as usize;
            // 最后一个字的高位不对应真实的帧
            if frame_idx >= self.total_frames {
                continue;
            }

            self.mark_allocated(frame_idx);
            self.allocated_count += 1;
            self.last_alloc_hint = idx;

            let ppn = self.start.offset(frame_idx);
            clear_frame(ppn);
            return Some(ppn);
        }

        None // 内存耗尽
    }

    /// 回收一个物理帧。
    pub fn dealloc_frame(&mut self, ppn: Ppn) {
        debug_assert!(
            ppn >= self.start && ppn < self.end,
            "dealloc_frame: frame out of range"
        );

        let frame_idx = ppn.as_usize() - self.start.as_usize();

        debug_assert!(
            !self.is_free(frame_idx),
            "dealloc_frame: double free detected"
        );

        self.mark_free(frame_idx);
        self.allocated_count -= 1;
    }

    /// 获取总的物理帧数
    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    /// 获取已分配的帧数
    pub fn allocated_frames(&self) -> usize {
        self.allocated_count
    }

    /// 获取空闲的帧数
    pub fn free_frames(&self) -> usize {
        self.total_frames - self.allocated_count
    }
}

impl Default for FrameAllocator {
    fn default() -> Self {
        Self::new()
    }
}
