//! 页表抽象模块
//!
//! 本模块定义了虚拟内存子系统对硬件页表的最小需求：
//! 建立/解除单页映射、地址翻译、查询与清除脏位。
//! 具体的页表格式与 TLB 细节由各架构实现。
//!
//! 实现者需保证：页表项被解除后 [`PageTableInner::is_dirty`] 返回 false，
//! 重新建立的映射脏位为空。

use crate::address::{Ppn, Vpn};
use crate::error::VmResult;
use bitflags::bitflags;

bitflags! {
    /// 与架构无关的页表项标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PteFlags: usize {
        /// 有效位
        const VALID = 1 << 0;
        /// 可读
        const READ = 1 << 1;
        /// 可写
        const WRITE = 1 << 2;
        /// 可执行
        const EXECUTE = 1 << 3;
        /// 用户态可访问
        const USER = 1 << 4;
        /// 已访问
        const ACCESSED = 1 << 6;
        /// 已修改（脏）
        const DIRTY = 1 << 7;
    }
}

impl PteFlags {
    /// 用户页的默认标志
    pub fn user(writable: bool) -> Self {
        let flags = PteFlags::VALID | PteFlags::READ | PteFlags::USER;
        if writable {
            flags | PteFlags::WRITE
        } else {
            flags
        }
    }
}

/// 页表内部接口
///
/// 此 trait 定义了页表的核心操作，由具体架构实现。
/// 调用者持有所属地址空间的锁（`&mut`），因此这些操作彼此不会交错。
pub trait PageTableInner {
    /// 创建新的空页表
    fn new() -> Self
    where
        Self: Sized;

    /// 映射虚拟页到物理页；虚拟页已映射时返回 `AlreadyMapped`
    fn map(&mut self, vpn: Vpn, ppn: Ppn, flags: PteFlags) -> VmResult<()>;

    /// 解除映射；虚拟页未映射时返回 `NotMapped`
    fn unmap(&mut self, vpn: Vpn) -> VmResult<()>;

    /// 翻译虚拟页，返回物理页号与标志
    fn translate(&self, vpn: Vpn) -> Option<(Ppn, PteFlags)>;

    /// 虚拟页自上次加载或写回后是否被修改过；未映射时为 false
    fn is_dirty(&self, vpn: Vpn) -> bool;

    /// 设置或清除脏位；未映射时无操作
    fn set_dirty(&mut self, vpn: Vpn, dirty: bool);
}
