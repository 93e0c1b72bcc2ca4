//! 页号抽象模块
//!
//! 页号是地址空间中页 (Page) 的索引，它将内存管理抽象与底层硬件地址解耦。

use super::{AlignOps, Paddr, UsizeConvert, Vaddr};
use crate::config::page_size;

/// 表示一个页号的 Trait。所有页号类型 (如 Ppn 和 Vpn) 必须实现此 Trait。
pub trait PageNum: UsizeConvert + Copy + Eq + Ord {
    /// 此页号类型关联的地址类型（例如 Ppn 关联 Paddr，Vpn 关联 Vaddr）。
    type TAddress: AlignOps;

    /// 向后偏移给定页数，得到新的页号。
    fn offset(self, pages: usize) -> Self {
        Self::from_usize(self.as_usize() + pages)
    }

    /// 将地址转换为页号 (向下取整，即包含该地址的页)。
    fn from_addr_floor(addr: Self::TAddress) -> Self {
        Self::from_usize(addr.as_usize() / page_size())
    }

    /// 将地址转换为页号 (向上取整，未对齐的地址指向下一页)。
    fn from_addr_ceil(addr: Self::TAddress) -> Self {
        Self::from_usize(addr.align_up_to_page().as_usize() / page_size())
    }

    /// 获取该页号对应的起始地址。
    fn start_addr(self) -> Self::TAddress {
        Self::TAddress::from_usize(self.as_usize() * page_size())
    }
}

macro_rules! impl_page_num {
    ($type:ty, $addr_type:ty) => {
        impl UsizeConvert for $type {
            fn as_usize(&self) -> usize {
                self.0
            }

            fn from_usize(value: usize) -> Self {
                Self(value)
            }
        }

        impl PageNum for $type {
            type TAddress = $addr_type;
        }
    };
}

/// 物理页号，对应物理地址 (Paddr)。
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Ppn(pub usize);
impl_page_num!(Ppn, Paddr);

/// 虚拟页号，对应虚拟地址 (Vaddr)。
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Vpn(pub usize);
impl_page_num!(Vpn, Vaddr);
