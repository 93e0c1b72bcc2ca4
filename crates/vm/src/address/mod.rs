//! 地址模块
//!
//! 此模块提供了物理地址、虚拟地址以及页号的抽象。
//!
//! # 地址类型
//!
//! - [`Paddr`] - 物理地址类型
//! - [`Vaddr`] - 虚拟地址类型
//!
//! # 页号
//!
//! - [`PageNum`] - 表示页号的 Trait
//! - [`Ppn`] - 物理页号（Physical Page Number）
//! - [`Vpn`] - 虚拟页号（Virtual Page Number）
//!
//! # 操作
//!
//! - [`UsizeConvert`] - 在类型和 usize 之间进行转换
//! - [`AlignOps`] - 地址对齐操作
pub mod page_num;

pub use page_num::{PageNum, Ppn, Vpn};

use crate::config::page_size;

/// 在类型和 usize 之间进行转换
pub trait UsizeConvert: Sized {
    /// 转换为 usize
    fn as_usize(&self) -> usize;
    /// 从 usize 构造
    fn from_usize(value: usize) -> Self;
}

/// 地址对齐操作
pub trait AlignOps: UsizeConvert {
    /// 是否按页对齐
    fn is_page_aligned(&self) -> bool {
        self.page_offset() == 0
    }

    /// 页内偏移
    fn page_offset(&self) -> usize {
        self.as_usize() & (page_size() - 1)
    }

    /// 向下对齐到页边界
    fn align_down_to_page(&self) -> Self {
        Self::from_usize(self.as_usize() & !(page_size() - 1))
    }

    /// 向上对齐到页边界
    fn align_up_to_page(&self) -> Self {
        let mask = page_size() - 1;
        Self::from_usize((self.as_usize() + mask) & !mask)
    }
}

macro_rules! impl_address {
    ($type:ty) => {
        impl UsizeConvert for $type {
            fn as_usize(&self) -> usize {
                self.0
            }

            fn from_usize(value: usize) -> Self {
                Self(value)
            }
        }

        impl AlignOps for $type {}

        impl core::fmt::LowerHex for $type {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::LowerHex::fmt(&self.0, f)
            }
        }
    };
}

/// 物理地址
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Paddr(pub usize);
impl_address!(Paddr);

/// 虚拟地址
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Vaddr(pub usize);
impl_address!(Vaddr);

impl Vaddr {
    /// 按字节偏移得到新地址，溢出时返回 None
    pub fn checked_add(self, bytes: usize) -> Option<Self> {
        self.0.checked_add(bytes).map(Self)
    }
}
