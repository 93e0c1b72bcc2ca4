//! 文件映射虚拟内存子系统
//!
//! 负责把进程地址空间中的一段区域映射到文件上：
//! `mmap` 时只登记未初始化页，首次访问时由缺页处理把文件内容读入物理帧，
//! 内存紧张时把脏页写回文件并回收帧，`munmap` 或进程退出时销毁整段映射。
//!
//! # 组成
//!
//! - [`address`]: 地址与页号类型
//! - [`frame_allocator`]: 位图物理帧分配器
//! - [`frame_table`]: 全局帧表，集中管理帧的引用计数与代表页
//! - [`page_table`]: 硬件页表抽象（映射、解除映射、脏位）
//! - [`page`]: 多态页（未初始化页 / 文件页）及其三种操作
//! - [`memory_space`]: 地址空间、补充页表与 mmap/munmap
//!
//! # 架构解耦
//!
//! 通过 trait 抽象与架构特定组件解耦：
//! - [`ArchVmOps`]: 物理地址到内核虚拟地址的转换、TLB 刷新
//! - [`VmConfig`]: 页大小与用户地址空间上界
//! - [`VmFile`]: 映射所需的最小文件接口
//!
//! 使用前必须调用 [`register_arch_ops`] 和 [`register_config`] 注册实现。

#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod arch_ops;
mod config;
mod error;
mod file;

pub mod address;
pub mod frame_allocator;
pub mod frame_table;
pub mod memory_space;
pub mod page;
pub mod page_table;

#[cfg(test)]
mod tests;

pub use arch_ops::{ArchVmOps, arch_ops, register_arch_ops};
pub use config::{VmConfig, register_config, vm_config};
pub use error::{VmError, VmResult};
pub use file::VmFile;

// Re-export 常用类型
pub use address::{AlignOps, PageNum, Paddr, Ppn, UsizeConvert, Vaddr, Vpn};
pub use frame_allocator::FrameAllocator;
pub use frame_table::{Frame, FrameOwner, FrameRelease, FrameTable, frame_table, init_frame_table};
pub use memory_space::{MemorySpace, MmapRegion, SupplementalPageTable};
pub use page::{FileInitArgs, FilePage, Page, PageBacking, PageContext, PageKind, PageOps, UninitPage};
pub use page_table::{PageTableInner, PteFlags};
