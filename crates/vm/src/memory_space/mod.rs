//! 内存空间模块
//!
//! 本模块定义了内存空间（Memory Space）的相关结构和功能：
//! 补充页表、mmap 映射记录，以及缺页、换出、mmap/munmap 等地址空间操作。

mod mmap;
mod mmap_region;
mod space;
mod spt;

pub use mmap_region::MmapRegion;
pub use space::MemorySpace;
pub use spt::SupplementalPageTable;
