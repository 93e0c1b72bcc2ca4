//! mmap 映射记录

use crate::VmFile;
use crate::address::{PageNum, Vpn};
use alloc::sync::Arc;

/// 一次 mmap 建立的连续文件页
///
/// 记录确切的起始页与页数，munmap 据此拆除，而不是逐页探测直到遇到空洞。
pub struct MmapRegion {
    /// 起始虚拟页号
    pub start: Vpn,
    /// 页数
    pub page_count: usize,
    /// 映射私有的文件句柄（由 mmap 重新打开）
    pub file: Arc<dyn VmFile>,
}

impl MmapRegion {
    /// 结束虚拟页号（不包含）
    pub fn end(&self) -> Vpn {
        self.start.offset(self.page_count)
    }

    /// 按顺序遍历映射中的虚拟页号
    pub fn pages(&self) -> impl Iterator<Item = Vpn> + use<> {
        let start = self.start;
        (0..self.page_count).map(move |i| start.offset(i))
    }

    /// 是否包含虚拟页号
    pub fn contains(&self, vpn: Vpn) -> bool {
        vpn >= self.start && vpn < self.end()
    }
}

// 手动实现 Debug，因为 dyn VmFile 没有实现 Debug
impl core::fmt::Debug for MmapRegion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MmapRegion")
            .field("start", &self.start)
            .field("page_count", &self.page_count)
            .field("file", &"<dyn VmFile>")
            .finish()
    }
}
