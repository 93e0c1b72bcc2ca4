//! 文件映射：mmap / munmap / msync

use super::mmap_region::MmapRegion;
use super::space::MemorySpace;
use crate::VmFile;
use crate::address::{AlignOps, PageNum, UsizeConvert, Vaddr, Vpn};
use crate::config::{page_size, vm_config};
use crate::error::{VmError, VmResult};
use crate::page::{FileInitArgs, Page, PageBacking, PageContext};
use crate::page_table::PageTableInner;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cmp::min;

impl<PT: PageTableInner> MemorySpace<PT> {
    /// 把 `file` 从 `offset` 开始的内容映射到 `[addr, addr + length)`
    ///
    /// 只登记未初始化页，不做任何 I/O。映射持有文件的一个独立句柄，
    /// 调用者关闭自己的句柄不影响映射。超出文件末尾的部分读作零，且永远不会写回。
    ///
    /// # 错误
    ///
    /// - `InvalidAddress`：`addr` 为空或未对齐，或区间越过用户空间
    /// - `InvalidArgument`：`length` 为 0，`offset` 未对齐或映射末尾的文件偏移溢出
    /// - `AlreadyMapped`：区间内已有页
    /// - `IoError`：无法重新打开文件
    pub fn mmap(
        &mut self,
        addr: Vaddr,
        length: usize,
        writable: bool,
        file: &Arc<dyn VmFile>,
        offset: usize,
    ) -> VmResult<Vaddr> {
        let page_size = page_size();
        if addr.as_usize() == 0 || !addr.is_page_aligned() {
            return Err(VmError::InvalidAddress);
        }
        if length == 0 || offset % page_size != 0 {
            return Err(VmError::InvalidArgument);
        }

        let page_count = length.div_ceil(page_size);
        let span = page_count
            .checked_mul(page_size)
            .ok_or(VmError::InvalidAddress)?;
        let end = addr.checked_add(span).ok_or(VmError::InvalidAddress)?;
        if end.as_usize() > vm_config().user_space_end() {
            return Err(VmError::InvalidAddress);
        }
        // 每页的文件偏移都必须可表示
        if offset.checked_add(span).is_none() {
            return Err(VmError::InvalidArgument);
        }

        let start = Vpn::from_addr_floor(addr);
        if (0..page_count).any(|i| self.spt.contains(start.offset(i))) {
            log::warn!("mmap: [{:#x}, {:#x}) overlaps an existing mapping", addr, end);
            return Err(VmError::AlreadyMapped);
        }

        let file = file.reopen().map_err(|errno| {
            log::error!("mmap: reopen failed: errno {}", errno);
            VmError::IoError
        })?;

        let mut read_bytes = min(length, file.size().saturating_sub(offset));
        let mut pages = Vec::with_capacity(page_count);
        for i in 0..page_count {
            let page_read_bytes = min(read_bytes, page_size);
            let args = FileInitArgs::new(file.clone(), offset + i * page_size, page_read_bytes);
            pages.push(Page::new_uninit(start.offset(i), writable, args));
            read_bytes -= page_read_bytes;
        }
        self.spt.insert_all(pages)?;

        self.regions.insert(
            start,
            MmapRegion {
                start,
                page_count,
                file,
            },
        );

        log::debug!(
            "mmap: [{:#x}, {:#x}) offset {:#x} ({} pages, writable: {})",
            addr,
            end,
            offset,
            page_count,
            writable
        );
        Ok(addr)
    }

    /// 解除以 `addr` 为起始地址的映射
    ///
    /// 脏的驻留页先写回，然后销毁区间内的所有页，最后关闭映射自己的文件句柄。
    /// `addr` 不是某个映射的起始地址时返回 `NotMapped`。
    pub fn munmap(&mut self, addr: Vaddr) -> VmResult<()> {
        if !addr.is_page_aligned() {
            return Err(VmError::InvalidAddress);
        }

        let start = Vpn::from_addr_floor(addr);
        let region = self.regions.remove(&start).ok_or(VmError::NotMapped)?;

        let mut ctx = PageContext::new(&mut self.page_table, &self.frames, self.asid);
        for vpn in region.pages() {
            if let Some(mut page) = self.spt.remove(vpn) {
                page.destroy(&mut ctx);
            }
        }

        log::debug!("munmap: {:#x} ({} pages)", addr, region.page_count);
        Ok(())
    }

    /// 把以 `addr` 为起始地址的映射中所有脏的驻留页写回文件，页保持驻留
    ///
    /// 返回写回的页数。
    pub fn msync(&mut self, addr: Vaddr) -> VmResult<usize> {
        if !addr.is_page_aligned() {
            return Err(VmError::InvalidAddress);
        }

        let start = Vpn::from_addr_floor(addr);
        let region = self.regions.get(&start).ok_or(VmError::NotMapped)?;

        let mut ctx = PageContext::new(&mut self.page_table, &self.frames, self.asid);
        let mut written = 0;
        for vpn in region.pages() {
            let Some(page) = self.spt.find(vpn) else {
                continue;
            };
            if let (Some(ppn), PageBacking::File(file_page)) = (page.frame(), page.backing()) {
                if file_page.sync(vpn, ppn, &mut ctx)? {
                    written += 1;
                }
            }
        }
        Ok(written)
    }

    /// 包含 `addr` 的映射
    pub fn region(&self, addr: Vaddr) -> Option<&MmapRegion> {
        let vpn = Vpn::from_addr_floor(addr);
        self.regions
            .range(..=vpn)
            .next_back()
            .map(|(_, region)| region)
            .filter(|region| region.contains(vpn))
    }

    /// 所有映射，按起始地址排序
    pub fn regions(&self) -> impl Iterator<Item = &MmapRegion> {
        self.regions.values()
    }
}
