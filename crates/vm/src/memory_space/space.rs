//! 内存空间核心实现

use core::cmp::min;
use core::sync::atomic::{AtomicUsize, Ordering};

use super::mmap_region::MmapRegion;
use super::spt::SupplementalPageTable;
use crate::address::{AlignOps, PageNum, Vaddr, Vpn};
use crate::config::page_size;
use crate::error::{VmError, VmResult};
use crate::frame_allocator::frame_bytes;
use crate::frame_table::{FrameOwner, FrameTable};
use crate::page::PageContext;
use crate::page_table::PageTableInner;
use alloc::collections::btree_map::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;

/// 地址空间标识分配器
static NEXT_ASID: AtomicUsize = AtomicUsize::new(1);

/// 表示地址空间的内存空间结构体
///
/// 持有 `&mut MemorySpace` 即持有该地址空间的锁：
/// 脏位查询、写回、清脏位、解除绑定这一串操作不会与同一地址空间的缺页交错。
pub struct MemorySpace<PT: PageTableInner> {
    /// 地址空间标识，用于帧的代表页
    pub(super) asid: usize,

    /// 与此内存空间关联的页表
    pub(super) page_table: PT,

    /// 补充页表
    pub(super) spt: SupplementalPageTable,

    /// mmap 映射记录，以起始虚拟页号为键
    pub(super) regions: BTreeMap<Vpn, MmapRegion>,

    /// 物理帧来源
    pub(super) frames: Arc<FrameTable>,
}

impl<PT: PageTableInner> MemorySpace<PT> {
    /// 创建一个新的空内存空间，从 `frames` 获取物理帧
    pub fn new(frames: Arc<FrameTable>) -> Self {
        MemorySpace {
            asid: NEXT_ASID.fetch_add(1, Ordering::Relaxed),
            page_table: PT::new(),
            spt: SupplementalPageTable::new(),
            regions: BTreeMap::new(),
            frames,
        }
    }

    /// 地址空间标识
    pub fn asid(&self) -> usize {
        self.asid
    }

    /// 返回页表的引用
    pub fn page_table(&self) -> &PT {
        &self.page_table
    }

    /// 返回页表的可变引用
    pub fn page_table_mut(&mut self) -> &mut PT {
        &mut self.page_table
    }

    /// 返回补充页表的引用
    pub fn spt(&self) -> &SupplementalPageTable {
        &self.spt
    }

    /// 返回帧表
    pub fn frames(&self) -> &Arc<FrameTable> {
        &self.frames
    }

    /// 处理缺页
    ///
    /// 地址不属于任何页时返回 `NotMapped`，写只读页时返回 `PermissionDenied`，
    /// 由调用者决定是否终止进程。
    pub fn handle_page_fault(&mut self, vaddr: Vaddr, write: bool) -> VmResult<()> {
        let vpn = Vpn::from_addr_floor(vaddr);
        let page = self.spt.find(vpn).ok_or(VmError::NotMapped)?;
        if write && !page.writable() {
            return Err(VmError::PermissionDenied);
        }
        self.claim_page(vaddr)
    }

    /// 让包含 `vaddr` 的页驻留：分配帧、换入内容、建立硬件映射
    ///
    /// 页已驻留时直接返回。物理帧耗尽时先换出本地址空间中一个独占帧的页再重试一次。
    pub fn claim_page(&mut self, vaddr: Vaddr) -> VmResult<()> {
        let vpn = Vpn::from_addr_floor(vaddr);
        let page = self.spt.find(vpn).ok_or(VmError::NotMapped)?;
        if page.is_resident() {
            return Ok(());
        }

        let owner = FrameOwner {
            asid: self.asid,
            vpn,
        };
        let ppn = match self.frames.alloc(owner) {
            Some(ppn) => ppn,
            None => {
                self.evict_victim(vpn)?;
                self.frames.alloc(owner).ok_or(VmError::OutOfMemory)?
            }
        };

        let page = self.spt.find_mut(vpn).ok_or(VmError::NotMapped)?;
        if let Err(err) = page.swap_in(ppn) {
            if let Err(release_err) = self.frames.release(ppn, owner) {
                log::error!(
                    "Frame {:?} of page {:?} not in frame table: {:?}",
                    ppn,
                    vpn,
                    release_err
                );
            }
            return Err(err);
        }

        let flags = page.pte_flags();
        if let Err(err) = self.page_table.map(vpn, ppn, flags) {
            let mut ctx = PageContext::new(&mut self.page_table, &self.frames, self.asid);
            page.destroy(&mut ctx);
            return Err(err);
        }
        Ok(())
    }

    /// 换出包含 `vaddr` 的页，并把它对帧的引用交还帧表
    ///
    /// 写回失败时页保持驻留，返回 `IoError`。
    pub fn evict_page(&mut self, vaddr: Vaddr) -> VmResult<()> {
        let vpn = Vpn::from_addr_floor(vaddr);
        let page = self.spt.find_mut(vpn).ok_or(VmError::NotMapped)?;
        let ppn = page.frame().ok_or(VmError::NotPresent)?;

        let mut ctx = PageContext::new(&mut self.page_table, &self.frames, self.asid);
        page.swap_out(&mut ctx)?;

        self.frames.release(ppn, ctx.owner(vpn))?;
        Ok(())
    }

    /// 选出并换出一个牺牲页：虚拟地址最小的、独占其帧的驻留页（`except` 除外）
    fn evict_victim(&mut self, except: Vpn) -> VmResult<()> {
        let victim = self
            .spt
            .iter()
            .filter(|page| page.vpn() != except)
            .find(|page| {
                page.frame()
                    .is_some_and(|ppn| self.frames.ref_count(ppn) == Some(1))
            })
            .map(|page| page.vpn())
            .ok_or(VmError::OutOfMemory)?;

        log::debug!("Evicting page {:#x} under memory pressure", victim.start_addr());
        self.evict_page(victim.start_addr())
    }

    /// 逐页访问 `[va, va + len)`，必要时像用户访问一样触发缺页
    fn access(
        &mut self,
        va: Vaddr,
        len: usize,
        write: bool,
        mut f: impl FnMut(&mut [u8], usize),
    ) -> VmResult<()> {
        let page_size = page_size();
        let mut done = 0usize;
        while done < len {
            let cur = va.checked_add(done).ok_or(VmError::InvalidAddress)?;
            self.handle_page_fault(cur, write)?;

            let vpn = Vpn::from_addr_floor(cur);
            let (ppn, _) = self
                .page_table
                .translate(vpn)
                .ok_or(VmError::NotPresent)?;
            let page_off = cur.page_offset();
            let take = min(len - done, page_size - page_off);

            // SAFETY: 帧由本地址空间的页持有，调用者持有地址空间锁
            let kva = unsafe { frame_bytes(ppn) };
            f(&mut kva[page_off..page_off + take], done);

            // 内核经直接映射写入不会经过 MMU，脏位需要手动置位
            if write {
                self.page_table.set_dirty(vpn, true);
            }
            done += take;
        }
        Ok(())
    }

    /// 从指定虚拟地址读取字节序列（跨页安全）
    pub fn read_bytes_at(&mut self, va: Vaddr, out: &mut [u8]) -> VmResult<()> {
        let len = out.len();
        self.access(va, len, false, |chunk, done| {
            out[done..done + chunk.len()].copy_from_slice(chunk);
        })
    }

    /// 向指定虚拟地址写入字节序列（跨页安全），写入的页被标记为脏
    pub fn write_bytes_at(&mut self, va: Vaddr, bytes: &[u8]) -> VmResult<()> {
        self.access(va, bytes.len(), true, |chunk, done| {
            chunk.copy_from_slice(&bytes[done..done + chunk.len()]);
        })
    }

    /// 复制内存空间（用于 fork）
    ///
    /// 子空间的每个映射都重新打开文件；已驻留的页与父空间共享同一帧，
    /// 未驻留的页以未驻留状态复制。
    pub fn duplicate(&self) -> VmResult<Self> {
        let mut child = Self::new(self.frames.clone());

        for region in self.regions.values() {
            let file = region.file.reopen().map_err(|errno| {
                log::error!("duplicate: reopen failed: errno {}", errno);
                VmError::IoError
            })?;

            for vpn in region.pages() {
                let Some(page) = self.spt.find(vpn) else {
                    continue;
                };
                let mut copy = page.duplicate(file.clone());
                let flags = copy.pte_flags();
                let shared = page.frame();
                if let Some(ppn) = shared {
                    self.frames.share(ppn)?;
                    copy.attach_shared(ppn);
                }
                child.spt.insert(copy)?;
                if let Some(ppn) = shared {
                    child.page_table.map(vpn, ppn, flags)?;
                }
            }

            child.regions.insert(
                region.start,
                MmapRegion {
                    start: region.start,
                    page_count: region.page_count,
                    file,
                },
            );
        }

        Ok(child)
    }

    /// 拆除整个地址空间（进程退出）
    fn teardown(&mut self) {
        let bases: Vec<Vpn> = self.regions.keys().copied().collect();
        for base in bases {
            if let Err(err) = self.munmap(base.start_addr()) {
                log::error!("teardown: munmap {:#x} failed: {:?}", base.start_addr(), err);
            }
        }

        let mut ctx = PageContext::new(&mut self.page_table, &self.frames, self.asid);
        while let Some(mut page) = self.spt.pop_first() {
            page.destroy(&mut ctx);
        }
    }
}

impl<PT: PageTableInner> Drop for MemorySpace<PT> {
    fn drop(&mut self) {
        self.teardown();
    }
}
