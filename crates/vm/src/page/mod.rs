//! 页模块
//!
//! [`Page`] 是地址空间中的一个虚拟页，后备类型由 [`PageBacking`] 区分：
//!
//! - [`PageBacking::Uninit`]：`mmap` 时登记的未初始化页，携带延迟构造参数
//! - [`PageBacking::File`]：首次缺页后由文件页初始化器转换而来
//!
//! 每种后备都实现 [`PageOps`] 约定的三个操作（换入、换出、销毁），
//! 由 [`Page`] 按后备类型 `match` 分派。
//!
//! ## 生命周期
//!
//! ```text
//! Uninit ──首次换入──> File(驻留) ──换出──> File(未驻留) ──换入──> File(驻留) ...
//!                                   └────────────── 销毁 ──────────────┘
//! ```
//!
//! 销毁只释放页持有的资源，不释放 [`Page`] 本身，由调用者 drop。

mod file_backed;
mod uninit;

pub use file_backed::FilePage;
pub use uninit::{FileInitArgs, UninitPage};

use crate::VmFile;
use crate::address::{PageNum, Ppn, UsizeConvert, Vpn};
use crate::arch_ops::arch_ops;
use crate::error::VmResult;
use crate::frame_allocator::frame_bytes;
use crate::frame_table::{FrameOwner, FrameTable};
use crate::page_table::{PageTableInner, PteFlags};
use alloc::sync::Arc;

/// 页后备类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// 尚未首次换入的页
    Uninit,
    /// 文件映射页
    File,
}

/// 页的三个后备相关操作
///
/// 调用者持有所属地址空间的锁。
pub trait PageOps {
    /// 把页内容读入 `kva` 指向的帧，返回从后备存储填入的字节数。
    ///
    /// 剩余部分的清零由调用者统一完成，与后备类型无关。
    fn swap_in(&mut self, kva: &mut [u8]) -> VmResult<usize>;

    /// 把页内容移出当前帧（必要时写回），之后页不再驻留。
    ///
    /// 不修改帧的引用计数。
    fn swap_out<PT: PageTableInner>(
        &mut self,
        vpn: Vpn,
        frame: &mut Option<Ppn>,
        ctx: &mut PageContext<'_, PT>,
    ) -> VmResult<()>;

    /// 永久释放页持有的资源，之后 `frame` 为 None。对每个页只调用一次。
    fn destroy<PT: PageTableInner>(
        &mut self,
        vpn: Vpn,
        frame: &mut Option<Ppn>,
        ctx: &mut PageContext<'_, PT>,
    );
}

/// 换出与销毁所需的地址空间上下文
pub struct PageContext<'a, PT: PageTableInner> {
    pub(crate) page_table: &'a mut PT,
    pub(crate) frames: &'a FrameTable,
    pub(crate) asid: usize,
}

impl<'a, PT: PageTableInner> PageContext<'a, PT> {
    /// 创建上下文
    pub fn new(page_table: &'a mut PT, frames: &'a FrameTable, asid: usize) -> Self {
        Self {
            page_table,
            frames,
            asid,
        }
    }

    /// 本地址空间中 `vpn` 对应的帧代表页
    pub(crate) fn owner(&self, vpn: Vpn) -> FrameOwner {
        FrameOwner {
            asid: self.asid,
            vpn,
        }
    }

    /// 解除 `vpn` 的硬件映射并刷新 TLB
    pub(crate) fn clear_mapping(&mut self, vpn: Vpn) {
        if self.page_table.unmap(vpn).is_ok() {
            arch_ops().flush_tlb(vpn.start_addr().as_usize());
        }
    }

    /// 清除 `vpn` 的脏位并刷新 TLB
    pub(crate) fn clear_dirty(&mut self, vpn: Vpn) {
        self.page_table.set_dirty(vpn, false);
        arch_ops().flush_tlb(vpn.start_addr().as_usize());
    }
}

/// 页的后备
#[derive(Debug)]
pub enum PageBacking {
    /// 未初始化页
    Uninit(UninitPage),
    /// 文件页
    File(FilePage),
}

/// 地址空间中的一个虚拟页
#[derive(Debug)]
pub struct Page {
    vpn: Vpn,
    writable: bool,
    /// 驻留时绑定的帧（可能与其他页共享）
    frame: Option<Ppn>,
    backing: PageBacking,
}

impl Page {
    /// 创建一个携带延迟构造参数的未初始化文件页
    pub fn new_uninit(vpn: Vpn, writable: bool, args: FileInitArgs) -> Self {
        Page {
            vpn,
            writable,
            frame: None,
            backing: PageBacking::Uninit(UninitPage::new(args)),
        }
    }

    /// 虚拟页号
    pub fn vpn(&self) -> Vpn {
        self.vpn
    }

    /// 是否可写
    pub fn writable(&self) -> bool {
        self.writable
    }

    /// 当前绑定的帧
    pub fn frame(&self) -> Option<Ppn> {
        self.frame
    }

    /// 是否驻留在物理帧中
    pub fn is_resident(&self) -> bool {
        self.frame.is_some()
    }

    /// 后备类型
    pub fn kind(&self) -> PageKind {
        match self.backing {
            PageBacking::Uninit(_) => PageKind::Uninit,
            PageBacking::File(_) => PageKind::File,
        }
    }

    /// 后备
    pub fn backing(&self) -> &PageBacking {
        &self.backing
    }

    /// 后备文件句柄
    pub fn file(&self) -> Option<&Arc<dyn VmFile>> {
        match &self.backing {
            PageBacking::Uninit(uninit) => uninit.args().map(|args| &args.file),
            PageBacking::File(file_page) => Some(file_page.file()),
        }
    }

    /// 建立硬件映射时使用的页表项标志
    pub fn pte_flags(&self) -> PteFlags {
        PteFlags::user(self.writable)
    }

    /// 把页内容读入 `ppn`，成功后页绑定到该帧
    ///
    /// 未初始化页先经过文件页初始化器；后备填充之后的剩余字节清零。
    /// 硬件映射由调用者建立。
    pub fn swap_in(&mut self, ppn: Ppn) -> VmResult<()> {
        debug_assert!(self.frame.is_none(), "swap_in: page already resident");

        if let PageBacking::Uninit(uninit) = &mut self.backing {
            if let Some(args) = uninit.take() {
                self.backing = PageBacking::File(FilePage::initialize(args));
            }
        }

        // SAFETY: 帧刚由调用者分配给此页，尚未映射到任何地址空间
        let kva = unsafe { frame_bytes(ppn) };
        let filled = match &mut self.backing {
            PageBacking::Uninit(uninit) => uninit.swap_in(kva)?,
            PageBacking::File(file_page) => file_page.swap_in(kva)?,
        };
        kva[filled..].fill(0);

        self.frame = Some(ppn);
        Ok(())
    }

    /// 换出
    pub fn swap_out<PT: PageTableInner>(&mut self, ctx: &mut PageContext<'_, PT>) -> VmResult<()> {
        match &mut self.backing {
            PageBacking::Uninit(uninit) => uninit.swap_out(self.vpn, &mut self.frame, ctx),
            PageBacking::File(file_page) => file_page.swap_out(self.vpn, &mut self.frame, ctx),
        }
    }

    /// 销毁
    pub fn destroy<PT: PageTableInner>(&mut self, ctx: &mut PageContext<'_, PT>) {
        match &mut self.backing {
            PageBacking::Uninit(uninit) => uninit.destroy(self.vpn, &mut self.frame, ctx),
            PageBacking::File(file_page) => file_page.destroy(self.vpn, &mut self.frame, ctx),
        }
        debug_assert!(self.frame.is_none(), "destroy: page still holds a frame");
    }

    /// 绑定到一个已驻留的共享帧（引用计数由调用者通过帧表增加）
    pub(crate) fn attach_shared(&mut self, ppn: Ppn) {
        debug_assert!(self.frame.is_none(), "attach_shared: page already resident");
        self.frame = Some(ppn);
    }

    /// 复制一个未驻留的页，后备文件换成 `file`
    pub(crate) fn duplicate(&self, file: Arc<dyn VmFile>) -> Self {
        let backing = match &self.backing {
            PageBacking::Uninit(uninit) => PageBacking::Uninit(uninit.with_file(file)),
            PageBacking::File(file_page) => PageBacking::File(file_page.with_file(file)),
        };
        Page {
            vpn: self.vpn,
            writable: self.writable,
            frame: None,
            backing,
        }
    }
}
