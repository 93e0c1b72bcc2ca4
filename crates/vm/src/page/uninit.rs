//! 未初始化页
//!
//! `mmap` 只登记页和它的构造参数，真正的初始化推迟到首次缺页。

use super::{PageContext, PageOps};
use crate::VmFile;
use crate::address::{Ppn, Vpn};
use crate::error::{VmError, VmResult};
use crate::page_table::PageTableInner;
use alloc::sync::Arc;

/// 文件页的延迟构造参数
///
/// 由 mmap 为每个页创建，首次换入时被文件页初始化器整体取走。
#[derive(Clone)]
pub struct FileInitArgs {
    /// 映射私有的文件句柄
    pub file: Arc<dyn VmFile>,
    /// 本页内容在文件中的起始偏移（字节）
    pub offset: usize,
    /// 本页中来自文件的字节数，其余部分为零填充
    pub page_read_bytes: usize,
}

impl FileInitArgs {
    /// 创建构造参数
    pub fn new(file: Arc<dyn VmFile>, offset: usize, page_read_bytes: usize) -> Self {
        Self {
            file,
            offset,
            page_read_bytes,
        }
    }
}

// 手动实现 Debug，因为 dyn VmFile 没有实现 Debug
impl core::fmt::Debug for FileInitArgs {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FileInitArgs")
            .field("file", &"<dyn VmFile>")
            .field("offset", &self.offset)
            .field("page_read_bytes", &self.page_read_bytes)
            .finish()
    }
}

/// 未初始化页
#[derive(Debug)]
pub struct UninitPage {
    init: Option<FileInitArgs>,
}

impl UninitPage {
    /// 创建携带构造参数的未初始化页
    pub fn new(args: FileInitArgs) -> Self {
        Self { init: Some(args) }
    }

    /// 尚未被取走的构造参数
    pub fn args(&self) -> Option<&FileInitArgs> {
        self.init.as_ref()
    }

    /// 取走构造参数（只能成功一次）
    pub(crate) fn take(&mut self) -> Option<FileInitArgs> {
        self.init.take()
    }

    pub(crate) fn with_file(&self, file: Arc<dyn VmFile>) -> Self {
        Self {
            init: self
                .init
                .as_ref()
                .map(|args| FileInitArgs::new(file, args.offset, args.page_read_bytes)),
        }
    }
}

impl PageOps for UninitPage {
    /// 未初始化页必须先经过初始化器，不能直接换入
    fn swap_in(&mut self, _kva: &mut [u8]) -> VmResult<usize> {
        Err(VmError::NotPresent)
    }

    fn swap_out<PT: PageTableInner>(
        &mut self,
        _vpn: Vpn,
        _frame: &mut Option<Ppn>,
        _ctx: &mut PageContext<'_, PT>,
    ) -> VmResult<()> {
        Err(VmError::NotPresent)
    }

    fn destroy<PT: PageTableInner>(
        &mut self,
        _vpn: Vpn,
        _frame: &mut Option<Ppn>,
        _ctx: &mut PageContext<'_, PT>,
    ) {
        self.init = None;
    }
}
