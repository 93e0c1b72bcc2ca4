//! 文件页
//!
//! 页内容来自文件 `[offset, offset + page_read_bytes)`，其余部分为零填充。
//! 换出或销毁时，只有被修改过（页表脏位置位）的页才会写回，
//! 且只写回 `page_read_bytes` 字节，零填充部分永远不会写进文件。

use super::uninit::FileInitArgs;
use super::{PageContext, PageOps};
use crate::VmFile;
use crate::address::{PageNum, Ppn, Vpn};
use crate::error::{VmError, VmResult};
use crate::frame_allocator::frame_bytes;
use crate::frame_table::FrameRelease;
use crate::page_table::PageTableInner;
use alloc::sync::Arc;

/// 文件页
pub struct FilePage {
    file: Arc<dyn VmFile>,
    offset: usize,
    page_read_bytes: usize,
}

// 手动实现 Debug，因为 dyn VmFile 没有实现 Debug
impl core::fmt::Debug for FilePage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FilePage")
            .field("file", &"<dyn VmFile>")
            .field("offset", &self.offset)
            .field("page_read_bytes", &self.page_read_bytes)
            .finish()
    }
}

impl FilePage {
    /// 文件页初始化器：从延迟构造参数取得文件、偏移和读取长度。
    ///
    /// 不做任何 I/O，也不接触帧。
    pub fn initialize(args: FileInitArgs) -> Self {
        let FileInitArgs {
            file,
            offset,
            page_read_bytes,
        } = args;
        Self {
            file,
            offset,
            page_read_bytes,
        }
    }

    /// 后备文件句柄
    pub fn file(&self) -> &Arc<dyn VmFile> {
        &self.file
    }

    /// 本页内容在文件中的起始偏移
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// 本页中来自文件的字节数
    pub fn page_read_bytes(&self) -> usize {
        self.page_read_bytes
    }

    pub(crate) fn with_file(&self, file: Arc<dyn VmFile>) -> Self {
        Self {
            file,
            offset: self.offset,
            page_read_bytes: self.page_read_bytes,
        }
    }

    /// 把帧的前 `page_read_bytes` 字节写回文件
    fn write_back(&self, kva: &[u8]) -> VmResult<()> {
        if self.page_read_bytes == 0 {
            return Ok(());
        }

        match self.file.write_at(self.offset, &kva[..self.page_read_bytes]) {
            Ok(written) if written == self.page_read_bytes => Ok(()),
            Ok(written) => {
                log::error!(
                    "Partial write at offset {}: expected {}, got {}",
                    self.offset,
                    self.page_read_bytes,
                    written
                );
                Err(VmError::IoError)
            }
            Err(errno) => {
                log::error!("Write-back at offset {} failed: errno {}", self.offset, errno);
                Err(VmError::IoError)
            }
        }
    }

    /// 若页是脏的，写回并清除脏位，返回是否发生了写回
    pub(crate) fn sync<PT: PageTableInner>(
        &self,
        vpn: Vpn,
        ppn: Ppn,
        ctx: &mut PageContext<'_, PT>,
    ) -> VmResult<bool> {
        if !ctx.page_table.is_dirty(vpn) {
            return Ok(false);
        }

        // SAFETY: 帧属于此页，调用者持有地址空间锁，期间没有其他写入者
        let kva = unsafe { frame_bytes(ppn) };
        self.write_back(kva)?;
        ctx.clear_dirty(vpn);
        Ok(true)
    }
}

impl PageOps for FilePage {
    fn swap_in(&mut self, kva: &mut [u8]) -> VmResult<usize> {
        let read_len = self.page_read_bytes;
        if read_len == 0 {
            return Ok(0);
        }

        let actual_read = self
            .file
            .read_at(self.offset, &mut kva[..read_len])
            .map_err(|errno| {
                log::warn!("Read at offset {} failed: errno {}", self.offset, errno);
                VmError::IoError
            })?;

        // 文件在映射之后被截短
        if actual_read < read_len {
            log::warn!(
                "Partial read at offset {}: expected {}, got {}",
                self.offset,
                read_len,
                actual_read
            );
        }
        Ok(actual_read)
    }

    fn swap_out<PT: PageTableInner>(
        &mut self,
        vpn: Vpn,
        frame: &mut Option<Ppn>,
        ctx: &mut PageContext<'_, PT>,
    ) -> VmResult<()> {
        let ppn = frame.ok_or(VmError::NotPresent)?;

        // 写回失败时页保持驻留且仍为脏，帧不能被复用
        self.sync(vpn, ppn, ctx)?;

        ctx.frames.clear_owner(ppn, ctx.owner(vpn));
        ctx.clear_mapping(vpn);
        *frame = None;
        Ok(())
    }

    fn destroy<PT: PageTableInner>(
        &mut self,
        vpn: Vpn,
        frame: &mut Option<Ppn>,
        ctx: &mut PageContext<'_, PT>,
    ) {
        let Some(ppn) = frame.take() else {
            return;
        };

        // 强制拆除时允许丢失内容，但帧必须释放
        if let Err(err) = self.sync(vpn, ppn, ctx) {
            log::warn!(
                "Dropping dirty page {:#x} after failed write-back: {:?}",
                vpn.start_addr(),
                err
            );
            ctx.clear_dirty(vpn);
        }

        ctx.clear_mapping(vpn);
        match ctx.frames.release(ppn, ctx.owner(vpn)) {
            Ok(FrameRelease::Shared(remaining)) => {
                log::debug!("Frame {:?} still shared by {} page(s)", ppn, remaining);
            }
            Ok(FrameRelease::Freed) => {}
            Err(err) => {
                log::error!("Frame {:?} of page {:?} not in frame table: {:?}", ppn, vpn, err);
            }
        }
    }
}
