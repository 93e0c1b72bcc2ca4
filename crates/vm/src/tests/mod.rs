// vm crate 的主机端单元测试。
//
// 物理内存用一块泄漏的、按页对齐的堆内存模拟，配合恒等映射的 `paddr_to_vaddr`；
// 页表与文件都是内存中的 Mock。

use crate::address::{Ppn, Vpn};
use crate::error::{VmError, VmResult};
use crate::frame_table::FrameTable;
use crate::page_table::{PageTableInner, PteFlags};
use crate::{ArchVmOps, MemorySpace, VmConfig, VmFile, register_arch_ops, register_config};
use alloc::collections::btree_map::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::alloc::Layout;
use std::sync::Once;
use sync::SpinLock;
use test_support::mock::arch::register_sync_mock;
use test_support::mock::mm::{MOCK_VM_CONFIG, MOCK_VM_OPS, MockVmConfig, MockVmOps};

mod page;
mod spt;

pub(crate) const PAGE_SIZE: usize = 4096;

/// 映射测试使用的起始地址
pub(crate) const MAP_BASE: usize = 0x1000_0000;

impl ArchVmOps for MockVmOps {
    fn paddr_to_vaddr(&self, paddr: usize) -> usize {
        MockVmOps::paddr_to_vaddr(self, paddr)
    }

    fn flush_tlb(&self, vaddr: usize) {
        MockVmOps::flush_tlb(self, vaddr)
    }
}

impl VmConfig for MockVmConfig {
    fn page_size(&self) -> usize {
        MockVmConfig::page_size(self)
    }

    fn user_space_end(&self) -> usize {
        MockVmConfig::user_space_end(self)
    }
}

static INIT: Once = Once::new();

/// 注册 Mock 架构操作与配置（每个进程只执行一次）
pub(crate) fn init_test_env() {
    INIT.call_once(|| {
        register_sync_mock();
        // SAFETY: Mock 实例是 'static 的，且只注册一次
        unsafe {
            register_arch_ops(&MOCK_VM_OPS);
            register_config(&MOCK_VM_CONFIG);
        }
    });
}

/// 创建一个管理 `count` 个帧的独立帧表
pub(crate) fn test_frames(count: usize) -> Arc<FrameTable> {
    init_test_env();
    let layout = Layout::from_size_align(count * PAGE_SIZE, PAGE_SIZE).unwrap();
    // SAFETY: layout 大小非零；这块内存在测试进程内永不释放
    let base = unsafe { std::alloc::alloc_zeroed(layout) } as usize;
    assert_ne!(base, 0);
    Arc::new(FrameTable::with_range(base, base + count * PAGE_SIZE))
}

/// 创建一个使用 `count` 个帧的内存空间
pub(crate) fn test_space(count: usize) -> MemorySpace<MockPageTable> {
    MemorySpace::new(test_frames(count))
}

/// 第 `i` 个映射页的起始地址
pub(crate) fn page_addr(i: usize) -> crate::Vaddr {
    crate::Vaddr(MAP_BASE + i * PAGE_SIZE)
}

/// 第 `i` 个映射页的页号
pub(crate) fn page_vpn(i: usize) -> Vpn {
    Vpn(MAP_BASE / PAGE_SIZE + i)
}

// ============================================================================
// Mock 页表
// ============================================================================

/// 用 BTreeMap 模拟的单级页表
pub(crate) struct MockPageTable {
    entries: BTreeMap<Vpn, (Ppn, PteFlags)>,
}

impl PageTableInner for MockPageTable {
    fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    fn map(&mut self, vpn: Vpn, ppn: Ppn, flags: PteFlags) -> VmResult<()> {
        if self.entries.contains_key(&vpn) {
            return Err(VmError::AlreadyMapped);
        }
        self.entries.insert(vpn, (ppn, flags - PteFlags::DIRTY));
        Ok(())
    }

    fn unmap(&mut self, vpn: Vpn) -> VmResult<()> {
        self.entries
            .remove(&vpn)
            .map(|_| ())
            .ok_or(VmError::NotMapped)
    }

    fn translate(&self, vpn: Vpn) -> Option<(Ppn, PteFlags)> {
        self.entries.get(&vpn).copied()
    }

    fn is_dirty(&self, vpn: Vpn) -> bool {
        self.entries
            .get(&vpn)
            .is_some_and(|(_, flags)| flags.contains(PteFlags::DIRTY))
    }

    fn set_dirty(&mut self, vpn: Vpn, dirty: bool) {
        if let Some((_, flags)) = self.entries.get_mut(&vpn) {
            flags.set(PteFlags::DIRTY, dirty);
        }
    }
}

// ============================================================================
// Mock 文件
// ============================================================================

/// 所有句柄共享的文件状态
#[derive(Default)]
pub(crate) struct FileState {
    pub data: SpinLock<Vec<u8>>,
    /// 成功的 write_at 次数
    pub writes: AtomicUsize,
    /// 打开过的句柄数
    pub opens: AtomicUsize,
    /// 已关闭的句柄数
    pub closes: AtomicUsize,
    pub fail_writes: AtomicBool,
    pub fail_reopen: AtomicBool,
}

impl FileState {
    pub fn content(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    pub fn live_handles(&self) -> usize {
        self.opens.load(Ordering::SeqCst) - self.closes.load(Ordering::SeqCst)
    }
}

/// 内存文件的一个句柄，drop 即关闭
pub(crate) struct MemFile {
    state: Arc<FileState>,
}

impl MemFile {
    /// 以 `content` 为内容创建文件，返回调用者的句柄和共享状态
    pub fn create(content: &[u8]) -> (Arc<dyn VmFile>, Arc<FileState>) {
        init_test_env();
        let state = Arc::new(FileState::default());
        state.data.lock().extend_from_slice(content);
        (MemFile::open(&state), state)
    }

    fn open(state: &Arc<FileState>) -> Arc<dyn VmFile> {
        state.opens.fetch_add(1, Ordering::SeqCst);
        Arc::new(MemFile {
            state: state.clone(),
        })
    }
}

impl Drop for MemFile {
    fn drop(&mut self) {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
    }
}

impl VmFile for MemFile {
    fn size(&self) -> usize {
        self.state.data.lock().len()
    }

    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize, isize> {
        let data = self.state.data.lock();
        if offset >= data.len() {
            return Ok(0);
        }
        let n = buf.len().min(data.len() - offset);
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        Ok(n)
    }

    fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize, isize> {
        if self.state.fail_writes.load(Ordering::SeqCst) {
            return Err(-5);
        }
        let mut data = self.state.data.lock();
        if data.len() < offset + buf.len() {
            data.resize(offset + buf.len(), 0);
        }
        data[offset..offset + buf.len()].copy_from_slice(buf);
        self.state.writes.fetch_add(1, Ordering::SeqCst);
        Ok(buf.len())
    }

    fn reopen(&self) -> Result<Arc<dyn VmFile>, isize> {
        if self.state.fail_reopen.load(Ordering::SeqCst) {
            return Err(-24);
        }
        Ok(MemFile::open(&self.state))
    }
}

/// 生成 `len` 字节的可辨认内容
pub(crate) fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
