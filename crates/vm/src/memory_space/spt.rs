//! 补充页表
//!
//! 以虚拟页号索引地址空间中的所有 [`Page`]，无论其是否驻留。

use crate::address::Vpn;
use crate::error::{VmError, VmResult};
use crate::page::{FileInitArgs, Page};
use alloc::collections::btree_map::{BTreeMap, Entry};
use alloc::vec::Vec;

/// 补充页表
#[derive(Debug, Default)]
pub struct SupplementalPageTable {
    pages: BTreeMap<Vpn, Page>,
}

impl SupplementalPageTable {
    /// 创建空的补充页表
    pub fn new() -> Self {
        Self::default()
    }

    /// 查找页
    pub fn find(&self, vpn: Vpn) -> Option<&Page> {
        self.pages.get(&vpn)
    }

    /// 查找页（可变）
    pub fn find_mut(&mut self, vpn: Vpn) -> Option<&mut Page> {
        self.pages.get_mut(&vpn)
    }

    /// 是否已有页
    pub fn contains(&self, vpn: Vpn) -> bool {
        self.pages.contains_key(&vpn)
    }

    /// 插入页；该虚拟页已有页时返回 `AlreadyMapped`
    pub fn insert(&mut self, page: Page) -> VmResult<()> {
        match self.pages.entry(page.vpn()) {
            Entry::Occupied(_) => Err(VmError::AlreadyMapped),
            Entry::Vacant(slot) => {
                slot.insert(page);
                Ok(())
            }
        }
    }

    /// 一次插入一组页
    ///
    /// 任一虚拟页已有页（包括这组页之间重复）时返回 `AlreadyMapped`，
    /// 已插入的页被撤回，补充页表保持原样。
    pub fn insert_all(&mut self, pages: Vec<Page>) -> VmResult<()> {
        let mut inserted = Vec::with_capacity(pages.len());
        for page in pages {
            let vpn = page.vpn();
            if let Err(err) = self.insert(page) {
                for vpn in inserted {
                    self.pages.remove(&vpn);
                }
                return Err(err);
            }
            inserted.push(vpn);
        }
        Ok(())
    }

    /// 登记一个携带延迟构造参数的未初始化文件页
    pub fn alloc_page_with_initializer(
        &mut self,
        vpn: Vpn,
        writable: bool,
        args: FileInitArgs,
    ) -> VmResult<()> {
        self.insert(Page::new_uninit(vpn, writable, args))
    }

    /// 移除页；销毁由调用者负责
    pub fn remove(&mut self, vpn: Vpn) -> Option<Page> {
        self.pages.remove(&vpn)
    }

    /// 移除虚拟页号最小的页
    pub(crate) fn pop_first(&mut self) -> Option<Page> {
        self.pages.pop_first().map(|(_, page)| page)
    }

    /// 按虚拟页号顺序遍历所有页
    pub fn iter(&self) -> impl Iterator<Item = &Page> {
        self.pages.values()
    }

    /// 页数
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// 是否没有页
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
