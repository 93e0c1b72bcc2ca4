use super::*;
use crate::memory_space::SupplementalPageTable;
use crate::page::{FileInitArgs, Page};

fn uninit(file: &Arc<dyn VmFile>, i: usize) -> Page {
    Page::new_uninit(page_vpn(i), true, FileInitArgs::new(file.clone(), i * PAGE_SIZE, PAGE_SIZE))
}

#[test]
fn test_insert_rejects_occupied_vpn() {
    let (file, _state) = MemFile::create(&pattern(PAGE_SIZE));
    let mut spt = SupplementalPageTable::new();

    spt.alloc_page_with_initializer(page_vpn(0), false, FileInitArgs::new(file.clone(), 0, 10))
        .unwrap();
    assert_eq!(spt.insert(uninit(&file, 0)), Err(VmError::AlreadyMapped));
    assert_eq!(spt.len(), 1);
    assert!(!spt.find(page_vpn(0)).unwrap().writable());
}

#[test]
fn test_insert_all_is_atomic() {
    let (file, _state) = MemFile::create(&pattern(4 * PAGE_SIZE));
    let mut spt = SupplementalPageTable::new();
    spt.insert(uninit(&file, 2)).unwrap();

    // 第三个页与已有页冲突，前两个必须被撤回
    let pages = (0..4).map(|i| uninit(&file, i)).collect();
    assert_eq!(spt.insert_all(pages), Err(VmError::AlreadyMapped));
    assert_eq!(spt.len(), 1);
    assert!(spt.contains(page_vpn(2)));
    assert!(!spt.contains(page_vpn(0)));
    assert!(!spt.contains(page_vpn(1)));

    // 同一批中重复的虚拟页
    let pages = alloc::vec![uninit(&file, 5), uninit(&file, 6), uninit(&file, 5)];
    assert_eq!(spt.insert_all(pages), Err(VmError::AlreadyMapped));
    assert_eq!(spt.len(), 1);

    let pages = (4..7).map(|i| uninit(&file, i)).collect();
    spt.insert_all(pages).unwrap();
    assert_eq!(spt.len(), 4);
    let vpns: Vec<Vpn> = spt.iter().map(|page| page.vpn()).collect();
    assert_eq!(vpns, alloc::vec![page_vpn(2), page_vpn(4), page_vpn(5), page_vpn(6)]);
}
