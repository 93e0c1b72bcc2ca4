use super::*;
use crate::frame_allocator::frame_bytes;
use crate::frame_table::FrameOwner;
use crate::page::{FileInitArgs, FilePage, Page, PageContext, PageKind};
use crate::{PageBacking, PageNum};

fn owner_of(asid: usize, vpn: Vpn) -> FrameOwner {
    FrameOwner { asid, vpn }
}

#[test]
fn test_initializer_moves_args() {
    let (file, _state) = MemFile::create(&pattern(100));

    let page = FilePage::initialize(FileInitArgs::new(file, 4096, 77));
    assert_eq!(page.offset(), 4096);
    assert_eq!(page.page_read_bytes(), 77);
}

#[test]
fn test_first_swap_in_converts_uninit() {
    let frames = test_frames(1);
    let content = pattern(10);
    let (file, _state) = MemFile::create(&content);
    let vpn = page_vpn(0);

    let mut page = Page::new_uninit(vpn, false, FileInitArgs::new(file, 0, 10));
    assert_eq!(page.kind(), PageKind::Uninit);
    assert!(!page.is_resident());

    let ppn = frames.alloc(owner_of(1, vpn)).unwrap();
    // 帧在换入前被弄脏，换入必须覆盖整页
    // SAFETY: 帧刚分配，测试独占
    unsafe { frame_bytes(ppn) }.fill(0xEE);
    page.swap_in(ppn).unwrap();

    assert_eq!(page.kind(), PageKind::File);
    assert_eq!(page.frame(), Some(ppn));
    // SAFETY: 同上
    let bytes = unsafe { frame_bytes(ppn) };
    assert_eq!(&bytes[..10], content.as_slice());
    assert!(bytes[10..].iter().all(|&b| b == 0));
}

#[test]
fn test_swap_in_short_read_zero_fills() {
    let frames = test_frames(1);
    let (file, state) = MemFile::create(&pattern(PAGE_SIZE));
    let vpn = page_vpn(0);

    let mut page = Page::new_uninit(vpn, true, FileInitArgs::new(file, 0, PAGE_SIZE));
    // 文件在映射后被截短
    state.data.lock().truncate(100);

    let ppn = frames.alloc(owner_of(1, vpn)).unwrap();
    page.swap_in(ppn).unwrap();

    // SAFETY: 帧属于此页，测试独占
    let bytes = unsafe { frame_bytes(ppn) };
    assert_eq!(&bytes[..100], &pattern(100)[..]);
    assert!(bytes[100..].iter().all(|&b| b == 0));
}

#[test]
fn test_destroy_unpopulated_is_noop() {
    let frames = test_frames(1);
    let (file, state) = MemFile::create(&pattern(64));
    let mut pt = MockPageTable::new();
    let vpn = page_vpn(0);

    let mut page = Page::new_uninit(vpn, true, FileInitArgs::new(file.clone(), 0, 64));
    let mut ctx = PageContext::new(&mut pt, &frames, 1);
    page.destroy(&mut ctx);

    assert!(!page.is_resident());
    assert!(frames.is_empty());
    assert_eq!(state.writes.load(Ordering::SeqCst), 0);
    assert_eq!(state.content(), pattern(64));

    // 已初始化但从未驻留的文件页同样无副作用
    let mut page = Page::new_uninit(vpn, true, FileInitArgs::new(file, 0, 64));
    let ppn = frames.alloc(owner_of(1, vpn)).unwrap();
    page.swap_in(ppn).unwrap();
    let mut ctx = PageContext::new(&mut pt, &frames, 1);
    page.swap_out(&mut ctx).unwrap();
    frames.release(ppn, owner_of(1, vpn)).unwrap();

    page.destroy(&mut ctx);
    assert!(frames.is_empty());
    assert_eq!(state.writes.load(Ordering::SeqCst), 0);
}

#[test]
fn test_swap_out_clean_page_skips_write_back() {
    let frames = test_frames(1);
    let (file, state) = MemFile::create(&pattern(PAGE_SIZE));
    let mut pt = MockPageTable::new();
    let vpn = page_vpn(0);

    let mut page = Page::new_uninit(vpn, true, FileInitArgs::new(file, 0, PAGE_SIZE));
    let ppn = frames.alloc(owner_of(1, vpn)).unwrap();
    page.swap_in(ppn).unwrap();
    pt.map(vpn, ppn, page.pte_flags()).unwrap();

    let mut ctx = PageContext::new(&mut pt, &frames, 1);
    page.swap_out(&mut ctx).unwrap();

    assert!(!page.is_resident());
    assert!(pt.translate(vpn).is_none());
    assert_eq!(state.writes.load(Ordering::SeqCst), 0);
    // 换出不改变引用计数，只清除代表页
    assert_eq!(frames.ref_count(ppn), Some(1));
    assert_eq!(frames.owner(ppn), None);
}

#[test]
fn test_swap_out_dirty_page_writes_read_bytes_only() {
    let frames = test_frames(1);
    let (file, state) = MemFile::create(&pattern(10));
    let mut pt = MockPageTable::new();
    let vpn = page_vpn(0);

    let mut page = Page::new_uninit(vpn, true, FileInitArgs::new(file, 0, 10));
    let ppn = frames.alloc(owner_of(1, vpn)).unwrap();
    page.swap_in(ppn).unwrap();
    pt.map(vpn, ppn, page.pte_flags()).unwrap();

    // SAFETY: 帧属于此页，测试独占
    unsafe { frame_bytes(ppn) }.fill(0x5A);
    pt.set_dirty(vpn, true);

    let mut ctx = PageContext::new(&mut pt, &frames, 1);
    page.swap_out(&mut ctx).unwrap();

    assert_eq!(state.content(), alloc::vec![0x5A; 10]);
    assert_eq!(state.writes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_swap_out_write_failure_keeps_page_resident() {
    let frames = test_frames(1);
    let (file, state) = MemFile::create(&pattern(PAGE_SIZE));
    let mut pt = MockPageTable::new();
    let vpn = page_vpn(0);

    let mut page = Page::new_uninit(vpn, true, FileInitArgs::new(file, 0, PAGE_SIZE));
    let ppn = frames.alloc(owner_of(1, vpn)).unwrap();
    page.swap_in(ppn).unwrap();
    pt.map(vpn, ppn, page.pte_flags()).unwrap();
    pt.set_dirty(vpn, true);
    state.fail_writes.store(true, Ordering::SeqCst);

    let mut ctx = PageContext::new(&mut pt, &frames, 1);
    assert_eq!(page.swap_out(&mut ctx), Err(VmError::IoError));
    assert_eq!(page.frame(), Some(ppn));
    assert!(pt.is_dirty(vpn));
    assert_eq!(frames.owner(ppn), Some(owner_of(1, vpn)));
}

#[test]
fn test_destroy_shared_frame_keeps_frame() {
    let frames = test_frames(1);
    let (file, _state) = MemFile::create(&pattern(PAGE_SIZE));
    let mut pt_a = MockPageTable::new();
    let mut pt_b = MockPageTable::new();
    let vpn = page_vpn(0);

    let mut a = Page::new_uninit(vpn, false, FileInitArgs::new(file.clone(), 0, PAGE_SIZE));
    let ppn = frames.alloc(owner_of(1, vpn)).unwrap();
    a.swap_in(ppn).unwrap();
    pt_a.map(vpn, ppn, a.pte_flags()).unwrap();

    let mut b = a.duplicate(file);
    frames.share(ppn).unwrap();
    b.attach_shared(ppn);
    pt_b.map(vpn, ppn, b.pte_flags()).unwrap();

    // 代表页先被销毁
    a.destroy(&mut PageContext::new(&mut pt_a, &frames, 1));
    assert!(pt_a.translate(vpn).is_none());
    assert_eq!(frames.ref_count(ppn), Some(1));
    assert_eq!(frames.owner(ppn), None);
    assert!(pt_b.translate(vpn).is_some());

    b.destroy(&mut PageContext::new(&mut pt_b, &frames, 2));
    assert!(!frames.contains(ppn));
    assert!(pt_b.translate(vpn).is_none());
}

#[test]
fn test_destroy_sole_owner_clears_mapping() {
    let frames = test_frames(1);
    let (file, state) = MemFile::create(&pattern(PAGE_SIZE));
    let mut pt = MockPageTable::new();
    let vpn = page_vpn(0);

    let mut page = Page::new_uninit(vpn, true, FileInitArgs::new(file, 0, PAGE_SIZE));
    let ppn = frames.alloc(owner_of(1, vpn)).unwrap();
    page.swap_in(ppn).unwrap();
    pt.map(vpn, ppn, page.pte_flags()).unwrap();
    pt.set_dirty(vpn, true);

    page.destroy(&mut PageContext::new(&mut pt, &frames, 1));
    assert!(pt.translate(vpn).is_none());
    assert!(frames.is_empty());
    assert_eq!(state.writes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_duplicate_keeps_layout() {
    let (file, state) = MemFile::create(&pattern(100));
    let vpn = page_vpn(3);

    let page = Page::new_uninit(vpn, true, FileInitArgs::new(file, 8192, 100));
    let (other, _) = MemFile::create(&[]);
    let copy = page.duplicate(other);

    assert_eq!(copy.vpn(), vpn);
    assert!(copy.writable());
    assert!(!copy.is_resident());
    let PageBacking::Uninit(uninit) = copy.backing() else {
        panic!("duplicate changed page kind");
    };
    let args = uninit.args().unwrap();
    assert_eq!(args.offset, 8192);
    assert_eq!(args.page_read_bytes, 100);
    assert_eq!(vpn.start_addr(), page_addr(3));
    drop(page);
    assert_eq!(state.live_handles(), 0);
}
