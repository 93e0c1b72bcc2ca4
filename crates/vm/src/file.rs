//! 文件映射接口 trait 定义

use alloc::sync::Arc;

/// 可映射到内存的文件接口
///
/// 此 trait 抽象了文件映射所需的最小接口，vfs 的文件对象通过桥接类型实现它。
/// 所有读写都是定位读写，不会移动共享的文件游标。
///
/// 句柄没有显式的 close：最后一个 `Arc` 被 drop 时即关闭。
pub trait VmFile: Send + Sync {
    /// 文件当前长度（字节）
    fn size(&self) -> usize;

    /// 从指定偏移读取数据到缓冲区，返回实际读取的字节数
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize, isize>;

    /// 将缓冲区数据写入指定偏移，返回实际写入的字节数
    fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize, isize>;

    /// 重新打开文件，得到一个与调用者文件描述符生命周期无关的私有句柄
    fn reopen(&self) -> Result<Arc<dyn VmFile>, isize>;
}
