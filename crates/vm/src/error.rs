//! 虚拟内存错误类型
//!
//! 可通过 [`VmError::to_errno()`] 转换为系统调用错误码。

/// 虚拟内存操作中可能发生的错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    /// 地址为空、未按页对齐或越过用户地址空间 (-EINVAL)
    InvalidAddress,
    /// 长度为 0 或文件偏移未按页对齐 (-EINVAL)
    InvalidArgument,
    /// 虚拟地址已被映射 (-EEXIST)
    AlreadyMapped,
    /// 虚拟地址未被映射，或不是某个映射的起始地址 (-EINVAL)
    NotMapped,
    /// 对只读页的写访问 (-EACCES)
    PermissionDenied,
    /// 物理帧或元数据分配失败 (-ENOMEM)
    OutOfMemory,
    /// 读写底层文件失败 (-EIO)
    IoError,
    /// 操作要求页已驻留在物理帧中 (-EFAULT)
    NotPresent,
}

impl VmError {
    /// 转换为系统调用错误码（负数）
    pub fn to_errno(&self) -> isize {
        match self {
            VmError::IoError => -5,
            VmError::OutOfMemory => -12,
            VmError::PermissionDenied => -13,
            VmError::NotPresent => -14,
            VmError::AlreadyMapped => -17,
            VmError::InvalidAddress | VmError::InvalidArgument | VmError::NotMapped => -22,
        }
    }
}

/// 虚拟内存操作的结果类型
pub type VmResult<T> = Result<T, VmError>;
