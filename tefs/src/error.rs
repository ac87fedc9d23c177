use block_dev::DevError;

/// 每个公开操作返回的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// 设备读故障
    Read,
    /// 设备写故障
    Write,
    /// 设备擦除故障
    Erase,
    /// 分配器已无空闲块
    DeviceFull,
    /// 根索引块耗尽，文件达到容量上限
    FileFull,
    /// 目录中找不到该文件
    FileNotFound,
    /// 索引里缺少指向存活块的地址
    UnreleasedBlock,
    /// 信息页校验失败，设备未格式化
    NotFormatted,
    /// 写入位置越过了文件末尾
    WritePastEnd,
    /// 读取范围越过了文件末尾
    EndOfFile,
    /// 文件名超出最大长度
    FileNameTooLong,
}

pub type Result<T> = core::result::Result<T, Error>;

impl From<DevError> for Error {
    fn from(e: DevError) -> Self {
        match e {
            DevError::Read => Self::Read,
            DevError::Write => Self::Write,
            DevError::Erase => Self::Erase,
        }
    }
}
