//! # 块设备接口层
//!
//! 块设备以**页**为单位存储数据，页是设备最小的可寻址单元；
//! [`BlockDevice`] 就是对读写这类设备的抽象，
//! 实现了此特质的类型称为**块设备驱动**。
//!
//! 与常见的整块读写接口不同，这里的读写允许页内字节偏移：
//! 驱动通常会在内部缓冲整页，把多次页内写合并后再落盘，
//! `flush` 强制把缓冲写出。

#![no_std]

use core::any::Any;
use core::fmt::Debug;

/// 块设备驱动特质
pub trait BlockDevice: Send + Sync + Any + Debug {
    /// 从 `page` 页的 `offset` 字节处读取 `buf.len()` 字节
    fn read(&self, page: u32, buf: &mut [u8], offset: usize) -> Result<(), DevError>;

    /// 把 `data` 写入 `page` 页的 `offset` 字节处。
    ///
    /// `hint` 为 [`WriteHint::Fresh`] 时，驱动不必预读目标页：
    /// 页内未被 `data` 覆盖的字节一律视为 0。
    fn write(&self, page: u32, data: &[u8], offset: usize, hint: WriteHint) -> Result<(), DevError>;

    /// 把所有缓冲中的写强制落盘
    fn flush(&self) -> Result<(), DevError>;

    /// 擦除 `[first_page, last_page]` 范围内的所有页
    fn erase_range(&self, first_page: u32, last_page: u32) -> Result<(), DevError>;

    /// 设备总页数
    fn page_count(&self) -> u32;
}

/// 页内写的合并提示
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteHint {
    /// 目标页已有数据，页内其余字节需要保留
    Merge,
    /// 目标页视同全新，其余字节填 0，无需预读
    Fresh,
}

/// 设备层故障
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevError {
    Read,
    Write,
    Erase,
}
