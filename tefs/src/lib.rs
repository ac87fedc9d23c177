//! # tefs
//!
//! 面向小内存嵌入式设备的微型文件系统：设备只需提供页粒度的
//! 线性存储（串行总线上的 SD 卡、裸 NAND 等），tefs 在其上提供
//! 具名文件的随机页读写、创建、查询与删除，以及设备的格式化。
//!
//! 单线程协作式模型：所有公开操作同步执行、跑完即返回，
//! 挂载状态经 `Arc<Mutex<_>>` 在句柄间共享。

#![no_std]

extern crate alloc;

/* tefs 的整体架构，自上而下 */

// 文件句柄层：页粒度读写、追加规则与两级索引缓存
mod file;

// 目录层：哈希文件 + 元数据文件
mod dir;

// 磁盘管理层：格式化、挂载、打开、查询与删除
mod fs;

// 磁盘数据结构层：信息页、状态区、索引项与目录记录
mod layout;

// 几何参数：格式化参数与"文件页 → 索引槽"映射
mod geometry;

mod error;

pub use self::{
    dir::hash_name,
    error::{Error, Result},
    file::File,
    fs::TefsFileSystem,
    geometry::FormatParams,
};

/// 信息页开头的校验标志，四个字节都是这个值
pub const CHECK_FLAG: u8 = 0xFC;
