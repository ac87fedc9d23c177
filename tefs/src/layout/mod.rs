//! # 磁盘数据结构层
//!
//! tefs 的磁盘布局：
//! 信息页 | 状态区 | 数据区（内部文件与用户文件的块）

pub(crate) mod entry;
pub(crate) mod info;
pub(crate) mod record;

mod state;
pub(crate) use state::StateSection;
