//! # 目录层
//!
//! 目录由两份存放在设备上的普通 tefs 文件组成：
//! 哈希文件是一串定宽哈希槽，元数据文件是与之平行的定宽记录，
//! 哈希文件的第 k 个槽恒对应元数据文件的第 k 条记录。
//! 两份文件自身没有目录项，根地址固定写在信息页的引导槽里。
//!
//! 查找是线性扫描加文件名核对：值为 0 的槽可能是从未用过，
//! 也可能是删除留下的墓碑，所以扫描一律走到哈希文件末尾；
//! 建新文件时优先复用扫描途中遇到的第一个墓碑。

use alloc::vec;

use block_dev::BlockDevice;

use crate::error::{Error, Result};
use crate::file::FileHandle;
use crate::geometry::Geometry;
use crate::layout::record::{self, RecordStatus};
use crate::layout::StateSection;

/// 文件内的一处位置：页号加页内字节
#[derive(Debug, Clone, Copy)]
pub(crate) struct FilePos {
    pub page: u32,
    pub byte: u16,
}

/// 一对互相对应的目录位置
#[derive(Debug, Clone, Copy)]
pub(crate) struct DirSlot {
    /// 哈希文件里的槽
    pub hash: FilePos,
    /// 元数据文件里的记录
    pub record: FilePos,
}

pub(crate) enum LookupOp {
    /// 只查找
    Find,
    /// 找不到就占一个槽位
    Create,
}

pub(crate) enum Lookup {
    /// 名字已存在且记录在用
    Found(DirSlot),
    /// 名字不存在，哈希值已写入返回的槽位
    Created(DirSlot),
    Missing,
}

/// DJB2a 变种：`h = (h * 33) XOR b`，初值 5381。
/// 0 是哈希文件的保留值，算出 0 时取 1；
/// 槽宽为 2 字节时再对 65521 取模。
pub fn hash_name(name: &str, hash_size: u32) -> u32 {
    let mut hash: u32 = 5381;
    for &b in name.as_bytes() {
        hash = ((hash << 5).wrapping_add(hash)) ^ (b as i8 as u32);
    }
    if hash == 0 {
        hash = 1;
    }
    if hash_size == 4 {
        hash
    } else {
        hash % 65521
    }
}

/// 在目录里找 `name`
pub(crate) fn lookup(
    geo: &Geometry,
    alloc: &mut StateSection,
    dev: &dyn BlockDevice,
    hash_file: &mut FileHandle,
    meta_file: &mut FileHandle,
    name: &str,
    op: LookupOp,
) -> Result<Lookup> {
    let wanted = hash_name(name, geo.hash_size);
    let slot_width = geo.hash_size as u16;

    let mut hash_pos = FilePos { page: 0, byte: 0 };
    let mut rec_pos = FilePos { page: 0, byte: 0 };
    let mut tombstone: Option<DirSlot> = None;

    loop {
        let mut slot = [0u8; 4];
        match hash_file.read_page(
            geo,
            dev,
            hash_pos.page,
            &mut slot[..slot_width as usize],
            hash_pos.byte,
        ) {
            Err(Error::EndOfFile) => break,
            other => other?,
        }
        let slot = u32::from_le_bytes(slot);

        if slot == wanted {
            // 哈希相同不代表就是它，还得核对记录状态与文件名
            let mut status = [0u8];
            meta_file.read_page(geo, dev, rec_pos.page, &mut status, rec_pos.byte)?;
            if status[0] == RecordStatus::InUse as u8 {
                let mut stored = vec![0u8; geo.max_file_name_size as usize];
                meta_file.read_page(
                    geo,
                    dev,
                    rec_pos.page,
                    &mut stored,
                    rec_pos.byte + record::NAME,
                )?;
                if name_matches(&stored, name) {
                    return Ok(Lookup::Found(DirSlot {
                        hash: hash_pos,
                        record: rec_pos,
                    }));
                }
            }
        } else if slot == 0 && matches!(op, LookupOp::Create) && tombstone.is_none() {
            tombstone = Some(DirSlot {
                hash: hash_pos,
                record: rec_pos,
            });
        }

        // 槽与记录并行前进，记录不跨页存放
        if rec_pos.byte as u32 + geo.metadata_size >= geo.page_size {
            rec_pos.page += 1;
            rec_pos.byte = 0;
        } else {
            rec_pos.byte += geo.metadata_size as u16;
        }
        hash_pos.byte += slot_width;
        if hash_pos.byte as u32 >= geo.page_size {
            hash_pos.page += 1;
            hash_pos.byte = 0;
        }
    }

    match op {
        LookupOp::Find => Ok(Lookup::Missing),
        LookupOp::Create => {
            let slot = tombstone.unwrap_or(DirSlot {
                hash: hash_pos,
                record: rec_pos,
            });
            let value = wanted.to_le_bytes();
            hash_file.write_page(
                geo,
                alloc,
                dev,
                None,
                slot.hash.page,
                &value[..slot_width as usize],
                slot.hash.byte,
            )?;
            Ok(Lookup::Created(slot))
        }
    }
}

/// 记录里的名字是否等于 `name`：逐字节相同，
/// 且在 `max_file_name_size` 或一个零字节处截止
fn name_matches(stored: &[u8], name: &str) -> bool {
    let name = name.as_bytes();
    match stored.get(..name.len()) {
        Some(prefix) if prefix == name => stored.get(name.len()).map_or(true, |&b| b == 0),
        _ => false,
    }
}
