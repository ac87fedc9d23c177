//! 信息页（0 号页）
//!
//! 固定布局，所有多字节整数一律小端：
//!
//! | 偏移 | 宽度 | 字段 |
//! |-----|-----|------|
//! | 0   | 4   | 校验标志，每字节 `0xFC` |
//! | 4   | 4   | 设备总页数 |
//! | 8   | 1   | log2(页大小) |
//! | 9   | 1   | log2(块大小) |
//! | 10  | 1   | log2(地址宽) |
//! | 11  | 1   | 哈希槽宽度 |
//! | 12  | 2   | 元数据记录大小 |
//! | 14  | 2   | 文件名上限 |
//! | 16  | 4   | 状态区页数 |
//! | 20  | 10  | 哈希文件引导槽（eof_page, eof_byte, 根索引地址） |
//! | 30  | 10  | 元数据文件引导槽 |
//!
//! 余下字节补零。

use alloc::vec;

use block_dev::{BlockDevice, WriteHint};

use crate::error::{Error, Result};
use crate::geometry::Geometry;
use crate::CHECK_FLAG;

/// 哈希文件引导槽的起始偏移
pub(crate) const HASH_FILE_FIELDS: u16 = 20;
/// 元数据文件引导槽的起始偏移
pub(crate) const META_FILE_FIELDS: u16 = 30;

/// 引导槽内根索引地址相对槽首的偏移
pub(crate) const BOOT_ROOT_ADDR: u16 = 6;

/// 格式化时写出整张信息页。
/// 两份内部文件的 `eof` 置零，根索引地址指向各自的首个子索引块。
pub(crate) fn write_page0(
    dev: &dyn BlockDevice,
    geo: &Geometry,
    hash_root: u32,
    meta_root: u32,
) -> Result<()> {
    let mut page = vec![0u8; geo.page_size as usize];

    page[0..4].fill(CHECK_FLAG);
    page[4..8].copy_from_slice(&geo.num_pages.to_le_bytes());
    page[8] = geo.page_size.trailing_zeros() as u8;
    page[9] = geo.block_size.trailing_zeros() as u8;
    page[10] = geo.address_size.trailing_zeros() as u8;
    page[11] = geo.hash_size as u8;
    page[12..14].copy_from_slice(&(geo.metadata_size as u16).to_le_bytes());
    page[14..16].copy_from_slice(&(geo.max_file_name_size as u16).to_le_bytes());
    page[16..20].copy_from_slice(&geo.state_pages.to_le_bytes());

    for (base, root) in [
        (HASH_FILE_FIELDS as usize, hash_root),
        (META_FILE_FIELDS as usize, meta_root),
    ] {
        page[base + BOOT_ROOT_ADDR as usize..base + BOOT_ROOT_ADDR as usize + 4]
            .copy_from_slice(&root.to_le_bytes());
    }

    dev.write(0, &page, 0, WriteHint::Fresh)?;
    Ok(())
}

/// 挂载时读取并校验信息页，还原几何参数
pub(crate) fn read_geometry(dev: &dyn BlockDevice) -> Result<Geometry> {
    let mut hdr = [0u8; 20];
    dev.read(0, &mut hdr, 0)?;

    if hdr[0..4] != [CHECK_FLAG; 4] {
        log::error!("check flag mismatch, device not formatted");
        return Err(Error::NotFormatted);
    }

    Ok(Geometry {
        num_pages: le32(&hdr[4..8]),
        page_size: 1 << hdr[8],
        block_size: 1 << hdr[9],
        address_size: 1 << hdr[10],
        hash_size: hdr[11] as u32,
        metadata_size: le16(&hdr[12..14]) as u32,
        max_file_name_size: le16(&hdr[14..16]) as u32,
        state_pages: le32(&hdr[16..20]),
    })
}

/// 读出一个引导槽：`(eof_page, eof_byte, 根索引地址)`
pub(crate) fn read_bootstrap(dev: &dyn BlockDevice, base: u16) -> Result<(u32, u16, u32)> {
    let mut buf = [0u8; 10];
    dev.read(0, &mut buf, base as usize)?;
    Ok((le32(&buf[0..4]), le16(&buf[4..6]), le32(&buf[6..10])))
}

fn le16(b: &[u8]) -> u16 {
    u16::from_le_bytes(b.try_into().unwrap())
}

fn le32(b: &[u8]) -> u32 {
    u32::from_le_bytes(b.try_into().unwrap())
}
