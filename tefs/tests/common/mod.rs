#![allow(dead_code)]

use std::sync::Mutex;

use block_dev::{BlockDevice, DevError, WriteHint};
use tefs::FormatParams;

/// 内存里的页式块设备
#[derive(Debug)]
pub struct MemDisk {
    data: Mutex<Vec<u8>>,
    page_size: usize,
}

impl MemDisk {
    pub fn new(pages: u32, page_size: usize) -> Self {
        Self {
            data: Mutex::new(vec![0; pages as usize * page_size]),
            page_size,
        }
    }

    /// 绕过文件系统直接查看设备内容，用于底层断言
    pub fn peek(&self, page: u32, offset: usize, len: usize) -> Vec<u8> {
        let data = self.data.lock().unwrap();
        let base = page as usize * self.page_size + offset;
        data[base..base + len].to_vec()
    }

    /// 状态区的空闲位总数
    pub fn free_bits(&self, state_pages: u32) -> u32 {
        (0..state_pages)
            .map(|p| {
                self.peek(1 + p, 0, self.page_size)
                    .iter()
                    .map(|b| b.count_ones())
                    .sum::<u32>()
            })
            .sum()
    }
}

impl BlockDevice for MemDisk {
    fn read(&self, page: u32, buf: &mut [u8], offset: usize) -> Result<(), DevError> {
        let data = self.data.lock().unwrap();
        let base = page as usize * self.page_size + offset;
        buf.copy_from_slice(&data[base..base + buf.len()]);
        Ok(())
    }

    fn write(&self, page: u32, src: &[u8], offset: usize, hint: WriteHint) -> Result<(), DevError> {
        let mut data = self.data.lock().unwrap();
        let start = page as usize * self.page_size;
        if let WriteHint::Fresh = hint {
            data[start..start + self.page_size].fill(0);
        }
        data[start + offset..start + offset + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn flush(&self) -> Result<(), DevError> {
        Ok(())
    }

    fn erase_range(&self, first_page: u32, last_page: u32) -> Result<(), DevError> {
        let mut data = self.data.lock().unwrap();
        let start = first_page as usize * self.page_size;
        let end = (last_page as usize + 1) * self.page_size;
        data[start..end].fill(0);
        Ok(())
    }

    fn page_count(&self) -> u32 {
        (self.data.lock().unwrap().len() / self.page_size) as u32
    }
}

/// 贯穿各场景的标准参数：
/// 512 字节页、8 页块、4 字节哈希、32 字节记录、12 字节文件名
pub fn default_params() -> FormatParams {
    FormatParams {
        num_pages: 62500,
        page_size: 512,
        block_size: 8,
        hash_size: 4,
        metadata_size: 32,
        max_file_name_size: 12,
        erase_first: false,
    }
}

pub fn le32(bytes: Vec<u8>) -> u32 {
    u32::from_le_bytes(bytes.try_into().unwrap())
}
