use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Mutex;

use block_dev::{BlockDevice, DevError, WriteHint};

/// 宿主机上用一个普通文件模拟的页式块设备
#[derive(Debug)]
pub struct BlockFile {
    file: Mutex<File>,
    page_size: usize,
}

impl BlockFile {
    pub fn new(fd: File, page_size: usize) -> Self {
        Self {
            file: Mutex::new(fd),
            page_size,
        }
    }

    fn seek_to(file: &mut File, pos: u64) -> std::io::Result<()> {
        file.seek(SeekFrom::Start(pos)).map(|_| ())
    }
}

impl BlockDevice for BlockFile {
    fn read(&self, page: u32, buf: &mut [u8], offset: usize) -> Result<(), DevError> {
        let mut file = self.file.lock().unwrap();
        Self::seek_to(&mut file, page as u64 * self.page_size as u64 + offset as u64)
            .and_then(|_| file.read_exact(buf))
            .map_err(|_| DevError::Read)
    }

    fn write(&self, page: u32, data: &[u8], offset: usize, hint: WriteHint) -> Result<(), DevError> {
        let mut file = self.file.lock().unwrap();
        match hint {
            // 页内其余字节在后备文件里本来就保留着
            WriteHint::Merge => {
                Self::seek_to(&mut file, page as u64 * self.page_size as u64 + offset as u64)
                    .and_then(|_| file.write_all(data))
            }
            WriteHint::Fresh => {
                let mut whole = vec![0u8; self.page_size];
                whole[offset..offset + data.len()].copy_from_slice(data);
                Self::seek_to(&mut file, page as u64 * self.page_size as u64)
                    .and_then(|_| file.write_all(&whole))
            }
        }
        .map_err(|_| DevError::Write)
    }

    fn flush(&self) -> Result<(), DevError> {
        let file = self.file.lock().unwrap();
        file.sync_data().map_err(|_| DevError::Write)
    }

    fn erase_range(&self, first_page: u32, last_page: u32) -> Result<(), DevError> {
        let mut file = self.file.lock().unwrap();
        let zeros = vec![0u8; self.page_size];
        for page in first_page..=last_page {
            Self::seek_to(&mut file, page as u64 * self.page_size as u64)
                .and_then(|_| file.write_all(&zeros))
                .map_err(|_| DevError::Erase)?;
        }
        Ok(())
    }

    fn page_count(&self) -> u32 {
        let file = self.file.lock().unwrap();
        (file.metadata().unwrap().len() / self.page_size as u64) as u32
    }
}
