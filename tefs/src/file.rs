//! # 文件句柄层
//!
//! 每个打开的文件持有一组缓存的索引指针与文件尺寸，
//! 读写以页为粒度，按两级索引把文件页换算到设备页：
//! 根索引块的每个槽指向一个子索引块，子索引块的每个槽指向一个数据块。
//! 连续访问落在同一数据块或同一子索引块内时直接走缓存。
//!
//! 小文件省掉根索引一级，目录里的根地址直接指向唯一的子索引块；
//! `eof_page` 到达单级上限时就地升级，旧的子索引块成为新根的 0 号槽。

use alloc::sync::Arc;

use block_dev::{BlockDevice, WriteHint};
use spin::Mutex;

use crate::dir::FilePos;
use crate::error::{Error, Result};
use crate::fs::TefsFileSystem;
use crate::geometry::Geometry;
use crate::layout::entry::IndexEntry;
use crate::layout::info;
use crate::layout::record;
use crate::layout::StateSection;

/// 缓存失效标记：任何合法文件页都到不了这个值
const NO_PAGE: u32 = u32::MAX;

/// 文件尺寸的回写位置
#[derive(Debug, Clone, Copy)]
pub(crate) enum DirPos {
    /// 内部文件：尺寸直接写回信息页的引导槽
    Bootstrap { field: u16 },
    /// 普通文件：尺寸写回元数据文件里的记录
    Record(FilePos),
}

/// 打开文件的全部状态
#[derive(Debug)]
pub(crate) struct FileHandle {
    /// 根索引块地址；单级模式下即唯一的子索引块
    root_index_block: u32,
    /// 最近一次访问的子索引块
    child_index_block: u32,
    /// 最近一次访问的数据块
    data_block_addr: u32,
    /// `data_block_addr` 对应的文件内块号
    data_block_no: u32,
    /// 最近一次访问的文件页
    current_page: u32,
    dir_pos: DirPos,
    /// 文件末页号
    pub eof_page: u32,
    /// 末页中已写的字节数
    pub eof_byte: u16,
    /// 尺寸是否已经落到目录里
    size_synced: bool,
}

impl FileHandle {
    /// 据目录里的尺寸与根地址恢复句柄，并预载首块的索引指针
    pub(crate) fn open_at(
        dev: &dyn BlockDevice,
        geo: &Geometry,
        dir_pos: DirPos,
        eof_page: u32,
        eof_byte: u16,
        root: u32,
    ) -> Result<Self> {
        let child = if eof_page >= geo.one_level_limit() {
            IndexEntry::load(dev, geo, root, 0)?
                .validate()
                .ok_or(Error::UnreleasedBlock)?
        } else {
            root
        };
        let data = IndexEntry::load(dev, geo, child, 0)?
            .validate()
            .ok_or(Error::UnreleasedBlock)?;

        Ok(Self {
            root_index_block: root,
            child_index_block: child,
            data_block_addr: data,
            data_block_no: 0,
            current_page: 0,
            dir_pos,
            eof_page,
            eof_byte,
            size_synced: true,
        })
    }

    /// 新文件：首个子索引块与数据块刚刚分配好，尺寸为零
    pub(crate) fn fresh(dir_pos: DirPos, child: u32, data: u32) -> Self {
        Self {
            root_index_block: child,
            child_index_block: child,
            data_block_addr: data,
            data_block_no: 0,
            current_page: 0,
            dir_pos,
            eof_page: 0,
            eof_byte: 0,
            size_synced: true,
        }
    }

    /// 是否已经配备独立的根索引块
    #[inline]
    fn two_level(&self, geo: &Geometry) -> bool {
        self.eof_page >= geo.one_level_limit()
    }

    /// 读文件页中 `[offset, offset + buf.len())` 的内容。
    /// 越过 `(eof_page, eof_byte)` 的范围一律报 [`Error::EndOfFile`]。
    pub(crate) fn read_page(
        &mut self,
        geo: &Geometry,
        dev: &dyn BlockDevice,
        page: u32,
        buf: &mut [u8],
        offset: u16,
    ) -> Result<()> {
        assert!(offset as usize + buf.len() <= geo.page_size as usize);

        if page > self.eof_page
            || (page == self.eof_page && offset as usize + buf.len() > self.eof_byte as usize)
        {
            return Err(Error::EndOfFile);
        }

        if page != self.current_page && geo.block_no(page) != self.data_block_no {
            self.locate_for_read(geo, dev, page)?;
            self.data_block_no = geo.block_no(page);
        }
        dev.read(
            self.data_block_addr + page % geo.block_size,
            buf,
            offset as usize,
        )?;

        self.current_page = page;
        Ok(())
    }

    /// 写文件页中 `[offset, offset + data.len())` 的内容。
    ///
    /// 追加规则：只许写到 `(eof_page, eof_byte)` 为止的位置，
    /// 正好从 `eof_byte` 续写则推进文件尺寸；越过则报
    /// [`Error::WritePastEnd`]。写满一页时 `eof_page` 进位，
    /// 缺失的索引块与数据块在此按需分配。
    pub(crate) fn write_page(
        &mut self,
        geo: &Geometry,
        alloc: &mut StateSection,
        dev: &dyn BlockDevice,
        dir: Option<&mut FileHandle>,
        page: u32,
        data: &[u8],
        offset: u16,
    ) -> Result<()> {
        assert!(offset as usize + data.len() <= geo.page_size as usize);

        let mut fresh_page = false;

        if page == self.eof_page {
            if offset > self.eof_byte {
                return Err(Error::WritePastEnd);
            }
            let end = offset + data.len() as u16;
            if end > self.eof_byte {
                // 只有落进从未写过的页，设备才可以跳过预读
                fresh_page = self.eof_byte == 0;
                self.eof_byte = end;
            }
            self.size_synced = false;

            if self.eof_byte as u32 == geo.page_size {
                self.eof_byte = 0;
                self.eof_page += 1;
                if self.eof_page == geo.one_level_limit() {
                    self.promote_root(geo, alloc, dev, dir)?;
                }
            }
        } else if page > self.eof_page {
            return Err(Error::WritePastEnd);
        }

        if page != self.current_page && geo.block_no(page) != self.data_block_no {
            self.locate_for_write(geo, alloc, dev, page)?;
            self.data_block_no = geo.block_no(page);
        }
        let hint = if fresh_page {
            WriteHint::Fresh
        } else {
            WriteHint::Merge
        };
        dev.write(
            self.data_block_addr + page % geo.block_size,
            data,
            offset as usize,
            hint,
        )?;

        self.current_page = page;
        Ok(())
    }

    /// 释放文件里的一个数据块（按文件内块号计）。
    /// 子索引块因此清空时连同子索引块一并回收，
    /// 并把它在根索引中的槽位标记为已删除。
    pub(crate) fn release_block(
        &mut self,
        geo: &Geometry,
        alloc: &mut StateSection,
        dev: &dyn BlockDevice,
        block_no: u32,
    ) -> Result<()> {
        let (rp, rb) = geo.root_slot_of(block_no);
        let (cp, cb) = geo.child_slot_of(block_no);

        if block_no != self.data_block_no {
            if self.data_block_no / geo.addresses_per_block()
                != block_no / geo.addresses_per_block()
            {
                self.child_index_block = if self.two_level(geo) {
                    IndexEntry::load(dev, geo, self.root_index_block + rp, rb)?
                        .validate()
                        .ok_or(Error::UnreleasedBlock)?
                } else {
                    self.root_index_block
                };
            }
            self.data_block_addr = IndexEntry::load(dev, geo, self.child_index_block + cp, cb)?
                .validate()
                .ok_or(Error::UnreleasedBlock)?;
        }

        alloc.release(geo, dev, self.data_block_addr)?;
        IndexEntry::store(
            dev,
            geo,
            self.child_index_block + cp,
            cb,
            IndexEntry::DELETED,
            WriteHint::Merge,
        )?;

        // 子索引块里还剩存活地址吗
        let mut in_use = false;
        'scan: for p in 0..geo.block_size {
            let mut b: u16 = 0;
            while (b as u32) < geo.page_size {
                if IndexEntry::load(dev, geo, self.child_index_block + p, b)?
                    .validate()
                    .is_some()
                {
                    in_use = true;
                    break 'scan;
                }
                b += geo.address_size as u16;
            }
        }

        if !in_use {
            if self.two_level(geo) {
                IndexEntry::store(
                    dev,
                    geo,
                    self.root_index_block + rp,
                    rb,
                    IndexEntry::DELETED,
                    WriteHint::Merge,
                )?;
            }
            alloc.release(geo, dev, self.child_index_block)?;
        }

        // 缓存已不可信，下次访问重新走索引
        self.data_block_no = NO_PAGE;
        self.current_page = NO_PAGE;
        dev.flush()?;
        Ok(())
    }

    /// 把未落盘的文件尺寸写回目录
    pub(crate) fn sync_size(
        &mut self,
        geo: &Geometry,
        alloc: &mut StateSection,
        dev: &dyn BlockDevice,
        dir: Option<&mut FileHandle>,
    ) -> Result<()> {
        if self.size_synced {
            return Ok(());
        }

        let page_bytes = self.eof_page.to_le_bytes();
        let byte_bytes = self.eof_byte.to_le_bytes();
        match self.dir_pos {
            DirPos::Bootstrap { field } => {
                dev.write(0, &page_bytes, field as usize, WriteHint::Merge)?;
                dev.write(0, &byte_bytes, field as usize + 4, WriteHint::Merge)?;
            }
            DirPos::Record(pos) => {
                let dir = dir.expect("metadata file handle required");
                dir.write_page(
                    geo,
                    alloc,
                    dev,
                    None,
                    pos.page,
                    &page_bytes,
                    pos.byte + record::EOF_PAGE,
                )?;
                dir.write_page(
                    geo,
                    alloc,
                    dev,
                    None,
                    pos.page,
                    &byte_bytes,
                    pos.byte + record::EOF_BYTE,
                )?;
            }
        }

        self.size_synced = true;
        Ok(())
    }

    /// 读路径的索引遍历：缺失的槽位报 [`Error::UnreleasedBlock`]
    fn locate_for_read(&mut self, geo: &Geometry, dev: &dyn BlockDevice, page: u32) -> Result<()> {
        if self.data_block_no / geo.addresses_per_block() != geo.child_ordinal(page) {
            let (rp, rb) = geo.root_slot(page);
            if rp >= geo.block_size {
                return Err(Error::FileFull);
            }
            self.child_index_block = if self.two_level(geo) {
                IndexEntry::load(dev, geo, self.root_index_block + rp, rb)?
                    .validate()
                    .ok_or(Error::UnreleasedBlock)?
            } else {
                self.root_index_block
            };
        }

        let (cp, cb) = geo.child_slot(page);
        self.data_block_addr = IndexEntry::load(dev, geo, self.child_index_block + cp, cb)?
            .validate()
            .ok_or(Error::UnreleasedBlock)?;
        Ok(())
    }

    /// 写路径的索引遍历：缺失的子索引块和数据块就地分配，
    /// 先占块再发布地址
    fn locate_for_write(
        &mut self,
        geo: &Geometry,
        alloc: &mut StateSection,
        dev: &dyn BlockDevice,
        page: u32,
    ) -> Result<()> {
        if self.data_block_no / geo.addresses_per_block() != geo.child_ordinal(page) {
            let (rp, rb) = geo.root_slot(page);
            if rp >= geo.block_size {
                return Err(Error::FileFull);
            }
            self.child_index_block = if self.two_level(geo) {
                match IndexEntry::load(dev, geo, self.root_index_block + rp, rb)?.validate() {
                    Some(addr) => addr,
                    None => {
                        let addr = alloc.reserve(geo, dev)?;
                        let hint = if rb == 0 {
                            WriteHint::Fresh
                        } else {
                            WriteHint::Merge
                        };
                        IndexEntry::store(
                            dev,
                            geo,
                            self.root_index_block + rp,
                            rb,
                            addr.into(),
                            hint,
                        )?;
                        addr
                    }
                }
            } else {
                self.root_index_block
            };
        }

        let (cp, cb) = geo.child_slot(page);
        self.data_block_addr =
            match IndexEntry::load(dev, geo, self.child_index_block + cp, cb)?.validate() {
                Some(addr) => addr,
                None => {
                    let addr = alloc.reserve(geo, dev)?;
                    let hint = if cb == 0 {
                        WriteHint::Fresh
                    } else {
                        WriteHint::Merge
                    };
                    IndexEntry::store(dev, geo, self.child_index_block + cp, cb, addr.into(), hint)?;
                    addr
                }
            };
        Ok(())
    }

    /// 单级转两级：新分配根索引块，旧的子索引块成为它的 0 号槽，
    /// 并在下一页写出之前更新目录里的根地址
    fn promote_root(
        &mut self,
        geo: &Geometry,
        alloc: &mut StateSection,
        dev: &dyn BlockDevice,
        dir: Option<&mut FileHandle>,
    ) -> Result<()> {
        let root = alloc.reserve(geo, dev)?;
        IndexEntry::store(
            dev,
            geo,
            root,
            0,
            self.child_index_block.into(),
            WriteHint::Fresh,
        )?;
        self.root_index_block = root;

        let bytes = root.to_le_bytes();
        match self.dir_pos {
            DirPos::Bootstrap { field } => {
                dev.write(
                    0,
                    &bytes,
                    (field + info::BOOT_ROOT_ADDR) as usize,
                    WriteHint::Merge,
                )?;
            }
            DirPos::Record(pos) => {
                let dir = dir.expect("metadata file handle required");
                dir.write_page(
                    geo,
                    alloc,
                    dev,
                    None,
                    pos.page,
                    &bytes,
                    pos.byte + record::ROOT_ADDR,
                )?;
            }
        }
        Ok(())
    }
}

/// 用户侧的文件句柄
///
/// 同一文件同时只能有一个句柄在用；第二个句柄的行为未定义。
/// 尺寸只在 [`File::flush`] 或 [`File::close`] 时落盘，
/// 掉电前未刷出的追加在重新挂载后不可见。
#[derive(Debug)]
pub struct File {
    fs: Arc<Mutex<TefsFileSystem>>,
    inner: FileHandle,
}

impl File {
    pub(crate) fn new(fs: Arc<Mutex<TefsFileSystem>>, inner: FileHandle) -> Self {
        Self { fs, inner }
    }

    /// 从逻辑页 `file_page` 的 `byte_offset` 处读 `buf.len()` 字节
    pub fn read(&mut self, file_page: u32, buf: &mut [u8], byte_offset: u16) -> Result<()> {
        let mut fs = self.fs.lock();
        let TefsFileSystem { dev, geo, .. } = &mut *fs;
        self.inner.read_page(geo, dev.as_ref(), file_page, buf, byte_offset)
    }

    /// 向逻辑页 `file_page` 的 `byte_offset` 处写 `data`
    pub fn write(&mut self, file_page: u32, data: &[u8], byte_offset: u16) -> Result<()> {
        let mut fs = self.fs.lock();
        let TefsFileSystem {
            dev,
            geo,
            state,
            meta_file,
            ..
        } = &mut *fs;
        self.inner.write_page(
            geo,
            state,
            dev.as_ref(),
            Some(meta_file),
            file_page,
            data,
            byte_offset,
        )
    }

    /// 释放文件里的一个数据块（按文件内块号计）
    pub fn release_block(&mut self, file_block: u32) -> Result<()> {
        let mut fs = self.fs.lock();
        let TefsFileSystem {
            dev, geo, state, ..
        } = &mut *fs;
        self.inner.release_block(geo, state, dev.as_ref(), file_block)
    }

    /// 把尺寸写回目录并让设备落盘
    pub fn flush(&mut self) -> Result<()> {
        let mut fs = self.fs.lock();
        let TefsFileSystem {
            dev,
            geo,
            state,
            meta_file,
            ..
        } = &mut *fs;
        self.inner
            .sync_size(geo, state, dev.as_ref(), Some(meta_file))?;
        dev.flush()?;
        Ok(())
    }

    /// 关闭文件，等价于最后一次 [`File::flush`]
    pub fn close(mut self) -> Result<()> {
        self.flush()
    }

    /// 当前文件尺寸 `(eof_page, eof_byte)`
    pub fn size(&self) -> (u32, u16) {
        (self.inner.eof_page, self.inner.eof_byte)
    }
}
