//! # 磁盘管理层
//!
//! 构建并使用整个磁盘布局：格式化、挂载，以及目录级的
//! 打开、查询与删除。挂载状态（几何参数、分配器游标、
//! 两份内部文件的句柄）集中在 [`TefsFileSystem`] 里，
//! 经 `Arc<Mutex<_>>` 被所有文件句柄共享。

use alloc::sync::Arc;
use alloc::vec;

use block_dev::{BlockDevice, WriteHint};
use spin::Mutex;

use crate::dir::{self, DirSlot, Lookup, LookupOp};
use crate::error::{Error, Result};
use crate::file::{DirPos, File, FileHandle};
use crate::geometry::{FormatParams, Geometry};
use crate::layout::entry::IndexEntry;
use crate::layout::info;
use crate::layout::record::{self, RecordStatus};
use crate::layout::StateSection;

#[derive(Debug)]
pub struct TefsFileSystem {
    pub(crate) dev: Arc<dyn BlockDevice>,
    pub(crate) geo: Geometry,
    pub(crate) state: StateSection,
    pub(crate) hash_file: FileHandle,
    pub(crate) meta_file: FileHandle,
}

impl TefsFileSystem {
    /// 格式化设备并挂载。
    ///
    /// 写出信息页、状态区，以及两份内部文件的引导块；
    /// 成功后设备上是一个只含两份零长内部文件的空文件系统。
    pub fn format(dev: Arc<dyn BlockDevice>, params: &FormatParams) -> Result<Arc<Mutex<Self>>> {
        let geo = Geometry::from_params(params);
        assert!(geo.num_pages <= dev.page_count());

        if params.erase_first {
            dev.erase_range(0, geo.num_pages - 1)?;
        }

        // 数据区开头四个块留给内部文件：各一个子索引块加一个数据块
        let hash_child = geo.data_start();
        let hash_data = geo.data_start() + geo.block_size;
        let meta_child = geo.data_start() + 2 * geo.block_size;
        let meta_data = geo.data_start() + 3 * geo.block_size;

        info::write_page0(dev.as_ref(), &geo, hash_child, meta_child)?;
        IndexEntry::store(dev.as_ref(), &geo, hash_child, 0, hash_data.into(), WriteHint::Fresh)?;
        IndexEntry::store(dev.as_ref(), &geo, meta_child, 0, meta_data.into(), WriteHint::Fresh)?;

        // 状态区全 1（空闲），开头四位对应上面四个常驻块置 0，
        // 位图有效长度之外的字节置 0，免得扫描捡到不存在的块
        let state_bytes = geo.state_bytes();
        let mut page = vec![0u8; geo.page_size as usize];
        for i in 0..geo.state_pages {
            let base = i * geo.page_size;
            for (j, b) in page.iter_mut().enumerate() {
                *b = if base + (j as u32) < state_bytes { 0xFF } else { 0x00 };
            }
            if i == 0 {
                page[0] = 0x0F;
            }
            dev.write(1 + i, &page, 0, WriteHint::Fresh)?;
        }

        dev.flush()?;
        log::info!(
            "tefs: formatted {} pages, block size {}, state section {} pages",
            geo.num_pages,
            geo.block_size,
            geo.state_pages
        );

        Self::mount(dev)
    }

    /// 从已格式化的设备恢复挂载状态
    pub fn mount(dev: Arc<dyn BlockDevice>) -> Result<Arc<Mutex<Self>>> {
        let geo = info::read_geometry(dev.as_ref())?;
        let hash_file = Self::load_bootstrap(dev.as_ref(), &geo, info::HASH_FILE_FIELDS)?;
        let meta_file = Self::load_bootstrap(dev.as_ref(), &geo, info::META_FILE_FIELDS)?;
        let state = StateSection::prime(&geo, dev.as_ref())?;

        log::debug!(
            "tefs: mounted, page size {}, {} pages",
            geo.page_size,
            geo.num_pages
        );

        Ok(Arc::new(Mutex::new(Self {
            dev,
            geo,
            state,
            hash_file,
            meta_file,
        })))
    }

    /// 打开名为 `name` 的文件，不存在就创建
    pub fn open(fs: &Arc<Mutex<Self>>, name: &str) -> Result<File> {
        let mut guard = fs.lock();
        let this = &mut *guard;
        if name.len() > this.geo.max_file_name_size as usize {
            return Err(Error::FileNameTooLong);
        }

        let Self {
            dev,
            geo,
            state,
            hash_file,
            meta_file,
        } = this;
        let inner = match dir::lookup(
            geo,
            state,
            dev.as_ref(),
            hash_file,
            meta_file,
            name,
            LookupOp::Create,
        )? {
            Lookup::Found(slot) => Self::load_file(dev.as_ref(), geo, meta_file, slot)?,
            Lookup::Created(slot) => {
                Self::create_file(dev.as_ref(), geo, state, meta_file, slot, name)?
            }
            Lookup::Missing => unreachable!("create lookup always yields a slot"),
        };
        this.sync_directory()?;

        drop(guard);
        Ok(File::new(fs.clone(), inner))
    }

    /// `name` 是否存在且在用
    pub fn exists(fs: &Arc<Mutex<Self>>, name: &str) -> Result<bool> {
        let mut guard = fs.lock();
        let this = &mut *guard;
        if name.len() > this.geo.max_file_name_size as usize {
            return Ok(false);
        }

        let Self {
            dev,
            geo,
            state,
            hash_file,
            meta_file,
        } = this;
        let found = matches!(
            dir::lookup(
                geo,
                state,
                dev.as_ref(),
                hash_file,
                meta_file,
                name,
                LookupOp::Find,
            )?,
            Lookup::Found(_)
        );
        Ok(found)
    }

    /// 删除文件：释放它引用的全部块，把记录标成已删除，
    /// 最后清零哈希槽留下墓碑
    pub fn remove(fs: &Arc<Mutex<Self>>, name: &str) -> Result<()> {
        let mut guard = fs.lock();
        let this = &mut *guard;
        if name.len() > this.geo.max_file_name_size as usize {
            return Err(Error::FileNotFound);
        }

        let Self {
            dev,
            geo,
            state,
            hash_file,
            meta_file,
        } = this;
        let slot = match dir::lookup(
            geo,
            state,
            dev.as_ref(),
            hash_file,
            meta_file,
            name,
            LookupOp::Find,
        )? {
            Lookup::Found(slot) => slot,
            _ => return Err(Error::FileNotFound),
        };

        let mut hdr = [0u8; record::STATIC_SIZE as usize];
        meta_file.read_page(geo, dev.as_ref(), slot.record.page, &mut hdr, slot.record.byte)?;
        let (_, eof_page, _, root) = record::parse_header(&hdr);

        this.release_file_blocks(root, eof_page)?;

        let Self {
            dev,
            geo,
            state,
            hash_file,
            meta_file,
        } = this;
        meta_file.write_page(
            geo,
            state,
            dev.as_ref(),
            None,
            slot.record.page,
            &[RecordStatus::Deleted as u8],
            slot.record.byte,
        )?;
        let zero = [0u8; 4];
        hash_file.write_page(
            geo,
            state,
            dev.as_ref(),
            None,
            slot.hash.page,
            &zero[..geo.hash_size as usize],
            slot.hash.byte,
        )?;
        dev.flush()?;
        Ok(())
    }

    /// 据引导槽恢复一份内部文件的句柄
    fn load_bootstrap(dev: &dyn BlockDevice, geo: &Geometry, field: u16) -> Result<FileHandle> {
        let (eof_page, eof_byte, root) = info::read_bootstrap(dev, field)?;
        FileHandle::open_at(dev, geo, DirPos::Bootstrap { field }, eof_page, eof_byte, root)
    }

    /// 打开一个已存在的文件：读出记录里的尺寸与根地址
    fn load_file(
        dev: &dyn BlockDevice,
        geo: &Geometry,
        meta_file: &mut FileHandle,
        slot: DirSlot,
    ) -> Result<FileHandle> {
        let mut hdr = [0u8; record::STATIC_SIZE as usize];
        meta_file.read_page(geo, dev, slot.record.page, &mut hdr, slot.record.byte)?;
        let (_, eof_page, eof_byte, root) = record::parse_header(&hdr);
        FileHandle::open_at(
            dev,
            geo,
            DirPos::Record(slot.record),
            eof_page,
            eof_byte,
            root,
        )
    }

    /// 建新文件：写记录、占首个子索引块与数据块。
    /// 状态字节最后才翻成在用，中途断电只会留下一条
    /// 对后续查找不可见的半成品记录。
    fn create_file(
        dev: &dyn BlockDevice,
        geo: &Geometry,
        state: &mut StateSection,
        meta_file: &mut FileHandle,
        slot: DirSlot,
        name: &str,
    ) -> Result<FileHandle> {
        let child = state.reserve(geo, dev)?;
        let rec = record::build(geo, child, name);
        meta_file.write_page(geo, state, dev, None, slot.record.page, &rec, slot.record.byte)?;
        meta_file.write_page(
            geo,
            state,
            dev,
            None,
            slot.record.page,
            &[RecordStatus::InUse as u8],
            slot.record.byte,
        )?;

        let data = state.reserve(geo, dev)?;
        IndexEntry::store(dev, geo, child, 0, data.into(), WriteHint::Fresh)?;

        Ok(FileHandle::fresh(DirPos::Record(slot.record), child, data))
    }

    /// 释放一个文件引用的所有块：数据块在前，然后是途经的
    /// 子索引块，最后是根索引块（若有）。只走到 `eof_page`
    /// 所在的槽位为止。
    fn release_file_blocks(&mut self, root: u32, eof_page: u32) -> Result<()> {
        let Self {
            dev, geo, state, ..
        } = self;
        let dev = dev.as_ref();

        let two_level = eof_page >= geo.one_level_limit();
        let (last_rp, last_rb) = geo.root_slot(eof_page);
        let (last_cp, last_cb) = geo.child_slot(eof_page);

        let mut done = false;
        let mut rp = 0;
        'outer: while rp <= last_rp {
            let mut rb: u16 = 0;
            while (rb as u32) < geo.page_size {
                let child = if two_level {
                    IndexEntry::load(dev, geo, root + rp, rb)?.validate()
                } else {
                    Some(root)
                };

                if let Some(child) = child {
                    'child: for cp in 0..geo.block_size {
                        let mut cb: u16 = 0;
                        while (cb as u32) < geo.page_size {
                            if let Some(data) =
                                IndexEntry::load(dev, geo, child + cp, cb)?.validate()
                            {
                                state.release(geo, dev, data)?;
                            }
                            if rp == last_rp && rb == last_rb && cp == last_cp && cb == last_cb {
                                done = true;
                                break 'child;
                            }
                            cb += geo.address_size as u16;
                        }
                    }
                    state.release(geo, dev, child)?;
                } else if rp == last_rp && rb == last_rb {
                    done = true;
                }

                if done {
                    break 'outer;
                }
                rb += geo.address_size as u16;
            }
            rp += 1;
        }

        if two_level {
            state.release(geo, dev, root)?;
        }
        Ok(())
    }

    /// 目录操作收尾：把两份内部文件的尺寸写回信息页并落盘
    fn sync_directory(&mut self) -> Result<()> {
        let Self {
            dev,
            geo,
            state,
            hash_file,
            meta_file,
        } = self;
        hash_file.sync_size(geo, state, dev.as_ref(), None)?;
        meta_file.sync_size(geo, state, dev.as_ref(), None)?;
        dev.flush()?;
        Ok(())
    }
}
