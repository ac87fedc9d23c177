//! # 几何参数
//!
//! 设备在格式化时选定页大小、块大小等参数，此后整个磁盘布局
//! 都由这组参数推导出来。索引遍历所需的"文件页 → 索引槽"映射
//! 也集中在这里。
//!
//! ## 索引槽编码
//!
//! - 块号除以每块可容纳的地址数，得到子索引块的序号
//! - 序号乘以地址宽再对页大小取模，得到槽在页内的字节偏移

use crate::layout::record;

/// [`TefsFileSystem::format`](crate::TefsFileSystem::format) 的参数
pub struct FormatParams {
    /// 设备总页数
    pub num_pages: u32,
    /// 页大小（字节），必须是 2 的幂
    pub page_size: u32,
    /// 块大小（页数），必须是 2 的幂
    pub block_size: u32,
    /// 目录哈希槽宽度，2 或 4 字节
    pub hash_size: u32,
    /// 单条元数据记录的大小，含文件名
    pub metadata_size: u32,
    /// 文件名的固定上限
    pub max_file_name_size: u32,
    /// 格式化前是否整盘擦除
    pub erase_first: bool,
}

/// 挂载后全局共享的一组布局参数
#[derive(Debug, Clone)]
pub(crate) struct Geometry {
    pub num_pages: u32,
    pub page_size: u32,
    pub block_size: u32,
    /// 索引中一条地址的宽度：设备页数不足 2^16 时为 2，否则为 4
    pub address_size: u32,
    pub hash_size: u32,
    pub metadata_size: u32,
    pub max_file_name_size: u32,
    /// 状态区占用的页数
    pub state_pages: u32,
}

impl Geometry {
    pub fn from_params(p: &FormatParams) -> Self {
        assert!(
            p.page_size.is_power_of_two() && p.block_size.is_power_of_two(),
            "page size and block size must be powers of two"
        );
        assert!(
            (64..=32768).contains(&p.page_size),
            "page size out of range"
        );
        assert!(matches!(p.hash_size, 2 | 4), "hash size must be 2 or 4");
        assert_eq!(
            p.page_size % p.metadata_size,
            0,
            "metadata records must not straddle pages"
        );
        assert!(
            p.metadata_size >= record::STATIC_SIZE + p.max_file_name_size,
            "metadata record too small for the file name"
        );

        let address_size = if p.num_pages < 1 << 16 { 2 } else { 4 };
        let state_bytes = (p.num_pages - 1) / (p.block_size * 8);
        assert!(state_bytes > 0, "device too small for a state section");
        let state_pages = (state_bytes - 1) / p.page_size + 1;

        let geo = Self {
            num_pages: p.num_pages,
            page_size: p.page_size,
            block_size: p.block_size,
            address_size,
            hash_size: p.hash_size,
            metadata_size: p.metadata_size,
            max_file_name_size: p.max_file_name_size,
            state_pages,
        };
        assert!(
            geo.data_start() + 4 * geo.block_size <= geo.num_pages,
            "device too small for the bootstrap blocks"
        );

        geo
    }

    /// 数据区的起始页，同时是 0 号逻辑块的地址
    #[inline]
    pub fn data_start(&self) -> u32 {
        1 + self.state_pages
    }

    /// 状态区位图的有效字节数
    #[inline]
    pub fn state_bytes(&self) -> u32 {
        (self.num_pages - 1) / (self.block_size * 8)
    }

    /// 一页能容纳多少条地址
    #[inline]
    pub fn pointers_per_page(&self) -> u32 {
        self.page_size / self.address_size
    }

    /// 一个索引块能容纳多少条地址
    #[inline]
    pub fn addresses_per_block(&self) -> u32 {
        self.pointers_per_page() * self.block_size
    }

    /// 单级索引模式下 `eof_page` 的上限；
    /// 到达该值时为文件配备根索引块
    #[inline]
    pub fn one_level_limit(&self) -> u32 {
        self.block_size * self.pointers_per_page()
    }

    /// 文件页所在的逻辑块号
    #[inline]
    pub fn block_no(&self, page: u32) -> u32 {
        page / self.block_size
    }

    /// 文件页所属子索引块的序号
    #[inline]
    pub fn child_ordinal(&self, page: u32) -> u32 {
        self.block_no(page) / self.addresses_per_block()
    }

    /// 逻辑块号在根索引中的槽位：块内页序 + 页内字节偏移
    pub fn root_slot_of(&self, block_no: u32) -> (u32, u16) {
        let child_no = block_no / self.addresses_per_block();
        (
            child_no / self.pointers_per_page(),
            ((child_no * self.address_size) % self.page_size) as u16,
        )
    }

    /// 逻辑块号在其子索引块中的槽位
    pub fn child_slot_of(&self, block_no: u32) -> (u32, u16) {
        let slot = block_no % self.addresses_per_block();
        (
            slot / self.pointers_per_page(),
            ((slot * self.address_size) % self.page_size) as u16,
        )
    }

    #[inline]
    pub fn root_slot(&self, page: u32) -> (u32, u16) {
        self.root_slot_of(self.block_no(page))
    }

    #[inline]
    pub fn child_slot(&self, page: u32) -> (u32, u16) {
        self.child_slot_of(self.block_no(page))
    }
}
