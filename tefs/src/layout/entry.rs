use block_dev::{BlockDevice, WriteHint};
use derive_more::{From, Into};

use crate::error::Result;
use crate::geometry::Geometry;

/// 索引槽的原始取值
///
/// `0` 与 `1` 是保留标记；块地址从数据区起始页算起，至少为 2，
/// 不会与标记重合。
#[derive(Debug, Clone, Copy, PartialEq, Eq, From, Into)]
pub(crate) struct IndexEntry(u32);

impl IndexEntry {
    /// 从未被写入过
    pub const FREE: Self = Self(0);

    /// 曾被占用，后被释放
    pub const DELETED: Self = Self(1);

    /// 槽里是真实块地址时返回它
    pub fn validate(self) -> Option<u32> {
        (self != Self::FREE && self != Self::DELETED).then_some(self.0)
    }

    /// 从索引页读出一条地址，按几何参数决定槽宽
    pub fn load(dev: &dyn BlockDevice, geo: &Geometry, page: u32, byte: u16) -> Result<Self> {
        let mut buf = [0u8; 4];
        dev.read(page, &mut buf[..geo.address_size as usize], byte as usize)?;
        Ok(Self(u32::from_le_bytes(buf)))
    }

    /// 把一条地址写进索引页
    pub fn store(
        dev: &dyn BlockDevice,
        geo: &Geometry,
        page: u32,
        byte: u16,
        value: Self,
        hint: WriteHint,
    ) -> Result<()> {
        let bytes = value.0.to_le_bytes();
        dev.write(page, &bytes[..geo.address_size as usize], byte as usize, hint)?;
        Ok(())
    }
}
