mod common;

use std::sync::Arc;

use tefs::{FormatParams, TefsFileSystem, CHECK_FLAG};

use common::MemDisk;

#[test]
fn format_writes_information_page() {
    let disk = Arc::new(MemDisk::new(62500, 512));
    let fs = TefsFileSystem::format(disk.clone(), &common::default_params()).unwrap();
    drop(fs);

    assert_eq!(disk.peek(0, 0, 4), [CHECK_FLAG; 4]);
    assert_eq!(disk.peek(0, 4, 4), 62500u32.to_le_bytes());
    // log2(页大小)、log2(块大小)、log2(地址宽)、哈希槽宽度
    assert_eq!(disk.peek(0, 8, 4), [9, 3, 2, 4]);
    assert_eq!(disk.peek(0, 12, 2), 32u16.to_le_bytes());
    assert_eq!(disk.peek(0, 14, 2), 12u16.to_le_bytes());
    // 状态区：ceil((62499 / 64) / 512) = 2 页
    assert_eq!(disk.peek(0, 16, 4), 2u32.to_le_bytes());

    // 两份内部文件都是零长，引导槽分别指向数据区头两个子索引块
    assert_eq!(disk.peek(0, 20, 6), [0; 6]);
    assert_eq!(disk.peek(0, 26, 4), 3u32.to_le_bytes());
    assert_eq!(disk.peek(0, 30, 6), [0; 6]);
    assert_eq!(disk.peek(0, 36, 4), 19u32.to_le_bytes());
}

#[test]
fn format_seeds_the_state_section() {
    let disk = Arc::new(MemDisk::new(62500, 512));
    let fs = TefsFileSystem::format(disk.clone(), &common::default_params()).unwrap();
    drop(fs);

    // 开头四位被保留块占掉，其余空闲
    assert_eq!(disk.peek(1, 0, 1), [0x0F]);
    assert_eq!(disk.peek(1, 1, 1), [0xFF]);

    // 位图共 62499 / 64 = 976 字节，越过末尾的字节补零
    assert_eq!(disk.peek(2, 463, 1), [0xFF]);
    assert_eq!(disk.peek(2, 464, 1), [0x00]);
    assert_eq!(disk.peek(2, 511, 1), [0x00]);
}

#[test]
fn freshly_formatted_device_mounts_empty() {
    let disk = Arc::new(MemDisk::new(62500, 512));
    let fs = TefsFileSystem::format(disk.clone(), &common::default_params()).unwrap();
    drop(fs);

    let fs = TefsFileSystem::mount(disk).unwrap();
    assert!(!TefsFileSystem::exists(&fs, "anything").unwrap());
}

#[test]
fn small_device_uses_two_byte_addresses() {
    // 页数不足 2^16，地址缩成 2 字节；顺带用 2 字节哈希
    let params = FormatParams {
        num_pages: 4096,
        page_size: 512,
        block_size: 8,
        hash_size: 2,
        metadata_size: 32,
        max_file_name_size: 12,
        erase_first: false,
    };
    let disk = Arc::new(MemDisk::new(4096, 512));
    let fs = TefsFileSystem::format(disk.clone(), &params).unwrap();
    assert_eq!(disk.peek(0, 10, 2), [1, 2]); // log2(地址宽) = 1，哈希槽宽 2

    let mut file = TefsFileSystem::open(&fs, "sensor.dat").unwrap();
    let payload: Vec<u8> = (0..512).map(|i| (i % 251) as u8).collect();
    for page in 0..20 {
        file.write(page, &payload, 0).unwrap();
    }
    file.close().unwrap();
    drop(fs);

    let fs = TefsFileSystem::mount(disk).unwrap();
    assert!(TefsFileSystem::exists(&fs, "sensor.dat").unwrap());
    let mut file = TefsFileSystem::open(&fs, "sensor.dat").unwrap();
    assert_eq!(file.size(), (20, 0));
    let mut buf = vec![0u8; 512];
    for page in [0, 7, 8, 19] {
        file.read(page, &mut buf, 0).unwrap();
        assert_eq!(buf, payload);
    }
}
