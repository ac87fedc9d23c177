mod common;

use std::sync::Arc;

use tefs::{hash_name, Error, TefsFileSystem};

use common::MemDisk;

fn payload(seed: u8, page: u32) -> [u8; 512] {
    let mut data = [0u8; 512];
    for (i, b) in data.iter_mut().enumerate() {
        *b = seed ^ (page as u8) ^ (i as u8);
    }
    data
}

#[test]
fn name_hash_is_never_zero() {
    for name in ["", "a", "tefs", "some.name", "x0", "playwright"] {
        assert_ne!(hash_name(name, 4), 0);
        let short = hash_name(name, 2);
        assert_ne!(short, 0);
        assert!(short < 65521);
    }
}

#[test]
fn interleaved_files_stay_apart() {
    let disk = Arc::new(MemDisk::new(62500, 512));
    let fs = TefsFileSystem::format(disk.clone(), &common::default_params()).unwrap();

    let mut f0 = TefsFileSystem::open(&fs, "file.0").unwrap();
    let mut f1 = TefsFileSystem::open(&fs, "file.1").unwrap();
    for page in 0u32..100 {
        f0.write(page, &payload(0x11, page), 0).unwrap();
        f1.write(page, &payload(0x77, page), 0).unwrap();
    }

    let mut buf = [0u8; 512];
    for page in 0u32..100 {
        f0.read(page, &mut buf, 0).unwrap();
        assert_eq!(buf, payload(0x11, page));
        f1.read(page, &mut buf, 0).unwrap();
        assert_eq!(buf, payload(0x77, page));
    }
    f0.close().unwrap();
    f1.close().unwrap();
}

#[test]
fn remove_reclaims_every_block() {
    let disk = Arc::new(MemDisk::new(62500, 512));
    let fs = TefsFileSystem::format(disk.clone(), &common::default_params()).unwrap();

    let mut f0 = TefsFileSystem::open(&fs, "file.0").unwrap();
    let mut f1 = TefsFileSystem::open(&fs, "file.1").unwrap();
    for page in 0u32..100 {
        f0.write(page, &payload(0x11, page), 0).unwrap();
        f1.write(page, &payload(0x77, page), 0).unwrap();
    }
    f0.close().unwrap();
    f1.close().unwrap();

    let before = disk.free_bits(2);
    TefsFileSystem::remove(&fs, "file.0").unwrap();
    // 100 页 = 13 个数据块，加 1 个子索引块；没有根索引块
    assert_eq!(disk.free_bits(2), before + 14);

    // 哈希槽清零成墓碑，记录标成已删除
    assert_eq!(disk.peek(11, 0, 4), [0; 4]);
    assert_eq!(disk.peek(27, 0, 1), [1]);
    assert!(!TefsFileSystem::exists(&fs, "file.0").unwrap());

    // 邻居不受影响
    assert!(TefsFileSystem::exists(&fs, "file.1").unwrap());
    let mut buf = [0u8; 512];
    let mut f1 = TefsFileSystem::open(&fs, "file.1").unwrap();
    f1.read(42, &mut buf, 0).unwrap();
    assert_eq!(buf, payload(0x77, 42));
}

#[test]
fn removed_slot_is_reused() {
    let disk = Arc::new(MemDisk::new(62500, 512));
    let fs = TefsFileSystem::format(disk.clone(), &common::default_params()).unwrap();

    let f0 = TefsFileSystem::open(&fs, "file.0").unwrap();
    let f1 = TefsFileSystem::open(&fs, "file.1").unwrap();
    f0.close().unwrap();
    f1.close().unwrap();
    TefsFileSystem::remove(&fs, "file.0").unwrap();

    // 新文件落进墓碑槽位：0 号哈希槽、0 号记录
    let f2 = TefsFileSystem::open(&fs, "file.2").unwrap();
    f2.close().unwrap();
    assert_eq!(
        common::le32(disk.peek(11, 0, 4)),
        hash_name("file.2", 4)
    );
    assert_eq!(disk.peek(27, 0, 1), [2]);
    assert_eq!(disk.peek(27, 11, 6), *b"file.2");
}

#[test]
fn removed_file_reopens_empty() {
    let disk = Arc::new(MemDisk::new(62500, 512));
    let fs = TefsFileSystem::format(disk.clone(), &common::default_params()).unwrap();

    let mut file = TefsFileSystem::open(&fs, "again").unwrap();
    for page in 0u32..10 {
        file.write(page, &payload(0x42, page), 0).unwrap();
    }
    file.close().unwrap();
    TefsFileSystem::remove(&fs, "again").unwrap();

    let mut file = TefsFileSystem::open(&fs, "again").unwrap();
    assert_eq!(file.size(), (0, 0));
    let mut buf = [0u8; 1];
    assert_eq!(file.read(0, &mut buf, 0), Err(Error::EndOfFile));
}

#[test]
fn colliding_names_keep_separate_data() {
    // DJB2a 撞车的一对名字
    let hash = hash_name("playwright", 4);
    assert_eq!(hash, 195_669_366);
    assert_eq!(hash, hash_name("snush", 4));

    let disk = Arc::new(MemDisk::new(62500, 512));
    let fs = TefsFileSystem::format(disk.clone(), &common::default_params()).unwrap();

    let mut a = TefsFileSystem::open(&fs, "playwright").unwrap();
    let mut b = TefsFileSystem::open(&fs, "snush").unwrap();
    a.write(0, &payload(0xAA, 0), 0).unwrap();
    b.write(0, &payload(0xBB, 0), 0).unwrap();

    let mut buf = [0u8; 512];
    a.read(0, &mut buf, 0).unwrap();
    assert_eq!(buf, payload(0xAA, 0));
    b.read(0, &mut buf, 0).unwrap();
    assert_eq!(buf, payload(0xBB, 0));

    // 哈希文件的头两个槽存着同一个哈希值
    assert_eq!(common::le32(disk.peek(11, 0, 4)), hash);
    assert_eq!(common::le32(disk.peek(11, 4, 4)), hash);
}

#[test]
fn directory_errors() {
    let disk = Arc::new(MemDisk::new(62500, 512));
    let fs = TefsFileSystem::format(disk.clone(), &common::default_params()).unwrap();

    assert_eq!(
        TefsFileSystem::remove(&fs, "missing").unwrap_err(),
        Error::FileNotFound
    );
    assert_eq!(
        TefsFileSystem::open(&fs, "thirteen.char").unwrap_err(),
        Error::FileNameTooLong
    );
    assert!(!TefsFileSystem::exists(&fs, "nobody").unwrap());
}

#[test]
fn directory_grows_past_its_first_page() {
    let disk = Arc::new(MemDisk::new(62500, 512));
    let fs = TefsFileSystem::format(disk.clone(), &common::default_params()).unwrap();

    // 一页装 16 条记录、128 个哈希槽；130 个文件迫使哈希文件翻页，
    // 元数据文件还得为第二个数据块走一次按需分配
    for i in 0..130 {
        let name = format!("f{i:03}");
        let mut file = TefsFileSystem::open(&fs, &name).unwrap();
        file.write(0, &payload(i as u8, 0), 0).unwrap();
        file.close().unwrap();
    }
    drop(fs);

    let fs = TefsFileSystem::mount(disk).unwrap();
    for i in (0..130).rev() {
        let name = format!("f{i:03}");
        assert!(TefsFileSystem::exists(&fs, &name).unwrap());
        let mut file = TefsFileSystem::open(&fs, &name).unwrap();
        let mut buf = [0u8; 512];
        file.read(0, &mut buf, 0).unwrap();
        assert_eq!(buf, payload(i as u8, 0));
    }
}
