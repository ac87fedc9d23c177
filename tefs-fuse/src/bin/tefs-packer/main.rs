mod cli;

use std::fs;
use std::fs::OpenOptions;
use std::io;
use std::sync::Arc;

use block_dev::BlockDevice;
use clap::Parser;
use tefs::{FormatParams, TefsFileSystem};
use tefs_fuse::BlockFile;
use typed_bytesize::ByteSizeIec;

use cli::Cli;

const PAGE_SIZE: u32 = 512;

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let image = cli.out_dir.join("tefs.img");
    let disk_size = cli.pages as u64 * PAGE_SIZE as u64;
    let fd = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&image)?;
    fd.set_len(disk_size)?;
    println!("image={:?} ({})", image, ByteSizeIec(disk_size));

    let dev: Arc<dyn BlockDevice> = Arc::new(BlockFile::new(fd, PAGE_SIZE as usize));
    let fs = TefsFileSystem::format(
        dev,
        &FormatParams {
            num_pages: cli.pages,
            page_size: PAGE_SIZE,
            block_size: 8,
            hash_size: 4,
            metadata_size: 32,
            max_file_name_size: 12,
            erase_first: cli.erase,
        },
    )
    .expect("formatting failed");

    for entry in fs::read_dir(&cli.source)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry
            .file_name()
            .into_string()
            .expect("file name isn't valid UTF-8");
        let data = fs::read(entry.path())?;
        log::info!("packing {name:?}, {} bytes", data.len());

        let mut file = TefsFileSystem::open(&fs, &name).expect("creating file failed");
        for (page, chunk) in data.chunks(PAGE_SIZE as usize).enumerate() {
            file.write(page as u32, chunk, 0).expect("writing page failed");
        }
        file.close().expect("closing file failed");
    }

    Ok(())
}
