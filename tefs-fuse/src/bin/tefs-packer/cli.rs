use std::path::PathBuf;

use clap::Parser;

/// Packs a directory of host files into a fresh tefs image
#[derive(Parser)]
pub struct Cli {
    /// Source directory with files to pack
    #[arg(long, short)]
    pub source: PathBuf,

    /// Output directory for the image
    #[arg(long, short = 'O')]
    pub out_dir: PathBuf,

    /// Device size in pages
    #[arg(long, default_value_t = 62500)]
    pub pages: u32,

    /// Erase the whole device before formatting
    #[arg(long)]
    pub erase: bool,
}
