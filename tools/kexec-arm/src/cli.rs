use crate::error::Error;
use clap::{ArgAction, Parser};
use kexec_zimage::{BootConfig, DtbSelection};
use std::fs;
use std::path::{Path, PathBuf};

/// Prepare an ARM zImage for kexec and print the resulting segments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The kernel, a `zImage` or an Android boot image.
    #[arg(required_unless_present = "list_boards")]
    pub kernel: Option<PathBuf>,

    /// The kernel command line.
    #[arg(short = 'a', long = "command-line", visible_alias = "append", value_name = "STRING")]
    pub command_line: Option<String>,

    /// The ramdisk to pass along.
    #[arg(short = 'r', long, visible_alias = "ramdisk", value_name = "PATH")]
    pub initrd: Option<PathBuf>,

    /// Boot with a device tree. Without a path the one appended to the
    /// kernel or the one of the running system is used.
    #[arg(
        short = 'd',
        long,
        value_name = "PATH",
        num_args = 0..=1,
        require_equals = true
    )]
    pub dtb: Option<Option<PathBuf>>,

    /// Boot with an ATAG list.
    #[arg(long)]
    pub atags: bool,

    /// Decompressed kernel size, in bytes.
    #[arg(long, value_parser = parse_number, value_name = "BYTES")]
    pub image_size: Option<u64>,

    /// Kernel virtual page offset.
    #[arg(long, value_parser = parse_number, value_name = "ADDR")]
    pub page_offset: Option<u64>,

    /// The board the device tree is prepared for, see `--list-boards`.
    #[arg(short = 'b', long, value_name = "NAME")]
    pub boardname: Option<String>,

    /// Load a panic kernel into the crash kernel region.
    #[arg(short = 'p', long)]
    pub load_panic: bool,

    /// The physical memory map.
    #[arg(long, default_value = "/proc/iomem", value_name = "PATH")]
    pub iomem: PathBuf,

    /// Directory procfs and sysfs are read below.
    #[arg(long, default_value = "/", value_name = "DIR")]
    pub root: PathBuf,

    /// Write each segment into a file in this directory.
    #[arg(long, value_name = "DIR")]
    pub dump: Option<PathBuf>,

    /// More output; repeat for more.
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Print the supported board names and exit.
    #[arg(long)]
    pub list_boards: bool,
}

/// Parse a decimal or `0x` prefixed hexadecimal number.
fn parse_number(text: &str) -> Result<u64, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{text}': {e}"))
}

pub(crate) fn read(path: &Path) -> Result<Vec<u8>, Error> {
    fs::read(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })
}

impl Cli {
    /// Load the files named on the command line into a [`BootConfig`].
    ///
    /// # Errors
    /// A given file cannot be read.
    pub fn boot_config(&self) -> Result<BootConfig, Error> {
        let ramdisk = self.initrd.as_deref().map(read).transpose()?;
        let dtb = match &self.dtb {
            None => DtbSelection::Unspecified,
            Some(None) => DtbSelection::Discover,
            Some(Some(path)) => DtbSelection::File(read(path)?),
        };

        Ok(BootConfig {
            command_line: self.command_line.clone(),
            ramdisk,
            dtb,
            atags: self.atags,
            image_size: self.image_size,
            page_offset: self.page_offset,
            board: self.boardname.clone(),
            crash: self.load_panic,
        })
    }
}
