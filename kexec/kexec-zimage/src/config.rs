use alloc::string::String;
use alloc::vec::Vec;
use kexec_boards::{Board, find_board};
use log::debug;

/// Where the device tree comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DtbSelection {
    /// Nothing requested; the device tree path is still taken unless ATAGs are.
    #[default]
    Unspecified,
    /// Use the device tree appended to the kernel, else the one the running
    /// system was booted with.
    Discover,
    /// A DTB image file (`QCDT` table or flattened device tree).
    File(Vec<u8>),
}

/// Everything a single load is parameterised with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootConfig {
    pub command_line: Option<String>,
    pub ramdisk: Option<Vec<u8>>,
    pub dtb: DtbSelection,
    /// Boot with an ATAG list instead of a device tree.
    pub atags: bool,
    /// Decompressed kernel size; places the ramdisk right behind it.
    pub image_size: Option<u64>,
    /// Kernel virtual page offset, forwarded to the crash dump setup.
    pub page_offset: Option<u64>,
    pub board: Option<String>,
    /// Load into the crash kernel region.
    pub crash: bool,
}

/// The metadata format the next kernel boots with.
#[derive(Clone, Copy)]
pub enum BootMode {
    Atags,
    DeviceTree(&'static dyn Board),
}

impl core::fmt::Debug for BootMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Atags => f.write_str("Atags"),
            Self::DeviceTree(board) => f
                .debug_tuple("DeviceTree")
                .field(&board.names().first().copied().unwrap_or_default())
                .finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("You can only use ATAGs if you don't specify a dtb")]
    AtagsWithDtb,
    #[error("Unknown boardname '{0}'")]
    UnknownBoard(String),
    #[error("DTB: --boardname was not specified")]
    MissingBoard,
    #[error("DTB: no device tree was given, appended to the kernel or provided by the running system")]
    NoDtbSource,
}

impl BootConfig {
    /// Check the options against each other and resolve the board.
    ///
    /// # Errors
    /// ATAGs combined with a DTB selection, an unknown board name, or the
    /// device tree path without a board.
    pub fn validate(&self) -> Result<BootMode, ConfigError> {
        if self.atags && self.dtb != DtbSelection::Unspecified {
            return Err(ConfigError::AtagsWithDtb);
        }

        let board = self
            .board
            .as_deref()
            .map(|name| find_board(name).map_err(|_| ConfigError::UnknownBoard(name.into())))
            .transpose()?;

        let mode = match (self.atags, board) {
            (true, _) => BootMode::Atags,
            (false, Some(board)) => BootMode::DeviceTree(board),
            (false, None) => return Err(ConfigError::MissingBoard),
        };
        debug!("boot mode {mode:?}, crash {}", self.crash);
        Ok(mode)
    }
}
