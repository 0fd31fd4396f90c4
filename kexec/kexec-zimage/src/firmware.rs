use alloc::vec::Vec;
use kexec_boards::LiveDeviceTree;
use kexec_layout::{LayoutError, SegmentTable};

/// What the running system tells about itself.
///
/// Every source is optional; `None` means the feature is absent.
pub trait Firmware: LiveDeviceTree {
    /// Snapshot of the tag list the running kernel was booted with.
    fn atags(&self) -> Option<Vec<u8>>;

    /// The flattened device tree the running kernel was booted with.
    fn flattened_device_tree(&self) -> Option<Vec<u8>>;

    /// `reg` of the running system's `/memory` node.
    fn memory_reg(&self) -> Option<Vec<u8>> {
        self.property("/memory", "reg")
    }
}

/// Crash dump preparation run before a panic kernel is placed.
pub trait CrashDumpHook {
    /// Register the crash dump segments (e.g. the ELF core header) and
    /// extend `command_line` accordingly.
    ///
    /// `command_line` holds the text without terminator.
    ///
    /// # Errors
    /// A segment cannot be placed.
    fn load_crashdump_segments(
        &mut self,
        table: &mut dyn SegmentTable,
        command_line: &mut Vec<u8>,
        page_offset: Option<u64>,
    ) -> Result<(), LayoutError>;
}
