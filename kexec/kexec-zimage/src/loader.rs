//! # Boot Pipeline
//!
//! Parse the kernel, place it, build the boot metadata and register the
//! segments. Segments are registered in boot protocol order:
//!
//! | path | order                   |
//! |------|-------------------------|
//! | ATAG | tags, ramdisk, kernel   |
//! | DTB  | ramdisk, DTB, kernel    |

use crate::config::{BootConfig, BootMode, ConfigError, DtbSelection};
use crate::firmware::{CrashDumpHook, Firmware};
use crate::{COMMAND_LINE_SIZE, CommandLine, LoadError};
use alloc::vec::Vec;
use kexec_addresses::{MemoryRange, PhysicalAddress};
use kexec_atags::{BOOT_PARAMS_SIZE, MemoryReg, TagList};
use kexec_boards::Board;
use kexec_fdt::DeviceTreeBuffer;
use kexec_image::{DtbImage, KernelImage, ParseOptions};
use kexec_layout::{
    BasePolicy, CrashRegions, LayoutError, PlacementPlan, Segment, SegmentTable, crash_base,
};
use log::{debug, info, warn};

/// Room added to the chosen device tree before it is patched.
pub const DTB_PAD_SIZE: usize = 65536;

/// The result of a successful load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOutcome {
    /// Where the next kernel starts executing.
    pub entry: PhysicalAddress,
    pub plan: PlacementPlan,
}

/// Prepare `kernel_file` for booting and register its segments in `table`.
///
/// In crash mode the kernel goes to the start of the crash kernel region and
/// `crash_dump`, if given, registers its segments first. Segments registered
/// before a failure are left in the table.
///
/// # Errors
/// Conflicting options, malformed images, a failed board lookup or no room
/// for the segments. [`LayoutError::NoCrashKernel`] is returned, before any
/// segment is registered, when crash mode finds no reserved region.
pub fn load<T, F>(
    kernel_file: &[u8],
    config: &BootConfig,
    table: &mut T,
    firmware: &F,
    crash_dump: Option<&mut dyn CrashDumpHook>,
) -> Result<LoadOutcome, LoadError>
where
    T: SegmentTable + CrashRegions,
    F: Firmware,
{
    let mode = config.validate()?;

    let image = KernelImage::parse(
        kernel_file,
        ParseOptions {
            ramdisk_given: config.ramdisk.is_some(),
            command_line_given: config.command_line.is_some(),
        },
    )?;

    let mut command_line = match (&config.command_line, image.command_line) {
        (Some(text), _) => Some(CommandLine::new(text.as_bytes())),
        (None, Some(field)) => {
            info!("using command line from Android image");
            Some(CommandLine::from_field(field))
        }
        (None, None) => None,
    };

    let ramdisk = config
        .ramdisk
        .as_deref()
        .or(image.ramdisk)
        .filter(|ramdisk| {
            if ramdisk.is_empty() {
                warn!("ignoring empty ramdisk");
            }
            !ramdisk.is_empty()
        });

    let kernel_len = image.kernel.len() as u64;
    let policy = if config.crash {
        let base = crash_base(&*table)?;
        command_line = Some(prepare_crash_dump(
            command_line.as_ref(),
            table,
            crash_dump,
            config.page_offset,
        )?);
        BasePolicy::Fixed(base)
    } else {
        BasePolicy::Search
    };

    let mut plan = PlacementPlan::new(&*table, policy, kernel_len, config.image_size)?;

    match mode {
        BootMode::Atags => {
            load_atags(&mut plan, table, firmware, command_line.as_ref(), ramdisk)?;
        }
        BootMode::DeviceTree(board) => {
            let source = dtb_source(&config.dtb, &image, firmware)?;
            let tree = board.choose_dtb(&source, firmware)?;
            load_device_tree(
                &mut plan,
                table,
                &DeviceTreeInputs {
                    board,
                    firmware,
                    tree: &tree,
                    command_line: command_line.as_ref(),
                    ramdisk,
                    crash: config.crash,
                },
            )?;
        }
    }

    table.add_segment(Segment {
        bytes: image.kernel.to_vec(),
        base: plan.kernel_base,
        memsz: plan.kernel_size,
    })?;

    info!("entry point {}", plan.kernel_base);
    Ok(LoadOutcome {
        entry: plan.kernel_base,
        plan,
    })
}

/// Hand the command line to the crash dump setup and read back the result.
fn prepare_crash_dump(
    command_line: Option<&CommandLine>,
    table: &mut dyn SegmentTable,
    crash_dump: Option<&mut dyn CrashDumpHook>,
    page_offset: Option<u64>,
) -> Result<CommandLine, LayoutError> {
    let mut text: Vec<u8> = command_line.map(|line| line.text().to_vec()).unwrap_or_default();
    text.truncate(COMMAND_LINE_SIZE - 1);

    match crash_dump {
        Some(hook) => hook.load_crashdump_segments(table, &mut text, page_offset)?,
        None => debug!("no crash dump setup, loading the panic kernel only"),
    }

    Ok(CommandLine::new(&text))
}

fn load_atags<T, F>(
    plan: &mut PlacementPlan,
    table: &mut T,
    firmware: &F,
    command_line: Option<&CommandLine>,
    ramdisk: Option<&[u8]>,
) -> Result<(), LoadError>
where
    T: SegmentTable + ?Sized,
    F: Firmware + ?Sized,
{
    let existing = match firmware.atags().filter(|snapshot| !snapshot.is_empty()) {
        Some(snapshot) => {
            let snapshot = &snapshot[..snapshot.len().min(BOOT_PARAMS_SIZE)];
            Some(TagList::parse(snapshot)?)
        }
        None => {
            debug!("no firmware tag list, building a fresh one");
            None
        }
    };

    let ramdisk_size = ramdisk
        .map(|ramdisk| u32::try_from(ramdisk.len()))
        .transpose()
        .map_err(|_| LayoutError::Overflow {
            what: "ramdisk size",
        })?;

    let mut tags = TagList::build(
        existing.as_ref(),
        || firmware.memory_reg().and_then(|reg| MemoryReg::from_be_bytes(&reg)),
        ramdisk_size,
        command_line.map(CommandLine::as_bytes),
    );

    if let Some(ramdisk) = ramdisk {
        let start = plan.place_initrd(&*table, ramdisk.len() as u64)?;
        tags.set_initrd_start(address_u32(start, "ramdisk address")?);
    }

    let atag_base = plan.atag_base()?;
    let bytes = tags.to_bytes()?;
    plan.metadata = Some(MemoryRange::new(atag_base, bytes.len() as u64));
    plan.check_disjoint()?;
    info!("ATAG list at {atag_base}, {:#x} bytes", bytes.len());

    let memsz = bytes.len() as u64;
    table.add_segment(Segment {
        bytes,
        base: atag_base,
        memsz,
    })?;

    if let Some(ramdisk) = ramdisk {
        table.add_segment(Segment {
            bytes: ramdisk.to_vec(),
            base: plan.initrd_base,
            memsz: plan.initrd_size,
        })?;
    }
    Ok(())
}

/// Pick the device tree image: the given file, the one appended to the
/// kernel, or the one the running system booted with.
fn dtb_source<F: Firmware + ?Sized>(
    selection: &DtbSelection,
    image: &KernelImage<'_>,
    firmware: &F,
) -> Result<Vec<u8>, LoadError> {
    if let DtbSelection::File(file) = selection {
        let image = DtbImage::parse(file)?;
        info!("DTB: using {:?} DTB from file", image.kind);
        return Ok(image.payload.to_vec());
    }

    match image.appended_dtb() {
        Ok(appended) => {
            info!("DTB: using DTB appended to zImage");
            return Ok(appended.to_vec());
        }
        Err(e) => debug!("DTB: no appended DTB: {e}"),
    }

    let live = firmware
        .flattened_device_tree()
        .ok_or(ConfigError::NoDtbSource)?;
    let image = DtbImage::parse(&live)?;
    info!("DTB: using the {:?} device tree of the running system", image.kind);
    Ok(image.payload.to_vec())
}

struct DeviceTreeInputs<'a, F: ?Sized> {
    board: &'a dyn Board,
    firmware: &'a F,
    tree: &'a [u8],
    command_line: Option<&'a CommandLine>,
    ramdisk: Option<&'a [u8]>,
    crash: bool,
}

fn load_device_tree<T, F>(
    plan: &mut PlacementPlan,
    table: &mut T,
    inputs: &DeviceTreeInputs<'_, F>,
) -> Result<(), LoadError>
where
    T: SegmentTable + ?Sized,
    F: Firmware,
{
    let mut dtb = DeviceTreeBuffer::open(inputs.tree, DTB_PAD_SIZE)?;
    inputs.board.add_extra_regs(&mut dtb, inputs.firmware)?;

    if let Some(command_line) = inputs.command_line {
        let root = dtb.root()?;
        dtb.setup_property(root, "chosen", "bootargs", &command_line.to_c_string())?;
    }

    plan.initrd_size = inputs.ramdisk.map_or(0, |ramdisk| ramdisk.len() as u64);
    if inputs.crash {
        debug!("crash kernel placement is fixed, skipping the DTB window check");
    } else {
        plan.reserve_dtb_window(&*table, dtb.total_size() as u64)?;
    }

    if inputs.ramdisk.is_some() {
        let start = address_u32(plan.initrd_base, "ramdisk address")?;
        let end = plan
            .initrd_base
            .checked_add(plan.initrd_size)
            .ok_or(LayoutError::Overflow { what: "ramdisk end" })
            .and_then(|end| address_u32(end, "ramdisk end"))?;

        let root = dtb.root()?;
        dtb.setup_property(root, "chosen", "linux,initrd-start", &start.to_be_bytes())?;
        let root = dtb.root()?;
        dtb.setup_property(root, "chosen", "linux,initrd-end", &end.to_be_bytes())?;
    }

    let dtb_base = plan.dtb_base()?;
    let bytes = dtb.into_bytes();
    let memsz = bytes.len() as u64;
    plan.metadata = Some(MemoryRange::new(dtb_base, memsz));
    plan.check_disjoint()?;
    info!("DTB at {dtb_base}, {memsz:#x} bytes");

    if let Some(ramdisk) = inputs.ramdisk {
        table.add_segment(Segment {
            bytes: ramdisk.to_vec(),
            base: plan.initrd_base,
            memsz: plan.initrd_size,
        })?;
    }

    table.add_segment(Segment {
        bytes,
        base: dtb_base,
        memsz,
    })?;
    Ok(())
}

fn address_u32(address: PhysicalAddress, what: &'static str) -> Result<u32, LayoutError> {
    address.as_u32().ok_or(LayoutError::Overflow { what })
}
