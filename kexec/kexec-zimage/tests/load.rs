use kexec_addresses::{MemoryRange, PhysicalAddress};
use kexec_atags::{Tag, TagCore, TagList};
use kexec_boards::LiveDeviceTree;
use kexec_fdt::{DeviceTree, DeviceTreeBuffer};
use kexec_layout::{LayoutError, MemoryMap, Segment, SegmentTable};
use kexec_zimage::{
    BootConfig, ConfigError, CrashDumpHook, DtbSelection, ErrorKind, Firmware, LoadError, load,
};

const RAM_BASE: u64 = 0x8000_0000;
const RAM_SIZE: u64 = 0x2000_0000;

#[derive(Default)]
struct FakeFirmware {
    atags: Option<Vec<u8>>,
    fdt: Option<Vec<u8>>,
    properties: Vec<(&'static str, &'static str, Vec<u8>)>,
}

impl FakeFirmware {
    fn with_property(mut self, path: &'static str, name: &'static str, value: Vec<u8>) -> Self {
        self.properties.push((path, name, value));
        self
    }
}

impl LiveDeviceTree for FakeFirmware {
    fn property(&self, path: &str, name: &str) -> Option<Vec<u8>> {
        self.properties
            .iter()
            .find(|(p, n, _)| *p == path && *n == name)
            .map(|(_, _, value)| value.clone())
    }
}

impl Firmware for FakeFirmware {
    fn atags(&self) -> Option<Vec<u8>> {
        self.atags.clone()
    }

    fn flattened_device_tree(&self) -> Option<Vec<u8>> {
        self.fdt.clone()
    }
}

/// Registers a one page ELF core header high in the crash region.
#[derive(Default)]
struct ElfCoreHeader {
    page_offset: Option<u64>,
}

impl CrashDumpHook for ElfCoreHeader {
    fn load_crashdump_segments(
        &mut self,
        table: &mut dyn SegmentTable,
        command_line: &mut Vec<u8>,
        page_offset: Option<u64>,
    ) -> Result<(), LayoutError> {
        self.page_offset = page_offset;
        let min = PhysicalAddress::new(0x9700_0000);
        let base = table
            .locate_hole(0x1000, 0x1000, min.as_u64(), u64::MAX)
            .ok_or(LayoutError::NoHole { size: 0x1000, min })?;
        table.add_segment(Segment {
            bytes: vec![0xee; 0x100],
            base,
            memsz: 0x1000,
        })?;
        command_line.extend_from_slice(format!(" elfcorehdr={:#x}", base.as_u64()).as_bytes());
        Ok(())
    }
}

fn ram() -> MemoryMap {
    MemoryMap::new(vec![MemoryRange::new(
        PhysicalAddress::new(RAM_BASE),
        RAM_SIZE,
    )])
}

fn cells(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

fn device_tree(model: &str, properties: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut dtb = DeviceTreeBuffer::from_tree(DeviceTree::new_empty(0x100).unwrap());
    let root = dtb.root().unwrap();
    dtb.set_property(root, "model", format!("{model}\0").as_bytes())
        .unwrap();
    for (name, value) in properties {
        dtb.set_property(root, name, value).unwrap();
    }
    dtb.into_bytes()
}

/// A `zImage` of `len` bytes with `dtb` appended behind its declared end.
fn zimage_with_dtb(len: usize, dtb: &[u8]) -> Vec<u8> {
    let mut image = vec![0x11u8; len];
    image[0x24..0x28].copy_from_slice(&0x016f_2818u32.to_le_bytes());
    image[0x28..0x2C].copy_from_slice(&0u32.to_le_bytes());
    image[0x2C..0x30].copy_from_slice(&u32::try_from(len).unwrap().to_le_bytes());
    image.extend_from_slice(dtb);
    image
}

fn chosen_property<'a>(dtb: &'a [u8], name: &str) -> &'a [u8] {
    let fdt = fdt::Fdt::new(dtb).unwrap();
    fdt.find_node("/chosen")
        .and_then(|chosen| chosen.property(name))
        .map(|property| property.value)
        .unwrap()
}

fn model(dtb: &[u8]) -> Vec<u8> {
    let tree = DeviceTree::parse(dtb).unwrap();
    let root = tree.root().unwrap();
    tree.property(root, "model").unwrap().unwrap().to_vec()
}

fn bases(table: &MemoryMap) -> Vec<u64> {
    table.segments().iter().map(|s| s.base.as_u64()).collect()
}

#[test]
fn atags_path_registers_tags_ramdisk_and_kernel() {
    let kernel = vec![0x11u8; 0x2000];
    let config = BootConfig {
        atags: true,
        command_line: Some("console=ttyAMA0".into()),
        ramdisk: Some(vec![0x52; 0x3000]),
        ..BootConfig::default()
    };
    let firmware =
        FakeFirmware::default().with_property("/memory", "reg", cells(&[0x8000_0000, 0x2000_0000]));
    let mut table = ram();

    let outcome = load(&kernel, &config, &mut table, &firmware, None).unwrap();

    assert_eq!(outcome.entry, PhysicalAddress::new(0x8000_8000));
    // ramdisk behind five times the compressed kernel
    assert_eq!(outcome.plan.initrd_base, PhysicalAddress::new(0x8001_2000));
    assert_eq!(bases(&table), [0x8000_1000, 0x8001_2000, 0x8000_8000]);

    let segments = table.segments();
    assert_eq!(segments[1].memsz, 0x3000);
    assert_eq!(segments[2].memsz, 0x2004);
    assert_eq!(segments[2].bytes.len(), 0x2000);

    let tags = TagList::parse(&segments[0].bytes).unwrap();
    assert_eq!(
        tags.tags(),
        [
            Tag::Core(TagCore::default()),
            Tag::Mem32 {
                size: 0x2000_0000,
                start: 0x8000_0000
            },
            Tag::InitRd2 {
                start: 0x8001_2000,
                size: 0x3000
            },
            Tag::CmdLine(b"console=ttyAMA0\0".to_vec()),
            Tag::None,
        ]
    );
}

#[test]
fn atags_path_carries_over_firmware_tags() {
    let firmware_tags = TagList::build(
        None,
        || {
            Some(kexec_atags::MemoryReg {
                base: 0x8000_0000,
                size: 0x1000_0000,
            })
        },
        Some(0x1000),
        Some(b"old\0"),
    );
    let firmware = FakeFirmware {
        atags: Some(firmware_tags.to_bytes().unwrap()),
        ..FakeFirmware::default()
    };
    let config = BootConfig {
        atags: true,
        command_line: Some("new".into()),
        ..BootConfig::default()
    };
    let mut table = ram();

    load(&[0x11; 0x1000], &config, &mut table, &firmware, None).unwrap();

    let tags = TagList::parse(&table.segments()[0].bytes).unwrap();
    assert_eq!(
        tags.tags(),
        [
            firmware_tags.tags()[0].clone(),
            firmware_tags.tags()[1].clone(),
            Tag::CmdLine(b"new\0".to_vec()),
            Tag::None,
        ]
    );
}

#[test]
fn empty_firmware_tag_list_builds_a_fresh_one() {
    let firmware = FakeFirmware {
        atags: Some(Vec::new()),
        ..FakeFirmware::default()
    }
    .with_property("/memory", "reg", cells(&[0x8000_0000, 0x2000_0000]));
    let config = BootConfig {
        atags: true,
        ..BootConfig::default()
    };
    let mut table = ram();

    load(&[0x11; 0x1000], &config, &mut table, &firmware, None).unwrap();

    let tags = TagList::parse(&table.segments()[0].bytes).unwrap();
    assert_eq!(
        tags.tags(),
        [
            Tag::Core(TagCore::default()),
            Tag::Mem32 {
                size: 0x2000_0000,
                start: 0x8000_0000
            },
            Tag::None,
        ]
    );
}

#[test]
fn android_image_supplies_ramdisk_and_command_line() {
    let page = 2048usize;
    let mut image = vec![0u8; page];
    image[..8].copy_from_slice(b"ANDROID!");
    image[8..12].copy_from_slice(&0x1000u32.to_le_bytes());
    image[16..20].copy_from_slice(&0x800u32.to_le_bytes());
    image[36..40].copy_from_slice(&2048u32.to_le_bytes());
    image[64..64 + 12].copy_from_slice(b"quiet rw ro\0");
    image.extend_from_slice(&[0x4b; 0x1000]);
    image.extend_from_slice(&[0x52; 0x800]);

    let config = BootConfig {
        atags: true,
        ..BootConfig::default()
    };
    let mut table = ram();
    load(&image, &config, &mut table, &FakeFirmware::default(), None).unwrap();

    let segments = table.segments();
    assert_eq!(segments.len(), 3);
    assert_eq!(segments[1].bytes, vec![0x52; 0x800]);
    assert_eq!(segments[2].bytes, vec![0x4b; 0x1000]);

    let tags = TagList::parse(&segments[0].bytes).unwrap();
    assert!(tags.tags().contains(&Tag::CmdLine(b"quiet rw ro\0".to_vec())));
}

#[test]
fn dtb_path_registers_ramdisk_dtb_and_kernel() {
    let dtb = device_tree("Test Board", &[]);
    let config = BootConfig {
        board: Some("generic".into()),
        dtb: DtbSelection::File(dtb.clone()),
        command_line: Some("console=ttyAMA0".into()),
        ramdisk: Some(vec![0x52; 0x3000]),
        ..BootConfig::default()
    };
    let mut table = ram();

    let outcome = load(&[0x11; 0x2000], &config, &mut table, &FakeFirmware::default(), None)
        .unwrap();

    assert_eq!(outcome.entry, PhysicalAddress::new(0x8000_8000));
    assert_eq!(bases(&table), [0x8001_2000, 0x8001_6000, 0x8000_8000]);

    let tree = &table.segments()[1].bytes;
    assert!(tree.len() >= dtb.len() + 65536);
    assert_eq!(chosen_property(tree, "bootargs"), b"console=ttyAMA0\0");
    assert_eq!(
        chosen_property(tree, "linux,initrd-start"),
        0x8001_2000u32.to_be_bytes()
    );
    assert_eq!(
        chosen_property(tree, "linux,initrd-end"),
        0x8001_5000u32.to_be_bytes()
    );
    assert_eq!(model(tree), b"Test Board\0");
}

#[test]
fn dtb_window_slides_past_used_memory() {
    let mut table = ram();
    // something already sits where the ramdisk would go
    table
        .add_segment(Segment {
            bytes: vec![0; 0x10],
            base: PhysicalAddress::new(0x8001_3000),
            memsz: 0x1000,
        })
        .unwrap();
    let config = BootConfig {
        board: Some("generic".into()),
        dtb: DtbSelection::File(device_tree("Test Board", &[])),
        ..BootConfig::default()
    };

    let outcome = load(&[0x11; 0x2000], &config, &mut table, &FakeFirmware::default(), None)
        .unwrap();

    assert_eq!(outcome.plan.initrd_base, PhysicalAddress::new(0x8001_4000));
    assert_eq!(table.segments()[1].base, PhysicalAddress::new(0x8001_5000));
}

#[test]
fn appended_dtb_is_used_and_kernel_is_truncated() {
    let kernel = zimage_with_dtb(0x1000, &device_tree("Appended", &[]));
    let config = BootConfig {
        board: Some("generic".into()),
        ..BootConfig::default()
    };
    let firmware = FakeFirmware {
        fdt: Some(device_tree("Live", &[])),
        ..FakeFirmware::default()
    };
    let mut table = ram();

    load(&kernel, &config, &mut table, &firmware, None).unwrap();

    let segments = table.segments();
    assert_eq!(model(&segments[0].bytes), b"Appended\0");
    assert_eq!(segments[1].bytes.len(), 0x1000);
    assert_eq!(segments[1].memsz, 0x1004);
}

#[test]
fn running_system_tree_is_the_last_resort() {
    let config = BootConfig {
        board: Some("generic".into()),
        dtb: DtbSelection::Discover,
        ..BootConfig::default()
    };
    let firmware = FakeFirmware {
        fdt: Some(device_tree("Live", &[])),
        ..FakeFirmware::default()
    };
    let mut table = ram();

    load(&[0x11; 0x1000], &config, &mut table, &firmware, None).unwrap();
    assert_eq!(model(&table.segments()[0].bytes), b"Live\0");

    let mut table = ram();
    let error = load(&[0x11; 0x1000], &config, &mut table, &FakeFirmware::default(), None)
        .unwrap_err();
    assert_eq!(error, LoadError::Config(ConfigError::NoDtbSource));
    assert!(table.segments().is_empty());
}

#[test]
fn qualcomm_board_picks_blob_and_copies_memory() {
    let mut image = b"QCDT".to_vec();
    image.resize(2048, 0);
    for (model, id) in [("rev-a", 0x2000_0000), ("rev-b", 0x2001_0000)] {
        image.extend_from_slice(&device_tree(model, &[("qcom,msm-id", cells(&[126, id]))]));
        image.resize(image.len().next_multiple_of(0x800), 0);
    }

    let config = BootConfig {
        board: Some("hammerhead".into()),
        dtb: DtbSelection::File(image),
        ..BootConfig::default()
    };
    let firmware = FakeFirmware::default()
        .with_property("/", "qcom,msm-id", cells(&[126, 0x2001_0000]))
        .with_property("/memory", "reg", cells(&[0x0, 0x0c00_0000]));
    let mut table = ram();

    load(&[0x11; 0x1000], &config, &mut table, &firmware, None).unwrap();

    let tree = &table.segments()[0].bytes;
    assert_eq!(model(tree), b"rev-b\0");
    let fdt = fdt::Fdt::new(tree).unwrap();
    let memory = fdt.find_node("/memory").unwrap();
    assert_eq!(memory.property("reg").unwrap().value, cells(&[0x0, 0x0c00_0000]));
    assert_eq!(memory.property("device_type").unwrap().value, b"memory\0");
}

#[test]
fn crash_mode_without_region_registers_nothing() {
    for atags in [true, false] {
        let config = BootConfig {
            atags,
            crash: true,
            board: Some("generic".into()),
            dtb: if atags {
                DtbSelection::Unspecified
            } else {
                DtbSelection::File(device_tree("Test Board", &[]))
            },
            ..BootConfig::default()
        };
        let mut table = ram();
        let mut hook = ElfCoreHeader::default();

        let error = load(
            &[0x11; 0x1000],
            &config,
            &mut table,
            &FakeFirmware::default(),
            Some(&mut hook),
        )
        .unwrap_err();

        assert_eq!(error, LoadError::Layout(LayoutError::NoCrashKernel));
        assert_eq!(error.kind(), ErrorKind::NoCrashKernel);
        assert!(table.segments().is_empty());
    }
}

#[test]
fn crash_kernel_goes_to_the_reserved_region() {
    let config = BootConfig {
        crash: true,
        board: Some("generic".into()),
        dtb: DtbSelection::File(device_tree("Test Board", &[])),
        command_line: Some("console=ttyS0".into()),
        page_offset: Some(0xc000_0000),
        ..BootConfig::default()
    };
    let mut table = ram().with_crash_kernel(MemoryRange::new(
        PhysicalAddress::new(0x9000_0000),
        0x0800_0000,
    ));
    let mut hook = ElfCoreHeader::default();

    let outcome = load(
        &[0x11; 0x2000],
        &config,
        &mut table,
        &FakeFirmware::default(),
        Some(&mut hook),
    )
    .unwrap();

    assert_eq!(hook.page_offset, Some(0xc000_0000));
    assert_eq!(outcome.plan.load_base, PhysicalAddress::new(0x9000_0000));
    assert_eq!(outcome.entry, PhysicalAddress::new(0x9000_8000));
    // core header, DTB right behind the empty ramdisk slot, kernel
    assert_eq!(bases(&table), [0x9700_0000, 0x9001_3000, 0x9000_8000]);
    assert_eq!(
        chosen_property(&table.segments()[1].bytes, "bootargs"),
        b"console=ttyS0 elfcorehdr=0x97000000\0"
    );
}

#[test]
fn conflicting_options_fail_before_any_segment() {
    let config = BootConfig {
        atags: true,
        dtb: DtbSelection::Discover,
        ..BootConfig::default()
    };
    let mut table = ram();
    let error = load(&[0x11; 0x1000], &config, &mut table, &FakeFirmware::default(), None)
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Config);
    assert!(table.segments().is_empty());
}

#[test]
fn truncated_zimage_is_a_format_error() {
    let mut kernel = zimage_with_dtb(0x1000, &[]);
    kernel[0x2C..0x30].copy_from_slice(&0x2000u32.to_le_bytes());
    let config = BootConfig {
        atags: true,
        ..BootConfig::default()
    };
    let error = load(&kernel, &config, &mut ram(), &FakeFirmware::default(), None).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Format);
}
