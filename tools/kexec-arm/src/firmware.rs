//! The running system as seen through procfs and sysfs.

use kexec_atags::BOOT_PARAMS_SIZE;
use kexec_boards::LiveDeviceTree;
use kexec_zimage::Firmware;
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

const ATAGS: &str = "proc/atags";
const DEVICE_TREE: &str = "proc/device-tree";
const SYSFS_FDT: &str = "sys/firmware/fdt";

/// Reads firmware information below a root directory, normally `/`.
#[derive(Debug, Clone)]
pub struct ProcFirmware {
    root: PathBuf,
}

impl ProcFirmware {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read(&self, relative: &Path) -> Option<Vec<u8>> {
        let path = self.root.join(relative);
        match fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                debug!("{}: {e}", path.display());
                None
            }
        }
    }
}

impl LiveDeviceTree for ProcFirmware {
    fn property(&self, path: &str, name: &str) -> Option<Vec<u8>> {
        let node = path.trim_matches('/');
        let mut relative = PathBuf::from(DEVICE_TREE);
        if !node.is_empty() {
            relative.push(node);
        }
        relative.push(name);
        self.read(&relative)
    }
}

impl Firmware for ProcFirmware {
    fn atags(&self) -> Option<Vec<u8>> {
        let mut snapshot = self.read(Path::new(ATAGS)).filter(|s| !s.is_empty())?;
        snapshot.truncate(BOOT_PARAMS_SIZE);
        Some(snapshot)
    }

    fn flattened_device_tree(&self) -> Option<Vec<u8>> {
        self.read(Path::new(SYSFS_FDT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("kexec-arm-{}-{name}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(dir.join("proc/device-tree/memory")).unwrap();
        dir
    }

    #[test]
    fn properties_map_to_files() {
        let root = scratch("properties");
        fs::write(root.join("proc/device-tree/memory/reg"), [0x80, 0, 0, 0, 0x10, 0, 0, 0]).unwrap();
        fs::write(root.join("proc/device-tree/qcom,msm-id"), [0, 0, 0, 126]).unwrap();

        let firmware = ProcFirmware::new(&root);
        assert_eq!(
            firmware.memory_reg(),
            Some(vec![0x80, 0, 0, 0, 0x10, 0, 0, 0])
        );
        assert_eq!(firmware.property("/", "qcom,msm-id"), Some(vec![0, 0, 0, 126]));
        assert_eq!(firmware.property("/chosen", "bootargs"), None);

        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn atags_snapshot_is_bounded() {
        let root = scratch("atags");
        fs::write(root.join("proc/atags"), vec![0u8; BOOT_PARAMS_SIZE + 100]).unwrap();

        let firmware = ProcFirmware::new(&root);
        assert_eq!(firmware.atags().as_deref().map(<[u8]>::len), Some(BOOT_PARAMS_SIZE));
        assert_eq!(firmware.flattened_device_tree(), None);

        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn empty_atags_file_is_absent() {
        let root = scratch("empty-atags");
        fs::write(root.join("proc/atags"), []).unwrap();

        assert_eq!(ProcFirmware::new(&root).atags(), None);

        fs::remove_dir_all(root).unwrap();
    }
}
