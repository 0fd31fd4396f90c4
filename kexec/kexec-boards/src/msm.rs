use crate::{Board, BoardError, LiveDeviceTree};
use alloc::vec::Vec;
use kexec_fdt::{DeviceTree, DeviceTreeBuffer, blobs};
use log::{debug, info, warn};

const MSM_ID: &str = "qcom,msm-id";
const BOARD_ID: &str = "qcom,board-id";

/// A Qualcomm MSM board.
///
/// The DTB image holds one blob per SoC and board revision, each tagged
/// with `qcom,msm-id` (and on newer devices `qcom,board-id`) tuples. The blob
/// whose tuples include the running machine's values is chosen. The memory
/// layout the bootloader wrote into the live tree is carried over.
#[derive(Debug, Clone, Copy)]
pub struct Msm {
    names: &'static [&'static str],
    match_board_id: bool,
}

impl Msm {
    /// LG Nexus 5.
    pub const HAMMERHEAD: Self = Self {
        names: &["hammerhead"],
        match_board_id: false,
    };
    /// OnePlus One.
    pub const BACON: Self = Self {
        names: &["bacon"],
        match_board_id: false,
    };
    /// HTC One (M8).
    pub const M8: Self = Self {
        names: &["m8"],
        match_board_id: true,
    };
    /// LG G3.
    pub const D851: Self = Self {
        names: &["d851"],
        match_board_id: true,
    };
    /// Motorola Nexus 6.
    pub const SHAMU: Self = Self {
        names: &["shamu"],
        match_board_id: true,
    };

    fn live_id(live: &dyn LiveDeviceTree, name: &'static str) -> Result<Vec<u8>, BoardError> {
        live.property("/", name)
            .filter(|value| !value.is_empty())
            .ok_or(BoardError::MissingLiveProperty { path: "/", name })
    }

    fn matches(tree: &DeviceTree, name: &str, wanted: &[u8]) -> bool {
        let Ok(root) = tree.root() else {
            return false;
        };
        match tree.property(root, name) {
            Ok(Some(tuples)) => contains_tuple(tuples, wanted),
            _ => false,
        }
    }
}

/// Whether `tuples` holds `wanted` as one of its `wanted.len()` wide entries.
fn contains_tuple(tuples: &[u8], wanted: &[u8]) -> bool {
    !wanted.is_empty() && tuples.chunks_exact(wanted.len()).any(|tuple| tuple == wanted)
}

impl Board for Msm {
    fn names(&self) -> &'static [&'static str] {
        self.names
    }

    fn choose_dtb(&self, image: &[u8], live: &dyn LiveDeviceTree) -> Result<Vec<u8>, BoardError> {
        let msm_id = Self::live_id(live, MSM_ID)?;
        let board_id = if self.match_board_id {
            Some(Self::live_id(live, BOARD_ID)?)
        } else {
            None
        };

        for (index, blob) in blobs(image).enumerate() {
            let tree = match DeviceTree::parse(blob) {
                Ok(tree) => tree,
                Err(e) => {
                    warn!("DTB: skipping blob {index}: {e}");
                    continue;
                }
            };

            let msm_match = Self::matches(&tree, MSM_ID, &msm_id);
            let board_match = board_id
                .as_deref()
                .is_none_or(|id| Self::matches(&tree, BOARD_ID, id));
            debug!("DTB: blob {index}: msm-id match {msm_match}, board-id match {board_match}");

            if msm_match && board_match {
                info!("DTB: using blob {index} ({:#x} bytes)", blob.len());
                return Ok(blob.to_vec());
            }
        }

        Err(BoardError::NoMatchingDtb)
    }

    fn add_extra_regs(
        &self,
        dtb: &mut DeviceTreeBuffer,
        live: &dyn LiveDeviceTree,
    ) -> Result<(), BoardError> {
        let Some(reg) = live.property("/memory", "reg") else {
            warn!("DTB: the running system has no /memory reg, keeping the image layout");
            return Ok(());
        };

        let root = dtb.root()?;
        let existed = dtb.tree().subnode_offset(root, "memory")?.is_some();
        let memory = dtb.ensure_subnode(root, "memory")?;
        if !existed {
            dtb.set_property(memory, "device_type", b"memory\0")?;
        }

        let root = dtb.root()?;
        dtb.setup_property(root, "memory", "reg", &reg)?;
        debug!("DTB: copied {} bytes of /memory reg", reg.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::String;

    #[derive(Default)]
    struct Live(Vec<(String, String, Vec<u8>)>);

    impl Live {
        fn with(mut self, path: &str, name: &str, value: &[u32]) -> Self {
            self.0.push((path.into(), name.into(), cells(value)));
            self
        }
    }

    impl LiveDeviceTree for Live {
        fn property(&self, path: &str, name: &str) -> Option<Vec<u8>> {
            self.0
                .iter()
                .find(|(p, n, _)| p == path && n == name)
                .map(|(_, _, value)| value.clone())
        }
    }

    fn cells(values: &[u32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    fn blob(model: &str, msm_id: &[u32], board_id: &[u32]) -> Vec<u8> {
        let mut dtb = DeviceTreeBuffer::from_tree(DeviceTree::new_empty(0x80).unwrap());
        let root = dtb.root().unwrap();
        dtb.set_property(root, "model", model.as_bytes()).unwrap();
        dtb.set_property(root, MSM_ID, &cells(msm_id)).unwrap();
        if !board_id.is_empty() {
            dtb.set_property(root, BOARD_ID, &cells(board_id)).unwrap();
        }
        dtb.into_bytes()
    }

    fn image(blobs: &[Vec<u8>]) -> Vec<u8> {
        let mut image = Vec::new();
        for blob in blobs {
            image.extend_from_slice(blob);
            image.resize(image.len().next_multiple_of(0x800), 0);
        }
        image
    }

    fn model(blob: &[u8]) -> Vec<u8> {
        let tree = DeviceTree::parse(blob).unwrap();
        let root = tree.root().unwrap();
        tree.property(root, "model").unwrap().unwrap().to_vec()
    }

    #[test]
    fn tuples_match_on_whole_entries() {
        let tuples = cells(&[126, 0x2000_0000, 194, 0x1000_0000]);
        assert!(contains_tuple(&tuples, &cells(&[194, 0x1000_0000])));
        assert!(!contains_tuple(&tuples, &cells(&[0x2000_0000, 194])));
        assert!(!contains_tuple(&tuples, &[]));
    }

    #[test]
    fn hammerhead_picks_blob_by_msm_id() {
        let image = image(&[
            blob("rev-a", &[126, 0x2000_0000], &[]),
            blob("rev-b", &[126, 0x2000_0000, 126, 0x2001_0000], &[]),
        ]);
        let live = Live::default().with("/", MSM_ID, &[126, 0x2001_0000]);

        let chosen = Msm::HAMMERHEAD.choose_dtb(&image, &live).unwrap();
        assert_eq!(model(&chosen), b"rev-b");
    }

    #[test]
    fn board_id_narrows_the_choice() {
        let image = image(&[
            blob("evt", &[194, 0x1000_0000], &[8, 0]),
            blob("dvt", &[194, 0x1000_0000], &[8, 1]),
        ]);
        let live = Live::default()
            .with("/", MSM_ID, &[194, 0x1000_0000])
            .with("/", BOARD_ID, &[8, 1]);

        assert_eq!(model(&Msm::M8.choose_dtb(&image, &live).unwrap()), b"dvt");
        // boards without board-id matching take the first msm-id hit
        assert_eq!(
            model(&Msm::BACON.choose_dtb(&image, &live).unwrap()),
            b"evt"
        );
    }

    #[test]
    fn missing_live_identity_is_an_error() {
        let image = image(&[blob("a", &[1, 2], &[])]);
        assert_eq!(
            Msm::HAMMERHEAD.choose_dtb(&image, &Live::default()),
            Err(BoardError::MissingLiveProperty {
                path: "/",
                name: MSM_ID
            })
        );

        let live = Live::default().with("/", MSM_ID, &[1, 2]);
        assert_eq!(
            Msm::SHAMU.choose_dtb(&image, &live),
            Err(BoardError::MissingLiveProperty {
                path: "/",
                name: BOARD_ID
            })
        );
    }

    #[test]
    fn no_match_is_an_error() {
        let image = image(&[blob("a", &[1, 2], &[])]);
        let live = Live::default().with("/", MSM_ID, &[3, 4]);
        assert_eq!(
            Msm::HAMMERHEAD.choose_dtb(&image, &live),
            Err(BoardError::NoMatchingDtb)
        );
    }

    #[test]
    fn memory_reg_is_copied_from_live_tree() {
        let blob = blob("a", &[1, 2], &[]);
        let mut dtb = DeviceTreeBuffer::open(&blob, 0).unwrap();
        let live = Live::default().with(
            "/memory",
            "reg",
            &[0x0, 0x0f00_0000, 0x1000_0000, 0x1000_0000],
        );
        Msm::HAMMERHEAD.add_extra_regs(&mut dtb, &live).unwrap();

        let tree = dtb.tree();
        let memory = tree.path_offset("/memory").unwrap().unwrap();
        assert_eq!(
            tree.property(memory, "reg").unwrap(),
            Some(&cells(&[0x0, 0x0f00_0000, 0x1000_0000, 0x1000_0000])[..])
        );
        assert_eq!(
            tree.property(memory, "device_type").unwrap(),
            Some(&b"memory\0"[..])
        );
    }

    #[test]
    fn existing_memory_node_is_updated() {
        let mut dtb = DeviceTreeBuffer::from_tree(DeviceTree::new_empty(0x80).unwrap());
        let root = dtb.root().unwrap();
        dtb.setup_property(root, "memory@0", "reg", &cells(&[0, 0x100])).unwrap();

        let live = Live::default().with("/memory", "reg", &[0x8000_0000, 0x2000_0000]);
        Msm::BACON.add_extra_regs(&mut dtb, &live).unwrap();

        let tree = dtb.tree();
        let memory = tree.path_offset("/memory").unwrap().unwrap();
        assert_eq!(tree.node_name(memory).unwrap(), b"memory@0");
        assert_eq!(
            tree.property(memory, "reg").unwrap(),
            Some(&cells(&[0x8000_0000, 0x2000_0000])[..])
        );
        assert_eq!(tree.property(memory, "device_type").unwrap(), None);
    }

    #[test]
    fn missing_live_memory_is_skipped() {
        let blob = blob("a", &[1, 2], &[]);
        let mut dtb = DeviceTreeBuffer::open(&blob, 0).unwrap();
        let before = dtb.as_bytes().to_vec();
        Msm::SHAMU.add_extra_regs(&mut dtb, &Live::default()).unwrap();
        assert_eq!(dtb.as_bytes(), &before[..]);
    }
}
