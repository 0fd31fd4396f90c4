use crate::{Board, BoardError, LiveDeviceTree};
use alloc::vec::Vec;
use kexec_fdt::{DeviceTree, DeviceTreeBuffer, blobs};
use log::info;

/// Uses the first valid device tree of the image and adds nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Generic;

impl Board for Generic {
    fn names(&self) -> &'static [&'static str] {
        &["generic"]
    }

    fn choose_dtb(&self, image: &[u8], _live: &dyn LiveDeviceTree) -> Result<Vec<u8>, BoardError> {
        let blob = blobs(image)
            .find(|blob| DeviceTree::parse(blob).is_ok())
            .ok_or(BoardError::NoMatchingDtb)?;
        info!("DTB: using the first device tree ({:#x} bytes)", blob.len());
        Ok(blob.to_vec())
    }

    fn add_extra_regs(
        &self,
        _dtb: &mut DeviceTreeBuffer,
        _live: &dyn LiveDeviceTree,
    ) -> Result<(), BoardError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoLiveTree;

    impl LiveDeviceTree for NoLiveTree {
        fn property(&self, _path: &str, _name: &str) -> Option<Vec<u8>> {
            None
        }
    }

    #[test]
    fn first_valid_tree_wins() {
        let first = DeviceTree::new_empty(0x80).unwrap().into_bytes();
        let mut second = DeviceTreeBuffer::from_tree(DeviceTree::new_empty(0x80).unwrap());
        let root = second.root().unwrap();
        second.set_property(root, "model", b"second\0").unwrap();

        let mut image = vec![0u8; 8];
        image.extend_from_slice(&first);
        image.extend_from_slice(&second.into_bytes());

        assert_eq!(Generic.choose_dtb(&image, &NoLiveTree), Ok(first));
    }

    #[test]
    fn image_without_tree_is_rejected() {
        assert_eq!(
            Generic.choose_dtb(&[0xff; 64], &NoLiveTree),
            Err(BoardError::NoMatchingDtb)
        );
    }
}
