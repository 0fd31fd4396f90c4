use crate::header::FdtHeader;

/// Iterate over the device trees stored back to back in `image`.
///
/// Zero padding between blobs is skipped. Iteration ends at the first
/// position that does not hold a valid header.
#[must_use]
pub const fn blobs(image: &[u8]) -> Blobs<'_> {
    Blobs { rest: image }
}

#[derive(Debug, Clone)]
pub struct Blobs<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for Blobs<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        // blob sizes need not be word multiples, so padding is skipped bytewise
        let padding = self
            .rest
            .iter()
            .position(|&b| b != 0)
            .unwrap_or(self.rest.len());
        self.rest = &self.rest[padding..];

        let Ok(header) = FdtHeader::validate(self.rest) else {
            self.rest = &[];
            return None;
        };
        let (blob, rest) = self.rest.split_at(header.total_size as usize);
        self.rest = rest;
        Some(blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeviceTree;
    use crate::tree::tests::board_blob;
    use alloc::vec::Vec;

    #[test]
    fn concatenated_blobs_are_split() {
        let one = board_blob();
        let mut image = one.clone();
        image.extend_from_slice(&[0; 8]);
        image.extend_from_slice(&one);
        image.extend_from_slice(&[0xff; 4]);

        let found: Vec<_> = blobs(&image).collect();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0], &one[..]);
        assert_eq!(found[1], &one[..]);
    }

    #[test]
    fn blobs_of_odd_size_are_found_behind_padding() {
        let mut tree = DeviceTree::new_empty(0x80).unwrap();
        let root = tree.root().unwrap();
        tree.set_property(root, "model", b"odd\0").unwrap();
        tree.grow(3).unwrap();
        let one = tree.into_bytes();
        assert_ne!(one.len() % 4, 0);

        let mut image = one.clone();
        image.resize(0x800, 0);
        image.extend_from_slice(&one);

        let found: Vec<_> = blobs(&image).collect();
        assert_eq!(found, [&one[..], &one[..]]);
    }

    #[test]
    fn garbage_yields_nothing() {
        assert_eq!(blobs(b"QCDT\x01\x00\x00\x00").count(), 0);
        assert_eq!(blobs(&[]).count(), 0);
    }
}
