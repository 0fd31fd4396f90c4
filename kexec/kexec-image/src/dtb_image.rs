use crate::ImageError;
use log::debug;

/// Leading bytes of a Qualcomm device tree table image.
pub const QCDT_MAGIC: &[u8; 4] = b"QCDT";

/// The table header is skipped whole; the blobs follow it.
pub const QCDT_HEADER_SIZE: usize = 2048;

const FDT_MAGIC_BE: [u8; 4] = [0xd0, 0x0d, 0xfe, 0xed];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtbImageKind {
    /// A `QCDT` table image as produced by `dtbTool`.
    Qcdt,
    /// One or more flattened device trees, e.g. `/sys/firmware/fdt`.
    Flat,
}

/// A device tree image file and the blob area it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DtbImage<'a> {
    pub kind: DtbImageKind,
    pub payload: &'a [u8],
}

impl<'a> DtbImage<'a> {
    /// Classify a loaded DTB file.
    ///
    /// # Errors
    /// [`ImageError::DtbImageTooSmall`] for a `QCDT` file without payload,
    /// [`ImageError::DtbImageHeader`] for anything that is neither format.
    pub fn parse(file: &'a [u8]) -> Result<Self, ImageError> {
        if file.starts_with(&FDT_MAGIC_BE) {
            debug!("DTB image: flattened device tree, {:#x} bytes", file.len());
            return Ok(Self {
                kind: DtbImageKind::Flat,
                payload: file,
            });
        }

        if !file.starts_with(QCDT_MAGIC) {
            return Err(ImageError::DtbImageHeader);
        }
        if file.len() <= QCDT_HEADER_SIZE {
            return Err(ImageError::DtbImageTooSmall { len: file.len() });
        }
        debug!("DTB image: QCDT table, {:#x} bytes", file.len());
        Ok(Self {
            kind: DtbImageKind::Qcdt,
            payload: &file[QCDT_HEADER_SIZE..],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qcdt_header_is_skipped() {
        let mut file = vec![0u8; QCDT_HEADER_SIZE + 8];
        file[..4].copy_from_slice(QCDT_MAGIC);
        file[QCDT_HEADER_SIZE..QCDT_HEADER_SIZE + 4].copy_from_slice(&FDT_MAGIC_BE);

        let image = DtbImage::parse(&file).unwrap();
        assert_eq!(image.kind, DtbImageKind::Qcdt);
        assert_eq!(image.payload.len(), 8);
        assert_eq!(&image.payload[..4], &FDT_MAGIC_BE);
    }

    #[test]
    fn qcdt_without_payload_is_too_small() {
        let mut file = vec![0u8; QCDT_HEADER_SIZE];
        file[..4].copy_from_slice(QCDT_MAGIC);
        assert_eq!(
            DtbImage::parse(&file),
            Err(ImageError::DtbImageTooSmall {
                len: QCDT_HEADER_SIZE
            })
        );
    }

    #[test]
    fn flat_blob_is_used_as_is() {
        let mut file = vec![0u8; 64];
        file[..4].copy_from_slice(&FDT_MAGIC_BE);
        let image = DtbImage::parse(&file).unwrap();
        assert_eq!(image.kind, DtbImageKind::Flat);
        assert_eq!(image.payload.len(), 64);
    }

    #[test]
    fn unknown_files_are_rejected() {
        assert_eq!(
            DtbImage::parse(&[0x7f, b'E', b'L', b'F']),
            Err(ImageError::DtbImageHeader)
        );
    }
}
