use crate::{ATAG_CMDLINE, ATAG_CORE, ATAG_INITRD2, ATAG_MEM, ATAG_NONE, TAG_HEADER_SIZE};
use alloc::vec::Vec;

/// `tag_core.flags`; only bit 0 is defined.
#[bitfield_struct::bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct CoreFlags {
    /// Mount the root device read-only.
    #[bits(1)]
    pub read_only: bool,
    #[bits(31)]
    __: u32,
}

/// Payload of an `ATAG_CORE` record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TagCore {
    pub flags: CoreFlags,
    pub page_size: u32,
    pub root_dev: u32,
}

/// A single record of a tag list.
///
/// Records of a kind this codec does not model, and modelled kinds whose
/// payload has an unexpected size, are kept as [`Tag::Other`] so that they
/// serialize back to exactly the bytes they were parsed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag {
    Core(TagCore),
    /// `ATAG_MEM`. Fields are in record order: size first, then start.
    Mem32 { size: u32, start: u32 },
    /// `ATAG_INITRD2`: physical location of the ramdisk.
    InitRd2 { start: u32, size: u32 },
    /// `ATAG_CMDLINE` payload, NUL terminated. Padding to the next word is implicit.
    CmdLine(Vec<u8>),
    /// Any other record; `payload` is a whole number of words.
    Other { tag: u32, payload: Vec<u8> },
    /// The terminating record.
    None,
}

impl Tag {
    /// Decode one record from its tag id and payload bytes.
    pub(crate) fn decode(tag: u32, payload: &[u8]) -> Self {
        match (tag, payload.len()) {
            (ATAG_CORE, 12) => Self::Core(TagCore {
                flags: CoreFlags::from_bits(word(payload, 0)),
                page_size: word(payload, 1),
                root_dev: word(payload, 2),
            }),
            (ATAG_MEM, 8) => Self::Mem32 {
                size: word(payload, 0),
                start: word(payload, 1),
            },
            (ATAG_INITRD2, 8) => Self::InitRd2 {
                start: word(payload, 0),
                size: word(payload, 1),
            },
            (ATAG_CMDLINE, _) => Self::CmdLine(payload.to_vec()),
            _ => Self::Other {
                tag,
                payload: payload.to_vec(),
            },
        }
    }

    /// The record's tag id.
    #[must_use]
    pub const fn id(&self) -> u32 {
        match self {
            Self::Core(_) => ATAG_CORE,
            Self::Mem32 { .. } => ATAG_MEM,
            Self::InitRd2 { .. } => ATAG_INITRD2,
            Self::CmdLine(_) => ATAG_CMDLINE,
            Self::Other { tag, .. } => *tag,
            Self::None => ATAG_NONE,
        }
    }

    /// Value of the header's `size` field in 32-bit words.
    ///
    /// The terminator declares size zero even though it occupies a header.
    #[must_use]
    pub const fn size_words(&self) -> usize {
        match self {
            Self::Core(_) => 5,
            Self::Mem32 { .. } | Self::InitRd2 { .. } => 4,
            Self::CmdLine(text) => (TAG_HEADER_SIZE + text.len() + 3) >> 2,
            Self::Other { payload, .. } => (TAG_HEADER_SIZE + payload.len()) >> 2,
            Self::None => 0,
        }
    }

    /// Number of bytes the record occupies in a serialized list.
    #[must_use]
    pub const fn byte_len(&self) -> usize {
        match self {
            Self::None => TAG_HEADER_SIZE,
            _ => self.size_words() * 4,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) {
        let start = out.len();
        out.extend_from_slice(&(self.size_words() as u32).to_le_bytes());
        out.extend_from_slice(&self.id().to_le_bytes());
        match self {
            Self::Core(core) => {
                out.extend_from_slice(&core.flags.into_bits().to_le_bytes());
                out.extend_from_slice(&core.page_size.to_le_bytes());
                out.extend_from_slice(&core.root_dev.to_le_bytes());
            }
            Self::Mem32 { size, start } => {
                out.extend_from_slice(&size.to_le_bytes());
                out.extend_from_slice(&start.to_le_bytes());
            }
            Self::InitRd2 { start, size } => {
                out.extend_from_slice(&start.to_le_bytes());
                out.extend_from_slice(&size.to_le_bytes());
            }
            Self::CmdLine(bytes) | Self::Other { payload: bytes, .. } => {
                out.extend_from_slice(bytes);
            }
            Self::None => {}
        }
        out.resize(start + self.byte_len(), 0);
    }
}

fn word(payload: &[u8], index: usize) -> u32 {
    let off = index * 4;
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&payload[off..off + 4]);
    u32::from_le_bytes(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_flags_read_only_bit() {
        let flags = CoreFlags::from_bits(1);
        assert!(flags.read_only());
        assert_eq!(CoreFlags::new().with_read_only(true).into_bits(), 1);
        assert!(!CoreFlags::from_bits(0xffff_fffe).read_only());
    }

    #[test]
    fn cmdline_size_rounds_up_to_words() {
        let tag = Tag::CmdLine(b"console=ttyAMA0\0".to_vec());
        assert_eq!(tag.size_words(), 6);
        assert_eq!(tag.byte_len(), 24);

        let mut out = Vec::new();
        tag.encode_into(&mut out);
        assert_eq!(out.len(), 24);
        assert_eq!(&out[8..24], b"console=ttyAMA0\0");
    }

    #[test]
    fn padding_is_zeroed() {
        let mut out = Vec::new();
        Tag::CmdLine(b"ro\0".to_vec()).encode_into(&mut out);
        assert_eq!(out, [3, 0, 0, 0, 0x09, 0, 0x41, 0x54, b'r', b'o', 0, 0]);
    }

    #[test]
    fn terminator_declares_zero_words() {
        let mut out = Vec::new();
        Tag::None.encode_into(&mut out);
        assert_eq!(out, [0u8; 8]);
    }

    #[test]
    fn mismatched_payload_sizes_are_kept_opaque() {
        let tag = Tag::decode(ATAG_CORE, &[]);
        assert_eq!(
            tag,
            Tag::Other {
                tag: ATAG_CORE,
                payload: Vec::new()
            }
        );
        assert_eq!(tag.size_words(), 2);
    }
}
