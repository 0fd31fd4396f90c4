use crate::tag::{Tag, TagCore};
use crate::{
    ATAG_CMDLINE, ATAG_INITRD, ATAG_INITRD2, ATAG_NONE, TAG_HEADER_SIZE, TAG_LIST_CAPACITY,
    TagError,
};
use alloc::vec::Vec;
use log::{debug, trace};

/// A physical memory bank as found in a device tree `memory/reg` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryReg {
    pub base: u32,
    pub size: u32,
}

impl MemoryReg {
    /// Decode the first `{base, size}` pair of big-endian cells.
    ///
    /// Returns `None` on a short read.
    #[must_use]
    pub fn from_be_bytes(reg: &[u8]) -> Option<Self> {
        let base = reg.get(0..4)?;
        let size = reg.get(4..8)?;
        Some(Self {
            base: u32::from_be_bytes([base[0], base[1], base[2], base[3]]),
            size: u32::from_be_bytes([size[0], size[1], size[2], size[3]]),
        })
    }
}

/// An ordered tag list. The last record is always [`Tag::None`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagList {
    tags: Vec<Tag>,
}

impl TagList {
    /// Parse a firmware tag snapshot.
    ///
    /// Parsing stops at the first record of size zero or at the end of the
    /// snapshot, whichever comes first.
    ///
    /// # Errors
    /// A record shorter than its header or extending past the snapshot.
    pub fn parse(snapshot: &[u8]) -> Result<Self, TagError> {
        let mut tags = Vec::new();
        let mut offset = 0;

        while let Some(header) = snapshot.get(offset..offset + TAG_HEADER_SIZE) {
            let size = read_u32_le(header, 0);
            let tag = read_u32_le(header, 4);
            if size == 0 {
                break;
            }
            if size < 2 {
                return Err(TagError::RecordTooShort { offset, size });
            }

            let len = (size as usize)
                .checked_mul(4)
                .ok_or(TagError::RecordOverrun { offset, size })?;
            let record = offset
                .checked_add(len)
                .and_then(|end| snapshot.get(offset..end))
                .ok_or(TagError::RecordOverrun { offset, size })?;

            trace!("tag {tag:#010x} at {offset:#x}, {size} words");
            tags.push(Tag::decode(tag, &record[TAG_HEADER_SIZE..]));
            offset += len;
        }

        tags.push(Tag::None);
        Ok(Self { tags })
    }

    /// Build the tag list for the next kernel.
    ///
    /// With an `existing` list every record except the initrd, command line
    /// and terminator records is carried over verbatim. Without one, a
    /// [`Tag::Core`] record is emitted, followed by a [`Tag::Mem32`] record if
    /// `memory` yields a bank.
    ///
    /// A ramdisk produces an [`Tag::InitRd2`] record whose start is zero until
    /// [`TagList::set_initrd_start`] resolves it. The command line is
    /// copied as-is with its last byte forced to NUL.
    pub fn build(
        existing: Option<&Self>,
        memory: impl FnOnce() -> Option<MemoryReg>,
        ramdisk_size: Option<u32>,
        command_line: Option<&[u8]>,
    ) -> Self {
        let mut tags = Vec::new();

        if let Some(existing) = existing {
            tags.extend(
                existing
                    .tags
                    .iter()
                    .filter(|tag| {
                        !matches!(
                            tag.id(),
                            ATAG_INITRD | ATAG_INITRD2 | ATAG_CMDLINE | ATAG_NONE
                        )
                    })
                    .cloned(),
            );
            debug!("carried over {} firmware tags", tags.len());
        } else {
            tags.push(Tag::Core(TagCore::default()));
            if let Some(reg) = memory() {
                debug!("memory bank {:#010x}+{:#x}", reg.base, reg.size);
                tags.push(Tag::Mem32 {
                    size: reg.size,
                    start: reg.base,
                });
            }
        }

        if let Some(size) = ramdisk_size {
            tags.push(Tag::InitRd2 { start: 0, size });
        }

        if let Some(command_line) = command_line {
            let mut text = command_line.to_vec();
            match text.last_mut() {
                Some(last) => *last = 0,
                None => text.push(0),
            }
            tags.push(Tag::CmdLine(text));
        }

        tags.push(Tag::None);
        Self { tags }
    }

    #[must_use]
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// Resolve the start address of the `InitRd2` record.
    ///
    /// Returns `false` if the list carries no such record.
    pub fn set_initrd_start(&mut self, address: u32) -> bool {
        for tag in &mut self.tags {
            if let Tag::InitRd2 { start, .. } = tag {
                *start = address;
                return true;
            }
        }
        false
    }

    /// Serialized length in bytes, including the terminator.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.tags.iter().map(Tag::byte_len).sum()
    }

    /// Serialize into a contiguous buffer of at most [`TAG_LIST_CAPACITY`] bytes.
    ///
    /// # Errors
    /// [`TagError::Overflow`] if the records do not fit into one page.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TagError> {
        let needed = self.byte_len();
        if needed > TAG_LIST_CAPACITY {
            return Err(TagError::Overflow {
                needed,
                capacity: TAG_LIST_CAPACITY,
            });
        }

        let mut out = Vec::with_capacity(needed);
        for tag in &self.tags {
            tag.encode_into(&mut out);
        }
        Ok(out)
    }
}

fn read_u32_le(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}
