use crate::header::FdtHeader;
use crate::token::{PROP_HEADER_SIZE, Token, token_at};
use crate::{
    FDT_BEGIN_NODE, FDT_END, FDT_END_NODE, FDT_HEADER_SIZE, FDT_LAST_COMP_VERSION, FDT_MAGIC,
    FDT_PROP, FDT_VERSION, FdtError,
};
use alloc::vec::Vec;
use core::fmt;
use kexec_addresses::tag_align;

/// Offset of a `FDT_BEGIN_NODE` token, relative to the structure block.
///
/// Offsets of nodes located after a mutation point move when the tree is
/// modified; look them up again after each mutation.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeOffset(usize);

impl NodeOffset {
    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Debug for NodeOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeOffset({:#x})", self.0)
    }
}

/// Location of a property token.
#[derive(Debug, Clone, Copy)]
struct PropertySlot {
    offset: usize,
    len: usize,
}

/// An owned device tree in read-write layout.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceTree {
    data: Vec<u8>,
    header: FdtHeader,
}

impl DeviceTree {
    /// Copy and normalize a blob, keeping its declared total size.
    ///
    /// # Errors
    /// The blob fails header or structure validation.
    pub fn parse(blob: &[u8]) -> Result<Self, FdtError> {
        let header = FdtHeader::validate(blob)?;
        let used = Self::normalized_len(blob, &header)?;
        Self::open_into(blob, used.max(header.total_size as usize))
    }

    /// Copy a blob into a fresh buffer of exactly `size` bytes in
    /// read-write layout.
    ///
    /// # Errors
    /// The blob is malformed, [`FdtError::NoSpace`] if `size` cannot hold its
    /// contents, or [`FdtError::OutOfMemory`] if storage cannot be allocated.
    pub fn open_into(blob: &[u8], size: usize) -> Result<Self, FdtError> {
        let source = FdtHeader::validate(blob)?;
        let rsvmap = reservation_map(blob, &source)?;
        let structure = struct_block(blob, &source)?;
        let strings_at = source.off_dt_strings as usize;
        let strings = &blob[strings_at..strings_at + source.size_dt_strings as usize];

        let off_struct = FDT_HEADER_SIZE + rsvmap.len();
        let off_strings = off_struct + structure.len();
        let used = off_strings + strings.len();
        if size < used {
            return Err(FdtError::NoSpace {
                needed: used - size,
            });
        }
        let total_size =
            u32::try_from(size).map_err(|_| FdtError::OutOfMemory { requested: size })?;

        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|_| FdtError::OutOfMemory { requested: size })?;
        data.resize(FDT_HEADER_SIZE, 0);
        data.extend_from_slice(rsvmap);
        data.extend_from_slice(structure);
        data.extend_from_slice(strings);
        data.resize(size, 0);

        let mut tree = Self {
            data,
            header: FdtHeader {
                magic: FDT_MAGIC,
                total_size,
                off_dt_struct: cell(off_struct),
                off_dt_strings: cell(off_strings),
                off_mem_rsvmap: cell(FDT_HEADER_SIZE),
                version: FDT_VERSION,
                last_comp_version: FDT_LAST_COMP_VERSION,
                boot_cpuid_phys: source.boot_cpuid_phys,
                size_dt_strings: source.size_dt_strings,
                size_dt_struct: cell(structure.len()),
            },
        };
        tree.sync_header();
        tree.check_structure()?;
        Ok(tree)
    }

    /// A tree holding only an empty root node, padded to `size` bytes.
    ///
    /// # Errors
    /// `size` is too small for the empty tree or cannot be allocated.
    pub fn new_empty(size: usize) -> Result<Self, FdtError> {
        let mut blob = [0u8; FDT_HEADER_SIZE + 16 + 16];
        let off_struct = FDT_HEADER_SIZE + 16;
        FdtHeader {
            magic: FDT_MAGIC,
            total_size: cell(blob.len()),
            off_dt_struct: cell(off_struct),
            off_dt_strings: cell(blob.len()),
            off_mem_rsvmap: cell(FDT_HEADER_SIZE),
            version: FDT_VERSION,
            last_comp_version: FDT_LAST_COMP_VERSION,
            boot_cpuid_phys: 0,
            size_dt_strings: 0,
            size_dt_struct: 16,
        }
        .write(&mut blob);
        for (i, token) in [FDT_BEGIN_NODE, 0, FDT_END_NODE, FDT_END].iter().enumerate() {
            let at = off_struct + i * 4;
            blob[at..at + 4].copy_from_slice(&token.to_be_bytes());
        }
        Self::open_into(&blob, size)
    }

    #[must_use]
    pub const fn header(&self) -> &FdtHeader {
        &self.header
    }

    /// Declared total size, equal to the length of the backing storage.
    #[must_use]
    pub const fn total_size(&self) -> usize {
        self.header.total_size as usize
    }

    /// Unused bytes at the end of the buffer.
    #[must_use]
    pub const fn free_space(&self) -> usize {
        self.total_size() - self.used()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Grow the buffer by `additional` zero bytes of free space.
    ///
    /// # Errors
    /// [`FdtError::OutOfMemory`] if storage cannot be allocated or the size
    /// no longer fits the 32-bit header field.
    pub fn grow(&mut self, additional: usize) -> Result<(), FdtError> {
        let size = self
            .total_size()
            .checked_add(additional)
            .ok_or(FdtError::OutOfMemory {
                requested: usize::MAX,
            })?;
        let total_size =
            u32::try_from(size).map_err(|_| FdtError::OutOfMemory { requested: size })?;
        self.data
            .try_reserve_exact(additional)
            .map_err(|_| FdtError::OutOfMemory { requested: size })?;
        self.data.resize(size, 0);
        self.header.total_size = total_size;
        self.sync_header();
        Ok(())
    }

    /// The root node.
    ///
    /// # Errors
    /// The structure block does not start with a node.
    pub fn root(&self) -> Result<NodeOffset, FdtError> {
        let block = self.block();
        let mut offset = 0;
        loop {
            match token_at(block, offset)? {
                (Token::Nop, next) => offset = next,
                (Token::BeginNode(_), _) => return Ok(NodeOffset(offset)),
                _ => return Err(FdtError::BadStructure { offset }),
            }
        }
    }

    /// Name of a node including its unit address, empty for the root.
    ///
    /// # Errors
    /// `node` is not a node offset.
    pub fn node_name(&self, node: NodeOffset) -> Result<&[u8], FdtError> {
        self.check_node(node).map(|(name, _)| name)
    }

    /// Find the direct child of `parent` named `name`.
    ///
    /// A name without a unit address also matches `name@unit`.
    ///
    /// # Errors
    /// `parent` is not a node or the structure is malformed.
    pub fn subnode_offset(
        &self,
        parent: NodeOffset,
        name: &str,
    ) -> Result<Option<NodeOffset>, FdtError> {
        let block = self.block();
        let (_, mut offset) = self.check_node(parent)?;
        let mut depth = 0usize;

        loop {
            let (token, next) = token_at(block, offset)?;
            match token {
                Token::BeginNode(child) => {
                    if depth == 0 && name_matches(child, name.as_bytes()) {
                        return Ok(Some(NodeOffset(offset)));
                    }
                    depth += 1;
                }
                Token::EndNode => {
                    if depth == 0 {
                        return Ok(None);
                    }
                    depth -= 1;
                }
                Token::Prop { .. } | Token::Nop => {}
                Token::End => return Err(FdtError::BadStructure { offset }),
            }
            offset = next;
        }
    }

    /// Resolve an absolute path such as `/chosen` or `/soc/memory`.
    ///
    /// # Errors
    /// The structure is malformed.
    pub fn path_offset(&self, path: &str) -> Result<Option<NodeOffset>, FdtError> {
        let mut node = self.root()?;
        for component in path.split('/').filter(|c| !c.is_empty()) {
            match self.subnode_offset(node, component)? {
                Some(child) => node = child,
                None => return Ok(None),
            }
        }
        Ok(Some(node))
    }

    /// Value of the property `name` of `node`.
    ///
    /// # Errors
    /// `node` is not a node or the structure is malformed.
    pub fn property(&self, node: NodeOffset, name: &str) -> Result<Option<&[u8]>, FdtError> {
        Ok(self.find_property(node, name)?.map(|slot| {
            let start = slot.offset + PROP_HEADER_SIZE;
            &self.block()[start..start + slot.len]
        }))
    }

    /// Set `name` on `node` to `value`, creating the property if needed.
    ///
    /// Existing properties are resized in place. New properties become the
    /// first property of the node.
    ///
    /// # Errors
    /// [`FdtError::NoSpace`] with the shortfall if the free tail is too
    /// short, in which case the tree is unchanged.
    pub fn set_property(
        &mut self,
        node: NodeOffset,
        name: &str,
        value: &[u8],
    ) -> Result<(), FdtError> {
        if name.is_empty() || name.as_bytes().contains(&0) {
            return Err(FdtError::BadName);
        }
        let (_, first_property) = self.check_node(node)?;
        let free = self.free_space();

        if let Some(slot) = self.find_property(node, name)? {
            let old_span = tag_align(slot.len);
            let new_span = tag_align(value.len());
            if new_span > old_span + free {
                return Err(FdtError::NoSpace {
                    needed: new_span - old_span - free,
                });
            }

            let value_at = slot.offset + PROP_HEADER_SIZE;
            self.splice_struct(value_at, old_span, new_span);
            self.put_u32(slot.offset + 4, cell(value.len()));
            self.block_mut()[value_at..value_at + value.len()].copy_from_slice(value);
        } else {
            let existing = self.find_string(name);
            let string_cost = if existing.is_some() { 0 } else { name.len() + 1 };
            let token_len = PROP_HEADER_SIZE + tag_align(value.len());
            if string_cost + token_len > free {
                return Err(FdtError::NoSpace {
                    needed: string_cost + token_len - free,
                });
            }

            let name_offset = match existing {
                Some(offset) => offset,
                None => self.append_string(name),
            };
            self.splice_struct(first_property, 0, token_len);
            self.put_u32(first_property, FDT_PROP);
            self.put_u32(first_property + 4, cell(value.len()));
            self.put_u32(first_property + 8, cell(name_offset));
            let value_at = first_property + PROP_HEADER_SIZE;
            self.block_mut()[value_at..value_at + value.len()].copy_from_slice(value);
        }

        self.sync_header();
        Ok(())
    }

    /// Add an empty child `name` to `parent`, after the parent's properties.
    ///
    /// # Errors
    /// [`FdtError::Exists`] if a matching child exists, [`FdtError::NoSpace`]
    /// if the free tail is too short.
    pub fn add_subnode(&mut self, parent: NodeOffset, name: &str) -> Result<NodeOffset, FdtError> {
        if name.is_empty() || name.bytes().any(|b| b == b'/' || b == 0) {
            return Err(FdtError::BadName);
        }
        if self.subnode_offset(parent, name)?.is_some() {
            return Err(FdtError::Exists);
        }

        let (_, mut offset) = self.check_node(parent)?;
        loop {
            match token_at(self.block(), offset)? {
                (Token::Prop { .. } | Token::Nop, next) => offset = next,
                _ => break,
            }
        }

        let name_span = tag_align(name.len() + 1);
        let node_len = 4 + name_span + 4;
        let free = self.free_space();
        if node_len > free {
            return Err(FdtError::NoSpace {
                needed: node_len - free,
            });
        }

        self.splice_struct(offset, 0, node_len);
        self.put_u32(offset, FDT_BEGIN_NODE);
        self.block_mut()[offset + 4..offset + 4 + name.len()].copy_from_slice(name.as_bytes());
        self.put_u32(offset + 4 + name_span, FDT_END_NODE);
        self.sync_header();
        Ok(NodeOffset(offset))
    }

    const fn used(&self) -> usize {
        self.header.off_dt_strings as usize + self.header.size_dt_strings as usize
    }

    fn block(&self) -> &[u8] {
        let start = self.header.off_dt_struct as usize;
        &self.data[start..start + self.header.size_dt_struct as usize]
    }

    fn block_mut(&mut self) -> &mut [u8] {
        let start = self.header.off_dt_struct as usize;
        &mut self.data[start..start + self.header.size_dt_struct as usize]
    }

    fn strings(&self) -> &[u8] {
        let start = self.header.off_dt_strings as usize;
        &self.data[start..start + self.header.size_dt_strings as usize]
    }

    fn sync_header(&mut self) {
        self.header.write(&mut self.data);
    }

    fn put_u32(&mut self, offset: usize, value: u32) {
        self.block_mut()[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
    }

    fn check_node(&self, node: NodeOffset) -> Result<(&[u8], usize), FdtError> {
        match token_at(self.block(), node.0) {
            Ok((Token::BeginNode(name), next)) => Ok((name, next)),
            _ => Err(FdtError::BadOffset { offset: node.0 }),
        }
    }

    fn string_at(&self, offset: usize) -> Result<&[u8], FdtError> {
        let bad = FdtError::BadStructure { offset };
        let tail = self.strings().get(offset..).ok_or_else(|| bad.clone())?;
        let len = tail.iter().position(|&b| b == 0).ok_or(bad)?;
        Ok(&tail[..len])
    }

    fn find_property(
        &self,
        node: NodeOffset,
        name: &str,
    ) -> Result<Option<PropertySlot>, FdtError> {
        let block = self.block();
        let (_, mut offset) = self.check_node(node)?;
        loop {
            let (token, next) = token_at(block, offset)?;
            match token {
                Token::Prop { name_offset, value } => {
                    if self.string_at(name_offset)? == name.as_bytes() {
                        return Ok(Some(PropertySlot {
                            offset,
                            len: value.len(),
                        }));
                    }
                }
                Token::Nop => {}
                Token::BeginNode(_) | Token::EndNode => return Ok(None),
                Token::End => return Err(FdtError::BadStructure { offset }),
            }
            offset = next;
        }
    }

    /// Offset of `name` in the strings block, reusing suffixes of longer names.
    fn find_string(&self, name: &str) -> Option<usize> {
        let needle_len = name.len() + 1;
        self.strings()
            .windows(needle_len)
            .position(|w| &w[..name.len()] == name.as_bytes() && w[name.len()] == 0)
    }

    /// Append `name` to the strings block. The caller checked the free space.
    fn append_string(&mut self, name: &str) -> usize {
        let offset = self.header.size_dt_strings as usize;
        let at = self.used();
        self.data[at..at + name.len()].copy_from_slice(name.as_bytes());
        self.data[at + name.len()] = 0;
        self.header.size_dt_strings = cell(offset + name.len() + 1);
        offset
    }

    /// Replace `remove` bytes at structure offset `at` with `insert` zero
    /// bytes, moving the rest of the structure block and the strings block.
    /// The caller checked the free space.
    fn splice_struct(&mut self, at: usize, remove: usize, insert: usize) {
        let start = self.header.off_dt_struct as usize + at;
        let used = self.used();
        self.data.copy_within(start + remove..used, start + insert);
        if remove > insert {
            self.data[used - (remove - insert)..used].fill(0);
        }
        self.data[start..start + insert].fill(0);

        let struct_size = self.header.size_dt_struct as usize + insert - remove;
        self.header.size_dt_struct = cell(struct_size);
        self.header.off_dt_strings = cell(self.header.off_dt_struct as usize + struct_size);
    }

    /// Walk the whole structure block once.
    fn check_structure(&self) -> Result<(), FdtError> {
        let block = self.block();
        let mut offset = self.root()?.0;
        let mut depth = 0usize;
        loop {
            let (token, next) = token_at(block, offset)?;
            match token {
                Token::BeginNode(_) => depth += 1,
                Token::EndNode => {
                    depth = depth
                        .checked_sub(1)
                        .ok_or(FdtError::BadStructure { offset })?;
                }
                Token::Prop { name_offset, .. } => {
                    if depth == 0 {
                        return Err(FdtError::BadStructure { offset });
                    }
                    self.string_at(name_offset)?;
                }
                Token::Nop => {}
                Token::End if depth == 0 => return Ok(()),
                Token::End => return Err(FdtError::BadStructure { offset }),
            }
            offset = next;
        }
    }

    fn normalized_len(blob: &[u8], header: &FdtHeader) -> Result<usize, FdtError> {
        Ok(FDT_HEADER_SIZE
            + reservation_map(blob, header)?.len()
            + struct_block(blob, header)?.len()
            + header.size_dt_strings as usize)
    }
}

impl fmt::Debug for DeviceTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceTree")
            .field("total_size", &self.header.total_size)
            .field("size_dt_struct", &self.header.size_dt_struct)
            .field("size_dt_strings", &self.header.size_dt_strings)
            .finish_non_exhaustive()
    }
}

/// Offsets and sizes stay below `total_size`, which fits the 32-bit header.
#[allow(clippy::cast_possible_truncation)]
const fn cell(value: usize) -> u32 {
    value as u32
}

fn name_matches(node: &[u8], query: &[u8]) -> bool {
    if node == query {
        return true;
    }
    !query.contains(&b'@')
        && node.len() > query.len()
        && node.starts_with(query)
        && node[query.len()] == b'@'
}

/// The reservation map including its `{0, 0}` terminator.
fn reservation_map<'a>(blob: &'a [u8], header: &FdtHeader) -> Result<&'a [u8], FdtError> {
    let total = header.total_size as usize;
    let start = header.off_mem_rsvmap as usize;
    let mut offset = start;
    loop {
        let entry = blob
            .get(offset..offset + 16)
            .filter(|_| offset + 16 <= total)
            .ok_or(FdtError::BadLayout {
                block: "memory reservation map",
            })?;
        offset += 16;
        if entry.iter().all(|&b| b == 0) {
            return Ok(&blob[start..offset]);
        }
    }
}

/// The structure block. Version 16 blobs do not declare its size, so it is
/// found by scanning for the `FDT_END` token.
fn struct_block<'a>(blob: &'a [u8], header: &FdtHeader) -> Result<&'a [u8], FdtError> {
    let start = header.off_dt_struct as usize;
    if header.version >= 17 {
        return Ok(&blob[start..start + header.size_dt_struct as usize]);
    }

    let block = &blob[start..header.total_size as usize];
    let mut offset = 0;
    loop {
        match token_at(block, offset)? {
            (Token::End, next) => return Ok(&block[..next]),
            (_, next) => offset = next,
        }
    }
}
