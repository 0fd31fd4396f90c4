use crate::header::FdtHeader;
use crate::tree::{DeviceTree, NodeOffset};
use crate::FdtError;
use alloc::vec::Vec;
use kexec_addresses::tag_align;
use log::trace;

/// Worst-case growth needed to add a node called `name`.
#[must_use]
pub const fn node_len(name: &str) -> usize {
    8 + tag_align(name.len() + 1) + 4
}

/// Worst-case growth needed to add a property `name` holding `len` bytes.
#[must_use]
pub const fn prop_len(name: &str, len: usize) -> usize {
    name.len() + 1 + 12 + tag_align(len)
}

/// A device tree that grows on demand while it is being patched.
///
/// Before each mutation the buffer grows by the worst-case encoded size of
/// what is added; if the tree still reports [`FdtError::NoSpace`] it grows by
/// the reported shortfall and retries once. The buffer is never shrunk.
#[derive(Debug, Clone)]
pub struct DeviceTreeBuffer {
    tree: DeviceTree,
}

impl DeviceTreeBuffer {
    /// Open `blob` for patching with `pad` bytes beyond its declared size.
    ///
    /// # Errors
    /// The blob is malformed or the storage cannot be allocated.
    pub fn open(blob: &[u8], pad: usize) -> Result<Self, FdtError> {
        let header = FdtHeader::validate(blob)?;
        let size = (header.total_size as usize)
            .checked_add(pad)
            .ok_or(FdtError::OutOfMemory {
                requested: usize::MAX,
            })?;
        Ok(Self {
            tree: DeviceTree::open_into(blob, size)?,
        })
    }

    #[must_use]
    pub const fn from_tree(tree: DeviceTree) -> Self {
        Self { tree }
    }

    #[must_use]
    pub const fn tree(&self) -> &DeviceTree {
        &self.tree
    }

    #[must_use]
    pub const fn total_size(&self) -> usize {
        self.tree.total_size()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.tree.as_bytes()
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.tree.into_bytes()
    }

    /// # Errors
    /// The structure block does not start with a node.
    pub fn root(&self) -> Result<NodeOffset, FdtError> {
        self.tree.root()
    }

    /// Return the child `name` of `parent`, creating it if it does not exist.
    ///
    /// # Errors
    /// `parent` is invalid, the name is invalid or growing failed.
    pub fn ensure_subnode(
        &mut self,
        parent: NodeOffset,
        name: &str,
    ) -> Result<NodeOffset, FdtError> {
        if let Some(node) = self.tree.subnode_offset(parent, name)? {
            return Ok(node);
        }

        self.grow(node_len(name))?;
        match self.tree.add_subnode(parent, name) {
            Err(FdtError::NoSpace { needed }) => {
                self.grow(needed)?;
                self.tree.add_subnode(parent, name)
            }
            result => result,
        }
    }

    /// Set a property, growing the buffer first if the value does not fit.
    ///
    /// # Errors
    /// `node` is invalid, the name is invalid or growing failed.
    pub fn set_property(
        &mut self,
        node: NodeOffset,
        name: &str,
        value: &[u8],
    ) -> Result<(), FdtError> {
        let growth = match self.tree.property(node, name)? {
            None => prop_len(name, value.len()),
            Some(old) if old.len() < value.len() => tag_align(value.len() - old.len()),
            Some(_) => 0,
        };
        if growth > 0 {
            self.grow(growth)?;
        }

        match self.tree.set_property(node, name, value) {
            Err(FdtError::NoSpace { needed }) => {
                self.grow(needed)?;
                self.tree.set_property(node, name, value)
            }
            result => result,
        }
    }

    /// Set `prop_name` on the child `node_name` of `parent`, creating the
    /// child if needed.
    ///
    /// # Errors
    /// See [`Self::ensure_subnode`] and [`Self::set_property`].
    pub fn setup_property(
        &mut self,
        parent: NodeOffset,
        node_name: &str,
        prop_name: &str,
        value: &[u8],
    ) -> Result<(), FdtError> {
        let node = self.ensure_subnode(parent, node_name)?;
        self.set_property(node, prop_name, value)
    }

    fn grow(&mut self, additional: usize) -> Result<(), FdtError> {
        trace!(
            "growing device tree from {:#x} by {additional:#x} bytes",
            self.tree.total_size()
        );
        self.tree.grow(additional)
    }
}
