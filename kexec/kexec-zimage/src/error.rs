use crate::ConfigError;
use kexec_atags::TagError;
use kexec_boards::BoardError;
use kexec_fdt::FdtError;
use kexec_image::ImageError;
use kexec_layout::LayoutError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Invalid kernel or DTB image")]
    Image(#[from] ImageError),
    #[error("Failed to build the ATAG list")]
    Tags(#[from] TagError),
    #[error("Failed to patch the device tree")]
    Fdt(#[from] FdtError),
    #[error("Board specific device tree handling failed")]
    Board(#[from] BoardError),
    #[error("Failed to place the boot segments")]
    Layout(#[from] LayoutError),
}

/// Coarse classification of a [`LoadError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad magic, truncated or inconsistent containers, malformed trees.
    Format,
    /// A buffer could not grow.
    Resource,
    /// No hole, overlapping plan or an address that does not fit.
    Placement,
    /// Crash mode without a reserved crash kernel region.
    NoCrashKernel,
    /// Conflicting or incomplete options.
    Config,
}

impl ErrorKind {
    /// Process exit status for this kind of failure.
    #[must_use]
    pub const fn exit_status(self) -> u8 {
        match self {
            Self::NoCrashKernel => 2,
            Self::Format | Self::Resource | Self::Placement | Self::Config => 1,
        }
    }
}

impl LoadError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::Board(BoardError::Unknown(_)) => ErrorKind::Config,
            Self::Image(_)
            | Self::Tags(_)
            | Self::Board(BoardError::MissingLiveProperty { .. } | BoardError::NoMatchingDtb)
            | Self::Layout(LayoutError::MalformedIomem { .. }) => ErrorKind::Format,
            Self::Fdt(e) | Self::Board(BoardError::Fdt(e)) => fdt_kind(e),
            Self::Layout(LayoutError::NoCrashKernel) => ErrorKind::NoCrashKernel,
            Self::Layout(_) => ErrorKind::Placement,
        }
    }
}

const fn fdt_kind(error: &FdtError) -> ErrorKind {
    match error {
        FdtError::NoSpace { .. } | FdtError::OutOfMemory { .. } => ErrorKind::Resource,
        _ => ErrorKind::Format,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_crash_kernel_is_its_own_kind() {
        let error = LoadError::from(LayoutError::NoCrashKernel);
        assert_eq!(error.kind(), ErrorKind::NoCrashKernel);
        assert_eq!(error.kind().exit_status(), 2);
    }

    #[test]
    fn errors_are_classified() {
        assert_eq!(
            LoadError::from(ImageError::DtbImageHeader).kind(),
            ErrorKind::Format
        );
        assert_eq!(
            LoadError::from(FdtError::OutOfMemory { requested: 1 }).kind(),
            ErrorKind::Resource
        );
        assert_eq!(
            LoadError::from(BoardError::Fdt(FdtError::BadMagic { found: 0 })).kind(),
            ErrorKind::Format
        );
        assert_eq!(
            LoadError::from(LayoutError::Overflow { what: "kernel base" }).kind(),
            ErrorKind::Placement
        );
        assert_eq!(
            LoadError::from(ConfigError::MissingBoard).kind(),
            ErrorKind::Config
        );
        assert_eq!(ErrorKind::Placement.exit_status(), 1);
    }

    #[test]
    fn oversized_tag_list_is_a_format_error() {
        let error = LoadError::from(TagError::Overflow {
            needed: 5000,
            capacity: 4096,
        });
        assert_eq!(error.kind(), ErrorKind::Format);
        assert_eq!(error.kind().exit_status(), 1);
    }
}
