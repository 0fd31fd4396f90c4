use kexec_layout::LayoutError;
use kexec_zimage::LoadError;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse the memory map")]
    MemoryMap(#[source] LayoutError),
    #[error(transparent)]
    Load(#[from] LoadError),
}

impl Error {
    /// 2 when no crash kernel region is reserved, 1 for everything else.
    #[must_use]
    pub const fn exit_status(&self) -> u8 {
        match self {
            Self::Load(e) => e.kind().exit_status(),
            Self::Read { .. } | Self::Write { .. } | Self::MemoryMap(_) => 1,
        }
    }
}

impl From<&Error> for ExitCode {
    fn from(value: &Error) -> Self {
        Self::from(value.exit_status())
    }
}

/// The error and its sources on one line.
#[must_use]
pub fn report(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
