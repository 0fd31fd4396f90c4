use alloc::vec::Vec;

/// Upper bound for a kernel command line, terminator included.
pub const COMMAND_LINE_SIZE: usize = 1024;

/// A kernel command line as handed to the next kernel.
///
/// The bytes always end in the terminator slot; the text is everything up
/// to the first NUL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    bytes: Vec<u8>,
}

impl CommandLine {
    /// Take `text` up to its first NUL plus a terminator, capped at
    /// [`COMMAND_LINE_SIZE`] bytes.
    #[must_use]
    pub fn new(text: &[u8]) -> Self {
        let strlen = text.iter().position(|&b| b == 0).unwrap_or(text.len());
        let len = strlen.min(COMMAND_LINE_SIZE - 1);
        let mut bytes = Vec::with_capacity(len + 1);
        bytes.extend_from_slice(&text[..len]);
        bytes.push(0);
        Self { bytes }
    }

    /// Adopt a field whose length is already fixed, such as one embedded in
    /// a boot image. The last byte becomes the terminator slot.
    #[must_use]
    pub fn from_field(field: &[u8]) -> Self {
        let mut bytes = field.to_vec();
        if bytes.is_empty() {
            bytes.push(0);
        }
        Self { bytes }
    }

    /// The bytes including the terminator slot.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The text before the first NUL.
    #[must_use]
    pub fn text(&self) -> &[u8] {
        let strlen = self
            .bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.bytes.len());
        &self.bytes[..strlen]
    }

    /// The text followed by exactly one NUL, as stored in `bootargs`.
    #[must_use]
    pub fn to_c_string(&self) -> Vec<u8> {
        let mut value = self.text().to_vec();
        value.push(0);
        value
    }

    #[must_use]
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }
}
