use crate::android::{AndroidHeader, MIN_PAGE_SIZE};
use crate::zimage::{ZImageHeader, appended_dtb};
use crate::ImageError;
use log::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// A kernel image loaded as-is, with or without a `zImage` header.
    PlainKernel,
    /// An Android boot image; the kernel and ramdisk were taken from it.
    AndroidBootImage,
}

/// What the caller already supplied on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    pub ramdisk_given: bool,
    pub command_line_given: bool,
}

/// The pieces of a kernel file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelImage<'a> {
    pub format: Format,
    /// The bytes to load as the kernel segment.
    pub kernel: &'a [u8],
    /// The kernel region before `zImage` truncation, searched for an
    /// appended device tree.
    payload: &'a [u8],
    pub zimage: Option<ZImageHeader>,
    /// Ramdisk embedded in a boot image, only when none was given.
    pub ramdisk: Option<&'a [u8]>,
    /// Command line embedded in a boot image, only when none was given.
    /// Includes the terminating NUL unless the field was full.
    pub command_line: Option<&'a [u8]>,
    pub page_size: Option<u32>,
}

impl<'a> KernelImage<'a> {
    /// Detect the framing of `file` and extract the kernel.
    ///
    /// The `zImage` length check and the Android detection both look at the
    /// start of `file`.
    ///
    /// # Errors
    /// A truncated `zImage` or an inconsistent Android header.
    pub fn parse(file: &'a [u8], options: ParseOptions) -> Result<Self, ImageError> {
        let mut len = file.len();
        let zimage = ZImageHeader::read(file);
        if let Some(header) = &zimage {
            len = header.effective_len(len)?;
        }

        let mut image = Self {
            format: Format::PlainKernel,
            kernel: &file[..len],
            payload: file,
            zimage,
            ramdisk: None,
            command_line: None,
            page_size: None,
        };

        if len > MIN_PAGE_SIZE
            && let Some(header) = AndroidHeader::read(file)
        {
            image.adopt_android(file, len, &header, options)?;
        }

        debug!("kernel: {:?}, {:#x} bytes", image.format, image.kernel.len());
        Ok(image)
    }

    fn adopt_android(
        &mut self,
        file: &'a [u8],
        len: usize,
        header: &AndroidHeader<'a>,
        options: ParseOptions,
    ) -> Result<(), ImageError> {
        let declared = header.expected_size()?;
        if (len as u64) < declared {
            return Err(ImageError::AndroidSize {
                declared,
                file_len: len,
            });
        }

        // `declared` fits in `len`, so every offset below does too.
        let page = header.page_size as usize;
        let kernel_end = page + header.kernel_size as usize;
        let kernel = &file[page..kernel_end];
        self.format = Format::AndroidBootImage;
        self.kernel = kernel;
        self.payload = kernel;
        self.page_size = Some(header.page_size);

        #[allow(clippy::cast_possible_truncation)]
        let ramdisk_at = page + header.kernel_pages_size()? as usize;
        if !options.ramdisk_given && header.ramdisk_size > 0 {
            info!("using ramdisk from Android image ({:#x} bytes)", header.ramdisk_size);
            self.ramdisk = Some(&file[ramdisk_at..ramdisk_at + header.ramdisk_size as usize]);
        }

        if !options.command_line_given {
            self.command_line = header.embedded_command_line();
        }
        Ok(())
    }

    /// Device tree appended to the kernel payload.
    ///
    /// # Errors
    /// The offset at 0x2C lies outside the payload or does not point at a
    /// device tree.
    pub fn appended_dtb(&self) -> Result<&'a [u8], ImageError> {
        appended_dtb(self.payload)
    }
}
