use crate::{
    buffer::Buffer,
    io::Source,
    tes4::{
        compression::{self, CodecKind},
        CompressionCodec, Error, Result, Version,
    },
};
use std::io::Write;

/// Parameters shared by every compression and decompression action.
///
/// ```rust
/// use bsarc::tes4::{CompressionCodec, CompressionOptions, Version};
///
/// // configure for Skyrim SE
/// let options = CompressionOptions {
///     version: Version::SSE,
///     ..Default::default()
/// };
///
/// // configure for Skyrim on the xbox
/// let options = CompressionOptions {
///     version: Version::TES5,
///     codec: CompressionCodec::Xmem,
/// };
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct CompressionOptions {
    pub version: Version,
    pub codec: CompressionCodec,
}

/// One file's payload, together with its compression state.
///
/// A compressed payload holds the codec bytes and remembers the size they
/// expand to; whether the bytes are compressed at all is independent of the
/// owning archive's default.
#[derive(Default)]
pub struct File<'bytes> {
    pub(crate) bytes: Buffer<'bytes>,
    pub(crate) decompressed_len: Option<u32>,
}

impl<'bytes> File<'bytes> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a borrowed, uncompressed payload.
    #[must_use]
    pub fn from_decompressed(bytes: &'bytes [u8]) -> Self {
        Self {
            bytes: Buffer::from_borrowed(bytes),
            decompressed_len: None,
        }
    }

    /// Wraps a borrowed payload already holding codec bytes that expand to
    /// `decompressed_len` bytes.
    #[must_use]
    pub fn from_compressed(bytes: &'bytes [u8], decompressed_len: u32) -> Self {
        Self {
            bytes: Buffer::from_borrowed(bytes),
            decompressed_len: Some(decompressed_len),
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.bytes.as_bytes()
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
        self.decompressed_len = None;
    }

    #[must_use]
    pub fn into_owned(self) -> File<'static> {
        File {
            bytes: self.bytes.into_owned(),
            decompressed_len: self.decompressed_len,
        }
    }

    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.decompressed_len.is_some()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// The size the payload expands to, when it is compressed.
    #[must_use]
    pub fn decompressed_len(&self) -> Option<usize> {
        self.decompressed_len.map(|len| len as usize)
    }

    /// Compresses the payload in place, leaving the handle owning the codec
    /// bytes. Does nothing if the file is already compressed.
    pub fn compress(&mut self, options: &CompressionOptions) -> Result<()> {
        if self.is_compressed() {
            return Ok(());
        }

        let mut out = Vec::new();
        self.compress_into(&mut out, options)?;
        out.shrink_to_fit();
        let decompressed_len = self.len().try_into()?;
        self.bytes = Buffer::from_owned(out);
        self.decompressed_len = Some(decompressed_len);
        Ok(())
    }

    /// Compresses the payload into `out` without touching the handle.
    pub fn compress_into(&self, out: &mut Vec<u8>, options: &CompressionOptions) -> Result<()> {
        if self.is_compressed() {
            return Err(Error::AlreadyCompressed);
        }
        compression::compress_into(
            CodecKind::select(options.version, options.codec),
            self.as_bytes(),
            out,
        )
    }

    /// The worst-case size of this payload once compressed.
    pub fn compress_bound(&self, options: &CompressionOptions) -> Result<usize> {
        compression::compress_bound(CodecKind::select(options.version, options.codec), self.len())
            .ok_or(Error::UnsupportedCodec)
    }

    /// Decompresses the payload in place, leaving the handle owning the
    /// expanded bytes. Does nothing if the file is already decompressed.
    pub fn decompress(&mut self, options: &CompressionOptions) -> Result<()> {
        if !self.is_compressed() {
            return Ok(());
        }

        let mut out = Vec::new();
        self.decompress_into(&mut out, options)?;
        out.shrink_to_fit();
        self.bytes = Buffer::from_owned(out);
        self.decompressed_len = None;
        Ok(())
    }

    /// Decompresses the payload into `out` without touching the handle.
    pub fn decompress_into(&self, out: &mut Vec<u8>, options: &CompressionOptions) -> Result<()> {
        let Some(decompressed_len) = self.decompressed_len() else {
            return Err(Error::AlreadyDecompressed);
        };
        compression::decompress_into(
            CodecKind::select(options.version, options.codec),
            self.as_bytes(),
            out,
            decompressed_len,
        )
    }

    /// Takes the remainder of `source` as this file's payload, uncompressed.
    #[must_use]
    pub fn read(mut source: Source<'bytes>) -> Self {
        Self {
            bytes: source.read_bytes_to_end(),
            decompressed_len: None,
        }
    }

    /// Writes the expanded payload, decompressing on the fly if needed.
    pub fn write<Out>(&self, stream: &mut Out, options: &CompressionOptions) -> Result<()>
    where
        Out: ?Sized + Write,
    {
        if self.is_compressed() {
            let mut decompressed = Vec::new();
            self.decompress_into(&mut decompressed, options)?;
            stream.write_all(&decompressed)?;
        } else {
            stream.write_all(self.as_bytes())?;
        }
        Ok(())
    }
}

impl File<'static> {
    /// Wraps an owned, uncompressed payload.
    #[must_use]
    pub fn from_decompressed_owned(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Buffer::from_owned(bytes),
            decompressed_len: None,
        }
    }

    /// Wraps owned codec bytes that expand to `decompressed_len` bytes.
    #[must_use]
    pub fn from_compressed_owned(bytes: Vec<u8>, decompressed_len: u32) -> Self {
        Self {
            bytes: Buffer::from_owned(bytes),
            decompressed_len: Some(decompressed_len),
        }
    }
}
