use crate::{buffer::Buffer, io::Source, tes3::Result};
use std::io::Write;

/// One file's payload. The hash and name live in the owning archive's key.
#[derive(Default)]
pub struct File<'bytes> {
    pub(crate) bytes: Buffer<'bytes>,
}

impl<'bytes> File<'bytes> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.bytes.as_bytes()
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    #[must_use]
    pub fn into_owned(self) -> File<'static> {
        File {
            bytes: self.bytes.into_owned(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Takes the remainder of `source` as this file's payload.
    #[must_use]
    pub fn read(mut source: Source<'bytes>) -> Self {
        Self {
            bytes: source.read_bytes_to_end(),
        }
    }

    pub fn write<Out>(&self, stream: &mut Out) -> Result<()>
    where
        Out: ?Sized + Write,
    {
        stream.write_all(self.as_bytes())?;
        Ok(())
    }
}

impl<'bytes> From<&'bytes [u8]> for File<'bytes> {
    fn from(bytes: &'bytes [u8]) -> Self {
        Self {
            bytes: Buffer::from_borrowed(bytes),
        }
    }
}

impl From<Vec<u8>> for File<'static> {
    fn from(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Buffer::from_owned(bytes),
        }
    }
}
