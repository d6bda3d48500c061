use memmap2::Mmap;
use std::sync::Arc;

/// A window into a memory mapped file.
///
/// Holding the `Arc` keeps the mapping alive for as long as any window into
/// it exists, so archives parsed from a mapped file own their backing store
/// transitively.
struct MapWindow {
    pos: usize,
    len: usize,
    map: Arc<Mmap>,
}

impl MapWindow {
    fn as_bytes(&self) -> &[u8] {
        &self.map[self.pos..self.pos + self.len]
    }
}

enum Inner<'data> {
    Borrowed(&'data [u8]),
    Owned(Vec<u8>),
    Mapped(MapWindow),
}

/// The buffer primitive backing every file payload.
///
/// A buffer either borrows bytes supplied by the caller, owns a heap copy,
/// or proxies into a still-live memory mapped input.
pub struct Buffer<'data> {
    inner: Inner<'data>,
}

impl<'data> Buffer<'data> {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match &self.inner {
            Inner::Borrowed(bytes) => bytes,
            Inner::Owned(bytes) => bytes,
            Inner::Mapped(window) => window.as_bytes(),
        }
    }

    /// Resets the buffer to an empty borrowed view.
    pub fn clear(&mut self) {
        self.inner = Inner::Borrowed(&[]);
    }

    #[must_use]
    pub fn from_borrowed(bytes: &'data [u8]) -> Self {
        Self {
            inner: Inner::Borrowed(bytes),
        }
    }

    /// Copies a borrowed view onto the heap, unshackling the buffer from its
    /// source lifetime. Owned and mapped buffers are returned as-is.
    #[must_use]
    pub fn into_owned(self) -> Buffer<'static> {
        Buffer {
            inner: match self.inner {
                Inner::Borrowed(bytes) => Inner::Owned(bytes.to_vec()),
                Inner::Owned(bytes) => Inner::Owned(bytes),
                Inner::Mapped(window) => Inner::Mapped(window),
            },
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }
}

impl Buffer<'static> {
    #[must_use]
    pub fn from_owned(bytes: Vec<u8>) -> Self {
        Self {
            inner: Inner::Owned(bytes),
        }
    }

    pub(crate) fn from_mapped(pos: usize, len: usize, map: Arc<Mmap>) -> Self {
        Self {
            inner: Inner::Mapped(MapWindow { pos, len, map }),
        }
    }
}

impl Default for Buffer<'_> {
    fn default() -> Self {
        Self {
            inner: Inner::Borrowed(&[]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Buffer;

    #[test]
    fn default_state_is_an_empty_view() {
        let buffer = Buffer::default();
        assert!(buffer.is_empty());
        assert_eq!(buffer.len(), 0);
        assert!(buffer.as_bytes().is_empty());
    }

    #[test]
    fn clear_resets_to_an_empty_view() {
        let mut buffer = Buffer::from_owned(vec![1, 2, 3]);
        assert_eq!(buffer.len(), 3);
        buffer.clear();
        assert!(buffer.is_empty());
    }

    #[test]
    fn into_owned_copies_borrowed_views() {
        let bytes = [7u8; 16];
        let buffer = Buffer::from_borrowed(&bytes);
        assert_eq!(buffer.as_bytes().as_ptr(), bytes.as_ptr());

        let owned = buffer.into_owned();
        assert_eq!(owned.as_bytes(), &bytes);
        assert_ne!(owned.as_bytes().as_ptr(), bytes.as_ptr());
    }
}
