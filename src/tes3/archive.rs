use crate::{
    buffer::Buffer,
    index::{self, Index},
    io::{Endian, Sink, Source},
    strings,
    tes3::{hashing, Error, File, Hash, Result},
};
use bstr::{BStr, BString};
use core::borrow::Borrow;
use std::io::Write;

mod constants {
    pub(super) const HEADER_MAGIC: u32 = 0x100;
    pub(super) const HEADER_SIZE: usize = 0xC;
    pub(super) const FILE_ENTRY_SIZE: usize = 0x8;
    pub(super) const NAME_OFFSET_SIZE: usize = 0x4;
    pub(super) const HASH_SIZE: usize = 0x8;
}

/// Identifies a file within an archive: the hash it is sorted by, plus the
/// normalized name that produced it.
///
/// Ordering and equality consider only the hash, so an archive remains fully
/// functional when names are absent.
#[derive(Clone, Debug, Default)]
pub struct FileKey {
    pub(crate) hash: Hash,
    pub(crate) name: BString,
}

impl FileKey {
    #[must_use]
    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    #[must_use]
    pub fn name(&self) -> &BStr {
        self.name.as_ref()
    }
}

impl PartialEq for FileKey {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for FileKey {}

impl PartialOrd for FileKey {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FileKey {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.hash.cmp(&other.hash)
    }
}

impl Borrow<Hash> for FileKey {
    fn borrow(&self) -> &Hash {
        &self.hash
    }
}

impl<T> From<T> for FileKey
where
    T: Into<BString>,
{
    fn from(value: T) -> Self {
        let mut name = value.into();
        let hash = hashing::hash_file_in_place(&mut name);
        Self { hash, name }
    }
}

struct Offsets {
    name_offsets: usize,
    names: usize,
    hashes: usize,
    file_data: usize,
}

struct Header {
    hash_offset: u32,
    file_count: u32,
}

impl Header {
    fn offsets(&self) -> Offsets {
        let file_count = self.file_count as usize;
        let name_offsets = constants::HEADER_SIZE + constants::FILE_ENTRY_SIZE * file_count;
        let names = name_offsets + constants::NAME_OFFSET_SIZE * file_count;
        // hash_offset is measured from the end of the header
        let hashes = constants::HEADER_SIZE + self.hash_offset as usize;
        let file_data = hashes + constants::HASH_SIZE * file_count;
        Offsets {
            name_offsets,
            names,
            hashes,
            file_data,
        }
    }
}

/// A flat, hash-sorted collection of files.
#[derive(Default)]
pub struct Archive<'bytes> {
    files: Index<FileKey, File<'bytes>>,
}

impl<'bytes> Archive<'bytes> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses an archive out of `source`.
    ///
    /// Payloads are not copied: each file's buffer borrows from or proxies
    /// into the source's backing store.
    pub fn read(mut source: Source<'bytes>) -> Result<Self> {
        let header = Self::read_header(&mut source)?;
        let offsets = header.offsets();
        if offsets.hashes < offsets.names || offsets.file_data > source.len() {
            return Err(Error::InconsistentOffset);
        }

        let mut files = Index::default();
        for idx in 0..header.file_count as usize {
            let (key, file) = Self::read_file(&mut source, idx, &offsets)?;
            if !files.insert(key, file) {
                return Err(Error::DuplicateHash);
            }
        }

        Ok(Self { files })
    }

    /// Serializes the archive. Files are emitted in ascending hash order,
    /// the container's natural order.
    pub fn write<Out>(&self, stream: &mut Out) -> Result<()>
    where
        Out: Write,
    {
        let mut sink = Sink::new(stream);
        let header = self.make_header()?;
        sink.write(constants::HEADER_MAGIC, Endian::Little)?;
        sink.write(header.hash_offset, Endian::Little)?;
        sink.write(header.file_count, Endian::Little)?;
        self.write_file_entries(&mut sink)?;
        self.write_name_offsets(&mut sink)?;
        self.write_names(&mut sink)?;
        self.write_hashes(&mut sink)?;
        self.write_file_data(&mut sink)?;
        Ok(())
    }

    /// Checks that the serialized archive would stay within the range the
    /// format's 32-bit offsets can address.
    #[must_use]
    pub fn verify_offsets(&self) -> bool {
        let entries = self
            .files
            .iter()
            .map(|(key, file)| (key.name.len(), file.len()));
        written_size(entries) <= u64::from(u32::MAX)
    }

    fn read_header(source: &mut Source<'bytes>) -> Result<Header> {
        let magic: u32 = source.read(Endian::Little)?;
        if magic != constants::HEADER_MAGIC {
            return Err(Error::BadMagic(magic));
        }

        let hash_offset: u32 = source.read(Endian::Little)?;
        let file_count: u32 = source.read(Endian::Little)?;
        Ok(Header {
            hash_offset,
            file_count,
        })
    }

    fn read_file(
        source: &mut Source<'bytes>,
        idx: usize,
        offsets: &Offsets,
    ) -> Result<(FileKey, File<'bytes>)> {
        let hash = source.save_restore_position(|source| -> Result<Hash> {
            source.seek_absolute(offsets.hashes + constants::HASH_SIZE * idx)?;
            let lo = source.read(Endian::Little)?;
            let hi = source.read(Endian::Little)?;
            Ok(Hash { lo, hi })
        })?;

        let name = source.save_restore_position(|source| -> Result<BString> {
            source.seek_absolute(offsets.name_offsets + constants::NAME_OFFSET_SIZE * idx)?;
            let name_offset: u32 = source.read(Endian::Little)?;
            source.seek_absolute(offsets.names + name_offset as usize)?;
            Ok(strings::read_zstring(source)?)
        })?;

        source.seek_absolute(constants::HEADER_SIZE + constants::FILE_ENTRY_SIZE * idx)?;
        let size: u32 = source.read(Endian::Little)?;
        let offset: u32 = source.read(Endian::Little)?;
        let bytes = source.save_restore_position(|source| -> Result<Buffer<'bytes>> {
            source.seek_absolute(offsets.file_data + offset as usize)?;
            Ok(source.read_bytes(size as usize)?)
        })?;

        Ok((FileKey { hash, name }, File { bytes }))
    }

    fn make_header(&self) -> Result<Header> {
        let tables =
            (constants::FILE_ENTRY_SIZE + constants::NAME_OFFSET_SIZE) * self.files.len();
        let names: usize = self
            .files
            .iter()
            .map(|(key, _)| key.name.len() + 1)
            .sum();
        Ok(Header {
            hash_offset: (tables + names).try_into()?,
            file_count: self.files.len().try_into()?,
        })
    }

    fn write_file_entries<Out>(&self, sink: &mut Sink<'_, Out>) -> Result<()>
    where
        Out: Write,
    {
        let mut offset: u32 = 0;
        for (_, file) in self.files.iter() {
            let size: u32 = file.len().try_into()?;
            sink.write(size, Endian::Little)?;
            sink.write(offset, Endian::Little)?;
            offset = offset.checked_add(size).ok_or(Error::OffsetOverflow)?;
        }
        Ok(())
    }

    fn write_name_offsets<Out>(&self, sink: &mut Sink<'_, Out>) -> Result<()>
    where
        Out: Write,
    {
        let mut offset: u32 = 0;
        for (key, _) in self.files.iter() {
            sink.write(offset, Endian::Little)?;
            offset = offset
                .checked_add(u32::try_from(key.name.len() + 1)?)
                .ok_or(Error::OffsetOverflow)?;
        }
        Ok(())
    }

    fn write_names<Out>(&self, sink: &mut Sink<'_, Out>) -> Result<()>
    where
        Out: Write,
    {
        for (key, _) in self.files.iter() {
            strings::write_zstring(sink, key.name())?;
        }
        Ok(())
    }

    fn write_hashes<Out>(&self, sink: &mut Sink<'_, Out>) -> Result<()>
    where
        Out: Write,
    {
        for (key, _) in self.files.iter() {
            sink.write(key.hash.lo, Endian::Little)?;
            sink.write(key.hash.hi, Endian::Little)?;
        }
        Ok(())
    }

    fn write_file_data<Out>(&self, sink: &mut Sink<'_, Out>) -> Result<()>
    where
        Out: Write,
    {
        for (_, file) in self.files.iter() {
            sink.write_bytes(file.as_bytes())?;
        }
        Ok(())
    }

    // container surface

    pub fn clear(&mut self) {
        self.files.clear();
    }

    #[must_use]
    pub fn get<K>(&self, key: &K) -> Option<&File<'bytes>>
    where
        K: Borrow<Hash>,
    {
        self.files.get(key.borrow())
    }

    #[must_use]
    pub fn get_key_value<K>(&self, key: &K) -> Option<(&FileKey, &File<'bytes>)>
    where
        K: Borrow<Hash>,
    {
        self.files.get_key_value(key.borrow())
    }

    #[must_use]
    pub fn get_mut<K>(&mut self, key: &K) -> Option<&mut File<'bytes>>
    where
        K: Borrow<Hash>,
    {
        self.files.get_mut(key.borrow())
    }

    /// Inserts `file` under `key`, failing (and leaving the archive
    /// unchanged) if a file with the same hash is already present.
    pub fn insert<K>(&mut self, key: K, file: File<'bytes>) -> bool
    where
        K: Into<FileKey>,
    {
        self.files.insert(key.into(), file)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> index::Iter<'_, FileKey, File<'bytes>> {
        self.files.iter()
    }

    pub fn iter_mut(&mut self) -> index::IterMut<'_, FileKey, File<'bytes>> {
        self.files.iter_mut()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn remove<K>(&mut self, key: &K) -> Option<File<'bytes>>
    where
        K: Borrow<Hash>,
    {
        self.files.remove(key.borrow())
    }

    pub fn remove_entry<K>(&mut self, key: &K) -> Option<(FileKey, File<'bytes>)>
    where
        K: Borrow<Hash>,
    {
        self.files.remove_entry(key.borrow())
    }
}

impl<'bytes> IntoIterator for Archive<'bytes> {
    type Item = (FileKey, File<'bytes>);
    type IntoIter = index::IntoIter<FileKey, File<'bytes>>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.into_iter()
    }
}

impl<'archive, 'bytes> IntoIterator for &'archive Archive<'bytes> {
    type Item = (&'archive FileKey, &'archive File<'bytes>);
    type IntoIter = index::Iter<'archive, FileKey, File<'bytes>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'bytes> FromIterator<(FileKey, File<'bytes>)> for Archive<'bytes> {
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = (FileKey, File<'bytes>)>,
    {
        let mut archive = Self::new();
        for (key, file) in iter {
            archive.insert(key, file);
        }
        archive
    }
}

/// The size of the fully serialized archive, without the 32-bit clamping the
/// real serializer applies.
fn written_size<Entries>(entries: Entries) -> u64
where
    Entries: Iterator<Item = (usize, usize)>,
{
    let mut total = constants::HEADER_SIZE as u64;
    for (name_len, data_len) in entries {
        total += (constants::FILE_ENTRY_SIZE
            + constants::NAME_OFFSET_SIZE
            + constants::HASH_SIZE) as u64;
        total += name_len as u64 + 1;
        total += data_len as u64;
    }
    total
}
