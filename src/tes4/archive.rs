use crate::{
    index::{self, Index},
    io::{Endian, Sink, Source},
    strings,
    tes4::{hashing, Directory, Error, File, FileKey, Hash, Result, Version},
};
use bstr::{BStr, BString};
use core::borrow::Borrow;
use std::io::Write;

bitflags::bitflags! {
    /// Behavior bits. Some change the archive's layout, others only steer
    /// the game's runtime parsing.
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct ArchiveFlags: u32 {
        /// Directory paths are stored in the archive.
        const DIRECTORY_STRINGS = 1 << 0;
        /// File basenames are stored in the archive.
        const FILE_STRINGS = 1 << 1;
        /// Payloads are compressed by default.
        const COMPRESSED = 1 << 2;
        const RETAIN_DIRECTORY_NAMES = 1 << 3;
        const RETAIN_FILE_NAMES = 1 << 4;
        const RETAIN_FILE_NAME_OFFSETS = 1 << 5;
        /// The archive targets the original xbox: hashes are byte-swapped
        /// on disk and entries sort by the swapped value.
        const XBOX_ARCHIVE = 1 << 6;
        const RETAIN_STRINGS_DURING_STARTUP = 1 << 7;
        /// Each payload is prefixed with its own full path (v104/v105).
        const EMBEDDED_FILE_NAMES = 1 << 8;
        /// Compressed payloads use the xmem codec (v104).
        const XBOX_COMPRESSED = 1 << 9;
    }
}

impl ArchiveFlags {
    #[must_use]
    pub fn directory_strings(&self) -> bool {
        self.contains(Self::DIRECTORY_STRINGS)
    }

    #[must_use]
    pub fn file_strings(&self) -> bool {
        self.contains(Self::FILE_STRINGS)
    }

    #[must_use]
    pub fn compressed(&self) -> bool {
        self.contains(Self::COMPRESSED)
    }

    #[must_use]
    pub fn retain_directory_names(&self) -> bool {
        self.contains(Self::RETAIN_DIRECTORY_NAMES)
    }

    #[must_use]
    pub fn retain_file_names(&self) -> bool {
        self.contains(Self::RETAIN_FILE_NAMES)
    }

    #[must_use]
    pub fn retain_file_name_offsets(&self) -> bool {
        self.contains(Self::RETAIN_FILE_NAME_OFFSETS)
    }

    #[must_use]
    pub fn xbox_archive(&self) -> bool {
        self.contains(Self::XBOX_ARCHIVE)
    }

    #[must_use]
    pub fn retain_strings_during_startup(&self) -> bool {
        self.contains(Self::RETAIN_STRINGS_DURING_STARTUP)
    }

    #[must_use]
    pub fn embedded_file_names(&self) -> bool {
        self.contains(Self::EMBEDDED_FILE_NAMES)
    }

    #[must_use]
    pub fn xbox_compressed(&self) -> bool {
        self.contains(Self::XBOX_COMPRESSED)
    }
}

impl Default for ArchiveFlags {
    fn default() -> Self {
        Self::DIRECTORY_STRINGS | Self::FILE_STRINGS
    }
}

bitflags::bitflags! {
    /// Advertises the kinds of content an archive carries.
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct ArchiveTypes: u16 {
        const MESHES = 1 << 0;
        const TEXTURES = 1 << 1;
        const MENUS = 1 << 2;
        const SOUNDS = 1 << 3;
        const VOICES = 1 << 4;
        const SHADERS = 1 << 5;
        const TREES = 1 << 6;
        const FONTS = 1 << 7;
        const MISC = 1 << 8;
    }
}

mod constants {
    pub(super) const MAGIC: u32 = u32::from_le_bytes(*b"BSA\0");
    pub(super) const HEADER_SIZE: usize = 0x24;
    pub(super) const DIRECTORY_ENTRY_SIZE: usize = 0x10;
    pub(super) const DIRECTORY_ENTRY_SIZE_LARGE: usize = 0x18;
    pub(super) const FILE_ENTRY_SIZE: usize = 0x10;

    /// Set on a file entry's size when its compression state is the inverse
    /// of the archive default.
    pub(super) const FILE_FLAG_COMPRESSION: u32 = 1 << 30;
    pub(super) const FILE_FLAG_CHECKED: u32 = 1 << 31;
    pub(super) const FILE_FLAG_SECONDARY_ARCHIVE: u32 = 1 << 31;
}

/// Identifies a directory within an archive: the hash it is sorted by, plus
/// the normalized path that produced it.
#[derive(Clone, Debug, Default)]
pub struct DirectoryKey {
    pub(crate) hash: Hash,
    pub(crate) name: BString,
}

impl DirectoryKey {
    #[must_use]
    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    #[must_use]
    pub fn name(&self) -> &BStr {
        self.name.as_ref()
    }
}

impl PartialEq for DirectoryKey {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for DirectoryKey {}

impl PartialOrd for DirectoryKey {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DirectoryKey {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.hash.cmp(&other.hash)
    }
}

impl Borrow<Hash> for DirectoryKey {
    fn borrow(&self) -> &Hash {
        &self.hash
    }
}

impl<T> From<T> for DirectoryKey
where
    T: Into<BString>,
{
    fn from(value: T) -> Self {
        let mut name = value.into();
        let hash = hashing::hash_directory_in_place(&mut name);
        Self { hash, name }
    }
}

struct Offsets {
    file_entries: usize,
    file_names: usize,
    file_data: usize,
}

struct Header {
    version: Version,
    flags: ArchiveFlags,
    directory_count: u32,
    file_count: u32,
    directory_names_len: u32,
    file_names_len: u32,
    types: ArchiveTypes,
}

impl Header {
    fn hash_endian(&self) -> Endian {
        if self.flags.xbox_archive() {
            Endian::Big
        } else {
            Endian::Little
        }
    }

    fn directory_entry_size(&self) -> usize {
        match self.version {
            Version::v103 | Version::v104 => constants::DIRECTORY_ENTRY_SIZE,
            Version::v105 => constants::DIRECTORY_ENTRY_SIZE_LARGE,
        }
    }

    fn embeds_file_names(&self) -> bool {
        // the flag bit predates the feature and means something else in v103
        matches!(self.version, Version::v104 | Version::v105) && self.flags.embedded_file_names()
    }

    fn offsets(&self) -> Offsets {
        let file_entries =
            constants::HEADER_SIZE + self.directory_count as usize * self.directory_entry_size();

        let directory_names = if self.flags.directory_strings() {
            // directory_names_len counts each name and its null terminator,
            // but not the bzstring length prefix, hence + directory_count
            self.directory_names_len as usize + self.directory_count as usize
        } else {
            0
        };
        let file_names = file_entries
            + directory_names
            + self.file_count as usize * constants::FILE_ENTRY_SIZE;

        let file_data = if self.flags.file_strings() {
            file_names + self.file_names_len as usize
        } else {
            file_names
        };

        Offsets {
            file_entries,
            file_names,
            file_data,
        }
    }
}

/// The directories a serializer visits, pre-sorted into on-disk order.
struct WriteEntry<'archive, 'bytes> {
    key: &'archive DirectoryKey,
    directory: &'archive Directory<'bytes>,
    files: Vec<(&'archive FileKey, &'archive File<'bytes>)>,
}

/// A hash-sorted set of directories, together with the flag and type bits
/// the on-disk header carries.
pub struct Archive<'bytes> {
    directories: Index<DirectoryKey, Directory<'bytes>>,
    flags: ArchiveFlags,
    types: ArchiveTypes,
}

impl<'bytes> Archive<'bytes> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn archive_flags(&self) -> ArchiveFlags {
        self.flags
    }

    pub fn set_archive_flags(&mut self, flags: ArchiveFlags) {
        self.flags = flags;
    }

    #[must_use]
    pub fn archive_types(&self) -> ArchiveTypes {
        self.types
    }

    pub fn set_archive_types(&mut self, types: ArchiveTypes) {
        self.types = types;
    }

    /// Parses an archive out of `source`, returning it together with the
    /// version it was written for. Flags and types are taken from the
    /// header; payloads stay in whatever encoding the archive stored and
    /// proxy into the source's backing store.
    pub fn read(mut source: Source<'bytes>) -> Result<(Self, Version)> {
        let header = Self::read_header(&mut source)?;
        let mut offsets = header.offsets();
        if offsets.file_entries > source.len() || offsets.file_data > source.len() {
            return Err(Error::InconsistentOffset);
        }

        let mut directories = Index::default();
        for _ in 0..header.directory_count {
            let (key, directory) = Self::read_directory(&mut source, &header, &mut offsets)?;
            if !directories.insert(key, directory) {
                return Err(Error::DuplicateHash);
            }
        }

        Ok((
            Self {
                directories,
                flags: header.flags,
                types: header.types,
            },
            header.version,
        ))
    }

    /// Serializes the archive for `version`. Entries are emitted in the
    /// canonical order for the archive's flags: ascending hash order, or
    /// ascending byte-swapped hash order for xbox archives.
    pub fn write<Out>(&self, stream: &mut Out, version: Version) -> Result<()>
    where
        Out: Write,
    {
        let mut sink = Sink::new(stream);
        let header = self.make_header(version)?;
        let ordered = self.sort_for_write();
        Self::write_header(&mut sink, &header)?;
        Self::write_directory_entries(&mut sink, &header, &ordered)?;
        Self::write_file_entries(&mut sink, &header, &ordered)?;
        Self::write_file_names(&mut sink, &header, &ordered)?;
        Self::write_file_data(&mut sink, &header, &ordered)?;
        Ok(())
    }

    /// Checks that every offset the serializer would compute for `version`
    /// stays within the range the format's 32-bit fields can address.
    #[must_use]
    pub fn verify_offsets(&self, version: Version) -> bool {
        self.check_offsets(version).is_ok()
    }

    fn check_offsets(&self, version: Version) -> Result<()> {
        let header = self.make_header(version)?;
        let offsets = header.offsets();

        let mut file_entries_offset = u64::from(header.file_names_len) + offsets.file_entries as u64;
        let mut data_offset = offsets.file_data as u64;
        for entry in self.sort_for_write() {
            u32::try_from(file_entries_offset)?;
            if header.flags.directory_strings() {
                file_entries_offset += entry.key.name.len() as u64 + 2;
            }
            file_entries_offset += (entry.files.len() * constants::FILE_ENTRY_SIZE) as u64;

            for (file_key, file) in entry.files {
                u32::try_from(data_offset)?;
                data_offset += Self::file_data_size(&header, entry.key, file_key, file) as u64;
            }
        }

        Ok(())
    }

    fn read_header(source: &mut Source<'bytes>) -> Result<Header> {
        let magic: u32 = source.read(Endian::Little)?;
        if magic != constants::MAGIC {
            return Err(Error::BadMagic(magic));
        }

        let version: u32 = source.read(Endian::Little)?;
        let version = match version {
            103 => Version::v103,
            104 => Version::v104,
            105 => Version::v105,
            unknown => return Err(Error::UnsupportedVersion(unknown)),
        };

        let directory_offset: u32 = source.read(Endian::Little)?;
        if directory_offset as usize != constants::HEADER_SIZE {
            return Err(Error::InconsistentOffset);
        }

        // tooling in the wild sets unknown bits, so they are dropped rather
        // than rejected
        let flags = ArchiveFlags::from_bits_truncate(source.read(Endian::Little)?);
        let directory_count: u32 = source.read(Endian::Little)?;
        let file_count: u32 = source.read(Endian::Little)?;
        let directory_names_len: u32 = source.read(Endian::Little)?;
        let file_names_len: u32 = source.read(Endian::Little)?;
        let types = ArchiveTypes::from_bits_truncate(source.read(Endian::Little)?);
        let _padding: u16 = source.read(Endian::Little)?;

        Ok(Header {
            version,
            flags,
            directory_count,
            file_count,
            directory_names_len,
            file_names_len,
            types,
        })
    }

    fn read_directory(
        source: &mut Source<'bytes>,
        header: &Header,
        offsets: &mut Offsets,
    ) -> Result<(DirectoryKey, Directory<'bytes>)> {
        let hash = Self::read_hash(source, header.hash_endian())?;
        let file_count: u32 = source.read(Endian::Little)?;
        let padding = match header.version {
            // the remaining u32 is the file-records offset, recomputed on
            // write
            Version::v103 | Version::v104 => {
                source.seek_relative(4)?;
                0
            }
            Version::v105 => {
                let padding = source.read(Endian::Little)?;
                source.seek_relative(8)?;
                padding
            }
        };

        let mut files = Index::default();
        let name = source.save_restore_position(|source| -> Result<Option<BString>> {
            source.seek_absolute(offsets.file_entries)?;
            let mut name = if header.flags.directory_strings() {
                Some(strings::read_bzstring(source)?)
            } else {
                None
            };

            for _ in 0..file_count {
                let (key, file) = Self::read_file_entry(source, header, offsets, &mut name)?;
                if !files.insert(key, file) {
                    return Err(Error::DuplicateHash);
                }
            }

            offsets.file_entries = source.position();
            Ok(name)
        })?;

        Ok((
            DirectoryKey {
                hash,
                name: name.unwrap_or_default(),
            },
            Directory { files, padding },
        ))
    }

    fn read_file_entry(
        source: &mut Source<'bytes>,
        header: &Header,
        offsets: &mut Offsets,
        directory_name: &mut Option<BString>,
    ) -> Result<(FileKey, File<'bytes>)> {
        let hash = Self::read_hash(source, header.hash_endian())?;
        let raw_size: u32 = source.read(Endian::Little)?;
        let raw_offset: u32 = source.read(Endian::Little)?;

        let compression_flipped = raw_size & constants::FILE_FLAG_COMPRESSION != 0;
        let mut data_size = (raw_size
            & !(constants::FILE_FLAG_COMPRESSION | constants::FILE_FLAG_CHECKED))
            as usize;
        let data_offset = (raw_offset & !constants::FILE_FLAG_SECONDARY_ARCHIVE) as usize;

        let mut name = if header.flags.file_strings() {
            source.save_restore_position(|source| -> Result<Option<BString>> {
                source.seek_absolute(offsets.file_names)?;
                let name = strings::read_zstring(source)?;
                offsets.file_names = source.position();
                Ok(Some(name))
            })?
        } else {
            None
        };

        let (bytes, decompressed_len) = source.save_restore_position(
            |source| -> Result<(crate::Buffer<'bytes>, Option<u32>)> {
                source.seek_absolute(data_offset)?;

                if header.embeds_file_names() {
                    let mut embedded = strings::read_bstring(source)?;
                    data_size = data_size
                        .checked_sub(embedded.len() + 1)
                        .ok_or(Error::InconsistentOffset)?;
                    if let Some(pos) =
                        embedded.iter().rposition(|&byte| byte == b'\\' || byte == b'/')
                    {
                        if directory_name.is_none() {
                            *directory_name = Some(embedded[..pos].into());
                        }
                        embedded.drain(..=pos);
                    }
                    if name.is_none() {
                        name = Some(embedded);
                    }
                }

                // the size prefix is present iff the payload's effective
                // compression differs from "stored raw"
                let decompressed_len = if header.flags.compressed() != compression_flipped {
                    let len: u32 = source.read(Endian::Little)?;
                    data_size = data_size
                        .checked_sub(core::mem::size_of::<u32>())
                        .ok_or(Error::InconsistentOffset)?;
                    Some(len)
                } else {
                    None
                };

                let bytes = source.read_bytes(data_size)?;
                Ok((bytes, decompressed_len))
            },
        )?;

        Ok((
            FileKey {
                hash,
                name: name.unwrap_or_default(),
            },
            File {
                bytes,
                decompressed_len,
            },
        ))
    }

    fn read_hash(source: &mut Source<'bytes>, endian: Endian) -> Result<Hash> {
        let last = source.read(Endian::Little)?;
        let last2 = source.read(Endian::Little)?;
        let length = source.read(Endian::Little)?;
        let first = source.read(Endian::Little)?;
        // only the crc is stored byte-swapped in xbox archives
        let crc = source.read(endian)?;
        Ok(Hash {
            last,
            last2,
            length,
            first,
            crc,
        })
    }

    fn make_header(&self, version: Version) -> Result<Header> {
        let mut file_count = 0usize;
        let mut directory_names_len = 0usize;
        let mut file_names_len = 0usize;

        for (key, directory) in self.directories.iter() {
            if self.flags.directory_strings() {
                // zstring length, the bzstring prefix byte is not counted
                directory_names_len += key.name.len() + 1;
            }
            for (file_key, _) in directory.iter() {
                file_count += 1;
                if self.flags.file_strings() {
                    file_names_len += file_key.name.len() + 1;
                }
            }
        }

        Ok(Header {
            version,
            flags: self.flags,
            directory_count: self.directories.len().try_into()?,
            file_count: file_count.try_into()?,
            directory_names_len: directory_names_len.try_into()?,
            file_names_len: file_names_len.try_into()?,
            types: self.types,
        })
    }

    fn sort_for_write(&self) -> Vec<WriteEntry<'_, 'bytes>> {
        let xbox = self.flags.xbox_archive();
        let mut ordered: Vec<WriteEntry<'_, 'bytes>> = self
            .directories
            .iter()
            .map(|(key, directory)| {
                let mut files: Vec<_> = directory.iter().collect();
                if xbox {
                    files.sort_by_key(|(key, _)| key.hash.numeric().swap_bytes());
                }
                WriteEntry {
                    key,
                    directory,
                    files,
                }
            })
            .collect();
        if xbox {
            ordered.sort_by_key(|entry| entry.key.hash.numeric().swap_bytes());
        }
        ordered
    }

    fn write_header<Out>(sink: &mut Sink<'_, Out>, header: &Header) -> Result<()>
    where
        Out: Write,
    {
        sink.write(constants::MAGIC, Endian::Little)?;
        sink.write(header.version as u32, Endian::Little)?;
        sink.write(u32::try_from(constants::HEADER_SIZE)?, Endian::Little)?;
        sink.write(header.flags.bits(), Endian::Little)?;
        sink.write(header.directory_count, Endian::Little)?;
        sink.write(header.file_count, Endian::Little)?;
        sink.write(header.directory_names_len, Endian::Little)?;
        sink.write(header.file_names_len, Endian::Little)?;
        sink.write(header.types.bits(), Endian::Little)?;
        sink.write(0u16, Endian::Little)?;
        Ok(())
    }

    fn write_directory_entries<Out>(
        sink: &mut Sink<'_, Out>,
        header: &Header,
        ordered: &[WriteEntry<'_, 'bytes>],
    ) -> Result<()>
    where
        Out: Write,
    {
        let offsets = header.offsets();
        // by format quirk the offsets are biased by the total length of the
        // file-name block
        let mut file_entries_offset = u32::try_from(offsets.file_entries)?
            .checked_add(header.file_names_len)
            .ok_or(Error::OffsetOverflow)?;

        for entry in ordered {
            Self::write_hash(sink, header, entry.key.hash)?;
            sink.write(u32::try_from(entry.files.len())?, Endian::Little)?;
            match header.version {
                Version::v103 | Version::v104 => {
                    sink.write(file_entries_offset, Endian::Little)?;
                }
                Version::v105 => {
                    sink.write(entry.directory.padding, Endian::Little)?;
                    sink.write(u64::from(file_entries_offset), Endian::Little)?;
                }
            }

            if header.flags.directory_strings() {
                // bzstring: length prefix byte + bytes + null terminator
                file_entries_offset = file_entries_offset
                    .checked_add(u32::try_from(entry.key.name.len() + 2)?)
                    .ok_or(Error::OffsetOverflow)?;
            }
            file_entries_offset = file_entries_offset
                .checked_add(u32::try_from(
                    entry.files.len() * constants::FILE_ENTRY_SIZE,
                )?)
                .ok_or(Error::OffsetOverflow)?;
        }

        Ok(())
    }

    fn write_file_entries<Out>(
        sink: &mut Sink<'_, Out>,
        header: &Header,
        ordered: &[WriteEntry<'_, 'bytes>],
    ) -> Result<()>
    where
        Out: Write,
    {
        let offsets = header.offsets();
        let mut data_offset = u32::try_from(offsets.file_data)?;

        for entry in ordered {
            if header.flags.directory_strings() {
                strings::write_bzstring(sink, entry.key.name())?;
            }

            for &(file_key, file) in &entry.files {
                Self::write_hash(sink, header, file_key.hash)?;

                let size = u32::try_from(Self::file_data_size(header, entry.key, file_key, file))?;
                if size & (constants::FILE_FLAG_COMPRESSION | constants::FILE_FLAG_CHECKED) != 0 {
                    return Err(Error::OffsetOverflow);
                }
                let stored_size = if file.is_compressed() == header.flags.compressed() {
                    size
                } else {
                    size | constants::FILE_FLAG_COMPRESSION
                };

                sink.write(stored_size, Endian::Little)?;
                sink.write(data_offset, Endian::Little)?;
                data_offset = data_offset
                    .checked_add(size)
                    .ok_or(Error::OffsetOverflow)?;
            }
        }

        Ok(())
    }

    fn write_file_names<Out>(
        sink: &mut Sink<'_, Out>,
        header: &Header,
        ordered: &[WriteEntry<'_, 'bytes>],
    ) -> Result<()>
    where
        Out: Write,
    {
        if header.flags.file_strings() {
            for entry in ordered {
                for (file_key, _) in &entry.files {
                    strings::write_zstring(sink, file_key.name())?;
                }
            }
        }
        Ok(())
    }

    fn write_file_data<Out>(
        sink: &mut Sink<'_, Out>,
        header: &Header,
        ordered: &[WriteEntry<'_, 'bytes>],
    ) -> Result<()>
    where
        Out: Write,
    {
        for entry in ordered {
            for &(file_key, file) in &entry.files {
                if let Some(name) = Self::embedded_name(header, entry.key, file_key) {
                    strings::write_bstring(sink, name.as_ref())?;
                }
                if let Some(len) = file.decompressed_len {
                    sink.write(len, Endian::Little)?;
                }
                sink.write_bytes(file.as_bytes())?;
            }
        }
        Ok(())
    }

    fn write_hash<Out>(sink: &mut Sink<'_, Out>, header: &Header, hash: Hash) -> Result<()>
    where
        Out: Write,
    {
        sink.write(hash.last, Endian::Little)?;
        sink.write(hash.last2, Endian::Little)?;
        sink.write(hash.length, Endian::Little)?;
        sink.write(hash.first, Endian::Little)?;
        sink.write(hash.crc, header.hash_endian())?;
        Ok(())
    }

    /// The full path prefixed to a payload when embedded names are active.
    fn embedded_name(
        header: &Header,
        directory: &DirectoryKey,
        file: &FileKey,
    ) -> Option<BString> {
        if !header.embeds_file_names() {
            return None;
        }

        let mut path = BString::from(directory.name.as_slice());
        if !path.is_empty() && !file.name.is_empty() {
            path.push(b'\\');
        }
        path.extend_from_slice(&file.name);
        Some(path)
    }

    /// The number of data-section bytes `file` occupies, prefixes included.
    fn file_data_size(
        header: &Header,
        directory_key: &DirectoryKey,
        file_key: &FileKey,
        file: &File<'bytes>,
    ) -> usize {
        let mut size = file.len();
        if let Some(name) = Self::embedded_name(header, directory_key, file_key) {
            size += name.len() + 1; // length prefix byte
        }
        if file.is_compressed() {
            size += core::mem::size_of::<u32>();
        }
        size
    }

    // container surface

    pub fn clear(&mut self) {
        self.directories.clear();
        self.flags = ArchiveFlags::default();
        self.types = ArchiveTypes::default();
    }

    #[must_use]
    pub fn get<K>(&self, key: &K) -> Option<&Directory<'bytes>>
    where
        K: Borrow<Hash>,
    {
        self.directories.get(key.borrow())
    }

    #[must_use]
    pub fn get_key_value<K>(&self, key: &K) -> Option<(&DirectoryKey, &Directory<'bytes>)>
    where
        K: Borrow<Hash>,
    {
        self.directories.get_key_value(key.borrow())
    }

    #[must_use]
    pub fn get_mut<K>(&mut self, key: &K) -> Option<&mut Directory<'bytes>>
    where
        K: Borrow<Hash>,
    {
        self.directories.get_mut(key.borrow())
    }

    /// Inserts `directory` under `key`, failing (and leaving the archive
    /// unchanged) if a directory with the same hash is already present.
    pub fn insert<K>(&mut self, key: K, directory: Directory<'bytes>) -> bool
    where
        K: Into<DirectoryKey>,
    {
        self.directories.insert(key.into(), directory)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.directories.is_empty()
    }

    pub fn iter(&self) -> index::Iter<'_, DirectoryKey, Directory<'bytes>> {
        self.directories.iter()
    }

    pub fn iter_mut(&mut self) -> index::IterMut<'_, DirectoryKey, Directory<'bytes>> {
        self.directories.iter_mut()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.directories.len()
    }

    pub fn remove<K>(&mut self, key: &K) -> Option<Directory<'bytes>>
    where
        K: Borrow<Hash>,
    {
        self.directories.remove(key.borrow())
    }

    pub fn remove_entry<K>(&mut self, key: &K) -> Option<(DirectoryKey, Directory<'bytes>)>
    where
        K: Borrow<Hash>,
    {
        self.directories.remove_entry(key.borrow())
    }
}

impl<'bytes> Default for Archive<'bytes> {
    fn default() -> Self {
        Self {
            directories: Index::default(),
            flags: ArchiveFlags::default(),
            types: ArchiveTypes::default(),
        }
    }
}

impl<'bytes> IntoIterator for Archive<'bytes> {
    type Item = (DirectoryKey, Directory<'bytes>);
    type IntoIter = index::IntoIter<DirectoryKey, Directory<'bytes>>;

    fn into_iter(self) -> Self::IntoIter {
        self.directories.into_iter()
    }
}

impl<'archive, 'bytes> IntoIterator for &'archive Archive<'bytes> {
    type Item = (&'archive DirectoryKey, &'archive Directory<'bytes>);
    type IntoIter = index::Iter<'archive, DirectoryKey, Directory<'bytes>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'bytes> FromIterator<(DirectoryKey, Directory<'bytes>)> for Archive<'bytes> {
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = (DirectoryKey, Directory<'bytes>)>,
    {
        let mut archive = Self::new();
        for (key, directory) in iter {
            archive.insert(key, directory);
        }
        archive
    }
}

#[cfg(test)]
mod tests {
    use super::{Archive, ArchiveFlags, ArchiveTypes, DirectoryKey};
    use crate::{
        tes4::{CompressionOptions, Directory, Error, File, FileKey, Version},
        Source,
    };
    use anyhow::Context as _;

    fn build_archive<'bytes>(flags: ArchiveFlags) -> Archive<'bytes> {
        let mut meshes = Directory::new();
        meshes.insert(
            FileKey::from("chest_01.nif"),
            File::from_decompressed(b"chest geometry"),
        );
        meshes.insert(
            FileKey::from("door_01.nif"),
            File::from_decompressed(b"door geometry"),
        );

        let mut textures = Directory::new();
        textures.insert(
            FileKey::from("chest_01.dds"),
            File::from_decompressed(b"chest pixels"),
        );
        textures.insert(FileKey::from("empty.dds"), File::new());

        let mut archive = Archive::new();
        archive.insert(DirectoryKey::from("meshes/clutter"), meshes);
        archive.insert(DirectoryKey::from("textures/clutter"), textures);
        archive.set_archive_flags(flags);
        archive.set_archive_types(ArchiveTypes::MESHES | ArchiveTypes::TEXTURES);
        archive
    }

    fn assert_same_contents(lhs: &Archive<'_>, rhs: &Archive<'_>) {
        assert_eq!(lhs.len(), rhs.len());
        assert_eq!(lhs.archive_types(), rhs.archive_types());
        for ((lhs_key, lhs_dir), (rhs_key, rhs_dir)) in lhs.iter().zip(rhs.iter()) {
            assert_eq!(lhs_key.hash(), rhs_key.hash());
            assert_eq!(lhs_dir.len(), rhs_dir.len());
            for ((lhs_key, lhs_file), (rhs_key, rhs_file)) in lhs_dir.iter().zip(rhs_dir.iter()) {
                assert_eq!(lhs_key.hash(), rhs_key.hash());
                assert_eq!(lhs_file.as_bytes(), rhs_file.as_bytes());
                assert_eq!(lhs_file.decompressed_len(), rhs_file.decompressed_len());
            }
        }
    }

    #[test]
    fn default_state() {
        let archive = Archive::new();
        assert!(archive.is_empty());
        assert_eq!(archive.len(), 0);
        assert_eq!(archive.archive_flags(), ArchiveFlags::default());
        assert_eq!(archive.archive_types(), ArchiveTypes::default());
    }

    #[test]
    fn round_trips_across_versions() -> anyhow::Result<()> {
        for version in [Version::v103, Version::v104, Version::v105] {
            let archive = build_archive(ArchiveFlags::default());

            let mut stream = Vec::new();
            archive
                .write(&mut stream, version)
                .with_context(|| format!("failed to write as {version:?}"))?;

            let (read_back, read_version) = Archive::read(Source::from_slice(&stream))
                .with_context(|| format!("failed to read back as {version:?}"))?;
            assert_eq!(read_version, version);
            assert_eq!(read_back.archive_flags(), archive.archive_flags());
            assert_same_contents(&archive, &read_back);

            // names survived
            let directory = read_back
                .get(&DirectoryKey::from("meshes/clutter"))
                .context("missing directory")?;
            let (key, _) = directory
                .get_key_value(&FileKey::from("chest_01.nif"))
                .context("missing file")?;
            assert_eq!(key.name(), "chest_01.nif");

            // an unmodified archive re-serializes byte-identically
            let mut second = Vec::new();
            read_back.write(&mut second, version)?;
            assert_eq!(second, stream, "round trip diverged for {version:?}");
        }
        Ok(())
    }

    #[test]
    fn round_trips_without_name_sections() -> anyhow::Result<()> {
        let flags = ArchiveFlags::empty();
        let archive = build_archive(flags);

        let mut stream = Vec::new();
        archive.write(&mut stream, Version::v104)?;

        let (read_back, _) = Archive::read(Source::from_slice(&stream))?;
        assert!(!read_back.archive_flags().directory_strings());
        assert!(!read_back.archive_flags().file_strings());
        assert_same_contents(&archive, &read_back);

        // the container stays functional without names
        let directory = read_back
            .get(&DirectoryKey::from("meshes/clutter"))
            .context("hash lookups must survive missing names")?;
        let (key, _) = directory
            .get_key_value(&FileKey::from("door_01.nif"))
            .context("missing file")?;
        assert!(key.name().is_empty());

        let mut second = Vec::new();
        read_back.write(&mut second, Version::v104)?;
        assert_eq!(second, stream);
        Ok(())
    }

    #[test]
    fn xbox_archives_swap_and_resort() -> anyhow::Result<()> {
        let normal = build_archive(ArchiveFlags::default());
        let xbox = {
            let mut archive = build_archive(ArchiveFlags::default());
            archive.set_archive_flags(ArchiveFlags::default() | ArchiveFlags::XBOX_ARCHIVE);
            archive
        };

        let mut normal_stream = Vec::new();
        normal.write(&mut normal_stream, Version::v104)?;
        let mut xbox_stream = Vec::new();
        xbox.write(&mut xbox_stream, Version::v104)?;
        assert_ne!(normal_stream, xbox_stream);

        let (read_back, _) = Archive::read(Source::from_slice(&xbox_stream))?;
        assert!(read_back.archive_flags().xbox_archive());
        assert_same_contents(&normal, &read_back);

        let mut second = Vec::new();
        read_back.write(&mut second, Version::v104)?;
        assert_eq!(second, xbox_stream);
        Ok(())
    }

    #[test]
    fn embedded_names_recover_missing_strings() -> anyhow::Result<()> {
        let archive = build_archive(
            ArchiveFlags::DIRECTORY_STRINGS | ArchiveFlags::EMBEDDED_FILE_NAMES,
        );

        let mut stream = Vec::new();
        archive.write(&mut stream, Version::v104)?;

        let (read_back, _) = Archive::read(Source::from_slice(&stream))?;
        let directory = read_back
            .get(&DirectoryKey::from("meshes/clutter"))
            .context("missing directory")?;
        let (key, file) = directory
            .get_key_value(&FileKey::from("chest_01.nif"))
            .context("missing file")?;
        // recovered from the embedded prefix, not a file-name block
        assert_eq!(key.name(), "chest_01.nif");
        assert_eq!(file.as_bytes(), b"chest geometry");

        let mut second = Vec::new();
        read_back.write(&mut second, Version::v104)?;
        assert_eq!(second, stream);
        Ok(())
    }

    #[test]
    fn per_file_compression_can_diverge_from_the_archive() -> anyhow::Result<()> {
        let payload = b"an uncompressed outlier inside a compressed archive".as_slice();
        let compressed_payload =
            b"partners in crime: a compressed file in a raw archive".as_slice();
        let options = CompressionOptions {
            version: Version::v104,
            ..Default::default()
        };

        // raw file inside an archive whose default is compressed
        let mut compressed_file = File::from_decompressed(compressed_payload);
        compressed_file.compress(&options)?;
        let mut directory = Directory::new();
        directory.insert(FileKey::from("raw.txt"), File::from_decompressed(payload));
        directory.insert(FileKey::from("packed.txt"), compressed_file);

        let mut archive = Archive::new();
        archive.insert(DirectoryKey::from("."), directory);
        archive.set_archive_flags(ArchiveFlags::default() | ArchiveFlags::COMPRESSED);

        let mut stream = Vec::new();
        archive.write(&mut stream, Version::v104)?;

        let (read_back, _) = Archive::read(Source::from_slice(&stream))?;
        assert!(read_back.archive_flags().compressed());
        let directory = read_back
            .get(&DirectoryKey::from("."))
            .context("missing the root directory")?;

        let raw = directory
            .get(&FileKey::from("raw.txt"))
            .context("missing the raw file")?;
        assert!(!raw.is_compressed());
        assert_eq!(raw.len(), payload.len());
        assert_eq!(raw.as_bytes(), payload);

        let packed = directory
            .get(&FileKey::from("packed.txt"))
            .context("missing the compressed file")?;
        assert!(packed.is_compressed());
        assert_eq!(packed.decompressed_len(), Some(compressed_payload.len()));
        let mut expanded = Vec::new();
        packed.decompress_into(&mut expanded, &options)?;
        assert_eq!(expanded, compressed_payload);

        let mut second = Vec::new();
        read_back.write(&mut second, Version::v104)?;
        assert_eq!(second, stream);
        Ok(())
    }

    #[test]
    fn invalid_headers_are_rejected() {
        fn read(stream: &[u8]) -> Result<(Archive<'_>, Version), Error> {
            Archive::read(Source::from_slice(stream))
        }

        let mut bad_magic = Vec::new();
        bad_magic.extend_from_slice(b"AB\0\0");
        bad_magic.resize(0x24, 0);
        assert!(matches!(
            read(&bad_magic),
            Err(Error::BadMagic(0x0000_4241))
        ));

        let mut bad_version = Vec::new();
        bad_version.extend_from_slice(b"BSA\0");
        bad_version.extend_from_slice(&42u32.to_le_bytes());
        bad_version.resize(0x24, 0);
        assert!(matches!(
            read(&bad_version),
            Err(Error::UnsupportedVersion(42))
        ));

        let mut bad_offset = Vec::new();
        bad_offset.extend_from_slice(b"BSA\0");
        bad_offset.extend_from_slice(&104u32.to_le_bytes());
        bad_offset.extend_from_slice(&0xCCu32.to_le_bytes());
        bad_offset.resize(0x24, 0);
        assert!(matches!(read(&bad_offset), Err(Error::InconsistentOffset)));

        assert!(matches!(read(b"BSA\0"), Err(Error::Truncated)));
    }

    #[test]
    fn offset_verification() {
        let archive = build_archive(ArchiveFlags::default());
        assert!(archive.verify_offsets(Version::v103));
        assert!(archive.verify_offsets(Version::v105));
        assert!(Archive::new().verify_offsets(Version::v104));
    }
}
