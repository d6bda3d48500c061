//! The Oblivion-era revision of the format, used through Skyrim SE.
//!
//! Archives are split into directories of files, carry behavior flags and
//! content-type bits, and may compress individual payloads with the codec
//! their version prescribes: zlib for v103/v104, LZ4 for v105.
//!
//! # Reading
//! ```rust
//! use bsarc::{
//!     tes4::{Archive, CompressionOptions, DirectoryKey, FileKey},
//!     Source,
//! };
//!
//! fn example() -> Option<()> {
//!     let (archive, version) =
//!         Archive::read(Source::open("Data/Oblivion - Voices2.bsa").ok()?).ok()?;
//!     let file = archive
//!         .get(&DirectoryKey::from("sound/voice/oblivion.esm/imperial/m"))?
//!         .get(&FileKey::from("testtoddquest_testtoddhappy_00027fa2_1.mp3"))?;
//!     let options = CompressionOptions {
//!         version,
//!         ..Default::default()
//!     };
//!     let mut stream = std::fs::File::create("happy.mp3").ok()?;
//!     file.write(&mut stream, &options).ok()?;
//!     Some(())
//! }
//! ```
//!
//! # Writing
//! ```rust
//! use bsarc::tes4::{Archive, ArchiveTypes, Directory, DirectoryKey, File, FileKey, Version};
//!
//! fn example() -> Option<()> {
//!     let file = File::from_decompressed(b"Hello world!\n");
//!     let directory: Directory = [(FileKey::from("hello.txt"), file)].into_iter().collect();
//!     let mut archive = Archive::new();
//!     archive.insert(DirectoryKey::from("misc"), directory);
//!     archive.set_archive_types(ArchiveTypes::MISC);
//!     let mut stream = std::fs::File::create("example.bsa").ok()?;
//!     archive.write(&mut stream, Version::SSE).ok()?;
//!     Some(())
//! }
//! ```

mod archive;
mod compression;
mod directory;
mod file;
mod hashing;

pub use self::{
    archive::{Archive, ArchiveFlags, ArchiveTypes, DirectoryKey},
    compression::CompressionCodec,
    directory::{Directory, FileKey},
    file::{CompressionOptions, File},
    hashing::{
        hash_directory, hash_directory_in_place, hash_file, hash_file_in_place, Hash,
    },
};

use core::num::TryFromIntError;
use std::{error, io};

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("can not compress a file which is already compressed")]
    AlreadyCompressed,

    #[error("can not decompress a file which is already decompressed")]
    AlreadyDecompressed,

    #[error("invalid magic read from archive header: {0:#X}")]
    BadMagic(u32),

    #[error("the underlying codec rejected the input while compressing")]
    CompressionFailed(#[source] Box<dyn error::Error + Send + Sync>),

    #[error("the underlying codec rejected the input while decompressing")]
    DecompressionFailed(#[source] Box<dyn error::Error + Send + Sync>),

    #[error("a buffer decompressed to {actual} bytes where {expected} were expected")]
    DecompressionSizeMismatch { expected: usize, actual: usize },

    #[error("two entries in the same scope share the same hash")]
    DuplicateHash,

    #[error("a section offset points outside the archive, or overlaps a prior section")]
    InconsistentOffset,

    #[error("a computed offset does not fit in 32 bits")]
    OffsetOverflow,

    #[error("the stream ended before the archive was fully read")]
    Truncated,

    #[error("the xmem codec has no available implementation")]
    UnsupportedCodec,

    #[error("invalid version read from archive header: {0}")]
    UnsupportedVersion(u32),

    #[error(transparent)]
    Io(io::Error),
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        match value.kind() {
            io::ErrorKind::UnexpectedEof => Self::Truncated,
            _ => Self::Io(value),
        }
    }
}

impl From<TryFromIntError> for Error {
    fn from(_: TryFromIntError) -> Self {
        Self::OffsetOverflow
    }
}

pub type Result<T> = core::result::Result<T, Error>;

/// The archive version. Each one shifts the abi of the on-disk format.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
pub enum Version {
    #[default]
    v103 = 103,
    v104 = 104,
    v105 = 105,
}

impl Version {
    /// The Elder Scrolls IV: Oblivion.
    pub const TES4: Self = Self::v103;
    /// Fallout 3.
    pub const FO3: Self = Self::v104;
    /// Fallout: New Vegas.
    pub const FNV: Self = Self::v104;
    /// The Elder Scrolls V: Skyrim.
    pub const TES5: Self = Self::v104;
    /// The Elder Scrolls V: Skyrim - Special Edition.
    pub const SSE: Self = Self::v105;
}
