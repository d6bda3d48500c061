//! The Morrowind revision of the format.
//!
//! The oldest and simplest variant: a flat, hash-sorted table of files with
//! no compression and no directory structure.
//!
//! # Reading
//! ```rust
//! use bsarc::{
//!     tes3::{Archive, FileKey},
//!     Source,
//! };
//!
//! fn example() -> Option<()> {
//!     let archive = Archive::read(Source::open("Data Files/Morrowind.bsa").ok()?).ok()?;
//!     let file = archive.get(&FileKey::from("icons/gold.dds"))?;
//!     std::fs::write("gold.dds", file.as_bytes()).ok()?;
//!     Some(())
//! }
//! ```
//!
//! # Writing
//! ```rust
//! use bsarc::tes3::{Archive, File, FileKey};
//!
//! fn example() -> Option<()> {
//!     let mut archive = Archive::new();
//!     archive.insert(FileKey::from("hello.txt"), File::from(&b"Hello world!\n"[..]));
//!     let mut stream = std::fs::File::create("example.bsa").ok()?;
//!     archive.write(&mut stream).ok()?;
//!     Some(())
//! }
//! ```

mod archive;
mod file;
mod hashing;

pub use self::{
    archive::{Archive, FileKey},
    file::File,
    hashing::{hash_file, hash_file_in_place, Hash},
};

use core::num::TryFromIntError;
use std::io;

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid magic read from archive header: {0:#X}")]
    BadMagic(u32),

    #[error("two files in the archive share the same hash")]
    DuplicateHash,

    #[error("a section offset points outside the archive, or overlaps a prior section")]
    InconsistentOffset,

    #[error("a computed offset does not fit in 32 bits")]
    OffsetOverflow,

    #[error("the stream ended before the archive was fully read")]
    Truncated,

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
