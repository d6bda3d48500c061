#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

//! A library for working with Bethesda Softworks Archives, the virtual
//! filesystem containers shipped with Morrowind ([`tes3`]) and the
//! Oblivion-through-Skyrim SE family ([`tes4`]).
//!
//! Both codecs round-trip canonical archives bit-exactly and share a lazy
//! reading model: parsing allocates per-entry metadata only, while payloads
//! borrow from or proxy into the input. A [`Source`] built over a memory
//! mapped file keeps the mapping alive for as long as any archive read from
//! it, so the mapping's lifetime never needs managing by hand.
//!
//! Archive paths are byte strings, not unicode; the [`bstr`] types are
//! re-exported for convenience.

mod buffer;
mod index;
mod io;
mod path;
mod strings;
pub mod tes3;
pub mod tes4;

pub use self::{
    buffer::Buffer,
    io::{Endian, Source},
};
pub use bstr::{BStr, BString};

/// The archive families this crate understands.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Format {
    Tes3,
    Tes4,
}

/// Guesses an archive's format from the magic at the front of `stream`.
pub fn guess_format<In>(stream: &mut In) -> Option<Format>
where
    In: ?Sized + std::io::Read,
{
    let mut magic = [0u8; 4];
    stream.read_exact(&mut magic).ok()?;
    match u32::from_le_bytes(magic) {
        0x100 => Some(Format::Tes3),
        magic if magic == u32::from_le_bytes(*b"BSA\0") => Some(Format::Tes4),
        _ => None,
    }
}
