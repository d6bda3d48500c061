//! The string encodings used on disk.
//!
//! - `zstring`: NUL-terminated.
//! - `bzstring`: u8 length prefix (which counts the NUL), then the bytes,
//!   then a NUL.
//! - `bstring`: u8 length prefix, no terminator.

use crate::io::{Endian, Sink, Source};
use bstr::{BStr, BString};
use std::io::{self, Write};

pub(crate) fn read_zstring(source: &mut Source<'_>) -> io::Result<BString> {
    let mut bytes = Vec::new();
    loop {
        match source.read::<u8>(Endian::Little)? {
            0 => break,
            byte => bytes.push(byte),
        }
    }
    Ok(BString::new(bytes))
}

pub(crate) fn write_zstring<Out>(sink: &mut Sink<'_, Out>, string: &BStr) -> io::Result<()>
where
    Out: Write,
{
    sink.write_bytes(string)?;
    sink.write_bytes(b"\0")
}

pub(crate) fn read_bzstring(source: &mut Source<'_>) -> io::Result<BString> {
    let len: u8 = source.read(Endian::Little)?;
    if len == 0 {
        return Err(missing_terminator());
    }

    let bytes = source.read_bytes(usize::from(len) - 1)?;
    let string = BString::from(bytes.as_bytes());
    match source.read::<u8>(Endian::Little)? {
        0 => Ok(string),
        _ => Err(missing_terminator()),
    }
}

pub(crate) fn write_bzstring<Out>(sink: &mut Sink<'_, Out>, string: &BStr) -> io::Result<()>
where
    Out: Write,
{
    let len: u8 = (string.len() + 1)
        .try_into()
        .map_err(|_| too_large(string.len()))?;
    sink.write(len, Endian::Little)?;
    sink.write_bytes(string)?;
    sink.write_bytes(b"\0")
}

pub(crate) fn read_bstring(source: &mut Source<'_>) -> io::Result<BString> {
    let len: u8 = source.read(Endian::Little)?;
    let bytes = source.read_bytes(usize::from(len))?;
    Ok(BString::from(bytes.as_bytes()))
}

pub(crate) fn write_bstring<Out>(sink: &mut Sink<'_, Out>, string: &BStr) -> io::Result<()>
where
    Out: Write,
{
    let len: u8 = string
        .len()
        .try_into()
        .map_err(|_| too_large(string.len()))?;
    sink.write(len, Endian::Little)?;
    sink.write_bytes(string)
}

fn missing_terminator() -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        "a string was missing its null terminator",
    )
}

fn too_large(len: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("a string of {len} bytes does not fit its length prefix"),
    )
}

#[cfg(test)]
mod tests {
    use super::{
        read_bstring, read_bzstring, read_zstring, write_bstring, write_bzstring, write_zstring,
    };
    use crate::io::{Sink, Source};
    use bstr::ByteSlice as _;
    use std::io;

    #[test]
    fn zstring_round_trip() -> io::Result<()> {
        let mut stream = Vec::new();
        write_zstring(&mut Sink::new(&mut stream), b"icons".as_bstr())?;
        assert_eq!(stream, b"icons\0");

        let read = read_zstring(&mut Source::from_slice(&stream))?;
        assert_eq!(read, "icons");
        Ok(())
    }

    #[test]
    fn bzstring_round_trip() -> io::Result<()> {
        let mut stream = Vec::new();
        write_bzstring(&mut Sink::new(&mut stream), b"meshes".as_bstr())?;
        assert_eq!(stream, b"\x07meshes\0");

        let read = read_bzstring(&mut Source::from_slice(&stream))?;
        assert_eq!(read, "meshes");
        Ok(())
    }

    #[test]
    fn bstring_round_trip() -> io::Result<()> {
        let mut stream = Vec::new();
        write_bstring(&mut Sink::new(&mut stream), b"a\\b.nif".as_bstr())?;
        assert_eq!(stream, b"\x07a\\b.nif");

        let read = read_bstring(&mut Source::from_slice(&stream))?;
        assert_eq!(read, "a\\b.nif");
        Ok(())
    }

    #[test]
    fn bzstring_rejects_a_zero_length_prefix() {
        assert!(read_bzstring(&mut Source::from_slice(b"\0")).is_err());
    }

    #[test]
    fn oversized_strings_are_rejected() {
        let big = vec![b'x'; 300];
        let mut stream = Vec::new();
        assert!(write_bzstring(&mut Sink::new(&mut stream), big.as_bstr()).is_err());
        assert!(write_bstring(&mut Sink::new(&mut stream), big.as_bstr()).is_err());
    }
}
