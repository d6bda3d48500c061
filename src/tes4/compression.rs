//! Adaptors over the compression codecs the format's versions prescribe.
//!
//! On disk a compressed payload is a `u32` decompressed size followed by the
//! codec bytes; the size prefix belongs to the archive serializer, so the
//! functions here deal in codec bytes only.

use crate::tes4::{Error, Result, Version};
use flate2::{
    write::{ZlibDecoder, ZlibEncoder},
    Compression,
};
use lzzzz::lz4;
use std::{error, io::Write};

/// Selects the codec used when compressing or decompressing file payloads.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum CompressionCodec {
    /// The codec the archive's version prescribes.
    #[default]
    Normal,
    /// The XNA codec used by xbox-compressed v104 archives.
    Xmem,
}

/// The concrete algorithm a `(version, codec)` pair resolves to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum CodecKind {
    Zlib,
    Lz4Block,
    Xmem,
}

impl CodecKind {
    pub(crate) fn select(version: Version, codec: CompressionCodec) -> Self {
        match (version, codec) {
            (_, CompressionCodec::Xmem) => Self::Xmem,
            (Version::v103 | Version::v104, CompressionCodec::Normal) => Self::Zlib,
            (Version::v105, CompressionCodec::Normal) => Self::Lz4Block,
        }
    }
}

pub(crate) fn compress_into(kind: CodecKind, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
    match kind {
        CodecKind::Zlib => {
            let mut encoder = ZlibEncoder::new(out, Compression::default());
            encoder.write_all(input).map_err(compression_failed)?;
            encoder.finish().map_err(compression_failed)?;
            Ok(())
        }
        CodecKind::Lz4Block => {
            lz4::compress_to_vec(input, out, lz4::ACC_LEVEL_DEFAULT)
                .map_err(compression_failed)?;
            Ok(())
        }
        CodecKind::Xmem => Err(Error::UnsupportedCodec),
    }
}

/// Decompresses `input` into `out`, which receives exactly
/// `decompressed_len` bytes on success.
pub(crate) fn decompress_into(
    kind: CodecKind,
    input: &[u8],
    out: &mut Vec<u8>,
    decompressed_len: usize,
) -> Result<()> {
    match kind {
        CodecKind::Zlib => {
            out.reserve_exact(decompressed_len);
            let mut decoder = ZlibDecoder::new(out);
            decoder.write_all(input).map_err(decompression_failed)?;
            decoder.try_finish().map_err(decompression_failed)?;
            let actual = usize::try_from(decoder.total_out()).map_err(Error::from)?;
            if actual == decompressed_len {
                Ok(())
            } else {
                Err(Error::DecompressionSizeMismatch {
                    expected: decompressed_len,
                    actual,
                })
            }
        }
        CodecKind::Lz4Block => {
            out.resize(decompressed_len, 0);
            let actual = lz4::decompress(input, out).map_err(decompression_failed)?;
            if actual == decompressed_len {
                Ok(())
            } else {
                Err(Error::DecompressionSizeMismatch {
                    expected: decompressed_len,
                    actual,
                })
            }
        }
        CodecKind::Xmem => Err(Error::UnsupportedCodec),
    }
}

/// The worst-case compressed size for `input_len` bytes, or `None` when the
/// codec has no implementation to size for.
pub(crate) fn compress_bound(kind: CodecKind, input_len: usize) -> Option<usize> {
    match kind {
        // zlib's deflateBound() for the default parameters
        CodecKind::Zlib => {
            Some(input_len + (input_len >> 12) + (input_len >> 14) + (input_len >> 25) + 13)
        }
        CodecKind::Lz4Block => Some(lz4::max_compressed_size(input_len)),
        CodecKind::Xmem => None,
    }
}

fn compression_failed<E>(source: E) -> Error
where
    E: error::Error + Send + Sync + 'static,
{
    Error::CompressionFailed(Box::new(source))
}

fn decompression_failed<E>(source: E) -> Error
where
    E: error::Error + Send + Sync + 'static,
{
    Error::DecompressionFailed(Box::new(source))
}

#[cfg(test)]
mod tests {
    use super::{
        compress_bound, compress_into, decompress_into, CodecKind, CompressionCodec,
    };
    use crate::tes4::{Error, Version};

    const PAYLOAD: &[u8] = b"The quick brown fox jumps over the lazy dog. \
        The quick brown fox jumps over the lazy dog. \
        The quick brown fox jumps over the lazy dog.";

    #[test]
    fn codec_selection_follows_the_version() {
        let select = CodecKind::select;
        assert_eq!(
            select(Version::v103, CompressionCodec::Normal),
            CodecKind::Zlib
        );
        assert_eq!(
            select(Version::v104, CompressionCodec::Normal),
            CodecKind::Zlib
        );
        assert_eq!(
            select(Version::v105, CompressionCodec::Normal),
            CodecKind::Lz4Block
        );
        assert_eq!(
            select(Version::v104, CompressionCodec::Xmem),
            CodecKind::Xmem
        );
    }

    #[test]
    fn zlib_round_trip() {
        let mut compressed = Vec::new();
        compress_into(CodecKind::Zlib, PAYLOAD, &mut compressed).unwrap();
        assert!(compressed.len() < PAYLOAD.len());
        assert!(compressed.len() <= compress_bound(CodecKind::Zlib, PAYLOAD.len()).unwrap());

        let mut decompressed = Vec::new();
        decompress_into(CodecKind::Zlib, &compressed, &mut decompressed, PAYLOAD.len()).unwrap();
        assert_eq!(decompressed, PAYLOAD);
    }

    #[test]
    fn lz4_round_trip() {
        let mut compressed = Vec::new();
        compress_into(CodecKind::Lz4Block, PAYLOAD, &mut compressed).unwrap();
        assert!(compressed.len() < PAYLOAD.len());
        assert!(compressed.len() <= compress_bound(CodecKind::Lz4Block, PAYLOAD.len()).unwrap());

        let mut decompressed = Vec::new();
        decompress_into(
            CodecKind::Lz4Block,
            &compressed,
            &mut decompressed,
            PAYLOAD.len(),
        )
        .unwrap();
        assert_eq!(decompressed, PAYLOAD);
    }

    #[test]
    fn a_wrong_expected_size_is_reported() {
        let mut compressed = Vec::new();
        compress_into(CodecKind::Zlib, PAYLOAD, &mut compressed).unwrap();

        let mut decompressed = Vec::new();
        match decompress_into(
            CodecKind::Zlib,
            &compressed,
            &mut decompressed,
            PAYLOAD.len() + 1,
        ) {
            Err(Error::DecompressionSizeMismatch { expected, actual }) => {
                assert_eq!(expected, PAYLOAD.len() + 1);
                assert_eq!(actual, PAYLOAD.len());
            }
            _ => panic!("expected DecompressionSizeMismatch"),
        }
    }

    #[test]
    fn xmem_is_unsupported() {
        let mut out = Vec::new();
        assert!(matches!(
            compress_into(CodecKind::Xmem, PAYLOAD, &mut out),
            Err(Error::UnsupportedCodec)
        ));
        assert!(matches!(
            decompress_into(CodecKind::Xmem, PAYLOAD, &mut out, 0),
            Err(Error::UnsupportedCodec)
        ));
        assert!(compress_bound(CodecKind::Xmem, 16).is_none());
    }
}
