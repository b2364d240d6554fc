//! Codec constructors backing the builtin [`Format`](crate::Format) records.
//!
//! Decoders are stacked on the peek reader directly (it is already a
//! [`BufRead`](std::io::BufRead)), so the layer is buffered exactly once.

use crate::peek::LayerReader;
use bzip2::{Compression as BzCompression, bufread::MultiBzDecoder, write::BzEncoder};
use flate2::{Compression as GzCompression, bufread::MultiGzDecoder, write::GzEncoder};
use std::io::{Error as IoError, ErrorKind as IoErrorKind, Read, Result as IoResult, Write};
#[cfg(feature = "xz")]
use xz2::{bufread::XzDecoder, write::XzEncoder};
#[cfg(feature = "zstd")]
use zstd::stream::{read::Decoder as ZstdDecoder, write::Encoder as ZstdEncoder};

const GZIP_FLAGS: usize = 3;
/// FLG bits 5 to 7 must be zero (RFC 1952).
const GZIP_RESERVED_FLAGS: u8 = 0xE0;
const BZIP2_HEADER_LEN: usize = 4;

/// A decoder, or the source stream itself when there is nothing to decode.
pub type BoxedRead<'a> = Box<dyn Read + Send + 'a>;
/// The destination stream handed to an encoder.
pub type BoxedWrite<'a> = Box<dyn Write + Send + 'a>;
/// An encoder stacked on a [`BoxedWrite`].
pub type BoxedEncoder<'a> = Box<dyn EncodeWrite + Send + 'a>;

/// A compressing writer that must be finalized.
///
/// Dropping an encoder without calling [`finish`](Self::finish) may leave the
/// output without its trailer.
pub trait EncodeWrite: Write {
    /// Write any buffered data and the format's trailer, then flush the
    /// underlying writer.
    fn finish(self: Box<Self>) -> IoResult<()>;
}

impl<W: Write> EncodeWrite for GzEncoder<W> {
    fn finish(self: Box<Self>) -> IoResult<()> {
        GzEncoder::<W>::finish(*self)?.flush()
    }
}

impl<W: Write> EncodeWrite for BzEncoder<W> {
    fn finish(self: Box<Self>) -> IoResult<()> {
        BzEncoder::<W>::finish(*self)?.flush()
    }
}

#[cfg(feature = "xz")]
impl<W: Write> EncodeWrite for XzEncoder<W> {
    fn finish(self: Box<Self>) -> IoResult<()> {
        XzEncoder::<W>::finish(*self)?.flush()
    }
}

#[cfg(feature = "zstd")]
impl<W: Write> EncodeWrite for ZstdEncoder<'static, W> {
    fn finish(self: Box<Self>) -> IoResult<()> {
        ZstdEncoder::<'static, W>::finish(*self)?.flush()
    }
}

fn malformed(kind: IoErrorKind, message: &'static str) -> IoError {
    IoError::new(kind, message)
}

pub(crate) fn gzip_decoder<'a>(mut reader: LayerReader<'a>) -> IoResult<BoxedRead<'a>> {
    let flags = reader.peek(GZIP_FLAGS + 1)?.get(GZIP_FLAGS).copied();
    if flags.is_some_and(|flags| flags & GZIP_RESERVED_FLAGS != 0) {
        return Err(malformed(IoErrorKind::InvalidData, "reserved gzip header flags set"));
    }
    // Concatenated members are one stream, same as `gzip -d`. The first
    // member's header is parsed here, before any data is read.
    let mut decoder = MultiGzDecoder::new(reader);
    if decoder.header().is_none() {
        // A failed header parse is kept by the decoder and handed back on
        // the next read.
        decoder.read(&mut [])?;
        return Err(malformed(IoErrorKind::UnexpectedEof, "truncated gzip header"));
    }
    Ok(Box::new(decoder))
}

pub(crate) fn gzip_encoder<'a>(writer: BoxedWrite<'a>, level: u32) -> IoResult<BoxedEncoder<'a>> {
    Ok(Box::new(GzEncoder::new(writer, GzCompression::new(level))))
}

pub(crate) fn bzip2_decoder<'a>(mut reader: LayerReader<'a>) -> IoResult<BoxedRead<'a>> {
    let header = reader.peek(BZIP2_HEADER_LEN)?;
    if header.len() < BZIP2_HEADER_LEN {
        return Err(malformed(IoErrorKind::UnexpectedEof, "truncated bzip2 header"));
    }
    if !(b'1'..=b'9').contains(&header[BZIP2_HEADER_LEN - 1]) {
        return Err(malformed(IoErrorKind::InvalidData, "invalid bzip2 block size"));
    }
    Ok(Box::new(MultiBzDecoder::new(reader)))
}

pub(crate) fn bzip2_encoder<'a>(writer: BoxedWrite<'a>, level: u32) -> IoResult<BoxedEncoder<'a>> {
    Ok(Box::new(BzEncoder::new(writer, BzCompression::new(level))))
}

#[cfg(feature = "xz")]
pub(crate) fn xz_decoder<'a>(reader: LayerReader<'a>) -> IoResult<BoxedRead<'a>> {
    Ok(Box::new(XzDecoder::new_multi_decoder(reader)))
}

#[cfg(feature = "xz")]
pub(crate) fn xz_encoder<'a>(writer: BoxedWrite<'a>, level: u32) -> IoResult<BoxedEncoder<'a>> {
    Ok(Box::new(XzEncoder::new(writer, level)))
}

#[cfg(feature = "zstd")]
pub(crate) fn zstd_decoder<'a>(reader: LayerReader<'a>) -> IoResult<BoxedRead<'a>> {
    Ok(Box::new(ZstdDecoder::with_buffer(reader)?))
}

#[cfg(feature = "zstd")]
pub(crate) fn zstd_encoder<'a>(writer: BoxedWrite<'a>, level: u32) -> IoResult<BoxedEncoder<'a>> {
    let level = i32::try_from(level).map_err(|_| malformed(IoErrorKind::InvalidInput, "zstd level out of range"))?;
    Ok(Box::new(ZstdEncoder::new(writer, level)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peek::PeekReader;
    use crate::pool::BufferPool;
    use rstest::rstest;

    fn layer_reader<'a>(pool: &'a BufferPool, bytes: &'a [u8]) -> LayerReader<'a> {
        PeekReader::new(pool, Box::new(bytes) as BoxedRead<'a>)
    }

    struct Reset;

    impl Read for Reset {
        fn read(&mut self, _: &mut [u8]) -> IoResult<usize> {
            Err(IoError::from(IoErrorKind::ConnectionReset))
        }
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut output = Vec::new();
        let mut encoder = gzip_encoder(Box::new(&mut output), 6).unwrap();
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap();
        output
    }

    #[rstest]
    #[case(&[0x1F, 0x8B, 0x08])]
    #[case(&[0x1F, 0x8B, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00])]
    fn gzip_rejects_truncated_header(#[case] bytes: &[u8]) {
        let pool = BufferPool::new();
        let err = gzip_decoder(layer_reader(&pool, bytes)).err().unwrap();
        assert_eq!(err.kind(), IoErrorKind::UnexpectedEof);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn gzip_rejects_reserved_flags() {
        let pool = BufferPool::new();
        let bytes = [0x1F, 0x8B, 0x08, 0xE0, 0x00, 0x00, 0x00, 0x00, 0x00, 0xFF, 0x03, 0x00];
        let err = gzip_decoder(layer_reader(&pool, &bytes)).err().unwrap();
        assert_eq!(err.kind(), IoErrorKind::InvalidData);
    }

    #[rstest]
    // FNAME set, name never terminated.
    #[case(&[0x1F, 0x8B, 0x08, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0xFF, b'l', b'a', b'y'], IoErrorKind::UnexpectedEof)]
    // FEXTRA longer than the stream.
    #[case(&[0x1F, 0x8B, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0x00], IoErrorKind::UnexpectedEof)]
    fn gzip_rejects_truncated_optional_fields(#[case] bytes: &[u8], #[case] expected: IoErrorKind) {
        let pool = BufferPool::new();
        let err = gzip_decoder(layer_reader(&pool, bytes)).err().unwrap();
        assert_eq!(err.kind(), expected);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn gzip_source_error_while_parsing_header() {
        let pool = BufferPool::new();
        let header: &[u8] = &[0x1F, 0x8B, 0x08, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0xFF];
        let source = header.chain(Reset);
        let err = gzip_decoder(PeekReader::new(&pool, Box::new(source) as BoxedRead<'_>)).err().unwrap();
        assert_eq!(err.kind(), IoErrorKind::ConnectionReset);
    }

    #[test]
    fn gzip_reads_concatenated_members() {
        let pool = BufferPool::new();
        let mut bytes = gzip(b"first member, ");
        bytes.extend(gzip(b"second member"));
        let mut decoder = gzip_decoder(layer_reader(&pool, &bytes)).unwrap();
        let mut output = String::new();
        decoder.read_to_string(&mut output).unwrap();
        assert_eq!(output, "first member, second member");
    }

    #[rstest]
    #[case(b"BZh")]
    #[case(b"BZh0")]
    #[case(b"BZhX1AY&SY")]
    fn bzip2_rejects_bad_header(#[case] bytes: &[u8]) {
        let pool = BufferPool::new();
        assert!(bzip2_decoder(layer_reader(&pool, bytes)).is_err());
    }

    #[test]
    fn encoder_finish_writes_trailer() {
        let mut output = Vec::new();
        let mut encoder = gzip_encoder(Box::new(&mut output), 9).unwrap();
        encoder.write_all(b"layer").unwrap();
        encoder.finish().unwrap();
        // ISIZE, the last four bytes of the trailer, is the input length.
        assert_eq!(output[output.len() - 4..], 5u32.to_le_bytes());
    }
}
