//! Peek at the head of a stream, then replay it.

use crate::Compression;
use crate::construct::GZIP_MAGIC;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::io::{Chain, Cursor, Read};

/// Read enough data to inspect (the compression magic bytes), then stream
/// the full content onward via [`into_reader`](Self::into_reader).
pub(crate) struct PeekableReader<R> {
    decoder: R,
    buffer: Vec<u8>,
}

impl<R: Read> PeekableReader<R> {
    /// Wrap any reader for peeking.
    pub(crate) fn new(decoder: R) -> Self {
        Self { decoder, buffer: Vec::new() }
    }

    /// Read up to `limit` bytes of the content.
    ///
    /// Returns a slice of all buffered data. Successive calls do not accumulate:
    /// - `peek(4*1024)` puts 4KiB in the buffer, returns 4KiB
    /// - `peek(8*1024)` puts an additional 4KiB in the buffer, returns 8KiB
    /// - `peek(2*1024)` immediately returns 2KiB (because buffer already has 8KiB)
    pub(crate) fn peek(&mut self, limit: usize) -> Result<&[u8]> {
        if self.buffer.len() >= limit {
            return Ok(&self.buffer[..limit]);
        }
        let needed = (limit - self.buffer.len()) as u64;
        (&mut self.decoder).take(needed).read_to_end(&mut self.buffer).or_raise(|| ErrorKind::InvalidData)?;
        Ok(&self.buffer[..self.buffer.len().min(limit)])
    }

    /// Convert into a [`Read`]er that replays the buffered head, then
    /// streams remaining decoder output.
    pub(crate) fn into_reader(self) -> Chain<Cursor<Vec<u8>>, R> {
        Cursor::new(self.buffer).chain(self.decoder)
    }
}

impl Compression {
    /// Sniff the first bytes of a raw stream and wrap it with a decompressor
    /// only if it is gzip-compressed. Uncompressed input is passed through
    /// untouched, with the sniffed bytes replayed.
    ///
    /// Returns the detected format alongside the reader.
    ///
    /// # Example
    ///
    /// ```
    /// use pkgcdn_compress::Compression;
    /// use std::io::Read;
    ///
    /// let compressed = Compression::Gzip.compress(b"tar bytes").unwrap();
    /// let (format, mut reader) = Compression::sniff_reader(compressed.as_slice()).unwrap();
    /// assert_eq!(format, Compression::Gzip);
    /// let mut out = Vec::new();
    /// reader.read_to_end(&mut out).unwrap();
    /// assert_eq!(out, b"tar bytes");
    ///
    /// let (format, _) = Compression::sniff_reader(&b"tar bytes"[..]).unwrap();
    /// assert_eq!(format, Compression::None);
    /// ```
    pub fn sniff_reader<'a, R: Read + Send + 'a>(reader: R) -> Result<(Compression, Box<dyn Read + Send + 'a>)> {
        let mut peekable = PeekableReader::new(reader);
        let format = Compression::from_magic_bytes(peekable.peek(GZIP_MAGIC.len())?);
        tracing::trace!(%format, "sniffed stream compression");
        Ok((format, format.wrap_reader(peekable.into_reader())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn test_data() -> Vec<u8> {
        b"Hello, world! This is test data for peekable decompression. \
          It needs to be long enough to test multiple peek() calls."
            .to_vec()
    }

    #[test]
    fn test_multiple_peek_calls() {
        let original = test_data();
        let mut peekable = PeekableReader::new(Cursor::new(original.clone()));
        assert_eq!(peekable.peek(5).unwrap(), b"Hello");
        assert_eq!(peekable.peek(13).unwrap(), b"Hello, world!");
        assert_eq!(peekable.peek(2).unwrap(), b"He");
        let mut output = Vec::new();
        std::io::copy(&mut peekable.into_reader(), &mut output).unwrap();
        assert_eq!(output, original);
    }

    #[rstest]
    #[case(Compression::None)]
    #[case(Compression::Gzip)]
    fn test_sniff_reader(#[case] format: Compression) {
        let original = test_data();
        let compressed = format.compress(&original).unwrap();
        let (detected, mut reader) = Compression::sniff_reader(Cursor::new(compressed)).unwrap();
        assert_eq!(detected, format);
        let mut output = Vec::new();
        reader.read_to_end(&mut output).unwrap();
        assert_eq!(output, original);
    }

    #[test]
    fn test_sniff_reader_shorter_than_magic() {
        let (detected, mut reader) = Compression::sniff_reader(Cursor::new(vec![0x1F])).unwrap();
        assert_eq!(detected, Compression::None);
        let mut output = Vec::new();
        reader.read_to_end(&mut output).unwrap();
        assert_eq!(output, vec![0x1F]);
    }

    #[test]
    fn test_sniff_reader_empty() {
        let (detected, mut reader) = Compression::sniff_reader(Cursor::new(Vec::new())).unwrap();
        assert_eq!(detected, Compression::None);
        let mut output = Vec::new();
        reader.read_to_end(&mut output).unwrap();
        assert!(output.is_empty());
    }
}
