//! Bounded copy from a reader into a writer.

use crate::stream::error::{Result, StreamError};
use crate::stream::reader::StreamReader;
use crate::stream::writer::StreamWriter;
use crate::util::size::format_bytes;

const SPLICE_CHUNK_SIZE: usize = 16384;

/// Pump `reader` into `writer` until EOF, enforcing `max_len` decoded
/// bytes when given.
///
/// Reads and writes go through the streams' codecs, so this transcodes
/// when the two sides use different compression. Returns the number of
/// bytes that crossed (decoded on the read side, pre-encoding on the
/// write side). The writer is left open; the caller still closes it.
pub fn splice(
    reader: &mut StreamReader,
    max_len: Option<u64>,
    writer: &mut StreamWriter,
) -> Result<u64> {
    let mut buf = [0u8; SPLICE_CHUNK_SIZE];
    let mut total = 0u64;

    while !reader.is_eof() {
        let len = reader.read(&mut buf)?;

        if let Some(max_len) = max_len {
            if total + len as u64 > max_len {
                log::error!(
                    "File '{}' is too large (limit = {})",
                    reader.file_name(),
                    format_bytes(max_len)
                );
                return Err(StreamError::TooLarge {
                    filename: reader.file_name().to_owned(),
                    limit: format_bytes(max_len),
                });
            }
        }

        writer.write(&buf[..len])?;
        total += len as u64;
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{CompressionSpeed, CompressionType};

    #[test]
    fn test_splice_plain() {
        let data: Vec<u8> = (0..100_000u32).map(|v| v as u8).collect();

        let mut reader = StreamReader::from_memory(data.clone(), CompressionType::None);
        let mut writer = StreamWriter::to_memory(CompressionType::None, CompressionSpeed::Default);

        let copied = splice(&mut reader, None, &mut writer).unwrap();
        assert_eq!(copied, data.len() as u64);
        assert_eq!(writer.finish().unwrap(), data);
    }

    #[test]
    fn test_splice_transcode() {
        let data = b"splice me".repeat(2000);

        let mut writer = StreamWriter::to_memory(CompressionType::Gzip, CompressionSpeed::Fast);
        writer.write(&data).unwrap();
        let gzipped = writer.finish().unwrap();

        let mut reader = StreamReader::from_memory(gzipped, CompressionType::Gzip);
        let mut writer = StreamWriter::to_memory(CompressionType::Lz4, CompressionSpeed::Default);
        let copied = splice(&mut reader, None, &mut writer).unwrap();
        assert_eq!(copied, data.len() as u64);

        let mut reader =
            StreamReader::from_memory(writer.finish().unwrap(), CompressionType::Lz4);
        assert_eq!(reader.read_all(u64::MAX).unwrap(), data);
    }

    #[test]
    fn test_splice_limit() {
        let mut reader = StreamReader::from_memory(vec![7u8; 65536], CompressionType::None);
        let mut writer = StreamWriter::to_memory(CompressionType::None, CompressionSpeed::Default);

        assert!(matches!(
            splice(&mut reader, Some(1024), &mut writer),
            Err(StreamError::TooLarge { .. })
        ));
    }
}
