use std::io::{Cursor, Read, Write};

use flate2::Compression as ZlibLevel;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::buffer_pool::PooledBuffer;
use crate::constant::Compression;
use crate::error::{Error, Result, eyre};

/// Streaming decompressor scoped to a single compressed frame.
///
/// The frame body is drained off the wire before the decoder is built, so
/// the decoder owns its input and drops deterministically at the frame
/// boundary. `read` returning `Ok(0)` signals frame exhaustion to the
/// packet codec above.
pub(crate) enum CompressedReader {
    Zlib(ZlibDecoder<Cursor<PooledBuffer>>),
    Zstd(zstd::stream::read::Decoder<'static, Cursor<PooledBuffer>>),
}

impl CompressedReader {
    pub(crate) fn new(algorithm: Compression, body: PooledBuffer) -> Result<Self> {
        match algorithm {
            Compression::Zlib => Ok(Self::Zlib(ZlibDecoder::new(Cursor::new(body)))),
            Compression::Zstd => {
                let decoder = zstd::stream::read::Decoder::with_buffer(Cursor::new(body))
                    .map_err(Error::Decompress)?;
                Ok(Self::Zstd(decoder))
            }
            Compression::None => Err(Error::LibraryBug(eyre!(
                "compressed frame context without a negotiated algorithm"
            ))),
        }
    }

    pub(crate) fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = match self {
            Self::Zlib(decoder) => decoder.read(buf),
            Self::Zstd(decoder) => decoder.read(buf),
        };
        n.map_err(Error::Decompress)
    }
}

/// Compress one packet fragment (header included) into `out`, appending a
/// complete zlib/zstd stream.
pub(crate) fn compress_into(
    algorithm: Compression,
    fragment: &[u8],
    out: &mut Vec<u8>,
) -> Result<()> {
    match algorithm {
        Compression::Zlib => {
            let mut encoder = ZlibEncoder::new(out, ZlibLevel::default());
            encoder.write_all(fragment)?;
            encoder.finish()?;
        }
        Compression::Zstd => {
            let mut encoder =
                zstd::stream::write::Encoder::new(out, zstd::DEFAULT_COMPRESSION_LEVEL)?;
            encoder.write_all(fragment)?;
            encoder.finish()?;
        }
        Compression::None => {
            return Err(Error::LibraryBug(eyre!(
                "compress_into called without a negotiated algorithm"
            )));
        }
    }
    Ok(())
}
