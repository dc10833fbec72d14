use std::fmt;
use std::str::FromStr;

#[cfg(feature = "gzip")]
use std::io::prelude::*;

use errors::{Error, ErrorKind, Result};

pub const DEFAULT_GZIP_LEVEL: i32 = 6;

/// Message compression codec.
///
/// The numeric value is the codec id carried in the low three bits of a
/// message's attributes byte.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Compression {
    None = 0,
    #[cfg_attr(not(feature = "gzip"), allow(dead_code))]
    Gzip = 1,
    #[cfg_attr(not(feature = "snappy"), allow(dead_code))]
    Snappy = 2,
    #[cfg_attr(not(feature = "lz4"), allow(dead_code))]
    Lz4 = 3,
}

impl Default for Compression {
    fn default() -> Self {
        Compression::None
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f,
               "{}",
               match *self {
                   Compression::None => "none",
                   Compression::Gzip => "gzip",
                   Compression::Snappy => "snappy",
                   Compression::Lz4 => "lz4",
               })
    }
}

impl FromStr for Compression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Compression::None),
            "gzip" => Ok(Compression::Gzip),
            "snappy" => Ok(Compression::Snappy),
            "lz4" => Ok(Compression::Lz4),
            _ => bail!(ErrorKind::ConfigError(format!("unknown compression type: {}", s))),
        }
    }
}

impl Compression {
    /// Decode the codec id from a message's attributes byte (already
    /// masked to the low three bits).
    pub fn from_attributes(attrs: u8) -> Result<Compression> {
        match attrs {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Gzip),
            2 => Ok(Compression::Snappy),
            3 => Ok(Compression::Lz4),
            _ => bail!(ErrorKind::UnknownCompression(attrs)),
        }
    }

    /// An upper bound on the compressed size of `len` input bytes, used to
    /// size scratch buffers before compressing.
    pub fn compute_bound(&self, len: usize) -> usize {
        match *self {
            Compression::None => len,
            // deflate bound plus gzip header and trailer
            Compression::Gzip => len + (len >> 12) + (len >> 14) + 11 + 18,
            #[cfg(feature = "snappy")]
            Compression::Snappy => ::snap::max_compress_len(len),
            // worst case for incompressible input
            Compression::Lz4 => len + (len / 255) + 16,
            #[cfg(not(feature = "snappy"))]
            Compression::Snappy => len + (len / 6) + 32,
        }
    }

    /// Validate a configured compression level for this codec. Only gzip
    /// accepts a level; `None` always means the codec default.
    pub fn validate_level(&self, level: Option<i32>) -> Result<()> {
        match (*self, level) {
            (_, None) => Ok(()),
            (Compression::Gzip, Some(level)) if level >= 0 && level <= 9 => Ok(()),
            (compression, Some(level)) => {
                bail!(ErrorKind::InvalidCompressionLevel(compression, level))
            }
        }
    }

    pub fn compress(&self, level: Option<i32>, src: &[u8]) -> Result<Vec<u8>> {
        match *self {
            Compression::None => Ok(src.to_vec()),

            #[cfg(feature = "gzip")]
            Compression::Gzip => {
                let level = level.unwrap_or(DEFAULT_GZIP_LEVEL);
                let mut encoder =
                    ::flate2::write::GzEncoder::new(Vec::with_capacity(self.compute_bound(src.len())),
                                                    ::flate2::Compression::new(level as u32));
                encoder
                    .write_all(src)
                    .map_err(|_| Error::from(ErrorKind::CodecError("gzip compression failed")))?;
                encoder
                    .finish()
                    .map_err(|_| ErrorKind::CodecError("gzip compression failed").into())
            }

            #[cfg(feature = "snappy")]
            Compression::Snappy => {
                let _ = level;
                ::snap::Encoder::new()
                    .compress_vec(src)
                    .map_err(|_| ErrorKind::CodecError("snappy compression failed").into())
            }

            #[cfg(feature = "lz4")]
            Compression::Lz4 => {
                let _ = level;
                Ok(::lz4_compress::compress(src))
            }

            #[allow(unreachable_patterns)]
            compression => bail!(ErrorKind::CompressionUnavailable(compression)),
        }
    }

    pub fn decompress(&self, src: &[u8]) -> Result<Vec<u8>> {
        match *self {
            Compression::None => Ok(src.to_vec()),

            #[cfg(feature = "gzip")]
            Compression::Gzip => {
                let mut decoded = Vec::with_capacity(src.len() * 2);
                ::flate2::read::GzDecoder::new(src)
                    .read_to_end(&mut decoded)
                    .map_err(|_| Error::from(ErrorKind::CodecError("gzip decompression failed")))?;
                Ok(decoded)
            }

            #[cfg(feature = "snappy")]
            Compression::Snappy => {
                ::snap::Decoder::new()
                    .decompress_vec(src)
                    .map_err(|_| ErrorKind::CodecError("snappy decompression failed").into())
            }

            #[cfg(feature = "lz4")]
            Compression::Lz4 => {
                ::lz4_compress::decompress(src)
                    .map_err(|_| ErrorKind::CodecError("lz4 decompression failed").into())
            }

            #[allow(unreachable_patterns)]
            compression => bail!(ErrorKind::CompressionUnavailable(compression)),
        }
    }
}
