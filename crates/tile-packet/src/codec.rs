//! Packet compression.
//!
//! A directory declares one [`Compression`] scheme. When the scheme does not
//! make a packet smaller the packet is stored verbatim and flagged as such,
//! so the stored size of a packet never exceeds its logical size.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use tile_types::Compression;

use crate::error::{PacketError, PacketResult};

/// How the stored bytes of a packet relate to its logical bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Encoding {
    /// Stored bytes are the logical bytes.
    Verbatim,
    /// Stored bytes are the directory scheme's output.
    Compressed,
    /// Stored bytes arrived already compressed and are returned unchanged.
    Precompressed,
}

/// Compress `data` with `scheme`, falling back to verbatim storage when that
/// does not save space.
pub fn encode(scheme: Compression, data: &[u8]) -> PacketResult<(Vec<u8>, Encoding)> {
    if scheme.is_identity() || data.is_empty() {
        return Ok((data.to_vec(), Encoding::Verbatim));
    }
    let compressed = compress(scheme, data)?;
    if compressed.len() < data.len() {
        Ok((compressed, Encoding::Compressed))
    } else {
        Ok((data.to_vec(), Encoding::Verbatim))
    }
}

/// Inverse of [`encode`]. Length verification is left to the caller.
pub fn decode(scheme: Compression, stored: Vec<u8>, encoding: Encoding) -> PacketResult<Vec<u8>> {
    match encoding {
        Encoding::Verbatim | Encoding::Precompressed => Ok(stored),
        Encoding::Compressed => decompress(scheme, &stored),
    }
}

/// Raw compression with `scheme`.
pub fn compress(scheme: Compression, data: &[u8]) -> PacketResult<Vec<u8>> {
    match scheme {
        Compression::None => Ok(data.to_vec()),
        Compression::Zstd { level } => zstd::encode_all(data, level)
            .map_err(|e| PacketError::Compression(format!("zstd: {e}"))),
        Compression::Deflate { level } => {
            let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::new(level));
            encoder
                .write_all(data)
                .map_err(|e| PacketError::Compression(format!("deflate: {e}")))?;
            encoder
                .finish()
                .map_err(|e| PacketError::Compression(format!("deflate finish: {e}")))
        }
    }
}

/// Raw decompression with `scheme`.
pub fn decompress(scheme: Compression, data: &[u8]) -> PacketResult<Vec<u8>> {
    match scheme {
        Compression::None => Ok(data.to_vec()),
        Compression::Zstd { .. } => {
            zstd::decode_all(data).map_err(|e| PacketError::Compression(format!("zstd: {e}")))
        }
        Compression::Deflate { .. } => {
            let mut decoder = ZlibDecoder::new(data);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| PacketError::Compression(format!("deflate: {e}")))?;
            Ok(out)
        }
    }
}
