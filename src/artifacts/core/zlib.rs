//! Streaming zlib wrappers
//!
//! All on-disk object content is zlib-framed (CMF header, Adler-32
//! trailer). The pack reader additionally needs to know how many
//! compressed bytes a stream consumed so it can find the next entry.

use crate::artifacts::core::STAGING_BUFFER_SIZE;
use crate::error::Error;
use anyhow::Context;
use bytes::Bytes;
use std::io::{Read, Write};

/// Compress a payload with the default level
pub fn compress(data: &[u8]) -> anyhow::Result<Bytes> {
    let mut encoder =
        flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());

    // feed through a bounded staging buffer rather than one large write
    for chunk in data.chunks(STAGING_BUFFER_SIZE) {
        encoder
            .write_all(chunk)
            .context("unable to compress object content")?;
    }

    encoder
        .finish()
        .map(Bytes::from)
        .context("unable to finish compressing object content")
}

/// Decompress an entire zlib stream held in memory
pub fn decompress(data: &[u8]) -> anyhow::Result<Bytes> {
    let mut decoder = flate2::read::ZlibDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| Error::Corrupt(format!("zlib stream: {e}")))?;

    Ok(Bytes::from(decompressed))
}

/// Decompress a zlib stream and report how many compressed bytes it
/// consumed, so a pack walk can advance to the next entry header
pub fn decompress_with_consumed(data: &[u8]) -> anyhow::Result<(Bytes, u64)> {
    let mut decoder = flate2::bufread::ZlibDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| Error::Corrupt(format!("zlib stream: {e}")))?;

    let consumed = decoder.total_in();
    Ok((Bytes::from(decompressed), consumed))
}
