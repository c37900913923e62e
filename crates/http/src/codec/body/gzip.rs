//! gzip helpers for request and response bodies.

use std::io;
use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

/// Compresses `data` with the default compression level.
pub fn gzip(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2 + 32), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Decompresses a gzip stream.
pub fn gunzip(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut decoded = Vec::with_capacity(data.len() * 2);
    GzDecoder::new(data).read_to_end(&mut decoded)?;
    Ok(decoded)
}
