//! Decompression codecs: STORED, SHRINK, IMPLODE, and INFLATE/INFLATE64.
//!
//! Each codec is a pure function from compressed bytes + declared sizes to
//! decompressed bytes delivered through a [`crate::window::Sink`]. None of
//! them touch the archive's headers or the overlap cover; that's the
//! per-entry extractor's job (`read.rs`).

pub mod implode;
pub mod inflate;
pub mod shrink;
pub mod stored;

use crate::result::ZipResult;
use crate::window::Sink;

/// How much of the compressed input a codec actually consumed, reconciled
/// to a byte boundary. The per-entry extractor uses this to position the
/// cursor after decoding (for data-descriptor detection and the overlap
/// cover), since a declared `compressed_size` of zero is common when flag
/// bit 3 (data descriptor) is set.
#[derive(Debug, Clone, Copy)]
pub struct DecodeReport {
    pub bytes_consumed: usize,
}

/// Decodes `input` (compressed bytes) into `sink`, given the declared
/// uncompressed size. `method` selects which codec runs; `wsize` is the
/// sliding window size (32 KiB classic, 64 KiB for INFLATE64).
pub fn decode(
    method: super::read::CompressionMethod,
    input: &[u8],
    uncompressed_size: usize,
    sink: &mut dyn Sink,
) -> ZipResult<DecodeReport> {
    use super::read::CompressionMethod as M;
    match method {
        M::Stored => stored::decode(input, uncompressed_size, sink),
        M::Shrink => shrink::decode(input, uncompressed_size, sink),
        M::Implode {
            large_window,
            three_trees,
        } => implode::decode(input, uncompressed_size, large_window, three_trees, sink),
        M::Deflate => inflate::decode(input, sink, false),
        M::Deflate64 => inflate::decode(input, sink, true),
        M::Unsupported(code) => Err(crate::result::ZipError::UnsupportedMethod(code)),
    }
}
