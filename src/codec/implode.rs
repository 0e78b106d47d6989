//! The IMPLODE method (compression method 6).
//!
//! Up to three Huffman trees (literal, length, distance) read from a
//! run-length-coded header, a 4 KiB or 8 KiB sliding window selected by
//! general-purpose flag bit 1, and literals that are either Huffman-coded
//! (min match length 3) or raw 8-bit bytes (min match length 2), selected by
//! flag bit 2.
//!
//! Uses a [`Window`] sized to the logical 4 KiB/8 KiB history directly,
//! rather than a single oversized physical buffer shared across window
//! sizes.

use super::DecodeReport;
use crate::bitstream::BitReader;
use crate::huffman::{self, BuildParams, HuffmanTable, Op};
use crate::result::{ZipError, ZipResult};
use crate::window::{Sink, Window};

const LENGTH_BASE_MIN2: [u32; 64] = {
    let mut t = [0u32; 64];
    let mut i = 0;
    while i < 64 {
        t[i] = 2 + i as u32;
        i += 1;
    }
    t
};
const LENGTH_BASE_MIN3: [u32; 64] = {
    let mut t = [0u32; 64];
    let mut i = 0;
    while i < 64 {
        t[i] = 3 + i as u32;
        i += 1;
    }
    t
};
/// Only the last length symbol carries an extra byte (8 bits), extending
/// the longest code past the 64-entry base table's reach.
const LENGTH_EXTRA: [u8; 64] = {
    let mut t = [0u8; 64];
    t[63] = 8;
    t
};

fn distance_base_table(eight_k: bool) -> [u32; 64] {
    let step = if eight_k { 128 } else { 64 };
    let mut t = [0u32; 64];
    for (i, v) in t.iter_mut().enumerate() {
        *v = 1 + (i as u32) * step;
    }
    t
}

/// Reads the run-length-coded bit-length list: a byte "count-1" pairs to
/// follow, then that many `(bits-1) | ((count-1) << 4)` bytes, each
/// assigning one code length to the next `count` symbols.
fn get_tree(reader: &mut BitReader, n: usize) -> ZipResult<Vec<u8>> {
    let mut lens = Vec::with_capacity(n);
    let mut pairs = [0u8; 1];
    reader.read_exact(&mut pairs)?;
    let num_pairs = pairs[0] as usize + 1;

    for _ in 0..num_pairs {
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte)?;
        let bits = (byte[0] & 0x0f) + 1;
        let count = ((byte[0] & 0xf0) >> 4) + 1;
        if lens.len() + count as usize > n {
            return Err(ZipError::InvalidCompressedData(
                "IMPLODE tree header overran its code-length table",
            ));
        }
        for _ in 0..count {
            lens.push(bits);
        }
    }

    if lens.len() != n {
        return Err(ZipError::InvalidCompressedData(
            "IMPLODE tree header produced the wrong number of code lengths",
        ));
    }
    Ok(lens)
}

pub fn decode(
    input: &[u8],
    uncompressed_size: usize,
    large_window: bool,
    three_trees: bool,
    sink: &mut dyn Sink,
) -> ZipResult<DecodeReport> {
    let mut reader = BitReader::new(input);

    let literal_table = if three_trees {
        let lens = get_tree(&mut reader, 256)?;
        Some(huffman::build(BuildParams {
            lens: &lens,
            bases: None,
            extra: None,
            end_of_block: None,
            literal: true,
            root_bits: 9,
        })?)
    } else {
        None
    };

    let length_lens = get_tree(&mut reader, 64)?;
    let length_bases = if three_trees {
        &LENGTH_BASE_MIN3
    } else {
        &LENGTH_BASE_MIN2
    };
    let length_table = huffman::build(BuildParams {
        lens: &length_lens,
        bases: Some(length_bases),
        extra: Some(&LENGTH_EXTRA),
        end_of_block: None,
        literal: false,
        root_bits: 7,
    })?;

    let dist_lens = get_tree(&mut reader, 64)?;
    let dist_bases = distance_base_table(large_window);
    let dist_table = huffman::build(BuildParams {
        lens: &dist_lens,
        bases: Some(&dist_bases),
        extra: None,
        end_of_block: None,
        literal: false,
        root_bits: 7,
    })?;

    let dist_low_bits: u32 = if large_window { 7 } else { 6 };
    let wsize = if large_window { 8 * 1024 } else { 4 * 1024 };

    let mut owned_sink = OwnedSinkAdapter(sink);
    let mut window = Window::new(wsize, &mut owned_sink);

    let mut produced = 0usize;
    while produced < uncompressed_size {
        let is_literal = reader.get_bit()? != 0;
        if is_literal {
            let byte = match &literal_table {
                Some(table) => match table.decode(&mut reader)? {
                    Op::Literal(v) => v as u8,
                    _ => {
                        return Err(ZipError::InvalidCompressedData(
                            "literal tree decoded to a non-literal op",
                        ))
                    }
                },
                None => reader.get_bits(8)? as u8,
            };
            window.emit_literal(byte)?;
            produced += 1;
        } else {
            let low = reader.get_bits(dist_low_bits)?;
            let (base, extra_bits) = match dist_table.decode(&mut reader)? {
                Op::Length { base, extra_bits } => (base, extra_bits),
                _ => {
                    return Err(ZipError::InvalidCompressedData(
                        "distance tree decoded to a non-length op",
                    ))
                }
            };
            debug_assert_eq!(extra_bits, 0);
            let distance = low as usize + base as usize;

            let mut length = match length_table.decode(&mut reader)? {
                Op::Length { base, extra_bits } => {
                    base as usize + reader.get_bits(extra_bits as u32)? as usize
                }
                _ => {
                    return Err(ZipError::InvalidCompressedData(
                        "length tree decoded to a non-length op",
                    ))
                }
            };
            length = length.min(uncompressed_size - produced);
            window.copy_match(distance, length)?;
            produced += length;
        }
    }
    window.finish()?;

    Ok(DecodeReport {
        bytes_consumed: reader.logical_position(),
    })
}

struct OwnedSinkAdapter<'a>(&'a mut dyn Sink);

impl<'a> Sink for OwnedSinkAdapter<'a> {
    fn write(&mut self, buf: &[u8]) -> ZipResult<()> {
        self.0.write(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::VecSink;

    struct BitWriter {
        acc: u64,
        nbits: u32,
        bytes: Vec<u8>,
    }

    impl BitWriter {
        fn new() -> Self {
            BitWriter {
                acc: 0,
                nbits: 0,
                bytes: Vec::new(),
            }
        }
        fn put(&mut self, value: u32, bits: u32) {
            self.acc |= (value as u64) << self.nbits;
            self.nbits += bits;
            while self.nbits >= 8 {
                self.bytes.push((self.acc & 0xff) as u8);
                self.acc >>= 8;
                self.nbits -= 8;
            }
        }
        fn finish(mut self) -> Vec<u8> {
            if self.nbits > 0 {
                self.bytes.push((self.acc & 0xff) as u8);
            }
            self.bytes
        }
    }

    /// Builds a balanced 64-symbol tree header (every symbol gets a 6-bit
    /// code, Kraft-exact): 4 run-length pairs of 16 symbols at length 6,
    /// since IMPLODE's `get_tree` assigns every one of its `n` symbols some
    /// nonzero length (unlike INFLATE's dynamic header, there's no "absent"
    /// symbol encoding).
    fn balanced_64_tree_bytes() -> Vec<u8> {
        let pair = (6 - 1) | ((16 - 1) << 4); // bits=6, count=16
        vec![3u8, pair, pair, pair, pair]
    }

    #[test]
    fn decodes_raw_literals_only() {
        let mut w = BitWriter::new();
        // Length tree header (n=64).
        let tree_bytes = balanced_64_tree_bytes();
        // Distance tree header (n=64), same shape.
        let mut stream = tree_bytes.clone();
        stream.extend_from_slice(&balanced_64_tree_bytes());

        // Two literal bytes: flag=1, 8 raw bits, repeated.
        w.put(1, 1);
        w.put(b'h' as u32, 8);
        w.put(1, 1);
        w.put(b'i' as u32, 8);
        let body = w.finish();
        stream.extend_from_slice(&body);

        let mut sink = VecSink::default();
        let report = decode(&stream, 2, false, false, &mut sink).unwrap();
        assert_eq!(&sink.0, b"hi");
        assert!(report.bytes_consumed <= stream.len());
    }
}
