//! INFLATE (RFC 1951 DEFLATE) and INFLATE64 (PKWARE's enhanced-deflate
//! variant, method 9) decoders.
//!
//! Handles the three DEFLATE block kinds (stored, fixed, dynamic) and their
//! length/distance base and extra-bits tables, built atop this crate's own
//! [`crate::bitstream::BitReader`], [`crate::huffman`] table builder, and
//! [`crate::window::Window`].

use super::DecodeReport;
use crate::bitstream::BitReader;
use crate::huffman::{self, BuildParams, HuffmanTable, Op};
use crate::result::{ZipError, ZipResult};
use crate::window::{Sink, Window};

/// Order code-length codes appear in a dynamic block header (RFC 1951 §3.2.7).
const CODE_LENGTH_ORDER: [usize; 19] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

const LENGTH_BASE_32: [u32; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
    163, 195, 227, 258,
];
const LENGTH_EXTRA_32: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];

// INFLATE64 extends the length alphabet's last entry to a 16-bit extra-bits
// field covering up to 3 + 65535, per the Deflate64 addendum.
const LENGTH_BASE_64: [u32; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
    163, 195, 227, 3,
];
const LENGTH_EXTRA_64: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 16,
];

const DIST_BASE_32: [u32; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];
const DIST_EXTRA_32: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];

// INFLATE64 adds two more distance codes to cover a 64 KiB window.
const DIST_BASE_64: [u32; 32] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577, 32769, 49153,
];
const DIST_EXTRA_64: [u8; 32] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13, 14, 14,
];

fn fixed_literal_table(deflate64: bool) -> ZipResult<HuffmanTable> {
    let mut lens = vec![0u8; 288];
    for l in lens[0..144].iter_mut() {
        *l = 8;
    }
    for l in lens[144..256].iter_mut() {
        *l = 9;
    }
    for l in lens[256..280].iter_mut() {
        *l = 7;
    }
    for l in lens[280..288].iter_mut() {
        *l = 8;
    }
    build_lit_len_table(&lens, deflate64, 9)
}

/// Builds the literal/length table: symbols 0..256 are bare literals, 256 is
/// end-of-block, and 257..285 are length codes via the length base/extra
/// tables -- the one mixed alphabet every DEFLATE block uses.
fn build_lit_len_table(lens: &[u8], deflate64: bool, root_bits: u32) -> ZipResult<HuffmanTable> {
    let (length_base, length_extra): (&[u32], &[u8]) = if deflate64 {
        (&LENGTH_BASE_64, &LENGTH_EXTRA_64)
    } else {
        (&LENGTH_BASE_32, &LENGTH_EXTRA_32)
    };

    let mut bases = vec![0u32; lens.len()];
    let mut extra = vec![0u8; lens.len()];
    for (i, (&b, &e)) in length_base.iter().zip(length_extra.iter()).enumerate() {
        let sym = 257 + i;
        if sym < bases.len() {
            bases[sym] = b;
            extra[sym] = e;
        }
    }

    huffman::build_mixed(lens, &bases, &extra, 256, root_bits)
}

fn build_dist_table(lens: &[u8], deflate64: bool, root_bits: u32) -> ZipResult<HuffmanTable> {
    let (dist_base, dist_extra): (&[u32], &[u8]) = if deflate64 {
        (&DIST_BASE_64, &DIST_EXTRA_64)
    } else {
        (&DIST_BASE_32, &DIST_EXTRA_32)
    };
    huffman::build(BuildParams {
        lens,
        bases: Some(dist_base),
        extra: Some(dist_extra),
        end_of_block: None,
        literal: false,
        root_bits,
    })
}

fn decode_block<S: Sink>(
    reader: &mut BitReader,
    window: &mut Window<S>,
    lit_len: &HuffmanTable,
    dist: &HuffmanTable,
) -> ZipResult<()> {
    loop {
        match lit_len.decode(reader)? {
            Op::EndOfBlock => return Ok(()),
            Op::Literal(v) => window.emit_literal(v as u8)?,
            Op::Length { base, extra_bits } => {
                let length = base as usize + reader.get_bits(extra_bits as u32)? as usize;
                match dist.decode(reader)? {
                    Op::Length { base, extra_bits } => {
                        let distance = base as usize + reader.get_bits(extra_bits as u32)? as usize;
                        window.copy_match(distance, length)?;
                    }
                    _ => {
                        return Err(ZipError::InvalidCompressedData(
                            "distance code decoded to a non-length op",
                        ))
                    }
                }
            }
            Op::Invalid => {
                return Err(ZipError::InvalidCompressedData("illegal literal/length code"))
            }
            Op::SubTable { .. } => unreachable!("HuffmanTable::decode resolves subtables"),
        }
    }
}

fn inflate_stored<S: Sink>(reader: &mut BitReader, window: &mut Window<S>) -> ZipResult<()> {
    reader.align_to_byte();
    let len = reader.get_bits(16)? as u16;
    let nlen = reader.get_bits(16)? as u16;
    if len != !nlen {
        return Err(ZipError::InvalidCompressedData(
            "stored block length complement mismatch",
        ));
    }
    let bytes = reader.slice(len as usize)?;
    for &b in bytes {
        window.emit_literal(b)?;
    }
    Ok(())
}

fn inflate_fixed<S: Sink>(
    reader: &mut BitReader,
    window: &mut Window<S>,
    deflate64: bool,
) -> ZipResult<()> {
    let lit_len = fixed_literal_table(deflate64)?;
    let dist_lens = vec![5u8; if deflate64 { 32 } else { 30 }];
    let dist = build_dist_table(&dist_lens, deflate64, 5)?;
    decode_block(reader, window, &lit_len, &dist)
}

fn inflate_dynamic<S: Sink>(
    reader: &mut BitReader,
    window: &mut Window<S>,
    deflate64: bool,
) -> ZipResult<()> {
    let hlit = reader.get_bits(5)? as usize + 257;
    let hdist = reader.get_bits(5)? as usize + 1;
    let hclen = reader.get_bits(4)? as usize + 4;

    let mut cl_lens = [0u8; 19];
    for &idx in CODE_LENGTH_ORDER.iter().take(hclen) {
        cl_lens[idx] = reader.get_bits(3)? as u8;
    }
    let cl_table = huffman::build(BuildParams {
        lens: &cl_lens,
        bases: None,
        extra: None,
        end_of_block: None,
        literal: true,
        root_bits: 7,
    })?;

    let mut lens = Vec::with_capacity(hlit + hdist);
    while lens.len() < hlit + hdist {
        let op = cl_table.decode(reader)?;
        let sym = match op {
            Op::Literal(v) => v,
            _ => {
                return Err(ZipError::InvalidCompressedData(
                    "code-length alphabet decoded to a non-literal",
                ))
            }
        };
        match sym {
            0..=15 => lens.push(sym as u8),
            16 => {
                let prev = *lens
                    .last()
                    .ok_or(ZipError::InvalidCompressedData("repeat code with no prior length"))?;
                let rep = 3 + reader.get_bits(2)?;
                for _ in 0..rep {
                    lens.push(prev);
                }
            }
            17 => {
                let rep = 3 + reader.get_bits(3)?;
                for _ in 0..rep {
                    lens.push(0);
                }
            }
            18 => {
                let rep = 11 + reader.get_bits(7)?;
                for _ in 0..rep {
                    lens.push(0);
                }
            }
            _ => {
                return Err(ZipError::InvalidCompressedData(
                    "invalid code-length symbol",
                ))
            }
        }
    }
    if lens.len() != hlit + hdist {
        return Err(ZipError::InvalidCompressedData(
            "code-length run overran the literal/distance table",
        ));
    }

    let lit_lens = &lens[..hlit];
    let dist_lens = &lens[hlit..];

    let lit_len = build_lit_len_table(lit_lens, deflate64, 9)?;
    let dist = if hdist == 1 && dist_lens[0] == 0 {
        // Some encoders emit a single zero-length distance code when the
        // block has no back-references at all; treat that as "incomplete,
        // tolerated" rather than building a table with nothing in it.
        build_dist_table(&[0, 0], deflate64, 1)?
    } else {
        build_dist_table(dist_lens, deflate64, 6)?
    };
    if lit_len.incomplete {
        return Err(ZipError::IncompleteHuffman(
            "literal/length tree did not fill its Kraft budget",
        ));
    }

    decode_block(reader, window, &lit_len, &dist)
}

pub fn decode(input: &[u8], sink: &mut dyn Sink, deflate64: bool) -> ZipResult<DecodeReport> {
    let wsize = if deflate64 { 64 * 1024 } else { 32 * 1024 };
    let mut reader = BitReader::new(input);
    let mut owned_sink = OwnedSinkAdapter(sink);
    let mut window = Window::new(wsize, &mut owned_sink);

    loop {
        let is_final = reader.get_bit()? != 0;
        let block_type = reader.get_bits(2)?;
        match block_type {
            0 => inflate_stored(&mut reader, &mut window)?,
            1 => inflate_fixed(&mut reader, &mut window, deflate64)?,
            2 => inflate_dynamic(&mut reader, &mut window, deflate64)?,
            _ => return Err(ZipError::InvalidCompressedData("reserved block type 3")),
        }
        if is_final {
            break;
        }
    }
    window.finish()?;

    Ok(DecodeReport {
        bytes_consumed: reader.logical_position(),
    })
}

/// Adapts a `&mut dyn Sink` trait object into a concrete `Sink` impl so
/// [`Window`] (generic over `S: Sink`) can hold it without an extra type
/// parameter leaking into every codec's public signature.
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

    /// A stored (uncompressed) deflate block: BFINAL=1, BTYPE=00, then
    /// byte-aligned LEN/NLEN/data.
    #[test]
    fn decodes_a_stored_block() {
        let payload = b"hello, deflate";
        let len = payload.len() as u16;
        let mut data = vec![0b0000_0001u8]; // BFINAL=1, BTYPE=00, rest padding
        data.extend_from_slice(&len.to_le_bytes());
        data.extend_from_slice(&(!len).to_le_bytes());
        data.extend_from_slice(payload);

        let mut sink = VecSink::default();
        let report = decode(&data, &mut sink, false).unwrap();
        assert_eq!(&sink.0, payload);
        assert_eq!(report.bytes_consumed, data.len());
    }

    #[test]
    fn rejects_mismatched_stored_length() {
        let mut data = vec![0b0000_0001u8];
        data.extend_from_slice(&5u16.to_le_bytes());
        data.extend_from_slice(&5u16.to_le_bytes()); // should be !5
        data.extend_from_slice(b"hello");

        let mut sink = VecSink::default();
        assert!(decode(&data, &mut sink, false).is_err());
    }
}
