//! Extra-field validator used by `--test` mode.
//!
//! Walks a member's extra field block by block (`{id:16, len:16,
//! data[len]}`) looking for the handful of "extended attribute" block
//! kinds various archivers historically stuffed in there: a compressed
//! blob carrying OS-specific permissions/ACLs, protected by its own
//! CRC-32. Most blocks (including the Zip64 block `spec.rs` already
//! consumes) are simply skipped -- this module only re-validates the kinds
//! that carry their own compressed payload and checksum.

use crate::codec::inflate;
use crate::read::FileMetadata;
use crate::result::{ZipError, ZipResult};
use crate::window::VecSink;

/// OS/2 extended attributes.
const EF_OS2: u16 = 0x0009;
/// IBM ACL extra field (same sub-blob shape as OS/2's).
const EF_ACL: u16 = 0x0065;
/// Macintosh (Mac3) extra field.
const EF_MAC3: u16 = 0x07c8;
/// BeOS extra field.
const EF_BEOS: u16 = 0x6542;
/// AtheOS extra field.
const EF_ATHEOS: u16 = 0x7441;
/// Windows NT security descriptor.
const EF_NTSD: u16 = 0x4453;
/// OpenVMS extra field: a bare CRC-32 over the remaining bytes.
const EF_PKVMS: u16 = 0x000a;

/// The one NTSD sub-field version this validator understands.
const NTSD_SUPPORTED_VERSION: u8 = 0x01;

fn read_u16(buf: &[u8]) -> u16 {
    u16::from_le_bytes([buf[0], buf[1]])
}

fn read_u32(buf: &[u8]) -> u32 {
    u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])
}

/// Validates a compressed EA sub-blob: `{uncompressed_size:32, method:16,
/// compressed_data, crc32:32}`. `method` is read the same way a member's
/// own compression method is; only STORED and DEFLATE-family EA blobs are
/// realistically ever seen, but we dispatch through the same decoder table
/// as a normal member so any supported method works.
fn validate_compressed_ea(data: &[u8]) -> ZipResult<()> {
    if data.len() < 4 + 2 + 4 {
        return Err(ZipError::InconsistentExtraField(
            "extended attribute sub-blob too short for its fixed header",
        ));
    }
    let uncompressed_size = read_u32(&data[0..4]) as usize;
    let method = read_u16(&data[4..6]);
    let crc_offset = data.len() - 4;
    let compressed = &data[6..crc_offset];
    let expected_crc = read_u32(&data[crc_offset..]);

    let mut sink = VecSink::default();
    match method {
        0 => {
            if compressed.len() < uncompressed_size {
                return Err(ZipError::InconsistentExtraField(
                    "stored extended attribute sub-blob shorter than its declared size",
                ));
            }
            sink.0.extend_from_slice(&compressed[..uncompressed_size]);
        }
        8 => {
            inflate::decode(compressed, &mut sink, false)?;
        }
        9 => {
            inflate::decode(compressed, &mut sink, true)?;
        }
        m => return Err(ZipError::UnsupportedMethod(m)),
    }

    if sink.0.len() != uncompressed_size {
        return Err(ZipError::InconsistentExtraField(
            "decompressed extended attribute sub-blob doesn't match its declared size",
        ));
    }

    let actual_crc = crc32fast::hash(&sink.0);
    if actual_crc != expected_crc {
        return Err(ZipError::BadEaCrc);
    }
    Ok(())
}

/// Validates the NTSD (`0x4453`) block: a one-byte version, then the same
/// compressed-EA shape every other OS-specific block uses.
fn validate_ntsd(data: &[u8]) -> ZipResult<()> {
    if data.is_empty() {
        return Err(ZipError::InconsistentExtraField(
            "NTSD extra field missing its version byte",
        ));
    }
    if data[0] != NTSD_SUPPORTED_VERSION {
        return Err(ZipError::UnsupportedVersion(data[0] as u16));
    }
    validate_compressed_ea(&data[1..])
}

/// Validates the PKVMS (`0x000a`) block: a plain 4-byte CRC-32 over
/// whatever data follows it.
fn validate_pkvms(data: &[u8]) -> ZipResult<()> {
    if data.len() < 4 {
        return Err(ZipError::InconsistentExtraField(
            "PKVMS extra field too short for its CRC-32",
        ));
    }
    let expected_crc = read_u32(&data[..4]);
    let actual_crc = crc32fast::hash(&data[4..]);
    if actual_crc != expected_crc {
        return Err(ZipError::BadEaCrc);
    }
    Ok(())
}

/// Walks `extra_field` and validates every recognized extended-attribute
/// block. Unrecognized block kinds (including Zip64's `0x0001`, already
/// consumed elsewhere) are silently skipped.
pub fn validate(mut extra_field: &[u8]) -> ZipResult<()> {
    while !extra_field.is_empty() {
        if extra_field.len() < 4 {
            return Err(ZipError::InconsistentExtraField(
                "extra field truncated before a block header",
            ));
        }
        let id = read_u16(&extra_field[0..2]);
        let len = read_u16(&extra_field[2..4]) as usize;
        extra_field = &extra_field[4..];
        if extra_field.len() < len {
            return Err(ZipError::InconsistentExtraField(
                "extra field block overran the field's declared length",
            ));
        }
        let (block, rest) = extra_field.split_at(len);
        extra_field = rest;

        match id {
            EF_OS2 | EF_ACL | EF_MAC3 | EF_BEOS | EF_ATHEOS => validate_compressed_ea(block)?,
            EF_NTSD => validate_ntsd(block)?,
            EF_PKVMS => validate_pkvms(block)?,
            _ => {}
        }
    }
    Ok(())
}

/// Validates the extra field carried by a member's central directory
/// entry, as `--test` mode does for every retained member.
pub fn validate_member_extra_field(metadata: &FileMetadata) -> ZipResult<()> {
    validate(metadata.raw_extra_field)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(id: u16, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&id.to_le_bytes());
        out.extend_from_slice(&(data.len() as u16).to_le_bytes());
        out.extend_from_slice(data);
        out
    }

    #[test]
    fn unknown_blocks_pass_through() {
        let field = block(0xdead, b"whatever");
        validate(&field).unwrap();
    }

    #[test]
    fn pkvms_validates_crc() {
        let payload = b"some data";
        let crc = crc32fast::hash(payload);
        let mut data = crc.to_le_bytes().to_vec();
        data.extend_from_slice(payload);
        let field = block(EF_PKVMS, &data);
        validate(&field).unwrap();
    }

    #[test]
    fn pkvms_rejects_bad_crc() {
        let payload = b"some data";
        let mut data = 0u32.to_le_bytes().to_vec();
        data.extend_from_slice(payload);
        let field = block(EF_PKVMS, &data);
        assert!(matches!(validate(&field), Err(ZipError::BadEaCrc)));
    }

    #[test]
    fn os2_stored_ea_round_trips() {
        let payload = b"rwxr-xr-x";
        let mut data = (payload.len() as u32).to_le_bytes().to_vec();
        data.extend_from_slice(&0u16.to_le_bytes()); // method: stored
        data.extend_from_slice(payload);
        data.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
        let field = block(EF_OS2, &data);
        validate(&field).unwrap();
    }

    #[test]
    fn truncated_block_header_is_an_error() {
        assert!(validate(&[0x09, 0x00, 0x05]).is_err());
    }
}
