//! The STORED method: no compression at all.

use super::DecodeReport;
use crate::result::{ZipError, ZipResult};
use crate::window::Sink;

pub fn decode(input: &[u8], uncompressed_size: usize, sink: &mut dyn Sink) -> ZipResult<DecodeReport> {
    if input.len() < uncompressed_size {
        return Err(ZipError::Truncated);
    }
    sink.write(&input[..uncompressed_size])?;
    Ok(DecodeReport {
        bytes_consumed: uncompressed_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::VecSink;

    #[test]
    fn copies_bytes_through() {
        let mut sink = VecSink::default();
        let report = decode(b"hello world", 11, &mut sink).unwrap();
        assert_eq!(report.bytes_consumed, 11);
        assert_eq!(&sink.0, b"hello world");
    }

    #[test]
    fn truncated_input_is_an_error() {
        let mut sink = VecSink::default();
        assert!(decode(b"short", 100, &mut sink).is_err());
    }
}
