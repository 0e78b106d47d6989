//! The sliding-window engine: a circular output buffer that doubles as LZ77
//! history for every codec's back-references.
//!
//! Shared by every codec that needs LZ77-style back-references (IMPLODE,
//! INFLATE/INFLATE64); expressed as a safe Rust type with an explicit
//! [`Sink`] rather than a callback taking a mutable global context.

use crate::result::{ZipError, ZipResult};

/// Where decompressed bytes ultimately go. `Ok`, `DiskFull`, or
/// `Cancelled`, propagated without translation by every codec.
pub trait Sink {
    fn write(&mut self, buf: &[u8]) -> ZipResult<()>;
}

/// A `Sink` that writes into a growable `Vec<u8>`. Used for in-memory
/// extraction and the extra-field validator.
#[derive(Default)]
pub struct VecSink(pub Vec<u8>);

impl Sink for VecSink {
    fn write(&mut self, buf: &[u8]) -> ZipResult<()> {
        self.0.extend_from_slice(buf);
        Ok(())
    }
}

/// A `Sink` that discards everything -- used by `--test` mode, which only
/// cares about the CRC-32 a [`crate::crc_reader`] computes along the way.
pub struct NullSink;

impl Sink for NullSink {
    fn write(&mut self, _buf: &[u8]) -> ZipResult<()> {
        Ok(())
    }
}

/// Fixed-capacity circular output buffer doubling as LZ history.
pub struct Window<'s, S: Sink> {
    buf: Vec<u8>,
    wsize: usize,
    cursor: usize,
    /// True iff the cursor has not wrapped since the last flush.
    unflushed: bool,
    sink: &'s mut S,
}

impl<'s, S: Sink> Window<'s, S> {
    /// `wsize` must be a power of two, in `[4 KiB, 64 KiB]` (IMPLODE's
    /// smallest historic window is 4 KiB; everything else uses 8 KiB+).
    pub fn new(wsize: usize, sink: &'s mut S) -> Self {
        debug_assert!(wsize.is_power_of_two());
        debug_assert!((4 * 1024..=64 * 1024).contains(&wsize));
        Window {
            buf: vec![0u8; wsize],
            wsize,
            cursor: 0,
            unflushed: true,
            sink,
        }
    }

    pub fn capacity(&self) -> usize {
        self.wsize
    }

    fn flush_and_wrap(&mut self) -> ZipResult<()> {
        self.sink.write(&self.buf[..self.cursor])?;
        self.cursor = 0;
        self.unflushed = false;
        Ok(())
    }

    /// Writes one byte, advancing (and flushing/wrapping) the cursor.
    pub fn emit_literal(&mut self, b: u8) -> ZipResult<()> {
        self.buf[self.cursor] = b;
        self.cursor += 1;
        if self.cursor == self.wsize {
            self.flush_and_wrap()?;
        }
        Ok(())
    }

    /// Copies `length` bytes from `cursor - distance` (mod `wsize`) forward.
    ///
    /// `distance` must be in `1..=wsize`; a distance of `0` or one exceeding
    /// `wsize` is always a bug in the caller (codecs must validate against
    /// the declared window size before calling this).
    pub fn copy_match(&mut self, distance: usize, mut length: usize) -> ZipResult<()> {
        if distance == 0 || distance > self.wsize {
            return Err(ZipError::InvalidCompressedData(
                "back-reference distance out of window range",
            ));
        }

        while length > 0 {
            // Position we'd read from, before accounting for the
            // never-wrapped-buffer zero-fill rule below.
            let src = (self.cursor + self.wsize - distance) % self.wsize;

            // How many bytes we can move before either the read or the
            // write pointer wraps around the physical buffer.
            let room_to_cursor_wrap = self.wsize - self.cursor;
            let room_to_src_wrap = self.wsize - src;
            let mut chunk = length.min(room_to_cursor_wrap).min(room_to_src_wrap);
            // Overlapping back-references (distance <= length) must be
            // copied byte-by-byte so later bytes see earlier ones just written.
            if distance <= chunk {
                chunk = chunk.min(distance);
            }

            if self.unflushed && distance > self.cursor {
                // Back-reference points into the not-yet-written portion of
                // a never-wrapped buffer: RFC 1951 treats this as zeros.
                for i in 0..chunk {
                    self.buf[self.cursor + i] = 0;
                }
            } else if distance <= chunk {
                for i in 0..chunk {
                    self.buf[self.cursor + i] = self.buf[src + i];
                }
            } else {
                self.buf.copy_within(src..src + chunk, self.cursor);
            }

            self.cursor += chunk;
            length -= chunk;

            if self.cursor == self.wsize {
                self.flush_and_wrap()?;
            }
        }
        Ok(())
    }

    /// Delivers the first `n` bytes of the window to the sink and resets
    /// the cursor to 0. Used for a STORED deflate block's final partial
    /// flush and by codecs that flush mid-stream without wrapping.
    pub fn flush_partial(&mut self, n: usize) -> ZipResult<()> {
        self.sink.write(&self.buf[..n])?;
        self.cursor = 0;
        self.unflushed = false;
        Ok(())
    }

    /// Flushes whatever's pending in the window. Call once at the end of
    /// a member's decode.
    pub fn finish(&mut self) -> ZipResult<()> {
        if self.cursor > 0 {
            self.flush_partial(self.cursor)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_then_match() {
        let mut sink = VecSink::default();
        {
            let mut w = Window::new(8 * 1024, &mut sink);
            for b in b"ab" {
                w.emit_literal(*b).unwrap();
            }
            w.copy_match(2, 4).unwrap(); // "abab"
            w.finish().unwrap();
        }
        assert_eq!(&sink.0, b"ababab");
    }

    #[test]
    fn unflushed_zero_fill_on_forward_reference() {
        let mut sink = VecSink::default();
        {
            let mut w = Window::new(8 * 1024, &mut sink);
            w.emit_literal(b'x').unwrap();
            // distance(5) > cursor(1) in a never-wrapped buffer -> zeros.
            w.copy_match(5, 3).unwrap();
            w.finish().unwrap();
        }
        assert_eq!(&sink.0, &[b'x', 0, 0, 0]);
    }

    #[test]
    fn rejects_zero_and_oversized_distance() {
        let mut sink = VecSink::default();
        let mut w = Window::new(8 * 1024, &mut sink);
        assert!(w.copy_match(0, 1).is_err());
        assert!(w.copy_match(1_000_000, 1).is_err());
    }

    #[test]
    fn flush_on_wrap() {
        let mut sink = VecSink::default();
        {
            let mut w = Window::new(8 * 1024, &mut sink);
            for _ in 0..8 * 1024 {
                w.emit_literal(b'z').unwrap();
            }
            w.emit_literal(b'!').unwrap();
            w.finish().unwrap();
        }
        assert_eq!(sink.0.len(), 8 * 1024 + 1);
        assert_eq!(sink.0[8 * 1024], b'!');
    }
}
