//! Buffered bit-granular I/O over a seekable byte channel.
//!
//! [`BitWriter`] packs unsigned integers of 1-64 bits MSB-first into bytes
//! and buffers them before handing whole chunks to the underlying channel.
//! [`BitReader`] is the mirror image, additionally exposing enough of the
//! channel's real cursor to let callers detect concurrent interference
//! (see [`BitReader::verify_channel_unmoved`]).

use std::io::{self, Read, Seek, Write};

/// Minimum internal buffer size, large enough for the widest single field.
pub const MIN_BUFFER: usize = 64;
const DEFAULT_BUFFER: usize = 4096;

/// Buffered MSB-first bit writer.
pub struct BitWriter<W> {
    writer: W,
    out: Vec<u8>,
    capacity: usize,
    cur_byte: u8,
    cur_bits: u8,
    total_bits: u64,
}

impl<W: Write> BitWriter<W> {
    pub fn new(writer: W) -> Self {
        Self::with_capacity(writer, DEFAULT_BUFFER)
    }

    pub fn with_capacity(writer: W, capacity: usize) -> Self {
        let capacity = capacity.max(MIN_BUFFER);
        Self {
            writer,
            out: Vec::with_capacity(capacity),
            capacity,
            cur_byte: 0,
            cur_bits: 0,
            total_bits: 0,
        }
    }

    /// Cumulative bits emitted (including any not-yet-flushed partial byte).
    pub fn position(&self) -> u64 {
        self.total_bits
    }

    /// Writes the low `n` bits of `value`, MSB-first. Caller guarantees
    /// `value < 2^n` (except when `n == 64`).
    pub fn write_bits(&mut self, value: u64, n: u8) -> io::Result<()> {
        debug_assert!((1..=64).contains(&n));
        for i in (0..n).rev() {
            let bit = (value >> i) & 1;
            self.cur_byte |= (bit as u8) << (7 - self.cur_bits);
            self.cur_bits += 1;
            if self.cur_bits == 8 {
                self.out.push(self.cur_byte);
                self.cur_byte = 0;
                self.cur_bits = 0;
                if self.out.len() >= self.capacity {
                    self.flush_buffer()?;
                }
            }
        }
        self.total_bits += u64::from(n);
        Ok(())
    }

    /// Pads the current byte with zero bits (if any are pending) and flushes
    /// the internal buffer to the underlying channel.
    pub fn align_to_byte(&mut self) -> io::Result<()> {
        if self.cur_bits > 0 {
            self.total_bits += u64::from(8 - self.cur_bits);
            self.out.push(self.cur_byte);
            self.cur_byte = 0;
            self.cur_bits = 0;
        }
        self.flush_buffer()
    }

    fn flush_buffer(&mut self) -> io::Result<()> {
        if !self.out.is_empty() {
            self.writer.write_all(&self.out)?;
            self.out.clear();
        }
        Ok(())
    }

    /// Hands any whole bytes accumulated so far to the underlying channel,
    /// without padding the current partial byte. Unlike [`Self::align_to_byte`]
    /// this never discards bit position by rounding up, so it is safe to call
    /// between fields for callers (e.g. a `SYNC`-mode writer) that want the
    /// channel to see every completed write without breaking frame packing.
    pub fn flush(&mut self) -> io::Result<()> {
        self.flush_buffer()
    }

    /// Aligns, flushes, and hands the underlying channel back to the caller.
    pub fn close(mut self) -> io::Result<W> {
        self.align_to_byte()?;
        Ok(self.writer)
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }
}

/// Buffered MSB-first bit reader over a seekable channel.
pub struct BitReader<R> {
    reader: R,
    buf: Vec<u8>,
    buf_start: u64,
    buf_pos: usize,
    buf_len: usize,
    bit_cursor: u8,
    bits_consumed: u64,
}

impl<R: Read + Seek> BitReader<R> {
    pub fn new(reader: R) -> io::Result<Self> {
        Self::with_capacity(reader, DEFAULT_BUFFER)
    }

    pub fn with_capacity(mut reader: R, capacity: usize) -> io::Result<Self> {
        let capacity = capacity.max(MIN_BUFFER);
        let buf_start = reader.stream_position()?;
        Ok(Self {
            reader,
            buf: vec![0u8; capacity],
            buf_start,
            buf_pos: 0,
            buf_len: 0,
            bit_cursor: 0,
            bits_consumed: 0,
        })
    }

    /// Cumulative bits consumed since this reader was constructed.
    pub fn position(&self) -> u64 {
        self.bits_consumed
    }

    fn refill(&mut self) -> io::Result<()> {
        self.buf_start = self.reader.stream_position()?;
        self.buf_len = self.reader.read(&mut self.buf)?;
        self.buf_pos = 0;
        self.bit_cursor = 0;
        Ok(())
    }

    fn read_bit(&mut self) -> io::Result<u8> {
        if self.buf_pos >= self.buf_len {
            self.refill()?;
            if self.buf_len == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "short read while decoding bit field",
                ));
            }
        }
        let byte = self.buf[self.buf_pos];
        let bit = (byte >> (7 - self.bit_cursor)) & 1;
        self.bit_cursor += 1;
        self.bits_consumed += 1;
        if self.bit_cursor == 8 {
            self.bit_cursor = 0;
            self.buf_pos += 1;
        }
        Ok(bit)
    }

    /// Reads the next `n` bits (1-64) as an unsigned value, MSB-first.
    pub fn read_bits(&mut self, n: u8) -> io::Result<u64> {
        debug_assert!((1..=64).contains(&n));
        let mut value = 0u64;
        for _ in 0..n {
            value = (value << 1) | u64::from(self.read_bit()?);
        }
        Ok(value)
    }

    /// Discards any bits left in the current byte.
    pub fn align_to_byte(&mut self) {
        if self.bit_cursor > 0 {
            self.bits_consumed += u64::from(8 - self.bit_cursor);
            self.bit_cursor = 0;
            self.buf_pos += 1;
        }
    }

    /// The channel position the reader's buffer implies is "current" -
    /// i.e. the byte immediately after the last bytes it pulled in.
    fn expected_channel_position(&self) -> u64 {
        self.buf_start + self.buf_len as u64
    }

    /// Queries the underlying channel's real position and compares it
    /// against what this reader's buffer expects. A mismatch means some
    /// other cursor moved the shared channel without restoring it.
    pub fn verify_channel_unmoved(&mut self) -> io::Result<bool> {
        let actual = self.reader.stream_position()?;
        Ok(actual == self.expected_channel_position())
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_arbitrary_widths() {
        let mut w = BitWriter::new(Vec::new());
        let fields: &[(u64, u8)] = &[(0, 1), (1, 1), (5, 3), (1023, 10), (u64::MAX, 64), (0, 64)];
        for &(v, n) in fields {
            w.write_bits(v, n).unwrap();
        }
        let bytes = w.close().unwrap();

        let mut r = BitReader::new(Cursor::new(bytes)).unwrap();
        for &(v, n) in fields {
            assert_eq!(r.read_bits(n).unwrap(), v);
        }
    }

    #[test]
    fn align_to_byte_pads_and_skips() {
        let mut w = BitWriter::new(Vec::new());
        w.write_bits(0b101, 3).unwrap();
        w.align_to_byte().unwrap();
        w.write_bits(0xAB, 8).unwrap();
        let bytes = w.close().unwrap();
        assert_eq!(bytes, vec![0b1010_0000, 0xAB]);

        let mut r = BitReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(r.read_bits(3).unwrap(), 0b101);
        r.align_to_byte();
        assert_eq!(r.read_bits(8).unwrap(), 0xAB);
    }

    #[test]
    fn short_read_is_unexpected_eof() {
        let mut r = BitReader::new(Cursor::new(vec![0xFFu8])).unwrap();
        assert_eq!(r.read_bits(8).unwrap(), 0xFF);
        let err = r.read_bits(1).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn detects_channel_moved_externally() {
        let mut cursor = Cursor::new(vec![0u8; 128]);
        let mut r = BitReader::new(cursor.clone()).unwrap();
        r.read_bits(8).unwrap();
        assert!(r.verify_channel_unmoved().unwrap());

        // Simulate something else moving the shared position.
        cursor.set_position(64);
        let mut r2 = BitReader::new(cursor).unwrap();
        r2.read_bits(8).unwrap();
        assert!(r2.verify_channel_unmoved().unwrap());
    }
}
