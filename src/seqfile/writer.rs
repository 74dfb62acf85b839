//! Sequential writer that bit-packs an ascending integer stream.

use std::io::Write;

use crate::bitio::BitWriter;
use crate::encoding::{encode_full, encode_offset};
use crate::error::{Result, WriteError};
use crate::header::Header;

/// Writes an ascending sequence of non-negative integers as bit-packed
/// full/offset frames. Holds a copy of the geometry fields (they never
/// change mid-write) rather than a live reference to the owning header.
pub struct SequenceWriter<W> {
    bits: BitWriter<W>,
    bits_per_full_entry: u8,
    bits_per_offset_entry: u8,
    offsets_per_frame: u16,
    count: u64,
    last_value: Option<u64>,
    max_offset: u32,
}

fn max_for_bits(bits: u8) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

impl<W: Write> SequenceWriter<W> {
    /// Builds a writer over `channel`, which must already be positioned at
    /// the start of the data section (immediately after the header).
    pub fn new(channel: W, header: &Header) -> Self {
        Self {
            bits: BitWriter::new(channel),
            bits_per_full_entry: header.bits_per_full_entry,
            bits_per_offset_entry: header.bits_per_offset_entry,
            offsets_per_frame: header.offsets_per_frame,
            count: 0,
            last_value: None,
            max_offset: 0,
        }
    }

    /// Builds a writer that continues an existing data section. `channel`
    /// must already be positioned at the end of the data section; `count`
    /// and `last_value` must reflect the entries already written, and
    /// `max_offset` the maximum encoded offset among them, so that the next
    /// `accept` call correctly judges frame boundaries and ascension.
    pub fn resume(
        channel: W,
        header: &Header,
        count: u64,
        last_value: Option<u64>,
        max_offset: u32,
    ) -> Self {
        Self {
            bits: BitWriter::new(channel),
            bits_per_full_entry: header.bits_per_full_entry,
            bits_per_offset_entry: header.bits_per_offset_entry,
            offsets_per_frame: header.offsets_per_frame,
            count,
            last_value,
            max_offset,
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn max_offset(&self) -> u32 {
        self.max_offset
    }

    /// Hands any bytes this writer has fully packed so far to the
    /// underlying channel, without disturbing bit alignment of the field
    /// in progress. Used by [`crate::seqfile::SeqFileWriter`] to honor its
    /// `SYNC` open mode.
    pub fn flush(&mut self) -> std::io::Result<()> {
        self.bits.flush()
    }

    /// The channel this writer packs bits into, for callers (e.g. a
    /// `SYNC`-mode writer) that need to force it durable after a flush.
    pub fn channel_mut(&mut self) -> &mut W {
        self.bits.get_mut()
    }

    /// Accepts the next value. The sentinel `-1` is the idiomatic
    /// end-of-stream marker used by consumer chains and is silently
    /// ignored here; everything else must be non-negative and strictly
    /// greater than the previous accepted value.
    pub fn accept(&mut self, v: i64) -> Result<()> {
        if v == -1 {
            return Ok(());
        }
        let value = v as u64;
        if let Some(last) = self.last_value {
            if value <= last {
                return Err(WriteError::NotAscending {
                    previous: last,
                    value,
                }
                .into());
            }
        }

        if self.count % u64::from(self.offsets_per_frame) == 0 {
            let s = encode_full(value);
            if s > max_for_bits(self.bits_per_full_entry) {
                return Err(WriteError::FullOverflow(s, self.bits_per_full_entry).into());
            }
            self.bits.write_bits(s, self.bits_per_full_entry)?;
        } else {
            let gap = value - self.last_value.unwrap();
            let s = encode_offset(gap);
            if s > max_for_bits(self.bits_per_offset_entry) {
                return Err(WriteError::OffsetOverflow(s, self.bits_per_offset_entry).into());
            }
            self.bits.write_bits(s, self.bits_per_offset_entry)?;
            self.max_offset = self.max_offset.max(s as u32);
        }

        self.last_value = Some(value);
        self.count += 1;
        Ok(())
    }

    /// Aligns and flushes the bit stream, handing the underlying channel
    /// back along with the final entry count and maximum encoded offset.
    pub fn finish(self) -> std::io::Result<(W, u64, u32)> {
        let count = self.count;
        let max_offset = self.max_offset;
        let channel = self.bits.close()?;
        Ok((channel, count, max_offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::HeaderBuilder;

    #[test]
    fn rejects_non_ascending_values() {
        let header = HeaderBuilder::new()
            .bits_per_full_entry(11)
            .offsets_per_frame(4)
            .build()
            .unwrap();
        let mut w = SequenceWriter::new(Vec::new(), &header);
        w.accept(5).unwrap();
        assert!(w.accept(5).is_err());
        assert!(w.accept(3).is_err());
    }

    #[test]
    fn ignores_sentinel() {
        let header = HeaderBuilder::new()
            .bits_per_full_entry(11)
            .offsets_per_frame(4)
            .build()
            .unwrap();
        let mut w = SequenceWriter::new(Vec::new(), &header);
        w.accept(2).unwrap();
        w.accept(-1).unwrap();
        w.accept(3).unwrap();
        assert_eq!(w.count(), 2);
    }

    #[test]
    fn rejects_overflowing_offset() {
        let header = HeaderBuilder::new()
            .bits_per_full_entry(11)
            .bits_per_offset_entry(1)
            .offsets_per_frame(4)
            .build()
            .unwrap();
        let mut w = SequenceWriter::new(Vec::new(), &header);
        w.accept(2).unwrap();
        // gap of 100 encodes to 50, which doesn't fit in 1 bit.
        assert!(w.accept(102).is_err());
    }

    #[test]
    fn tracks_max_encoded_offset() {
        let header = HeaderBuilder::new()
            .bits_per_full_entry(11)
            .bits_per_offset_entry(11)
            .offsets_per_frame(4)
            .build()
            .unwrap();
        let mut w = SequenceWriter::new(Vec::new(), &header);
        for v in [2u64, 3, 5, 11, 211] {
            w.accept(v as i64).unwrap();
        }
        // max gap is 211-11=200 -> encoded 100
        assert_eq!(w.max_offset(), 100);
    }
}
