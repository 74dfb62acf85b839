//! Sequential cursor over the bit-packed data section.
//!
//! A [`SequenceReader`] borrows the file's geometry ([`Header`]) and owns a
//! [`BitReader`] over whichever channel it was handed; see
//! [`crate::seqfile`] for how the owning [`crate::seqfile::SeqFile`] wires
//! this up for plain sequential iteration vs. a seek-to-index start.

use std::io::{Read, Seek};

use crate::bitio::BitReader;
use crate::encoding::{decode_full, decode_offset};
use crate::error::{Error, ReadError, Result};
use crate::header::Header;

/// A sequential cursor over a sequence file's data section.
///
/// Borrows the header immutably (geometry never changes mid-read) and owns
/// the bit-level channel for its lifetime, per the no-reference-cycles rule:
/// the cursor is a borrow of the file, not a co-owner of it.
pub struct SequenceReader<'a, R> {
    header: &'a Header,
    bits: BitReader<R>,
    count: u64,
    last_value: u64,
}

impl<'a, R: Read + Seek> SequenceReader<'a, R> {
    /// Builds a cursor over `channel`, which must already be positioned at
    /// the very start of the data section (immediately after the header).
    pub fn new(header: &'a Header, channel: R) -> Result<Self> {
        Ok(Self {
            header,
            bits: BitReader::new(channel)?,
            count: 0,
            last_value: 0,
        })
    }

    /// Builds a cursor whose first [`Iterator::next`] call yields the entry
    /// at `index`. `channel` must already be seeked to
    /// `header.position_of(index).frame_byte`; this constructor consumes the
    /// leading `skip_bits` and any gap entries between the frame's start and
    /// `index`, without exposing them to the caller.
    pub fn seek_to(header: &'a Header, channel: R, index: u64) -> Result<Self> {
        let pos = header.position_of(index);
        let mut bits = BitReader::new(channel)?;
        if pos.skip_bits > 0 {
            bits.read_bits(pos.skip_bits)?;
        }
        let mut reader = Self {
            header,
            bits,
            count: index - pos.offset_into_frame,
            last_value: 0,
        };
        for _ in 0..pos.offset_into_frame {
            reader.advance_raw()?;
        }
        Ok(reader)
    }

    /// Cumulative bits consumed by this cursor since construction.
    pub fn bits_consumed(&self) -> u64 {
        self.bits.position()
    }

    /// Detects whether the underlying channel moved without this cursor's
    /// knowledge (see [`BitReader::verify_channel_unmoved`]).
    pub fn verify_channel_unmoved(&mut self) -> std::io::Result<bool> {
        self.bits.verify_channel_unmoved()
    }

    pub fn into_inner(self) -> R {
        self.bits.into_inner()
    }

    /// Decodes and returns the next logical entry without checking for
    /// end-of-stream or channel interference; used internally to fast-
    /// forward to an arbitrary index. Returns the raw I/O error (not yet
    /// classified as `Truncated`) so callers can distinguish EOF.
    fn advance_raw(&mut self) -> std::io::Result<u64> {
        let value = if self.count % u64::from(self.header.offsets_per_frame) == 0 {
            let s = self.bits.read_bits(self.header.bits_per_full_entry)?;
            decode_full(s)
        } else {
            let s = self.bits.read_bits(self.header.bits_per_offset_entry)?;
            self.last_value + decode_offset(s)
        };
        self.last_value = value;
        self.count += 1;
        Ok(value)
    }
}

impl<'a, R: Read + Seek> Iterator for SequenceReader<'a, R> {
    type Item = Result<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.count >= self.header.count {
            return None;
        }
        let before = self.count;
        match self.advance_raw() {
            Ok(value) => match self.bits.verify_channel_unmoved() {
                Ok(true) => Some(Ok(value)),
                Ok(false) => Some(Err(Error::Read(ReadError::ConcurrentAccess {
                    expected: before,
                    observed: self.count,
                }))),
                Err(e) => Some(Err(e.into())),
            },
            Err(e) => {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    Some(Err(ReadError::Truncated(before, self.header.count).into()))
                } else {
                    Some(Err(e.into()))
                }
            }
        }
    }
}
