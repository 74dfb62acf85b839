//! Header module for the sequence file format.
//!
//! The header is a fixed 20-byte preamble describing frame geometry and
//! accumulated write statistics. All multi-byte fields are big-endian on
//! disk. See the module docs on [`crate::seqfile`] for the full on-disk
//! layout.

use byteorder::{BigEndian, ByteOrder};
use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::{HeaderError, Result};

/// Literal magic bytes at the start of every sequence file.
pub const MAGIC: [u8; 3] = [23, 42, 23];

/// Current format version.
pub const VERSION: u8 = 1;

/// Size of the fixed header, in bytes.
pub const SIZE_HEADER: usize = 20;

/// Default number of entries between consecutive full entries.
pub const DEFAULT_OFFSETS_PER_FRAME: u16 = 300;

/// Default bit width of an offset (gap) field.
pub const DEFAULT_BITS_PER_OFFSET_ENTRY: u8 = 11;

/// Geometry and accumulated statistics of a sequence file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub bits_per_offset_entry: u8,
    pub bits_per_full_entry: u8,
    pub offsets_per_frame: u16,
    pub count: u64,
    pub max_offset: u32,
}

impl Header {
    /// Number of bits occupied by one full frame (leading full entry plus
    /// `offsets_per_frame - 1` gap entries).
    #[must_use]
    pub fn bits_per_frame(&self) -> u64 {
        u64::from(self.bits_per_full_entry)
            + u64::from(self.offsets_per_frame - 1) * u64::from(self.bits_per_offset_entry)
    }

    /// Computes the physical location of a logical entry: the byte at which
    /// its containing frame starts, the number of leading bits within that
    /// byte to skip, and the entry's position within the frame.
    #[must_use]
    pub fn position_of(&self, index: u64) -> EntryPosition {
        let per_frame = u64::from(self.offsets_per_frame);
        let frame = index / per_frame;
        let bit_offset = frame * self.bits_per_frame();
        EntryPosition {
            frame_byte: SIZE_HEADER as u64 + bit_offset / 8,
            skip_bits: (bit_offset % 8) as u8,
            offset_into_frame: index - frame * per_frame,
        }
    }

    /// Estimates how many entries a data section of `file_size` bytes holds,
    /// without trusting the (possibly stale) `count` field. Used by the
    /// repair path to recover from an interrupted writer.
    #[must_use]
    pub fn estimated_count(&self, file_size: u64) -> u64 {
        let data_bytes = file_size.saturating_sub(SIZE_HEADER as u64);
        let data_bits = data_bytes * 8;
        let bits_per_frame = self.bits_per_frame();
        if bits_per_frame == 0 {
            return 0;
        }
        let full_frames = data_bits / bits_per_frame;
        let remaining_bits = data_bits % bits_per_frame;

        let mut count = full_frames * u64::from(self.offsets_per_frame);
        if remaining_bits >= u64::from(self.bits_per_full_entry) {
            let after_full = remaining_bits - u64::from(self.bits_per_full_entry);
            let extra = 1 + after_full / u64::from(self.bits_per_offset_entry);
            count += extra.min(u64::from(self.offsets_per_frame - 1));
        }
        count
    }

    /// Serializes the header to its 20-byte on-disk form.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; SIZE_HEADER] {
        let mut buf = [0u8; SIZE_HEADER];
        buf[0..3].copy_from_slice(&MAGIC);
        buf[3] = VERSION;
        buf[4] = self.bits_per_offset_entry;
        buf[5] = self.bits_per_full_entry;
        BigEndian::write_u16(&mut buf[6..8], self.offsets_per_frame);
        BigEndian::write_u64(&mut buf[8..16], self.count);
        BigEndian::write_u32(&mut buf[16..20], self.max_offset);
        buf
    }

    /// Parses a header from a fixed-size buffer, validating magic, version,
    /// and every geometry field that must be nonzero.
    pub fn from_bytes(buf: &[u8; SIZE_HEADER]) -> Result<Self> {
        if buf[0..3] != MAGIC {
            return Err(HeaderError::BadMagic([buf[0], buf[1], buf[2]]).into());
        }
        let version = buf[3];
        if version != VERSION {
            return Err(HeaderError::UnsupportedVersion(version).into());
        }
        let bits_per_offset_entry = buf[4];
        if bits_per_offset_entry == 0 {
            return Err(HeaderError::ZeroField("bitsPerOffsetEntry").into());
        }
        let bits_per_full_entry = buf[5];
        if bits_per_full_entry == 0 {
            return Err(HeaderError::ZeroField("bitsPerFullEntry").into());
        }
        let offsets_per_frame = BigEndian::read_u16(&buf[6..8]);
        if offsets_per_frame == 0 {
            return Err(HeaderError::ZeroField("offsetsPerFrame").into());
        }
        let count = BigEndian::read_u64(&buf[8..16]);
        let max_offset = BigEndian::read_u32(&buf[16..20]);
        Ok(Self {
            bits_per_offset_entry,
            bits_per_full_entry,
            offsets_per_frame,
            count,
            max_offset,
        })
    }

    /// Reads a header from an arbitrarily-sized buffer, requiring at least
    /// [`SIZE_HEADER`] bytes to be present.
    pub fn from_buffer(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < SIZE_HEADER {
            return Err(HeaderError::ShortFile(buffer.len()).into());
        }
        let mut bytes = [0u8; SIZE_HEADER];
        bytes.copy_from_slice(&buffer[..SIZE_HEADER]);
        Self::from_bytes(&bytes)
    }

    /// Reads a header from the start of a reader.
    pub fn from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; SIZE_HEADER];
        reader.read_exact(&mut buf)?;
        Self::from_bytes(&buf)
    }

    /// Writes the header's 20-byte form to a writer.
    pub fn write_bytes<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// Overwrites the 12 mutable bytes of the header (`count`, `max_offset`)
    /// at offset 8, restoring the channel's prior position afterwards. The
    /// in-memory header is only updated once the write succeeds.
    pub fn update_count_and_save<C: Read + Write + Seek>(
        &mut self,
        count: u64,
        max_offset: u32,
        channel: &mut C,
    ) -> Result<()> {
        let prior = channel.stream_position()?;
        let mut mutable = [0u8; 12];
        BigEndian::write_u64(&mut mutable[0..8], count);
        BigEndian::write_u32(&mut mutable[8..12], max_offset);

        channel.seek(SeekFrom::Start(8))?;
        channel.write_all(&mutable)?;
        channel.seek(SeekFrom::Start(prior))?;

        self.count = count;
        self.max_offset = max_offset;
        Ok(())
    }
}

/// The physical location of a logical entry within the data section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPosition {
    /// Absolute byte offset (from the start of the file) of the entry's frame.
    pub frame_byte: u64,
    /// Number of leading bits of `frame_byte` to skip before the frame starts.
    pub skip_bits: u8,
    /// The entry's 0-based position within its frame.
    pub offset_into_frame: u64,
}

/// Builder for [`Header`], with the sequence file format's default geometry.
#[derive(Debug, Clone, Copy)]
pub struct HeaderBuilder {
    bits_per_offset_entry: u8,
    bits_per_full_entry: Option<u8>,
    offsets_per_frame: u16,
}

impl Default for HeaderBuilder {
    fn default() -> Self {
        Self {
            bits_per_offset_entry: DEFAULT_BITS_PER_OFFSET_ENTRY,
            bits_per_full_entry: None,
            offsets_per_frame: DEFAULT_OFFSETS_PER_FRAME,
        }
    }
}

impl HeaderBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn bits_per_offset_entry(mut self, bits: u8) -> Self {
        self.bits_per_offset_entry = bits;
        self
    }

    #[must_use]
    pub fn bits_per_full_entry(mut self, bits: u8) -> Self {
        self.bits_per_full_entry = Some(bits);
        self
    }

    #[must_use]
    pub fn offsets_per_frame(mut self, n: u16) -> Self {
        self.offsets_per_frame = n;
        self
    }

    /// Derives `bits_per_full_entry` from an upper bound when it was not
    /// explicitly overridden.
    #[must_use]
    pub fn bits_per_full_entry_for_max(mut self, max: u64) -> Self {
        if self.bits_per_full_entry.is_none() {
            let bound = if max > 1 { (max - 1) / 2 } else { 1 };
            self.bits_per_full_entry = Some(crate::encoding::bits_needed(bound));
        }
        self
    }

    pub fn build(self) -> Result<Header> {
        let bits_per_full_entry = self.bits_per_full_entry.unwrap_or(32);
        if bits_per_full_entry == 0 {
            return Err(HeaderError::ZeroField("bitsPerFullEntry").into());
        }
        if self.bits_per_offset_entry == 0 {
            return Err(HeaderError::ZeroField("bitsPerOffsetEntry").into());
        }
        if self.offsets_per_frame == 0 {
            return Err(HeaderError::ZeroField("offsetsPerFrame").into());
        }
        Ok(Header {
            bits_per_offset_entry: self.bits_per_offset_entry,
            bits_per_full_entry,
            offsets_per_frame: self.offsets_per_frame,
            count: 0,
            max_offset: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample() -> Header {
        HeaderBuilder::new()
            .bits_per_full_entry(11)
            .bits_per_offset_entry(5)
            .offsets_per_frame(4)
            .build()
            .unwrap()
    }

    #[test]
    fn round_trips_bytes() {
        let mut h = sample();
        h.count = 5;
        h.max_offset = 3;
        let bytes = h.to_bytes();
        let parsed = Header::from_bytes(&bytes).unwrap();
        assert_eq!(h, parsed);
    }

    #[test]
    fn rejects_bad_magic_and_version() {
        let mut bytes = sample().to_bytes();
        bytes[0] = 0;
        assert!(Header::from_bytes(&bytes).is_err());

        let mut bytes = sample().to_bytes();
        bytes[3] = 2;
        assert!(Header::from_bytes(&bytes).is_err());
    }

    #[test]
    fn positions_match_frame_layout_example() {
        // bitsPerFullEntry=11, bitsPerOffsetEntry=5, offsetsPerFrame=4
        let h = sample();
        // bits_per_frame = 11 + 3*5 = 26
        assert_eq!(h.bits_per_frame(), 26);
        let p0 = h.position_of(0);
        assert_eq!(p0.frame_byte, SIZE_HEADER as u64);
        assert_eq!(p0.skip_bits, 0);
        assert_eq!(p0.offset_into_frame, 0);

        let p4 = h.position_of(4);
        assert_eq!(p4.frame_byte, SIZE_HEADER as u64 + 26 / 8);
        assert_eq!(p4.skip_bits, 26 % 8);
        assert_eq!(p4.offset_into_frame, 0);
    }

    #[test]
    fn update_count_and_save_restores_position() {
        let mut h = sample();
        let mut cursor = Cursor::new(vec![0u8; SIZE_HEADER + 8]);
        h.write_bytes(&mut cursor).unwrap();
        cursor.set_position(SIZE_HEADER as u64 + 3);

        h.update_count_and_save(42, 7, &mut cursor).unwrap();
        assert_eq!(cursor.position(), SIZE_HEADER as u64 + 3);

        cursor.set_position(0);
        let reloaded = Header::from_reader(&mut cursor).unwrap();
        assert_eq!(reloaded.count, 42);
        assert_eq!(reloaded.max_offset, 7);
    }

    #[test]
    fn estimated_count_exact_frames() {
        let h = sample();
        let data_bits = h.bits_per_frame() * 10;
        let file_size = SIZE_HEADER as u64 + data_bits / 8;
        assert_eq!(h.estimated_count(file_size), 40);
    }
}
