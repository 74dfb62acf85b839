//! The sequence file container: a random-access, append-capable file of
//! bit-packed ascending integers.
//!
//! ## On-disk format
//!
//! ```text
//! [ 20-byte header ][ frame 0 ][ frame 1 ]...
//! ```
//!
//! Each frame holds `offsetsPerFrame` logical entries: a leading "full"
//! value followed by `offsetsPerFrame - 1` "offset" (gap) values, encoded by
//! [`crate::encoding`]. See [`crate::header::Header`] for the byte layout
//! and [`Header::position_of`] for how a logical index maps to a bit
//! position.
//!
//! Reading (`get`, `search`, `iterate`) and writing live on two distinct
//! handles, [`SeqFileReader`] and [`SeqFileWriter`], both reachable through
//! [`SeqFile::open`].

pub mod reader;
pub mod writer;

use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::encoding::bits_needed;
use crate::error::{Error, FilterError, ReadError, Result};
use crate::header::{Header, HeaderBuilder, SIZE_HEADER};

pub use reader::SequenceReader;
pub use writer::SequenceWriter;

/// A search tie-break (see [`SeqFileReader::search`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bias {
    /// Only an exact match counts; otherwise fail.
    None,
    /// Snap to the next value greater than or equal to the target.
    Forward,
    /// Snap to the next value less than or equal to the target.
    Backward,
    /// Snap to whichever neighbor is numerically closest.
    Nearest,
}

/// How a sequence file should be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Open an existing file for random/sequential reads.
    Read,
    /// Create a new file; fails if one already exists at the path.
    Write { sync: bool },
    /// Create a new file, truncating any existing one.
    Overwrite { sync: bool },
    /// Reopen an existing file and continue appending to it.
    Append { sync: bool },
}

/// A sequence file opened for either reading or writing.
pub enum SeqFile {
    Read(SeqFileReader),
    Write(SeqFileWriter),
}

impl SeqFile {
    /// Opens `path` in the given mode. `header` is required (and geometry-
    /// defining) for `Write`/`Overwrite`; ignored for `Read`/`Append`, which
    /// recover geometry from the file itself.
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode, header: Option<Header>) -> Result<Self> {
        let path = path.as_ref();
        match mode {
            OpenMode::Read => Ok(SeqFile::Read(SeqFileReader::open(path)?)),
            OpenMode::Write { sync } => Ok(SeqFile::Write(SeqFileWriter::create(
                path,
                header.unwrap_or_else(|| {
                    HeaderBuilder::new()
                        .build()
                        .expect("default header geometry is always valid")
                }),
                sync,
            )?)),
            OpenMode::Overwrite { sync } => Ok(SeqFile::Write(SeqFileWriter::overwrite(
                path,
                header.unwrap_or_else(|| {
                    HeaderBuilder::new()
                        .build()
                        .expect("default header geometry is always valid")
                }),
                sync,
            )?)),
            OpenMode::Append { sync } => Ok(SeqFile::Write(SeqFileWriter::append(path, sync)?)),
        }
    }

    pub fn into_reader(self) -> Option<SeqFileReader> {
        match self {
            SeqFile::Read(r) => Some(r),
            SeqFile::Write(_) => None,
        }
    }

    pub fn into_writer(self) -> Option<SeqFileWriter> {
        match self {
            SeqFile::Write(w) => Some(w),
            SeqFile::Read(_) => None,
        }
    }
}

/// A lightweight handle to a shared, `RefCell`-guarded file, implementing
/// `Read + Seek` by taking a brief borrow per call. This lets a long-lived
/// sequential cursor and short-lived random-access reads share one real
/// file descriptor without either holding the borrow across calls.
pub struct SharedChannel<'a>(&'a RefCell<File>);

impl Read for SharedChannel<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().read(buf)
    }
}

impl Seek for SharedChannel<'_> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.0.borrow_mut().seek(pos)
    }
}

/// A handle for random-access and sequential reads from an existing
/// sequence file.
pub struct SeqFileReader {
    channel: RefCell<File>,
    header: Header,
    #[allow(dead_code)]
    path: PathBuf,
}

impl SeqFileReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        let header = Header::from_reader(&mut file)?;
        Ok(Self {
            channel: RefCell::new(file),
            header,
            path,
        })
    }

    pub fn header(&self) -> Header {
        self.header
    }

    pub fn count(&self) -> u64 {
        self.header.count
    }

    /// Random-access lookup. Saves and restores the shared channel's
    /// position so interleaved sequential iteration is not disturbed.
    pub fn get(&self, index: u64) -> Result<u64> {
        if index >= self.header.count {
            return Err(ReadError::OutOfRange(index, self.header.count).into());
        }
        let pos = self.header.position_of(index);
        let prior = self.channel.borrow_mut().stream_position()?;
        self.channel
            .borrow_mut()
            .seek(SeekFrom::Start(pos.frame_byte))?;

        let result = (|| -> Result<u64> {
            let chan = SharedChannel(&self.channel);
            let mut reader = SequenceReader::seek_to(&self.header, chan, index)?;
            reader
                .next()
                .ok_or_else(|| ReadError::OutOfRange(index, self.header.count).into())?
        })();
        self.channel.borrow_mut().seek(SeekFrom::Start(prior))?;
        result
    }

    pub fn first(&self) -> Result<u64> {
        self.get(0)
    }

    pub fn last(&self) -> Result<u64> {
        if self.header.count == 0 {
            return Err(ReadError::OutOfRange(0, 0).into());
        }
        self.get(self.header.count - 1)
    }

    /// Binary search over `[0, count)` using [`Self::get`] as the oracle.
    /// Returns `-1` when no value satisfies `bias` (see [`Bias`]).
    pub fn search(&self, value: u64, bias: Bias) -> Result<i64> {
        let count = self.header.count;
        if count == 0 {
            return Ok(-1);
        }
        let mut lo = 0u64;
        let mut hi = count;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.get(mid)? < value {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        let idx = lo;
        if idx < count && self.get(idx)? == value {
            return Ok(idx as i64);
        }
        match bias {
            Bias::None => Ok(-1),
            Bias::Forward => {
                if idx < count {
                    Ok(idx as i64)
                } else {
                    Ok(-1)
                }
            }
            Bias::Backward => {
                if idx > 0 {
                    Ok((idx - 1) as i64)
                } else {
                    Ok(-1)
                }
            }
            Bias::Nearest => match (idx > 0, idx < count) {
                (false, false) => Ok(-1),
                (false, true) => Ok(idx as i64),
                (true, false) => Ok((idx - 1) as i64),
                (true, true) => {
                    let fwd = self.get(idx)?;
                    let bwd = self.get(idx - 1)?;
                    if value - bwd <= fwd - value {
                        Ok((idx - 1) as i64)
                    } else {
                        Ok(idx as i64)
                    }
                }
            },
        }
    }

    /// Convenience: `get(search(value, bias))`, or `None` when `search`
    /// returns `-1`.
    pub fn nearest_to(&self, value: u64, bias: Bias) -> Result<Option<u64>> {
        match self.search(value, bias)? {
            -1 => Ok(None),
            idx => Ok(Some(self.get(idx as u64)?)),
        }
    }

    /// A fail-fast sequential iterator starting at the beginning of the
    /// data section.
    pub fn iterate(&self) -> Result<SequenceReader<'_, SharedChannel<'_>>> {
        self.channel
            .borrow_mut()
            .seek(SeekFrom::Start(SIZE_HEADER as u64))?;
        SequenceReader::new(&self.header, SharedChannel(&self.channel))
    }

    /// A fail-fast sequential iterator whose first entry is `index`.
    pub fn iterate_from(&self, index: u64) -> Result<SequenceReader<'_, SharedChannel<'_>>> {
        if index >= self.header.count {
            return Err(ReadError::OutOfRange(index, self.header.count).into());
        }
        let pos = self.header.position_of(index);
        self.channel
            .borrow_mut()
            .seek(SeekFrom::Start(pos.frame_byte))?;
        SequenceReader::seek_to(&self.header, SharedChannel(&self.channel), index)
    }

    /// Two-pass filtered copy. Pass 1 determines the minimal geometry for
    /// the accepted subsequence; pass 2 writes it to `out_path`. The
    /// predicate's [`Predicate::reset`] is invoked between passes.
    pub fn filter<P: Predicate>(
        &self,
        predicate: &mut P,
        out_path: &Path,
        overwrite: bool,
        offsets_per_frame: u16,
    ) -> Result<Header> {
        let mut accepted_count = 0usize;
        let mut max_value = 0u64;
        let mut max_gap = 0u64;
        let mut prev: Option<u64> = None;
        for value in self.iterate()? {
            let value = value?;
            if predicate.test(value) {
                if let Some(p) = prev {
                    max_gap = max_gap.max(value - p);
                }
                prev = Some(value);
                max_value = value;
                accepted_count += 1;
            }
        }
        if accepted_count < 2 {
            return Err(FilterError::TooFewAccepted(accepted_count).into());
        }
        predicate.reset();

        let new_header = HeaderBuilder::new()
            .bits_per_full_entry(bits_needed(crate::encoding::encode_full(max_value)))
            .bits_per_offset_entry(bits_needed(crate::encoding::encode_offset(max_gap)))
            .offsets_per_frame(offsets_per_frame)
            .build()?;

        let mode = if overwrite {
            OpenMode::Overwrite { sync: false }
        } else {
            OpenMode::Write { sync: false }
        };
        let mut out = SeqFileWriter::create_with_mode(out_path, new_header, mode)?;
        for value in self.iterate()? {
            let value = value?;
            if predicate.test(value) {
                out.accept(value as i64)?;
            }
        }
        out.close()
    }
}

/// Stateful predicate used by [`SeqFileReader::filter`]. Implement
/// [`Predicate::reset`] for predicates whose acceptance depends on prior
/// state (e.g. "distinct gap" filters); stateless predicates can leave the
/// default no-op.
pub trait Predicate {
    fn test(&mut self, value: u64) -> bool;
    fn reset(&mut self) {}
}

/// Adapts a plain `FnMut(u64) -> bool` closure into a stateless [`Predicate`].
pub struct FnPredicate<F>(pub F);

impl<F: FnMut(u64) -> bool> Predicate for FnPredicate<F> {
    fn test(&mut self, value: u64) -> bool {
        (self.0)(value)
    }
}

/// A handle for appending to a sequence file.
pub struct SeqFileWriter {
    file: Option<File>,
    header: Header,
    writer: Option<SequenceWriter<File>>,
    path: PathBuf,
    sync: bool,
}

impl SeqFileWriter {
    pub fn create<P: AsRef<Path>>(path: P, header: Header, sync: bool) -> Result<Self> {
        Self::create_with_mode(path.as_ref(), header, OpenMode::Write { sync })
    }

    pub fn overwrite<P: AsRef<Path>>(path: P, header: Header, sync: bool) -> Result<Self> {
        Self::create_with_mode(path.as_ref(), header, OpenMode::Overwrite { sync })
    }

    fn create_with_mode(path: &Path, header: Header, mode: OpenMode) -> Result<Self> {
        let mut options = OpenOptions::new();
        options.write(true).read(true);
        let sync = match mode {
            OpenMode::Write { sync } => {
                options.create_new(true);
                sync
            }
            OpenMode::Overwrite { sync } => {
                options.create(true).truncate(true);
                sync
            }
            _ => unreachable!("create_with_mode only handles Write/Overwrite"),
        };
        let mut file = options.open(path)?;
        header.write_bytes(&mut file)?;
        Ok(Self {
            header,
            writer: Some(SequenceWriter::new(file.try_clone()?, &header)),
            file: Some(file),
            path: path.to_path_buf(),
            sync,
        })
    }

    /// Reopens an existing file and positions the writer at the end of its
    /// data section, ready to append more entries.
    pub fn append<P: AsRef<Path>>(path: P, sync: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        let header = Header::from_reader(&mut file)?;

        let last_value = if header.count > 0 {
            let pos = header.position_of(header.count - 1);
            let mut tail = file.try_clone()?;
            tail.seek(SeekFrom::Start(pos.frame_byte))?;
            let mut reader = SequenceReader::seek_to(&header, tail, header.count - 1)?;
            Some(
                reader
                    .next()
                    .ok_or_else(|| ReadError::OutOfRange(header.count - 1, header.count))??,
            )
        } else {
            None
        };

        file.seek(SeekFrom::End(0))?;
        let writer_channel = file.try_clone()?;
        let writer = SequenceWriter::resume(
            writer_channel,
            &header,
            header.count,
            last_value,
            header.max_offset,
        );
        Ok(Self {
            header,
            file: Some(file),
            writer: Some(writer),
            path,
            sync,
        })
    }

    pub fn header(&self) -> Header {
        self.header
    }

    /// Accepts the next value. When this writer was opened with a `SYNC`
    /// open mode, the packed bytes are flushed to the channel and forced
    /// durable with `sync_data` after every accepted value.
    pub fn accept(&mut self, v: i64) -> Result<()> {
        let writer = self.writer.as_mut().expect("writer used after close");
        writer.accept(v)?;
        if self.sync {
            writer.flush()?;
            writer.channel_mut().sync_data()?;
        }
        Ok(())
    }

    /// Flushes the data section, rewrites the header's mutable fields, and
    /// consumes the writer, returning the final header.
    pub fn close(mut self) -> Result<Header> {
        let writer = self.writer.take().expect("writer used after close");
        let (_channel, count, max_offset) = writer.finish()?;
        let mut file = self.file.take().expect("file used after close");
        self.header
            .update_count_and_save(count, max_offset, &mut file)?;
        Ok(self.header)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Scans a sequence file's data section end-to-end and rewrites its header
/// with the recovered `count`/`max_offset`, recovering from a writer that
/// was interrupted before it could update those fields on close. A
/// `Truncated` error encountered mid-scan is not fatal here: the last
/// successfully-decoded entry becomes the effective count.
pub fn repair<P: AsRef<Path>>(path: P) -> Result<Header> {
    let path = path.as_ref();
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    let mut header = Header::from_reader(&mut file)?;
    let file_size = file.metadata()?.len();

    // Re-derive an upper bound on the entry count from the file size alone,
    // then replay the stream, stopping at the first truncation.
    header.count = header.estimated_count(file_size);

    file.seek(SeekFrom::Start(SIZE_HEADER as u64))?;
    let mut recovered_count = 0u64;
    let mut recovered_max_offset = 0u32;
    {
        let reader = SequenceReader::new(&header, &mut file)?;
        for (i, value) in reader.enumerate() {
            match value {
                Ok(_) => recovered_count = i as u64 + 1,
                Err(Error::Read(ReadError::Truncated(_, _))) => break,
                Err(e) => return Err(e),
            }
        }
    }

    // Replay again to compute the max encoded offset among the recovered
    // entries (cheap relative to the scan above, and keeps the encoding
    // logic colocated with the writer rather than duplicated here).
    if recovered_count > 0 {
        header.count = recovered_count;
        file.seek(SeekFrom::Start(SIZE_HEADER as u64))?;
        let reader = SequenceReader::new(&header, &mut file)?;
        let mut prev = None;
        for value in reader {
            let value = value?;
            if let Some(p) = prev {
                recovered_max_offset =
                    recovered_max_offset.max(crate::encoding::encode_offset(value - p) as u32);
            }
            prev = Some(value);
        }
    }

    header.update_count_and_save(recovered_count, recovered_max_offset, &mut file)?;
    Ok(header)
}
