//! Virtual concatenation of several sequence files into one ascending
//! stream, with boundary de-duplication for the case where segmented
//! sieving chains files by reusing the seed's last value as the next
//! window's first value.

use std::path::Path;

use crate::encoding::{bits_needed, decode_offset};
use crate::error::{ReadError, Result};
use crate::header::{Header, HeaderBuilder};
use crate::seqfile::{Bias, SeqFileReader};

/// Reads an ordered list of sequence files as a single logical stream.
///
/// Adjacent files are expected to overlap at exactly one point when they
/// come from chained sieve windows (the previous window's last prime is
/// fed back as the new window's seed, landing as its first written value).
/// When that overlap is detected, the duplicate is suppressed so each
/// value appears exactly once in the combined index space.
pub struct MultiSeqReader {
    readers: Vec<SeqFileReader>,
    /// `skip_first[k]` is true when reader `k`'s first entry duplicates
    /// reader `k-1`'s last entry (always false for `k == 0`).
    skip_first: Vec<bool>,
    /// Cumulative count at the start of each file in the combined index
    /// space; `prefix[readers.len()]` is the total count.
    prefix: Vec<u64>,
    pos: u64,
}

impl MultiSeqReader {
    pub fn open<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut readers = Vec::with_capacity(paths.len());
        for p in paths {
            readers.push(SeqFileReader::open(p)?);
        }

        let mut skip_first = vec![false; readers.len()];
        for k in 1..readers.len() {
            if readers[k - 1].count() > 0 && readers[k].count() > 0 {
                let prev_last = readers[k - 1].last()?;
                let cur_first = readers[k].first()?;
                if prev_last == cur_first {
                    skip_first[k] = true;
                }
            }
        }

        let mut prefix = vec![0u64; readers.len() + 1];
        for (k, r) in readers.iter().enumerate() {
            let count = r.count();
            let effective = if skip_first[k] { count.saturating_sub(1) } else { count };
            prefix[k + 1] = prefix[k] + effective;
        }

        Ok(Self {
            readers,
            skip_first,
            prefix,
            pos: 0,
        })
    }

    pub fn count(&self) -> u64 {
        *self.prefix.last().unwrap_or(&0)
    }

    /// Maps a global index to the file that owns it and its local index
    /// within that file's own numbering.
    fn locate(&self, index: u64) -> (usize, u64) {
        let file_idx = self.prefix.partition_point(|&p| p <= index) - 1;
        let shift = u64::from(self.skip_first[file_idx]);
        (file_idx, index - self.prefix[file_idx] + shift)
    }

    pub fn get(&self, index: u64) -> Result<u64> {
        let total = self.count();
        if index >= total {
            return Err(ReadError::OutOfRange(index, total).into());
        }
        let (file_idx, local) = self.locate(index);
        self.readers[file_idx].get(local)
    }

    pub fn first(&self) -> Result<u64> {
        self.get(0)
    }

    pub fn last(&self) -> Result<u64> {
        let total = self.count();
        if total == 0 {
            return Err(ReadError::OutOfRange(0, 0).into());
        }
        self.get(total - 1)
    }

    /// Advances the combined stream by one value, or returns `None` at the
    /// end, mirroring a single-file iterator.
    pub fn next(&mut self) -> Result<Option<u64>> {
        if self.pos >= self.count() {
            return Ok(None);
        }
        let v = self.get(self.pos)?;
        self.pos += 1;
        Ok(Some(v))
    }

    /// Repositions the stream cursor used by [`Self::next`].
    pub fn seek(&mut self, index: u64) -> Result<()> {
        if index > self.count() {
            return Err(ReadError::OutOfRange(index, self.count()).into());
        }
        self.pos = index;
        Ok(())
    }

    /// Locates the file whose range covers `value` (its own `last()` is
    /// the first, in file order, that is `>= value`) and delegates the
    /// search to it, translating the result back into the combined index
    /// space. Falls back to the final file for values past every file's
    /// last entry, where only `Backward`/`Nearest` biases can succeed.
    pub fn search(&self, value: u64, bias: Bias) -> Result<i64> {
        for (k, r) in self.readers.iter().enumerate() {
            if r.count() == 0 {
                continue;
            }
            if value <= r.last()? {
                return self.translate(k, r.search(value, bias)?);
            }
        }
        if let Some((k, r)) = self
            .readers
            .iter()
            .enumerate()
            .rev()
            .find(|(_, r)| r.count() > 0)
        {
            if matches!(bias, Bias::Backward | Bias::Nearest) {
                return self.translate(k, r.search(value, bias)?);
            }
        }
        Ok(-1)
    }

    fn translate(&self, file_idx: usize, local_idx: i64) -> Result<i64> {
        if local_idx < 0 {
            return Ok(-1);
        }
        let shift = i64::from(self.skip_first[file_idx]);
        Ok(self.prefix[file_idx] as i64 + local_idx - shift)
    }

    /// Derives the minimal geometry (`bitsPerFullEntry` from the
    /// concatenated last value, `bitsPerOffsetEntry` from the concatenated
    /// max gap) for a file that would hold the merged stream, using the
    /// default frame size.
    pub fn size_optimized_header_for_new_file(&self) -> Result<Header> {
        let last = self.last()?;

        let mut max_offset_encoded = 0u32;
        for r in &self.readers {
            if r.count() > 0 {
                max_offset_encoded = max_offset_encoded.max(r.header().max_offset);
            }
        }
        let mut max_gap = decode_offset(u64::from(max_offset_encoded));

        for k in 0..self.readers.len().saturating_sub(1) {
            if !self.skip_first[k + 1] && self.readers[k].count() > 0 && self.readers[k + 1].count() > 0
            {
                let gap = self.readers[k + 1].first()? - self.readers[k].last()?;
                max_gap = max_gap.max(gap);
            }
        }

        HeaderBuilder::new()
            .bits_per_full_entry_for_max(last)
            .bits_per_offset_entry(bits_needed(crate::encoding::encode_offset(max_gap.max(1))))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::HeaderBuilder;
    use crate::sieve::{FnConsumer, Sieve};
    use crate::seqfile::{OpenMode, SeqFile};
    use tempfile::tempdir;

    fn write_range(path: &Path, values: &[u64]) {
        let header = HeaderBuilder::new()
            .bits_per_full_entry(16)
            .bits_per_offset_entry(8)
            .offsets_per_frame(8)
            .build()
            .unwrap();
        let seqfile = SeqFile::open(path, OpenMode::Write { sync: false }, Some(header)).unwrap();
        let mut writer = seqfile.into_writer().unwrap();
        for &v in values {
            writer.accept(v as i64).unwrap();
        }
        writer.close().unwrap();
    }

    #[test]
    fn dedups_shared_boundary_value() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.seq");
        let b = dir.path().join("b.seq");
        write_range(&a, &[2, 3, 5, 7]);
        write_range(&b, &[7, 11, 13]);

        let multi = MultiSeqReader::open(&[&a, &b]).unwrap();
        assert_eq!(multi.count(), 6);
        let all: Vec<u64> = (0..multi.count()).map(|i| multi.get(i).unwrap()).collect();
        assert_eq!(all, vec![2, 3, 5, 7, 11, 13]);
    }

    #[test]
    fn sequential_next_matches_get() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.seq");
        let b = dir.path().join("b.seq");
        write_range(&a, &[2, 3, 5]);
        write_range(&b, &[7, 11]);

        let mut multi = MultiSeqReader::open(&[&a, &b]).unwrap();
        let mut collected = Vec::new();
        while let Some(v) = multi.next().unwrap() {
            collected.push(v);
        }
        assert_eq!(collected, vec![2, 3, 5, 7, 11]);
    }

    #[test]
    fn search_locates_containing_file() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.seq");
        let b = dir.path().join("b.seq");
        write_range(&a, &[2, 3, 5, 7]);
        write_range(&b, &[7, 11, 13]);

        let multi = MultiSeqReader::open(&[&a, &b]).unwrap();
        assert_eq!(multi.search(11, Bias::None).unwrap(), 4);
        assert_eq!(multi.search(7, Bias::None).unwrap(), 3);
        assert_eq!(multi.search(20, Bias::Backward).unwrap(), 5);
        assert_eq!(multi.search(20, Bias::Forward).unwrap(), -1);
    }

    #[test]
    fn chained_sieve_windows_round_trip_through_multi_reader() {
        let dir = tempdir().unwrap();
        let first_path = dir.path().join("w0.seq");
        let second_path = dir.path().join("w1.seq");

        let header0 = HeaderBuilder::new()
            .bits_per_full_entry(16)
            .bits_per_offset_entry(8)
            .offsets_per_frame(16)
            .build()
            .unwrap();
        let seqfile0 =
            SeqFile::open(&first_path, OpenMode::Write { sync: false }, Some(header0)).unwrap();
        let mut writer0 = seqfile0.into_writer().unwrap();
        let last0 = Sieve::run_cold(
            1000,
            &mut FnConsumer(|v| writer0.accept(v as i64)),
            -1,
        )
        .unwrap();
        writer0.close().unwrap();
        assert_eq!(last0, 997);

        let reader0 = SeqFileReader::open(&first_path).unwrap();
        let header1 = HeaderBuilder::new()
            .bits_per_full_entry(16)
            .bits_per_offset_entry(8)
            .offsets_per_frame(16)
            .build()
            .unwrap();
        let seqfile1 =
            SeqFile::open(&second_path, OpenMode::Write { sync: false }, Some(header1)).unwrap();
        let mut writer1 = seqfile1.into_writer().unwrap();
        let mut seed_idx = 0u64;
        let seed = move || -> i64 {
            if seed_idx < reader0.count() {
                let v = reader0.get(seed_idx).unwrap() as i64;
                seed_idx += 1;
                v
            } else {
                -1
            }
        };
        Sieve::run_warm(
            997,
            seed,
            &mut FnConsumer(|v| writer1.accept(v as i64)),
            2000,
            -1,
        )
        .unwrap();
        writer1.close().unwrap();

        let multi = MultiSeqReader::open(&[&first_path, &second_path]).unwrap();
        assert_eq!(multi.get(0).unwrap(), 2);
        assert_eq!(multi.last().unwrap(), 1999);
    }
}
