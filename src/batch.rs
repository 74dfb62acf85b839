//! Orchestrates repeated bounded-memory sieve runs to reach very large
//! bounds, spilling each window to a scratch sequence file and chaining
//! them as the seed for the next window via [`MultiSeqReader`].

use std::path::{Path, PathBuf};

use tempfile::Builder;

use crate::error::Result;
use crate::header::HeaderBuilder;
use crate::multi::MultiSeqReader;
use crate::seqfile::{OpenMode, SeqFile};
use crate::sieve::{Consumer, FanOut, FnConsumer, Sieve};

/// How far past a window boundary the driver will extend the final window
/// rather than leave a tiny trailing window of its own.
const TAIL_MERGE_THRESHOLD: u64 = 10_000;

/// A consumer wrapper that suppresses `end()`, used to keep a sieve run's
/// terminal sentinel from reaching the user's consumer after every
/// intermediate window; the real `end()` is delivered once, after the
/// last window, by [`BatchDriver::run`].
struct SuppressEnd<'a>(&'a mut dyn Consumer);

impl Consumer for SuppressEnd<'_> {
    fn accept(&mut self, value: u64) -> Result<()> {
        self.0.accept(value)
    }

    fn end(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Drives a sieve over `[0, max)` in bounded-memory windows, persisting
/// each window to a scratch file under `scratch_dir` and feeding prior
/// windows back in as the seed for the next.
pub struct BatchDriver {
    scratch_dir: PathBuf,
}

impl BatchDriver {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Runs the batch, delivering every prime in `[0, max)` (capped at
    /// `total` if non-negative) to `consumer`. Scratch files are removed
    /// whether the run succeeds or fails. Returns the last prime emitted.
    pub fn run(
        &self,
        max: u64,
        batch_size: u64,
        total: i64,
        consumer: &mut dyn Consumer,
    ) -> Result<u64> {
        let mut scratch_paths: Vec<PathBuf> = Vec::new();
        let result = self.run_windows(max, batch_size, total, consumer, &mut scratch_paths);
        for path in &scratch_paths {
            let _ = std::fs::remove_file(path);
        }
        result
    }

    fn run_windows(
        &self,
        max: u64,
        batch_size: u64,
        total: i64,
        consumer: &mut dyn Consumer,
        scratch_paths: &mut Vec<PathBuf>,
    ) -> Result<u64> {
        let ends = partition_ends(max, batch_size);
        let mut last = 0u64;
        let mut emitted_total = 0i64;

        for (i, &end) in ends.iter().enumerate() {
            let path = next_scratch_path(&self.scratch_dir, i)?;
            let header = HeaderBuilder::new().bits_per_full_entry_for_max(end.max(2)).build()?;
            let seqfile = SeqFile::open(&path, OpenMode::Overwrite { sync: false }, Some(header))?;
            let mut writer = seqfile
                .into_writer()
                .expect("SeqFile::open with a Write/Overwrite mode always yields a writer");
            scratch_paths.push(path);

            let remaining = if total < 0 {
                -1
            } else {
                (total - emitted_total).max(0)
            };

            let mut scratch_sink = FnConsumer(|v: u64| writer.accept(v as i64));
            let mut suppressed = SuppressEnd(&mut *consumer);
            let mut fan_out = FanOut(vec![&mut scratch_sink, &mut suppressed]);

            last = if i == 0 {
                Sieve::run_cold(end, &mut fan_out, remaining)?
            } else {
                let prior = &scratch_paths[..i];
                let mut seed_reader = MultiSeqReader::open(prior)?;
                let seed = move || -> i64 {
                    match seed_reader.next() {
                        Ok(Some(v)) => v as i64,
                        _ => -1,
                    }
                };
                Sieve::run_warm(last, seed, &mut fan_out, end, remaining)?
            };

            drop(fan_out);
            emitted_total += writer.count() as i64;
            writer.close()?;

            if total >= 0 && emitted_total >= total {
                break;
            }
        }

        consumer.end()?;
        Ok(last)
    }
}

/// Partitions `[0, max)` into windows bounded by `batch_size`, extending
/// the final window to absorb any trailing remainder of at most
/// [`TAIL_MERGE_THRESHOLD`] rather than leave a tiny window of its own.
/// Returns each window's exclusive upper bound; the windows' lower bounds
/// are implicit in the sieve chain (the previous window's last prime).
fn partition_ends(max: u64, batch_size: u64) -> Vec<u64> {
    if max == 0 {
        return vec![0];
    }
    let mut ends = Vec::new();
    let mut boundary = 0u64;
    while boundary < max {
        let mut next = (boundary + batch_size).min(max);
        let remainder = max - next;
        if remainder > 0 && remainder <= TAIL_MERGE_THRESHOLD {
            next = max;
        }
        ends.push(next);
        boundary = next;
    }
    ends
}

/// Allocates a fresh, uniquely-named scratch path for window `index`
/// inside `dir`. The file is created (empty) by `tempfile` to reserve the
/// name, then immediately handed to [`SeqFile::open`] in `Overwrite` mode,
/// which truncates and rewrites it.
fn next_scratch_path(dir: &Path, index: usize) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let named = Builder::new()
        .prefix(&format!("gapseq-window-{index}-"))
        .suffix(".seq")
        .tempfile_in(dir)?;
    named.into_temp_path().keep().map_err(|e| e.error.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sieve::FnConsumer;
    use tempfile::tempdir;

    fn is_prime(n: u64) -> bool {
        if n < 2 {
            return false;
        }
        (2..n).take_while(|d| d * d <= n).all(|d| n % d != 0)
    }

    #[test]
    fn batched_run_matches_one_shot_sieve() {
        let dir = tempdir().unwrap();
        let driver = BatchDriver::new(dir.path().join("scratch"));

        let mut collected = Vec::new();
        let last = driver
            .run(
                10_000,
                1_000,
                -1,
                &mut FnConsumer(|v| {
                    collected.push(v);
                    Ok(())
                }),
            )
            .unwrap();

        let expected: Vec<u64> = (2..10_000).filter(|&n| is_prime(n)).collect();
        assert_eq!(collected, expected);
        assert_eq!(last, *expected.last().unwrap());
    }

    #[test]
    fn scratch_files_are_removed_after_run() {
        let dir = tempdir().unwrap();
        let scratch = dir.path().join("scratch");
        let driver = BatchDriver::new(&scratch);

        driver
            .run(5_000, 1_000, -1, &mut FnConsumer(|_| Ok(())))
            .unwrap();

        let remaining: Vec<_> = std::fs::read_dir(&scratch).unwrap().collect();
        assert!(remaining.is_empty());
    }

    #[test]
    fn respects_total_cap_across_window_boundary() {
        let dir = tempdir().unwrap();
        let driver = BatchDriver::new(dir.path().join("scratch"));

        let mut collected = Vec::new();
        driver
            .run(
                10_000,
                1_000,
                5,
                &mut FnConsumer(|v| {
                    collected.push(v);
                    Ok(())
                }),
            )
            .unwrap();

        assert_eq!(collected, vec![2, 3, 5, 7, 11]);
    }
}
