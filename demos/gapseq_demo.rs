//! Small end-to-end demo: sieve a window, persist it, read it back.
//!
//! Stands in for the out-of-scope CLI front end; run with
//! `cargo run --example gapseq-demo`.

use gapseq::sieve::FnConsumer;
use gapseq::{HeaderBuilder, OpenMode, SeqFile, Sieve};

fn main() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("primes-under-1000.seq");

    let header = HeaderBuilder::new()
        .bits_per_full_entry(16)
        .bits_per_offset_entry(8)
        .offsets_per_frame(32)
        .build()?;

    let seqfile = SeqFile::open(&path, OpenMode::Write { sync: false }, Some(header))?;
    let mut writer = seqfile.into_writer().expect("opened for writing");

    let last = Sieve::run_cold(1000, &mut FnConsumer(|v| writer.accept(v as i64)), -1)?;
    let final_header = writer.close()?;
    eprintln!(
        "sieved {} primes under 1000, last = {last}",
        final_header.count
    );

    let seqfile = SeqFile::open(&path, OpenMode::Read, None)?;
    let reader = seqfile.into_reader().expect("opened for reading");
    eprintln!("count    = {}", reader.count());
    eprintln!("get(0)   = {}", reader.get(0)?);
    eprintln!("last()   = {}", reader.last()?);

    Ok(())
}
