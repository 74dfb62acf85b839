//! Segmented prime sieving with a bit-packed, random-access sequence file
//! format for persisting the results.
//!
//! The two halves of the crate compose through [`sieve::Consumer`]: a
//! [`sieve::Sieve`] run drives a consumer synchronously, and
//! [`seqfile::SeqFileWriter`] is itself wired up as one via
//! [`sieve::FnConsumer`]. [`batch::BatchDriver`] strings multiple bounded
//! sieve runs together over scratch files, chained through
//! [`multi::MultiSeqReader`], to reach bounds too large to sieve in one
//! pass.

pub mod batch;
pub mod bitio;
pub mod bitset;
pub mod encoding;
pub mod error;
pub mod header;
pub mod multi;
pub mod seqfile;
pub mod sieve;

pub use batch::BatchDriver;
pub use error::{Error, Result};
pub use header::{Header, HeaderBuilder};
pub use multi::MultiSeqReader;
pub use seqfile::{Bias, OpenMode, SeqFile, SeqFileReader, SeqFileWriter};
pub use sieve::{Consumer, Sieve};
