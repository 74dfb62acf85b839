//! Error taxonomy for the gapseq core.
//!
//! One `thiserror` enum per failure family, folded into a single top-level
//! [`Error`] via `#[from]`.

#[derive(thiserror::Error, Debug)]
pub enum HeaderError {
    #[error("bad magic number: {0:02x?}")]
    BadMagic([u8; 3]),

    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u8),

    #[error("header field `{0}` must be nonzero")]
    ZeroField(&'static str),

    #[error("file is shorter than the {0}-byte header")]
    ShortFile(usize),
}

#[derive(thiserror::Error, Debug)]
pub enum ReadError {
    #[error("data section ended mid-entry after {0} of {1} expected entries")]
    Truncated(u64, u64),

    #[error("index {0} is out of range (count = {1})")]
    OutOfRange(u64, u64),

    #[error("channel position moved from {expected} to {observed} during sequential iteration")]
    ConcurrentAccess { expected: u64, observed: u64 },
}

#[derive(thiserror::Error, Debug)]
pub enum WriteError {
    #[error("value {value} is not strictly greater than the previous value {previous}")]
    NotAscending { previous: u64, value: u64 },

    #[error("encoded full value {0} does not fit in {1} bits")]
    FullOverflow(u64, u8),

    #[error("encoded offset {0} does not fit in {1} bits")]
    OffsetOverflow(u64, u8),
}

#[derive(thiserror::Error, Debug)]
pub enum SieveError {
    #[error("seed must begin with 2, got {0}")]
    SeedDoesNotStartAtTwo(u64),

    #[error("seed value {value} is not strictly greater than the previous seed value {previous}")]
    SeedNotAscending { previous: u64, value: u64 },

    #[error("seed value {0} is composite (divisible by a small prime)")]
    SeedNotSmooth(u64),

    #[error("seed value {value} exceeds the sieve bound {max}")]
    SeedExceedsMax { value: u64, max: u64 },

    #[error("seed's last value {last} does not equal the warm start {start}")]
    SeedEndpointMismatch { last: u64, start: u64 },
}

#[derive(thiserror::Error, Debug)]
pub enum FilterError {
    #[error("filter accepted {0} elements, need at least 2")]
    TooFewAccepted(usize),
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Header(#[from] HeaderError),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Sieve(#[from] SieveError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
