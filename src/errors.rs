//! Error types for cache construction and block loading.
//!
//! Errors are stage-specific to keep diagnostics precise and avoid a
//! single monolithic error enum that grows unbounded. All enums are
//! `#[non_exhaustive]` to allow adding variants without breaking callers;
//! consumers should include a fallback match arm.
//!
//! # Design Notes
//! - I/O errors preserve their source to keep diagnostics actionable.
//! - A read failure shared by several waiters of the same in-flight load
//!   is carried behind an `Arc`; the failing read happened once, so the
//!   error is surfaced once per waiter without cloning the source.

use std::fmt;
use std::io;
use std::sync::Arc;

/// Errors from cache configuration validation.
///
/// These surface at construction time; a cache is never built from an
/// invalid configuration.
#[derive(Debug)]
#[non_exhaustive]
pub enum ConfigError {
    /// Block size is below the supported minimum.
    BlockSizeTooSmall { block_size: u32, min: u32 },
    /// Block size is not a power of two.
    BlockSizeNotPowerOfTwo { block_size: u32 },
    /// Maximum cache weight is zero.
    ZeroCapacity,
    /// Stream ratio is outside `[0, 1]` (or NaN).
    StreamRatioOutOfRange { ratio: f64 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlockSizeTooSmall { block_size, min } => {
                write!(f, "block size {block_size} is below the minimum {min}")
            }
            Self::BlockSizeNotPowerOfTwo { block_size } => {
                write!(f, "block size {block_size} is not a power of two")
            }
            Self::ZeroCapacity => write!(f, "maximum cache size must be non-zero"),
            Self::StreamRatioOutOfRange { ratio } => {
                write!(f, "stream ratio {ratio} is outside [0, 1]")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Errors produced by block sources and block reads.
#[derive(Debug)]
#[non_exhaustive]
pub enum PackReadError {
    /// The requested read starts beyond the end of the pack.
    OutOfRange { offset: u64, len: usize },
    /// The source returned fewer bytes than requested.
    ShortRead { expected: usize, got: usize },
    /// Source-specific I/O error.
    Io(io::Error),
}

impl PackReadError {
    /// Creates an I/O error variant, preserving the source.
    #[inline]
    pub fn io(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl fmt::Display for PackReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange { offset, len } => {
                write!(f, "read out of range at {offset} (len {len})")
            }
            Self::ShortRead { expected, got } => {
                write!(f, "short read: expected {expected}, got {got}")
            }
            Self::Io(err) => write!(f, "pack read error: {err}"),
        }
    }
}

impl std::error::Error for PackReadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for PackReadError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// Errors surfaced by [`BlockCache::get_or_load`](crate::cache::BlockCache::get_or_load).
#[derive(Debug)]
#[non_exhaustive]
pub enum LoadError {
    /// The underlying read failed; shared by all waiters of the load.
    Read(Arc<PackReadError>),
    /// A cached block repeatedly failed its ownership check.
    ///
    /// Bounded retry guards against livelock when the cached entry for a
    /// position keeps resolving to a block belonging to a superseded pack
    /// identity.
    StaleRetriesExhausted { position: u64, attempts: usize },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read(err) => write!(f, "block load failed: {err}"),
            Self::StaleRetriesExhausted { position, attempts } => {
                write!(
                    f,
                    "cached block at {position} failed ownership check {attempts} times"
                )
            }
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Read(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_error_preserves_io_source() {
        let err = PackReadError::from(io::Error::new(io::ErrorKind::NotFound, "missing pack"));
        let source = std::error::Error::source(&err).expect("source");
        assert!(source.to_string().contains("missing pack"));
    }

    #[test]
    fn load_error_display_names_position() {
        let err = LoadError::StaleRetriesExhausted {
            position: 1024,
            attempts: 3,
        };
        assert!(err.to_string().contains("1024"));
    }
}
