//! Cache sizing and streaming-policy configuration.
//!
//! Configuration is validated at construction; a cache is never built
//! from an invalid configuration. Values come from callers rather than
//! compiled-in constants, so validation surfaces as a `Result` instead
//! of panicking.

use crate::errors::ConfigError;

/// Smallest supported block size in bytes.
pub const MIN_BLOCK_SIZE: u32 = 512;

/// Default block size (64 KiB).
pub const DEFAULT_BLOCK_SIZE: u32 = 64 * 1024;

/// Default maximum total cache weight (32 MiB).
pub const DEFAULT_MAX_BYTES: u64 = 32 * 1024 * 1024;

/// Default fraction of capacity below which payloads copy through the cache.
pub const DEFAULT_STREAM_RATIO: f64 = 0.30;

/// Sizing parameters for a [`BlockCache`](crate::cache::BlockCache).
///
/// `block_size` is the aligned read window for pack data and must be a
/// power of two no smaller than [`MIN_BLOCK_SIZE`]. `max_bytes` bounds the
/// total weight of cached entries; the live total may exceed it by at most
/// one admission while eviction catches up. `stream_ratio` scales
/// `max_bytes` into the stream-through threshold: payloads no larger than
/// `max_bytes * stream_ratio` are worth copying through the cache, larger
/// ones should bypass it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CacheConfig {
    /// Aligned read window in bytes. Power of two, at least [`MIN_BLOCK_SIZE`].
    pub block_size: u32,
    /// Maximum total weight of cached entries in bytes.
    pub max_bytes: u64,
    /// Fraction of `max_bytes` used as the stream-through threshold.
    pub stream_ratio: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            max_bytes: DEFAULT_MAX_BYTES,
            stream_ratio: DEFAULT_STREAM_RATIO,
        }
    }
}

impl CacheConfig {
    /// Builds a validated configuration.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] describing the first invalid field.
    pub fn new(block_size: u32, max_bytes: u64, stream_ratio: f64) -> Result<Self, ConfigError> {
        let config = Self {
            block_size,
            max_bytes,
            stream_ratio,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates all fields.
    ///
    /// # Errors
    /// - `BlockSizeTooSmall` / `BlockSizeNotPowerOfTwo` for a bad block size
    /// - `ZeroCapacity` when `max_bytes` is zero
    /// - `StreamRatioOutOfRange` when the ratio is outside `[0, 1]` or NaN
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_size < MIN_BLOCK_SIZE {
            return Err(ConfigError::BlockSizeTooSmall {
                block_size: self.block_size,
                min: MIN_BLOCK_SIZE,
            });
        }
        if !self.block_size.is_power_of_two() {
            return Err(ConfigError::BlockSizeNotPowerOfTwo {
                block_size: self.block_size,
            });
        }
        if self.max_bytes == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        // NaN fails the range check, which is the rejection we want.
        if !(0.0..=1.0).contains(&self.stream_ratio) {
            return Err(ConfigError::StreamRatioOutOfRange {
                ratio: self.stream_ratio,
            });
        }
        Ok(())
    }

    /// Largest payload length that should copy through the cache.
    #[must_use]
    pub fn max_stream_through(&self) -> u64 {
        (self.max_bytes as f64 * self.stream_ratio) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        CacheConfig::default().validate().expect("default is valid");
    }

    #[test]
    fn rejects_small_block_size() {
        let err = CacheConfig::new(256, 4096, 0.5).unwrap_err();
        assert!(matches!(err, ConfigError::BlockSizeTooSmall { .. }));
    }

    #[test]
    fn rejects_non_power_of_two_block_size() {
        let err = CacheConfig::new(513, 4096, 0.5).unwrap_err();
        assert!(matches!(err, ConfigError::BlockSizeNotPowerOfTwo { .. }));
    }

    #[test]
    fn rejects_zero_capacity() {
        let err = CacheConfig::new(512, 0, 0.5).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroCapacity));
    }

    #[test]
    fn rejects_out_of_range_stream_ratio() {
        assert!(CacheConfig::new(512, 4096, -0.1).is_err());
        assert!(CacheConfig::new(512, 4096, 1.1).is_err());
        assert!(CacheConfig::new(512, 4096, f64::NAN).is_err());
    }

    #[test]
    fn stream_threshold_scales_capacity() {
        let config = CacheConfig::new(512, 4096, 0.5).expect("valid");
        assert_eq!(config.max_stream_through(), 2048);
    }
}
