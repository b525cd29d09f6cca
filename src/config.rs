//! Engine configuration, passed to opens instead of living in globals.

use crate::body::DEFAULT_FRAME_SIZE;
use crate::compress::CompressionMethod;

/// Name of the environment variable [`EngineConfig::from_env`] consults.
pub const COMPRESSION_ENV: &str = "SILK_COMPRESSION_METHOD";

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// What the `default` pseudo-method resolves to.  The builtin pin is
    /// `none`; only [`from_env`](Self::from_env) or the caller changes it.
    pub default_compression: CompressionMethod,
    /// Target uncompressed bytes per body frame.
    pub block_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            default_compression: CompressionMethod::None,
            block_size: DEFAULT_FRAME_SIZE,
        }
    }
}

impl EngineConfig {
    /// Builds a config honoring `SILK_COMPRESSION_METHOD`.  Tools call this
    /// at startup; the library itself never reads the environment, so
    /// embedders get [`Default`] behavior unless they opt in.  A value that
    /// is not a method name is ignored.
    pub fn from_env() -> Self {
        let mut cfg = EngineConfig::default();
        if let Ok(name) = std::env::var(COMPRESSION_ENV) {
            if let Some(method) = CompressionMethod::from_name(&name) {
                cfg.default_compression = method;
            }
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_default_is_uncompressed() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.default_compression, CompressionMethod::None);
        assert_eq!(cfg.block_size, DEFAULT_FRAME_SIZE);
    }

    #[test]
    fn env_override_is_opt_in() {
        std::env::set_var(COMPRESSION_ENV, "zlib");
        assert_eq!(
            EngineConfig::from_env().default_compression,
            CompressionMethod::Zlib
        );
        // Default() must not see the environment.
        assert_eq!(
            EngineConfig::default().default_compression,
            CompressionMethod::None
        );

        std::env::set_var(COMPRESSION_ENV, "not-a-method");
        assert_eq!(
            EngineConfig::from_env().default_compression,
            CompressionMethod::None
        );
        std::env::remove_var(COMPRESSION_ENV);
    }
}
