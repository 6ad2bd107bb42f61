//! Runtime Configuration
//!
//! Configuration for the Sable runtime. Settings can be provided
//! programmatically through the builder or loaded from environment
//! variables.
//!
//! # Environment Variables
//!
//! All environment variables use the `SABLE_` prefix:
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `SABLE_SEGMENT_RESERVE` | Per-segment address-space reservation in bytes | 268435456 (256 MiB) |
//! | `SABLE_SEGMENT_COMMIT` | Initially committed bytes per segment | 65536 (64 KiB) |
//! | `SABLE_LOG_LEVEL` | Log level (off/error/warn/info/debug/trace) | warn |
//! | `SABLE_LEAK_CHECK` | Verify allocator balance when `run` returns ("true"/"false") | false |

use std::env;
use std::fmt;
use std::sync::OnceLock;

use crate::log::LogLevel;

/// Default address-space reservation per stack segment (256 MiB).
///
/// Large enough that per-call bump allocation does not need a limit check
/// in practice; pages are committed on demand, so the reservation costs
/// address space only.
pub const DEFAULT_SEGMENT_RESERVE: usize = 1 << 28;

/// Default initially committed bytes per stack segment (64 KiB).
pub const DEFAULT_SEGMENT_COMMIT: usize = 64 * 1024;

/// Stack segment configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentConfig {
    /// Total address-space reservation per segment, in bytes.
    pub reserve: usize,
    /// Bytes committed when a segment is created.
    pub commit: usize,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            reserve: DEFAULT_SEGMENT_RESERVE,
            commit: DEFAULT_SEGMENT_COMMIT,
        }
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Stack segment sizing.
    pub segment: SegmentConfig,
    /// Minimum log level.
    pub log_level: LogLevel,
    /// Whether `run` verifies the allocator balance on exit.
    pub leak_check: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            segment: SegmentConfig::default(),
            log_level: LogLevel::Warn,
            leak_check: false,
        }
    }
}

impl RuntimeConfig {
    /// Create a new builder.
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::new()
    }

    /// Load configuration from `SABLE_*` environment variables.
    ///
    /// Unset or unparsable variables fall back to their defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(reserve) = env_usize("SABLE_SEGMENT_RESERVE") {
            config.segment.reserve = reserve;
        }
        if let Some(commit) = env_usize("SABLE_SEGMENT_COMMIT") {
            config.segment.commit = commit;
        }
        if let Ok(level) = env::var("SABLE_LOG_LEVEL") {
            if let Some(level) = LogLevel::parse(&level) {
                config.log_level = level;
            }
        }
        if let Ok(value) = env::var("SABLE_LEAK_CHECK") {
            config.leak_check = matches!(value.as_str(), "1" | "true" | "yes");
        }

        config
    }
}

fn env_usize(name: &str) -> Option<usize> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Error produced by builder validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The segment reservation is too small to hold a sentinel frame.
    ReserveTooSmall(usize),
    /// The initial commit exceeds the reservation.
    CommitExceedsReserve {
        /// Requested commit size.
        commit: usize,
        /// Configured reservation.
        reserve: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ReserveTooSmall(n) => {
                write!(f, "segment reservation of {} bytes is too small", n)
            }
            ConfigError::CommitExceedsReserve { commit, reserve } => {
                write!(
                    f,
                    "segment commit ({} bytes) exceeds reservation ({} bytes)",
                    commit, reserve
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Builder for [`RuntimeConfig`].
#[derive(Debug, Clone)]
pub struct RuntimeConfigBuilder {
    config: RuntimeConfig,
}

impl RuntimeConfigBuilder {
    /// Create a builder initialized with defaults.
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
        }
    }

    /// Set the per-segment address-space reservation.
    pub fn segment_reserve(mut self, bytes: usize) -> Self {
        self.config.segment.reserve = bytes;
        self
    }

    /// Set the initially committed bytes per segment.
    pub fn segment_commit(mut self, bytes: usize) -> Self {
        self.config.segment.commit = bytes;
        self
    }

    /// Set the minimum log level.
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.log_level = level;
        self
    }

    /// Enable or disable the exit-time allocator balance check.
    pub fn leak_check(mut self, enabled: bool) -> Self {
        self.config.leak_check = enabled;
        self
    }

    /// Validate and produce the configuration.
    pub fn build(self) -> Result<RuntimeConfig, ConfigError> {
        let segment = self.config.segment;
        // A segment must at least hold a frame header and a few locals.
        if segment.reserve < 4096 {
            return Err(ConfigError::ReserveTooSmall(segment.reserve));
        }
        if segment.commit > segment.reserve {
            return Err(ConfigError::CommitExceedsReserve {
                commit: segment.commit,
                reserve: segment.reserve,
            });
        }
        Ok(self.config)
    }
}

impl Default for RuntimeConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Installed process-wide configuration.
static RUNTIME_CONFIG: OnceLock<RuntimeConfig> = OnceLock::new();

/// Install a configuration. The first installation wins; later calls are
/// ignored (segments created before a late install would already have the
/// earlier sizing baked in).
pub fn install(config: RuntimeConfig) {
    let _ = RUNTIME_CONFIG.set(config);
}

/// Get the installed configuration, installing one from the environment on
/// first use.
pub fn runtime_config() -> &'static RuntimeConfig {
    RUNTIME_CONFIG.get_or_init(RuntimeConfig::from_env)
}
