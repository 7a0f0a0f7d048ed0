//! # Sync Configuration
//!
//! Configuration for the synchronization engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     JOULE_REMOTE_URL=https://telemetry.example.com                     │
//! │     JOULE_UPLOAD_CADENCE="0 */5 * * * *"                               │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     Path passed by the composing binary (--config)                     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     Built-in cadences, batch size 100, 3 flush attempts                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # joule.toml
//! [remote]
//! base_url = "https://telemetry.example.com"
//! api_key = "gw-secret"
//!
//! [cycles]
//! collection = 60                   # fixed interval, seconds
//! upload = "0 */5 * * * *"          # cron, every 5 minutes
//! config_sync = "0 */30 * * * *"    # cron, every 30 minutes
//! sync_tick = 30                    # fixed interval, seconds
//!
//! [batcher]
//! batch_size = 100
//! flush_attempts = 3
//!
//! [monitor]
//! probe_interval_secs = 30
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Cadence
// =============================================================================

/// How often a registered cycle fires.
///
/// ## Cadence Semantics
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  INTERVAL (seconds)                 │  CRON (expression)                │
/// │  ──────────────────                 │  ─────────────────                │
/// │  • Re-armed after each run          │  • Wall-clock-aligned (UTC)       │
/// │    completes                        │  • "every 15 min on the quarter   │
/// │  • Never drifts into overlap        │    hour"                          │
/// │  • Long runs delay the next start   │  • A firing during a running      │
/// │                                     │    body is skipped and logged     │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
///
/// Cron expressions use the six-field form with seconds first
/// (`sec min hour day month weekday`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cadence {
    /// Fixed interval in seconds, re-armed after each completed run.
    IntervalSecs(u64),

    /// Wall-clock-aligned cron expression, evaluated against UTC.
    Cron(String),
}

impl Cadence {
    /// Validates that this cadence can actually be scheduled.
    pub fn validate(&self) -> SyncResult<()> {
        match self {
            Cadence::IntervalSecs(0) => Err(SyncError::InvalidCadence(
                "interval must be greater than 0 seconds".into(),
            )),
            Cadence::IntervalSecs(_) => Ok(()),
            Cadence::Cron(expr) => cron::Schedule::from_str(expr)
                .map(|_| ())
                .map_err(|e| SyncError::InvalidCadence(format!("'{expr}': {e}"))),
        }
    }
}

impl std::fmt::Display for Cadence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cadence::IntervalSecs(secs) => write!(f, "every {secs}s"),
            Cadence::Cron(expr) => write!(f, "cron '{expr}'"),
        }
    }
}

impl FromStr for Cadence {
    type Err = SyncError;

    /// Parses `"60"` as a fixed interval and anything else as a cron
    /// expression. Used for environment overrides.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cadence = match s.trim().parse::<u64>() {
            Ok(secs) => Cadence::IntervalSecs(secs),
            Err(_) => Cadence::Cron(s.trim().to_string()),
        };
        cadence.validate()?;
        Ok(cadence)
    }
}

// =============================================================================
// Remote Settings
// =============================================================================

/// Remote system-of-record connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Base URL of the remote API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key sent as `x-api-key` on every request (if set).
    #[serde(default)]
    pub api_key: Option<String>,

    /// Connection timeout (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Per-request timeout (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for RemoteSettings {
    fn default() -> Self {
        RemoteSettings {
            base_url: default_base_url(),
            api_key: None,
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl RemoteSettings {
    /// Connection timeout as a Duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Request timeout as a Duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// =============================================================================
// Cycle Settings
// =============================================================================

/// Cadences for the four cycles registered by the composing process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleSettings {
    /// Device-reading collection (short fixed interval by default).
    #[serde(default = "default_collection_cadence")]
    pub collection: Cadence,

    /// Reading upload to the remote (cron by default).
    #[serde(default = "default_upload_cadence")]
    pub upload: Cadence,

    /// Remote-to-local configuration sync (cron by default).
    #[serde(default = "default_config_sync_cadence")]
    pub config_sync: Cadence,

    /// Overarching data-sync orchestration tick (short fixed interval).
    #[serde(default = "default_sync_tick_cadence")]
    pub sync_tick: Cadence,
}

fn default_collection_cadence() -> Cadence {
    Cadence::IntervalSecs(60)
}

fn default_upload_cadence() -> Cadence {
    // Every 5 minutes, on the minute
    Cadence::Cron("0 */5 * * * *".to_string())
}

fn default_config_sync_cadence() -> Cadence {
    // Every 30 minutes, on the half hour
    Cadence::Cron("0 */30 * * * *".to_string())
}

fn default_sync_tick_cadence() -> Cadence {
    Cadence::IntervalSecs(30)
}

impl Default for CycleSettings {
    fn default() -> Self {
        CycleSettings {
            collection: default_collection_cadence(),
            upload: default_upload_cadence(),
            config_sync: default_config_sync_cadence(),
            sync_tick: default_sync_tick_cadence(),
        }
    }
}

// =============================================================================
// Batcher Settings
// =============================================================================

/// Delivery pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatcherSettings {
    /// Maximum readings per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Attempts per batch before it is reported failed.
    #[serde(default = "default_flush_attempts")]
    pub flush_attempts: u32,

    /// Timeout for a single flush attempt (seconds).
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,

    /// Initial backoff between flush attempts (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff between flush attempts (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Maximum backlog readings pulled from the store per batching pass.
    #[serde(default = "default_backlog_limit")]
    pub backlog_limit: u32,

    /// Failed delivery cycles after which a reading is dead-lettered
    /// (excluded from further batching passes, kept queryable).
    #[serde(default = "default_dead_letter_threshold")]
    pub dead_letter_threshold: i64,
}

fn default_batch_size() -> usize {
    100
}
fn default_flush_attempts() -> u32 {
    3
}
fn default_attempt_timeout() -> u64 {
    30
}
fn default_initial_backoff() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    5
}
fn default_backlog_limit() -> u32 {
    1000
}
fn default_dead_letter_threshold() -> i64 {
    5
}

impl Default for BatcherSettings {
    fn default() -> Self {
        BatcherSettings {
            batch_size: default_batch_size(),
            flush_attempts: default_flush_attempts(),
            attempt_timeout_secs: default_attempt_timeout(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            backlog_limit: default_backlog_limit(),
            dead_letter_threshold: default_dead_letter_threshold(),
        }
    }
}

impl BatcherSettings {
    /// Per-attempt timeout as a Duration.
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    /// Initial inter-attempt backoff as a Duration.
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Maximum inter-attempt backoff as a Duration.
    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

// =============================================================================
// Monitor Settings
// =============================================================================

/// Connectivity monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// Interval between reachability probes (seconds).
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,

    /// Timeout for a single probe (seconds).
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

fn default_probe_interval() -> u64 {
    30
}

fn default_probe_timeout() -> u64 {
    5
}

impl Default for MonitorSettings {
    fn default() -> Self {
        MonitorSettings {
            probe_interval_secs: default_probe_interval(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

impl MonitorSettings {
    /// Probe interval as a Duration.
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    /// Probe timeout as a Duration.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete engine configuration.
///
/// ## Example Config File
/// ```toml
/// [remote]
/// base_url = "https://telemetry.example.com"
/// api_key = "gw-secret"
/// request_timeout_secs = 30
///
/// [cycles]
/// collection = 60
/// upload = "0 */5 * * * *"
/// config_sync = "0 */30 * * * *"
/// sync_tick = 30
///
/// [batcher]
/// batch_size = 100
/// flush_attempts = 3
/// dead_letter_threshold = 5
///
/// [monitor]
/// probe_interval_secs = 30
/// probe_timeout_secs = 5
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Remote system-of-record settings.
    #[serde(default)]
    pub remote: RemoteSettings,

    /// Cadences for the four registered cycles.
    #[serde(default)]
    pub cycles: CycleSettings,

    /// Delivery pipeline settings.
    #[serde(default)]
    pub batcher: BatcherSettings,

    /// Connectivity monitor settings.
    #[serde(default)]
    pub monitor: MonitorSettings,
}

impl SyncConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (TOML)
    /// 3. Environment variables (`JOULE_*`)
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: &PathBuf) -> SyncResult<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(config_path, contents)?;

        info!(?config_path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if !self.remote.base_url.starts_with("http://")
            && !self.remote.base_url.starts_with("https://")
        {
            return Err(SyncError::InvalidUrl(format!(
                "Remote URL must start with http:// or https://, got: {}",
                self.remote.base_url
            )));
        }

        if self.batcher.batch_size == 0 {
            return Err(SyncError::InvalidConfig(
                "batch_size must be greater than 0".into(),
            ));
        }

        if self.batcher.flush_attempts == 0 {
            return Err(SyncError::InvalidConfig(
                "flush_attempts must be greater than 0".into(),
            ));
        }

        if self.batcher.dead_letter_threshold < 1 {
            return Err(SyncError::InvalidConfig(
                "dead_letter_threshold must be at least 1".into(),
            ));
        }

        if self.monitor.probe_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "probe_interval_secs must be greater than 0".into(),
            ));
        }

        self.cycles.collection.validate()?;
        self.cycles.upload.validate()?;
        self.cycles.config_sync.validate()?;
        self.cycles.sync_tick.validate()?;

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("JOULE_REMOTE_URL") {
            debug!(url = %url, "Overriding remote URL from environment");
            self.remote.base_url = url;
        }

        if let Ok(key) = std::env::var("JOULE_API_KEY") {
            self.remote.api_key = Some(key);
        }

        if let Ok(size) = std::env::var("JOULE_BATCH_SIZE") {
            if let Ok(n) = size.parse::<usize>() {
                self.batcher.batch_size = n;
            }
        }

        if let Ok(secs) = std::env::var("JOULE_PROBE_INTERVAL_SECS") {
            if let Ok(n) = secs.parse::<u64>() {
                self.monitor.probe_interval_secs = n;
            }
        }

        for (var, slot) in [
            ("JOULE_COLLECTION_CADENCE", &mut self.cycles.collection),
            ("JOULE_UPLOAD_CADENCE", &mut self.cycles.upload),
            ("JOULE_CONFIG_SYNC_CADENCE", &mut self.cycles.config_sync),
            ("JOULE_SYNC_TICK_CADENCE", &mut self.cycles.sync_tick),
        ] {
            if let Ok(raw) = std::env::var(var) {
                match raw.parse::<Cadence>() {
                    Ok(cadence) => {
                        debug!(var, cadence = %cadence, "Overriding cadence from environment");
                        *slot = cadence;
                    }
                    Err(e) => warn!(var, error = %e, "Ignoring invalid cadence in environment"),
                }
            }
        }
    }
}
