//! Configuration module
//!
//! TOML configuration covering capture, home networks, flow expiry,
//! detection, response policy, logging, and performance tuning. The
//! detection threshold is additionally exposed through [`SharedConfig`]
//! so the control surface can update it at runtime.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::Deserialize;

use crate::error::DetectError;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub capture: CaptureConfig,
    #[serde(default)]
    pub networks: NetworksConfig,
    #[serde(default)]
    pub flow: FlowConfig,
    pub detection: DetectionConfig,
    #[serde(default)]
    pub response: ResponseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
}

/// Capture settings
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    /// Network interface to monitor
    pub interface: String,

    /// Maximum bytes captured per frame
    #[serde(default = "default_snaplen")]
    pub snaplen: usize,

    /// Put the interface into promiscuous mode
    #[serde(default)]
    pub promiscuous: bool,
}

/// Home network definition, used only for traffic-direction accounting
#[derive(Debug, Clone, Deserialize, Default)]
pub struct NetworksConfig {
    /// CIDR blocks considered local
    #[serde(default)]
    pub home_net: Vec<String>,
}

/// Flow table expiry behavior (all values in seconds)
#[derive(Debug, Clone, Deserialize)]
pub struct FlowConfig {
    #[serde(default = "default_tcp_timeout")]
    pub tcp_timeout: u64,
    #[serde(default = "default_udp_timeout")]
    pub udp_timeout: u64,
    #[serde(default = "default_max_flows")]
    pub max_flows: usize,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
}

/// Inference parameters
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Serialized classifier graph
    pub model_path: String,

    /// ONNX Runtime shared library loaded at startup
    #[serde(default)]
    pub ort_lib_path: String,

    /// Standardization parameters (mean/scale/feature_names)
    pub scaler_path: String,

    /// Class label list; empty means the built-in six-class map
    #[serde(default)]
    pub label_map_path: String,

    /// Minimum confidence for a non-benign prediction to raise an event
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    #[serde(default = "default_suspicious_threshold")]
    pub suspicious_threshold: f64,
    #[serde(default = "default_suspicious_count_limit")]
    pub suspicious_count_limit: u32,
}

/// Response policy. Enforcement itself lives outside the core; these
/// options are validated and handed to the event consumer.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseConfig {
    #[serde(default)]
    pub enable_block: bool,
    #[serde(default = "default_block_duration")]
    pub block_duration: u64,
    #[serde(default)]
    pub whitelist: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,

    /// "stdout", "file", or "both"
    #[serde(default = "default_log_output")]
    pub output: String,

    #[serde(default = "default_log_file")]
    pub file_path: String,

    /// Rotation knobs (MB / count / days)
    #[serde(default = "default_log_max_size")]
    pub max_size: u64,
    #[serde(default = "default_log_max_backups")]
    pub max_backups: u32,
    #[serde(default = "default_log_max_age")]
    pub max_age: u32,
}

/// Worker counts and queue sizing
#[derive(Debug, Clone, Deserialize)]
pub struct PerformanceConfig {
    #[serde(default = "default_decoder_workers")]
    pub decoder_workers: usize,
    #[serde(default = "default_feature_workers")]
    pub feature_workers: usize,
    #[serde(default = "default_packet_queue_size")]
    pub packet_queue_size: usize,
}

// Default value functions
fn default_snaplen() -> usize { 65535 }
fn default_tcp_timeout() -> u64 { 60 }
fn default_udp_timeout() -> u64 { 30 }
fn default_max_flows() -> usize { 100_000 }
fn default_cleanup_interval() -> u64 { 10 }
fn default_threshold() -> f64 { 0.8 }
fn default_suspicious_threshold() -> f64 { 0.6 }
fn default_suspicious_count_limit() -> u32 { 3 }
fn default_block_duration() -> u64 { 3600 }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "pretty".to_string() }
fn default_log_output() -> String { "stdout".to_string() }
fn default_log_file() -> String { "logs/flowwarden.log".to_string() }
fn default_log_max_size() -> u64 { 100 }
fn default_log_max_backups() -> u32 { 5 }
fn default_log_max_age() -> u32 { 30 }
fn default_decoder_workers() -> usize { 4 }
fn default_feature_workers() -> usize { 2 }
fn default_packet_queue_size() -> usize { 10_000 }

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            tcp_timeout: default_tcp_timeout(),
            udp_timeout: default_udp_timeout(),
            max_flows: default_max_flows(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            enable_block: false,
            block_duration: default_block_duration(),
            whitelist: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            output: default_log_output(),
            file_path: default_log_file(),
            max_size: default_log_max_size(),
            max_backups: default_log_max_backups(),
            max_age: default_log_max_age(),
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            decoder_workers: default_decoder_workers(),
            feature_workers: default_feature_workers(),
            packet_queue_size: default_packet_queue_size(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        toml::from_str(&content)
            .with_context(|| "Failed to parse configuration")
    }

    /// Validate the configuration. Failures here are fatal at startup.
    pub fn validate(&self) -> Result<()> {
        if self.capture.interface.is_empty() {
            anyhow::bail!("capture.interface cannot be empty");
        }
        if self.capture.snaplen < 64 || self.capture.snaplen > 65535 {
            anyhow::bail!("capture.snaplen must be between 64 and 65535");
        }

        for cidr in &self.networks.home_net {
            cidr.parse::<ipnetwork::IpNetwork>()
                .map_err(|e| anyhow::anyhow!("networks.home_net entry '{}' is not a valid CIDR: {}", cidr, e))?;
        }

        if self.flow.tcp_timeout == 0 {
            anyhow::bail!("flow.tcp_timeout must be greater than 0");
        }
        if self.flow.udp_timeout == 0 {
            anyhow::bail!("flow.udp_timeout must be greater than 0");
        }
        if self.flow.max_flows == 0 {
            anyhow::bail!("flow.max_flows must be greater than 0");
        }
        if self.flow.cleanup_interval == 0 {
            anyhow::bail!("flow.cleanup_interval must be greater than 0");
        }

        if self.detection.model_path.is_empty() {
            anyhow::bail!("detection.model_path cannot be empty");
        }
        if self.detection.scaler_path.is_empty() {
            anyhow::bail!("detection.scaler_path cannot be empty");
        }
        if self.detection.threshold <= 0.0 || self.detection.threshold > 1.0 {
            anyhow::bail!("detection.threshold must be within (0, 1]");
        }
        if self.detection.suspicious_threshold <= 0.0 || self.detection.suspicious_threshold > 1.0 {
            anyhow::bail!("detection.suspicious_threshold must be within (0, 1]");
        }

        match self.logging.format.as_str() {
            "pretty" | "json" => {}
            other => anyhow::bail!("logging.format must be 'pretty' or 'json', got '{}'", other),
        }
        match self.logging.output.as_str() {
            "stdout" | "file" | "both" => {}
            other => anyhow::bail!("logging.output must be 'stdout', 'file' or 'both', got '{}'", other),
        }
        if self.logging.output != "stdout" && self.logging.file_path.is_empty() {
            anyhow::bail!("logging.file_path cannot be empty when logging to a file");
        }

        if self.performance.decoder_workers == 0 {
            anyhow::bail!("performance.decoder_workers must be greater than 0");
        }
        if self.performance.feature_workers == 0 {
            anyhow::bail!("performance.feature_workers must be greater than 0");
        }
        if self.performance.packet_queue_size < 64 {
            anyhow::bail!("performance.packet_queue_size must be at least 64");
        }

        Ok(())
    }
}

/// Shared, hot-updatable configuration snapshot.
///
/// The detection worker reads the threshold through this handle on every
/// decision; the control surface writes it. Reads and writes are serialized
/// through a short lock so a torn value can never be observed.
#[derive(Clone)]
pub struct SharedConfig {
    inner: Arc<RwLock<Config>>,
}

impl SharedConfig {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Current detection threshold.
    pub fn detection_threshold(&self) -> f64 {
        self.inner.read().detection.threshold
    }

    /// Update the detection threshold. Values outside (0, 1] are rejected
    /// and leave the configuration untouched.
    pub fn update_threshold(&self, value: f64) -> Result<(), DetectError> {
        if value <= 0.0 || value > 1.0 {
            return Err(DetectError::ThresholdOutOfRange(value));
        }
        self.inner.write().detection.threshold = value;
        Ok(())
    }

    /// Clone of the full configuration.
    pub fn snapshot(&self) -> Config {
        self.inner.read().clone()
    }
}
