// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Layered configuration: built-in defaults, overridden by an optional TOML
//! file, overridden by `SIDECAR_`-prefixed environment variables.

use std::path::PathBuf;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

fn default_bind_address() -> String {
    "127.0.0.1:8088".to_string()
}

const fn default_max_body_bytes() -> usize {
    16 * 1024 * 1024
}

fn default_cors_origins() -> Vec<String> {
    Vec::new()
}

/// HTTP server bind address, body size limit, and CORS allowlist.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Exact origins allowed to make cross-origin requests. Empty = same-origin only.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            max_body_bytes: default_max_body_bytes(),
            cors_origins: default_cors_origins(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("/tmp/sidecar-recordings")
}

const fn default_frame_rate() -> u32 {
    15
}

const fn default_display_index() -> u32 {
    0
}

const fn default_max_size_mb() -> u64 {
    512
}

/// Recorder defaults, overridable per-session by request body fields.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RecorderConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_frame_rate")]
    pub default_frame_rate: u32,
    #[serde(default = "default_display_index")]
    pub default_display_index: u32,
    #[serde(default = "default_max_size_mb")]
    pub default_max_size_mb: u64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            default_frame_rate: default_frame_rate(),
            default_display_index: default_display_index(),
            default_max_size_mb: default_max_size_mb(),
        }
    }
}

fn default_debugger_url() -> String {
    "ws://127.0.0.1:9222".to_string()
}

/// DOM-sync debugger connection.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DomSyncConfig {
    #[serde(default = "default_debugger_url")]
    pub debugger_url: String,
}

impl Default for DomSyncConfig {
    fn default() -> Self {
        Self { debugger_url: default_debugger_url() }
    }
}

fn default_video_device() -> String {
    "/dev/video10".to_string()
}

fn default_audio_sink() -> String {
    "sidecar_mic".to_string()
}

/// Virtual camera / virtual microphone device targets.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VirtualMediaConfig {
    #[serde(default = "default_video_device")]
    pub video_device: String,
    #[serde(default = "default_audio_sink")]
    pub audio_sink: String,
}

impl Default for VirtualMediaConfig {
    fn default() -> Self {
        Self { video_device: default_video_device(), audio_sink: default_audio_sink() }
    }
}

fn default_fspipe_listen_address() -> String {
    "127.0.0.1:8089".to_string()
}

fn default_fspipe_root() -> PathBuf {
    PathBuf::from("/tmp/sidecar-fspipe")
}

const fn default_fspipe_capacity() -> usize {
    1000
}

const fn default_fspipe_ack_timeout_s() -> u64 {
    30
}

const fn default_fspipe_max_retries() -> u32 {
    3
}

/// FsPipe listener and outbound-queue tuning.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FsPipeConfig {
    #[serde(default = "default_fspipe_listen_address")]
    pub listen_address: String,
    #[serde(default = "default_fspipe_root")]
    pub root_dir: PathBuf,
    #[serde(default = "default_fspipe_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_fspipe_ack_timeout_s")]
    pub ack_timeout_s: u64,
    #[serde(default = "default_fspipe_max_retries")]
    pub max_retries: u32,
}

impl Default for FsPipeConfig {
    fn default() -> Self {
        Self {
            listen_address: default_fspipe_listen_address(),
            root_dir: default_fspipe_root(),
            queue_capacity: default_fspipe_capacity(),
            ack_timeout_s: default_fspipe_ack_timeout_s(),
            max_retries: default_fspipe_max_retries(),
        }
    }
}

/// Log level for console/file output.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    #[default]
    Info,
    Debug,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

/// Console/file logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LogConfig {
    #[serde(default = "default_true")]
    pub console_enable: bool,
    #[serde(default)]
    pub file_enable: bool,
    #[serde(default)]
    pub console_level: LogLevel,
    #[serde(default)]
    pub file_level: LogLevel,
    #[serde(default = "default_log_file_path")]
    pub file_path: String,
}

const fn default_true() -> bool {
    true
}

fn default_log_file_path() -> String {
    "./sidecar.log".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_enable: true,
            file_enable: false,
            console_level: LogLevel::default(),
            file_level: LogLevel::Info,
            file_path: default_log_file_path(),
        }
    }
}

/// Root configuration for the sidecar process.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub recorder: RecorderConfig,
    #[serde(default)]
    pub domsync: DomSyncConfig,
    #[serde(default)]
    pub virtual_media: VirtualMediaConfig,
    #[serde(default)]
    pub fspipe: FsPipeConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Outcome of [`load`]: the resolved config plus whether the file it was
/// asked to read was actually present.
#[derive(Debug)]
pub struct ConfigLoadResult {
    pub config: Config,
    pub file_missing: Option<String>,
}

/// Loads configuration from built-in defaults, an optional TOML file, and
/// `SIDECAR_`-prefixed environment variables (double underscore nests, e.g.
/// `SIDECAR_SERVER__BIND_ADDRESS`).
///
/// # Errors
/// Returns an error if the file exists but is not valid TOML, or if an
/// environment variable holds a value that does not match its field's type.
pub fn load(config_path: &str) -> Result<ConfigLoadResult, Box<figment::Error>> {
    let mut figment = Figment::new().merge(figment::providers::Serialized::defaults(Config::default()));

    let mut file_missing = None;
    if std::path::Path::new(config_path).exists() {
        figment = figment.merge(Toml::file(config_path));
    } else {
        file_missing = Some(config_path.to_string());
    }

    let config: Config = figment.merge(Env::prefixed("SIDECAR_").split("__")).extract().map_err(Box::new)?;
    Ok(ConfigLoadResult { config, file_missing })
}

/// Renders the default configuration as a pretty-printed TOML document.
///
/// # Errors
/// Returns an error if the default configuration cannot be serialized; this
/// would indicate a programming error, not a runtime condition.
pub fn generate_default() -> Result<String, toml::ser::Error> {
    toml::to_string_pretty(&Config::default())
}
