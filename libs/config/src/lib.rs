//! Decoder Configuration
//!
//! Loads [`DecoderConfig`] from built-in defaults, an optional TOML file and `CTF_`-prefixed
//! environment variables, in that order of precedence (later layers win).
//!
//! ```toml
//! emit_lost_events = true
//! verify_magic = true
//! verify_uuid = false
//! verify_stream_id = true
//! max_packet_size = 268435456
//! max_sequence_length = 1048576
//! log_level = "debug"
//! ```

pub mod logging;

use anyhow::{Context, Result};
use config_crate::{Config, Environment, File, FileFormat};
use ctf_codec::{ReaderOptions, DEFAULT_MAX_PACKET_SIZE, DEFAULT_MAX_SEQUENCE_LENGTH};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub use logging::init_logging;

/// Environment variable prefix, e.g. `CTF_VERIFY_UUID=false`
pub const ENV_PREFIX: &str = "CTF";

/// Settings of the stream decoder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Produce lost-event records when a packet's discarded counter grows
    pub emit_lost_events: bool,
    pub verify_magic: bool,
    pub verify_uuid: bool,
    pub verify_stream_id: bool,
    /// Largest accepted packet, in bytes
    pub max_packet_size: u64,
    /// Zero-size array/sequence elements one event may produce
    pub max_sequence_length: u64,
    pub log_level: String,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            emit_lost_events: true,
            verify_magic: true,
            verify_uuid: true,
            verify_stream_id: true,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            max_sequence_length: DEFAULT_MAX_SEQUENCE_LENGTH,
            log_level: "info".to_string(),
        }
    }
}

impl DecoderConfig {
    /// Load configuration: defaults, then the TOML file at `path` (if any), then
    /// environment variables. `path` may contain `~` and `$VARS`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = toml::to_string(&Self::default()).context("Failed to encode defaults")?;
        let mut builder =
            Config::builder().add_source(File::from_str(&defaults, FileFormat::Toml));

        if let Some(path) = path {
            let path = expand_path(path)?;
            info!("Loading decoder config: {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        let config: Self = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        debug!("Decoder config: {:?}", config);
        Ok(config)
    }

    /// Parse a TOML document on top of the defaults, ignoring the environment
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse decoder config")
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to encode decoder config")
    }

    /// Options handed to the stream reader
    pub fn reader_options(&self) -> ReaderOptions {
        ReaderOptions {
            emit_lost_events: self.emit_lost_events,
            verify_magic: self.verify_magic,
            verify_uuid: self.verify_uuid,
            verify_stream_id: self.verify_stream_id,
            max_packet_size: self.max_packet_size,
            max_sequence_length: self.max_sequence_length,
        }
    }
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::full(&raw)
        .with_context(|| format!("Failed to expand config path {raw}"))?;
    Ok(PathBuf::from(expanded.as_ref()))
}
