//! Channel-plan configuration
//!
//! The station refuses to run without a channel plan: a JSON document
//! giving the wideband tuning and the list of narrowband channels to
//! monitor. A minimal plan looks like
//!
//! ```json
//! {
//!   "center_freq": 929612500,
//!   "sample_rate": 1000000,
//!   "channels": [
//!     {"name": "Hospital", "offset_hz": -187500, "protocols": ["POCSAG1200", "FLEX"]}
//!   ]
//! }
//! ```

use serde::Deserialize;
use thiserror::Error;

/// Error loading or validating the channel plan
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The document is not valid JSON or is missing required keys
    #[error("invalid channel plan: {0}")]
    Parse(#[from] serde_json::Error),

    /// The plan contains no channels at all
    #[error("invalid channel plan: no channels defined")]
    NoChannels,

    /// The wideband rate cannot be channelized by the fixed decimation
    #[error("invalid channel plan: sample rate {rate} Hz is not divisible by {decimation}")]
    IndivisibleRate { rate: u32, decimation: u32 },
}

/// Wideband tuning plus the channels carved out of it
///
/// Loaded once at startup and immutable for the life of the process.
#[derive(Clone, Debug, Deserialize)]
pub struct ChannelPlanConfig {
    /// Receiver center frequency (Hz)
    pub center_freq: f64,

    /// Wideband sample rate (Hz)
    pub sample_rate: u32,

    /// Channels to monitor, at least one
    pub channels: Vec<ChannelConfig>,
}

/// One narrowband channel
#[derive(Clone, Debug, Deserialize)]
pub struct ChannelConfig {
    /// Unique human-readable label, used in source tags and log lines
    pub name: String,

    /// Offset from the wideband center frequency (Hz, signed)
    pub offset_hz: f64,

    /// Decoder demodulators to enable, in order ("POCSAG1200", "FLEX", ...)
    pub protocols: Vec<String>,
}

impl ChannelPlanConfig {
    /// Parse a channel plan from JSON text
    ///
    /// An empty channel list is rejected here, before any hardware or
    /// subprocess is touched.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        if config.channels.is_empty() {
            return Err(ConfigError::NoChannels);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = r#"{
        "center_freq": 929612500,
        "sample_rate": 1000000,
        "channels": [
            {"name": "Hospital", "offset_hz": -187500, "protocols": ["POCSAG1200", "FLEX"]},
            {"name": "Wide Area", "offset_hz": 250000, "protocols": ["FLEX"]}
        ]
    }"#;

    #[test]
    fn parses_a_full_plan() {
        let config = ChannelPlanConfig::from_json(PLAN).unwrap();
        assert_eq!(config.sample_rate, 1_000_000);
        assert_eq!(config.channels.len(), 2);
        assert_eq!(config.channels[0].name, "Hospital");
        assert_eq!(config.channels[0].offset_hz, -187_500.0);
        assert_eq!(config.channels[1].protocols, vec!["FLEX".to_string()]);
    }

    #[test]
    fn rejects_missing_keys() {
        let err = ChannelPlanConfig::from_json(r#"{"center_freq": 1}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_empty_channel_list() {
        let err = ChannelPlanConfig::from_json(
            r#"{"center_freq": 929612500, "sample_rate": 1000000, "channels": []}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::NoChannels));
    }
}
