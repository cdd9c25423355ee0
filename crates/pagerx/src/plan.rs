//! Per-channel signal-chain parameter derivation
//!
//! Each monitored channel is cut out of the wideband stream by the same
//! chain: frequency translation with a low-pass channel filter and fixed
//! decimation, FM discrimination, rational resampling down to the
//! decoder's native audio rate, and quantization to signed 16-bit PCM.
//! This module derives every number that chain needs from the wideband
//! sample rate; the chain itself is executed elsewhere.

use crate::config::{ChannelPlanConfig, ConfigError};

/// Decoder native audio rate (Hz)
pub const AUDIO_RATE: u32 = 22_050;

/// Fixed decimation from the wideband rate to the channel rate
pub const CHANNEL_DECIMATION: u32 = 20;

/// Nominal peak FM deviation for this paging band (Hz)
pub const MAX_DEVIATION: f64 = 4_500.0;

/// Channel filter cutoff (Hz)
pub const CHANNEL_BANDWIDTH: f64 = 12_500.0;

/// Channel filter transition width (Hz)
pub const TRANSITION_WIDTH: f64 = 3_000.0;

/// Full-scale factor for float to i16 audio conversion
///
/// About half of `i16::MAX`, the same headroom rtl_fm leaves.
pub const AUDIO_SCALE: f64 = 16_384.0;

/// Derived signal-chain parameters for one channel
///
/// All fields are functions of the wideband sample rate and the fixed
/// band constants above; none depend on a channel's offset. The
/// resample ratio is always reduced to lowest terms.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChannelPlan {
    /// Wideband-to-channel decimation factor
    pub decimation: u32,

    /// Channel sample rate after decimation (Hz)
    pub channel_rate: u32,

    /// Resampler interpolation factor (numerator of audio/channel rate)
    pub resample_interp: u32,

    /// Resampler decimation factor (denominator of audio/channel rate)
    pub resample_decim: u32,

    /// Discriminator gain: channel_rate / (2π × peak deviation)
    pub demod_gain: f64,

    /// Channel filter cutoff (Hz)
    pub filter_cutoff: f64,

    /// Channel filter transition width (Hz)
    pub transition_width: f64,
}

impl ChannelPlan {
    /// Derive the chain parameters for a wideband source at `sample_rate` Hz
    pub fn for_rate(sample_rate: u32) -> Result<Self, ConfigError> {
        if sample_rate == 0 || sample_rate % CHANNEL_DECIMATION != 0 {
            return Err(ConfigError::IndivisibleRate {
                rate: sample_rate,
                decimation: CHANNEL_DECIMATION,
            });
        }
        let channel_rate = sample_rate / CHANNEL_DECIMATION;

        let divisor = gcd(AUDIO_RATE, channel_rate);
        let demod_gain = channel_rate as f64 / (2.0 * std::f64::consts::PI * MAX_DEVIATION);

        Ok(Self {
            decimation: CHANNEL_DECIMATION,
            channel_rate,
            resample_interp: AUDIO_RATE / divisor,
            resample_decim: channel_rate / divisor,
            demod_gain,
            filter_cutoff: CHANNEL_BANDWIDTH,
            transition_width: TRANSITION_WIDTH,
        })
    }
}

/// Derive one plan per configured channel
///
/// Pure; the only failure modes are an empty channel list and a
/// wideband rate the fixed decimation cannot divide. Offsets are taken
/// on faith: callers own keeping channels inside the captured bandwidth.
pub fn plan_channels(config: &ChannelPlanConfig) -> Result<Vec<ChannelPlan>, ConfigError> {
    if config.channels.is_empty() {
        return Err(ConfigError::NoChannels);
    }
    let plan = ChannelPlan::for_rate(config.sample_rate)?;
    Ok(vec![plan; config.channels.len()])
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}
