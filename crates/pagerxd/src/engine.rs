//! Signal-chain marshaling and the engine boundary
//!
//! The signal engine is an external collaborator: it owns the receiver
//! and runs, for every channel, a chain that translates the selected
//! offset to baseband with a low-pass channel filter and decimation,
//! FM-discriminates, resamples to the decoder audio rate, and
//! quantizes to signed 16-bit PCM. This module owns the other half of
//! that contract: deriving the [`ChainSpec`] each chain must implement
//! and binding the chain output to the right decoder's audio sink.
//!
//! [`PcmPipeBackend`] is the shipped [`SignalBackend`]: it reads each
//! channel's finished audio from `<dir>/<channel>.pcm` (a FIFO or file
//! the engine writes) and copies it into the decoder sink, logging the
//! full chain spec at startup so the engine can be configured to
//! match.

use std::path::PathBuf;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use tokio::process::ChildStdin;
use tokio::task::JoinHandle;

use pagerx::{ChannelConfig, ChannelPlan, ChannelPlanConfig, AUDIO_RATE, AUDIO_SCALE};

use crate::decoder::DecoderProcess;

/// Write end of one decoder's audio input
pub type AudioSink = ChildStdin;

/// Global engine parameters
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Receiver center frequency (Hz)
    pub center_freq: f64,

    /// Wideband sample rate (Hz)
    pub sample_rate: u32,

    /// Device selector, engine-specific
    pub device: Option<String>,
}

/// Everything one per-channel chain needs
///
/// The chain translates `offset_hz` to baseband while filtering to
/// `filter_cutoff` and decimating by `decimation`, discriminates FM
/// with `demod_gain`, resamples by `resample_interp/resample_decim`
/// to `audio_rate`, and quantizes with `audio_scale` as full scale
/// (clipping is the engine's business).
#[derive(Clone, Debug, PartialEq)]
pub struct ChainSpec {
    pub channel: String,
    pub offset_hz: f64,
    pub input_rate: u32,
    pub decimation: u32,
    pub channel_rate: u32,
    pub filter_cutoff: f64,
    pub transition_width: f64,
    pub demod_gain: f64,
    pub resample_interp: u32,
    pub resample_decim: u32,
    pub audio_rate: u32,
    pub audio_scale: f64,
}

impl ChainSpec {
    /// Marshal one channel's derived parameters for the engine
    pub fn new(config: &ChannelPlanConfig, channel: &ChannelConfig, plan: &ChannelPlan) -> Self {
        Self {
            channel: channel.name.clone(),
            offset_hz: channel.offset_hz,
            input_rate: config.sample_rate,
            decimation: plan.decimation,
            channel_rate: plan.channel_rate,
            filter_cutoff: plan.filter_cutoff,
            transition_width: plan.transition_width,
            demod_gain: plan.demod_gain,
            resample_interp: plan.resample_interp,
            resample_decim: plan.resample_decim,
            audio_rate: AUDIO_RATE,
            audio_scale: AUDIO_SCALE,
        }
    }
}

/// The signal engine boundary
///
/// Implementations own sample execution and scheduling. This crate
/// only hands over chain parameters and the audio sinks the chains
/// must feed; once started, the engine is an opaque producer until
/// [`stop`](SignalBackend::stop), which must release every sink.
pub trait SignalBackend: Send {
    /// Register one channel chain and bind its output to `sink`
    fn add_chain(&mut self, spec: ChainSpec, sink: AudioSink) -> Result<()>;

    /// Start producing samples into every bound sink
    fn start(&mut self) -> Result<()>;

    /// Stop producing and drop every sink, closing the decoder inputs
    fn stop(&mut self);
}

/// Build every channel's chain and bind it to its decoder
///
/// Takes each decoder's audio sink (exclusive ownership transfer) and
/// registers the chain with the backend. Decoders, channels, and plans
/// line up by index.
pub fn build_chains(
    backend: &mut dyn SignalBackend,
    config: &ChannelPlanConfig,
    plans: &[ChannelPlan],
    decoders: &mut [DecoderProcess],
) -> Result<()> {
    for ((channel, plan), decoder) in config
        .channels
        .iter()
        .zip(plans)
        .zip(decoders.iter_mut())
    {
        let sink = decoder.take_audio_sink().with_context(|| {
            format!(
                "audio sink for channel \"{}\" was already claimed",
                decoder.name()
            )
        })?;
        backend.add_chain(ChainSpec::new(config, channel, plan), sink)?;
    }
    Ok(())
}

/// Feeds decoders from per-channel PCM pipes
pub struct PcmPipeBackend {
    dir: PathBuf,
    engine: EngineConfig,
    chains: Vec<(ChainSpec, AudioSink)>,
    feeders: Vec<JoinHandle<()>>,
}

impl PcmPipeBackend {
    pub fn new(dir: PathBuf, engine: EngineConfig) -> Self {
        Self {
            dir,
            engine,
            chains: Vec::new(),
            feeders: Vec::new(),
        }
    }
}

impl SignalBackend for PcmPipeBackend {
    fn add_chain(&mut self, spec: ChainSpec, sink: AudioSink) -> Result<()> {
        self.chains.push((spec, sink));
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        info!(
            "engine: centre {:.3} MHz, {} Hz wideband, device {}",
            self.engine.center_freq / 1e6,
            self.engine.sample_rate,
            self.engine.device.as_deref().unwrap_or("default")
        );
        for (spec, sink) in self.chains.drain(..) {
            let path = self.dir.join(format!("{}.pcm", spec.channel));
            info!(
                "chain [{}]: {:.3} MHz ({:+.0} Hz), decimate {} to {} Hz, cutoff {:.0}/{:.0} Hz, \
                 gain {:.3}, resample {}/{} to {} Hz, scale {:.0}, audio from {}",
                spec.channel,
                (self.engine.center_freq + spec.offset_hz) / 1e6,
                spec.offset_hz,
                spec.decimation,
                spec.channel_rate,
                spec.filter_cutoff,
                spec.transition_width,
                spec.demod_gain,
                spec.resample_interp,
                spec.resample_decim,
                spec.audio_rate,
                spec.audio_scale,
                path.display()
            );
            self.feeders.push(tokio::spawn(feed(path, spec.channel, sink)));
        }
        Ok(())
    }

    fn stop(&mut self) {
        for feeder in &self.feeders {
            // dropping the task drops its sink, closing the decoder input
            feeder.abort();
        }
        self.feeders.clear();
        self.chains.clear();
    }
}

async fn feed(path: PathBuf, channel: String, mut sink: AudioSink) {
    // opening a FIFO parks here until the engine connects its write end
    let mut source = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(err) => {
            warn!("chain [{channel}]: cannot open {}: {err}", path.display());
            return;
        }
    };
    match tokio::io::copy(&mut source, &mut sink).await {
        Ok(bytes) => debug!("chain [{channel}]: audio source closed after {bytes} bytes"),
        Err(err) => warn!("chain [{channel}]: audio feed stopped: {err}"),
    }
}
