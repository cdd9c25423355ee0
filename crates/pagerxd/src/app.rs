//! Startup sequencing, run loop, and graceful shutdown
//!
//! The daemon moves through four phases, strictly in order:
//!
//! ```txt
//!   starting ==> running ==> stopping ==> stopped
//!      ||           ||
//!      ||           ||<== stats tick, every --stats-interval
//!      \/           \/
//!   store retry   SIGINT / SIGTERM
//! ```
//!
//! `starting` waits for the page store (retrying forever, unless
//! shutdown is requested first), ensures the schema, spawns one
//! decoder per channel (any spawn failure is fatal), and hands the
//! signal chains to the engine. `running` idles, logging per-channel
//! stats on a fixed interval. `stopping` halts the sample producer
//! before tearing down decoders, so no chain ever writes into a
//! closed sink, then drains the ingest queue.
//!
//! Shutdown is a watch-channel token flipped by the signal watcher
//! and observed at every wait point; nothing polls a global flag.

use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, watch};
use tokio::time::{self, MissedTickBehavior};

use pagerx::{ChannelPlan, ChannelPlanConfig, PageEvent, SpamFilter, AUDIO_RATE};

use crate::cli::Args;
use crate::decoder::DecoderProcess;
use crate::engine::{build_chains, EngineConfig, PcmPipeBackend, SignalBackend};
use crate::store::PageStore;

/// Fixed delay between store connection attempts
const STORE_RETRY: Duration = Duration::from_secs(2);

/// Run the daemon to completion
pub async fn run(args: Args, config: ChannelPlanConfig, plans: Vec<ChannelPlan>) -> Result<()> {
    let mut shutdown = shutdown_token()?;

    info!(
        "pagerxd starting: centre {:.3} MHz, {} Hz wideband, {} channels",
        config.center_freq / 1e6,
        config.sample_rate,
        config.channels.len()
    );
    if let Some(plan) = plans.first() {
        info!(
            "dsp: channel rate {} Hz, audio rate {AUDIO_RATE} Hz, demod gain {:.3}, resample {}/{}",
            plan.channel_rate, plan.demod_gain, plan.resample_interp, plan.resample_decim
        );
    }

    // starting: nothing may produce pages until the store is up
    let Some(store) = connect_store(&args, shutdown.clone()).await else {
        info!("shutdown requested before the page store became ready");
        return Ok(());
    };
    store.ensure_schema().await?;

    let (events_tx, events_rx) = mpsc::channel(256);
    let mut decoders = Vec::with_capacity(config.channels.len());
    for channel in &config.channels {
        let decoder = DecoderProcess::start(
            &args.decoder,
            &channel.name,
            &channel.protocols,
            events_tx.clone(),
        )
        .with_context(|| format!("channel \"{}\" failed to start", channel.name))?;
        decoders.push(decoder);
    }
    // the reader tasks hold the only senders from here on, so the
    // ingest task ends exactly when the last decoder does
    drop(events_tx);

    let spam = SpamFilter::new(args.discard_spam);
    let ingest = tokio::spawn(ingest(events_rx, spam, store.clone()));

    let mut backend = PcmPipeBackend::new(
        args.audio_dir.clone(),
        EngineConfig {
            center_freq: config.center_freq,
            sample_rate: config.sample_rate,
            device: args.device.clone(),
        },
    );
    build_chains(&mut backend, &config, &plans, &mut decoders)?;
    backend.start()?;

    // running
    run_until_shutdown(&mut shutdown, &mut decoders, args.stats_interval).await;

    // stopping: samples first, then decoders, then the ingest drain
    info!("shutting down");
    backend.stop();
    for decoder in decoders {
        decoder.stop().await;
    }
    if let Err(err) = ingest.await {
        warn!("ingest task failed: {err}");
    }
    info!("pagerxd stopped");
    Ok(())
}

/// Apply the spam filter and persist every surviving event
async fn ingest(mut events: mpsc::Receiver<PageEvent>, spam: SpamFilter, store: PageStore) {
    while let Some(event) = events.recv().await {
        if !spam.accept(&event.content) {
            debug!("discarding spam from {}: {}", event.source, event.content);
            continue;
        }
        store.store(event).await;
    }
}

/// Idle until shutdown, reporting channel stats on a fixed interval
async fn run_until_shutdown(
    shutdown: &mut Shutdown,
    decoders: &mut [DecoderProcess],
    stats_interval: u64,
) {
    let mut ticker = time::interval(Duration::from_secs(stats_interval.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // the first tick completes immediately
    ticker.tick().await;

    info!("running, waiting for pages");
    loop {
        tokio::select! {
            _ = shutdown.requested() => break,
            _ = ticker.tick() => {
                for decoder in decoders.iter_mut() {
                    decoder.log_stats();
                }
            }
        }
    }
}

/// Retry the store connection forever with a fixed backoff
///
/// Returns `None` only when shutdown is requested before the store
/// becomes reachable.
async fn connect_store(args: &Args, mut shutdown: Shutdown) -> Option<PageStore> {
    let db = args.db.clone();
    loop {
        let path = db.clone();
        match tokio::task::spawn_blocking(move || PageStore::connect(path)).await {
            Ok(Ok(store)) => {
                info!("page store ready at {}", db.display());
                return Some(store);
            }
            Ok(Err(err)) => warn!("page store not ready: {err}"),
            Err(err) => warn!("page store connect task failed: {err}"),
        }
        tokio::select! {
            _ = time::sleep(STORE_RETRY) => {}
            _ = shutdown.requested() => return None,
        }
    }
}

/// Cooperative shutdown token
///
/// Clones share one underlying flag; [`requested`](Shutdown::requested)
/// resolves once the signal watcher flips it.
#[derive(Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Wait until shutdown is requested
    pub async fn requested(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                // watcher gone; treat as shutdown rather than hang
                break;
            }
        }
    }
}

/// Install the SIGINT/SIGTERM watcher and hand out its token
fn shutdown_token() -> Result<Shutdown> {
    let (tx, rx) = watch::channel(false);
    let mut term = signal(SignalKind::terminate()).context("unable to watch SIGTERM")?;
    let mut int = signal(SignalKind::interrupt()).context("unable to watch SIGINT")?;
    tokio::spawn(async move {
        tokio::select! {
            _ = term.recv() => info!("SIGTERM received, shutting down"),
            _ = int.recv() => info!("SIGINT received, shutting down"),
        }
        let _ = tx.send(true);
    });
    Ok(Shutdown { rx })
}
