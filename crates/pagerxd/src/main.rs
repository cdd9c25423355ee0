use anyhow::Context;
use clap::Parser;
use log::LevelFilter;

use pagerx::ChannelPlanConfig;

mod app;
mod cli;
mod decoder;
mod engine;
mod store;

use cli::{Args, CliError};

fn main() {
    match pagerxd() {
        Ok(()) => {}
        Err(cli_error) => cli_error.exit(),
    }
}

fn pagerxd() -> Result<(), CliError> {
    // Parse options and start logging
    let args = Args::try_parse()?;
    log_setup(&args);

    // the channel plan is mandatory; refuse to start without it
    let text = std::fs::read_to_string(&args.channels).with_context(|| {
        format!(
            "unable to read channel plan \"{}\" (set --channels or CHANNELS_FILE)",
            args.channels.display()
        )
    })?;
    let config = ChannelPlanConfig::from_json(&text)
        .with_context(|| format!("channel plan \"{}\" is invalid", args.channels.display()))?;
    let plans = pagerx::plan_channels(&config).context("channel plan is not realizable")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("unable to start async runtime")?;
    runtime.block_on(app::run(args, config, plans))?;

    Ok(())
}

fn log_setup(args: &Args) {
    if std::env::var_os("RUST_LOG").is_none() {
        // parameter controls
        let log_filter = match args.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        pretty_env_logger::formatted_builder()
            .filter_module("pagerx", log_filter)
            .filter_module("pagerxd", log_filter)
            .init();
    } else {
        // environment controls
        pretty_env_logger::init();
    }
}
