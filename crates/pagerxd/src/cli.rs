use std::fmt::Display;
use std::path::PathBuf;

use clap::{error::ErrorKind, CommandFactory, Parser};

const USAGE_SHORT: &str = r#"
This daemon monitors several paging channels from one wideband receiver. An external signal engine channelizes the capture and writes each channel's demodulated 16-bit PCM audio into <AUDIO_DIR>/<channel>.pcm; every channel gets its own multimon-ng decoder, and every decoded page is stored in a searchable database.

See --help for more details.
"#;

const USAGE_LONG: &str = r#"
This daemon monitors several paging channels from one wideband receiver.

The channel plan is a JSON file:

    {
      "center_freq": 929612500,
      "sample_rate": 1000000,
      "channels": [
        {"name": "Hospital", "offset_hz": -187500,
         "protocols": ["POCSAG512", "POCSAG1200", "FLEX"]}
      ]
    }

At startup the derived chain parameters for every channel are logged; configure the signal engine to match and point it at <AUDIO_DIR>/<channel>.pcm (a FIFO works well):

    mkfifo /run/pagerx/Hospital.pcm

Decoded pages land in an SQLite database with a full-text index over recipient and content. The store is created on first run and is safe to re-open.

Most options also read an environment variable, so the daemon can run unattended under a process supervisor with no arguments at all.
"#;

/// Top-level program arguments
#[derive(Parser, Clone, Debug)]
#[command(version)]
#[command(about, long_about = None)]
#[command(after_help = USAGE_SHORT, after_long_help = USAGE_LONG)]
#[command(max_term_width = 100)]
pub struct Args {
    /// Verbosity level (-vvv for more)
    #[arg(short, long, default_value_t = 0, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Channel plan file (JSON)
    #[arg(long, env = "CHANNELS_FILE", default_value = "channels.json")]
    pub channels: PathBuf,

    /// Page database file
    #[arg(long, env = "PAGES_DB", default_value = "pages.db")]
    pub db: PathBuf,

    /// Drop short or deny-listed pages instead of storing them
    #[arg(long, env = "DISCARD_SPAM")]
    pub discard_spam: bool,

    /// Directory of per-channel PCM pipes from the signal engine
    #[arg(long, env = "AUDIO_DIR", default_value = "/run/pagerx")]
    pub audio_dir: PathBuf,

    /// Device selector handed to the signal engine
    #[arg(long, env = "SDR_DEVICE")]
    pub device: Option<String>,

    /// Decoder executable
    #[arg(long, default_value = "multimon-ng")]
    pub decoder: String,

    /// Seconds between per-channel statistics reports
    #[arg(long, default_value_t = 30)]
    pub stats_interval: u64,
}

/// A program-level error with exit code
#[derive(Debug)]
pub struct CliError {
    error: anyhow::Error,
    exit_code: i32,
}

impl CliError {
    /// Create new error with a custom exit code
    pub fn new(error: anyhow::Error, code: i32) -> CliError {
        CliError {
            error,
            exit_code: code,
        }
    }

    /// Print this error to the terminal
    ///
    /// Errors from clap are printed verbatim. Other types of errors
    /// are printed indirectly via clap's fancy formatter.
    pub fn print(&self) -> std::io::Result<()> {
        if let Some(e) = self.error.downcast_ref::<clap::Error>() {
            e.print()
        } else {
            Args::command()
                .error(ErrorKind::Format, self.to_string())
                .print()
        }
    }

    /// Print this error to the terminal and exit
    pub fn exit(&self) -> ! {
        drop(self.print());
        std::process::exit(self.exit_code);
    }
}

impl Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.error)
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> CliError {
        CliError::new(err, 1)
    }
}

impl From<clap::Error> for CliError {
    fn from(err: clap::Error) -> CliError {
        let code = if err.use_stderr() { 1 } else { 0 };
        CliError::new(err.into(), code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clap() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
