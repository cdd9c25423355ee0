//! Decoder subprocess management
//!
//! One multimon-ng instance runs per channel for the lifetime of the
//! process. The signal engine feeds raw 16-bit audio into the decoder's
//! standard input; two reader tasks drain its standard output (page
//! data, parsed here) and standard error (diagnostics only) so neither
//! stream can ever block the other or the audio feed.
//!
//! Ownership of the audio write end is explicit: it sits in an
//! `Option` until the signal chain claims it with [`take_audio_sink`],
//! and whoever holds it closes it. Closing the sink is also the
//! graceful way to stop the decoder; it exits on end-of-input.
//!
//! [`take_audio_sink`]: DecoderProcess::take_audio_sink

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;

use pagerx::{parse_line, PageEvent};

/// How long to wait for a decoder to exit after its input closes
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Counters shared with the stats reporter
#[derive(Debug, Default)]
pub struct ChannelStats {
    pages: AtomicU64,
}

impl ChannelStats {
    pub fn pages(&self) -> u64 {
        self.pages.load(Ordering::Relaxed)
    }
}

/// One running decoder subprocess and its output readers
pub struct DecoderProcess {
    name: String,
    child: Child,
    audio_sink: Option<ChildStdin>,
    stats: Arc<ChannelStats>,
    readers: Vec<JoinHandle<()>>,
}

impl DecoderProcess {
    /// Spawn the decoder for one channel
    ///
    /// `protocols` become one `-a NAME` flag pair each. Every parsed
    /// page is sent into `events`; stderr goes to debug logging.
    pub fn start(
        decoder: &str,
        name: &str,
        protocols: &[String],
        events: mpsc::Sender<PageEvent>,
    ) -> Result<Self> {
        let mut cmd = Command::new(decoder);
        cmd.arg("-t")
            .arg("raw")
            .arg("--json") // structured output where the build supports it
            .arg("-e") // hide empty POCSAG pages
            .arg("-u"); // prune improbable POCSAG decodes
        for protocol in protocols {
            cmd.arg("-a").arg(protocol);
        }
        cmd.arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        info!("starting decoder for {name}: {cmd:?}");
        let mut child = cmd.spawn().with_context(|| {
            format!("unable to spawn decoder \"{decoder}\" for channel \"{name}\"")
        })?;

        let audio_sink = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .context("decoder stdout was not captured")?;
        let stderr = child
            .stderr
            .take()
            .context("decoder stderr was not captured")?;

        let stats = Arc::new(ChannelStats::default());
        let mut readers = Vec::with_capacity(2);

        let channel = name.to_string();
        let counters = Arc::clone(&stats);
        readers.push(tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let Some(event) = parse_line(&channel, &line) else {
                    continue;
                };
                info!("PAGE {event}");
                counters.pages.fetch_add(1, Ordering::Relaxed);
                if events.send(event).await.is_err() {
                    // ingest side is gone, nothing left to deliver to
                    break;
                }
            }
            debug!("decoder [{channel}] stdout closed");
        }));

        let channel = name.to_string();
        readers.push(tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if !line.trim().is_empty() {
                    debug!("decoder [{channel}] stderr: {line}");
                }
            }
        }));

        Ok(Self {
            name: name.to_string(),
            child,
            audio_sink,
            stats,
            readers,
        })
    }

    /// Channel name this decoder serves
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Take the write end of the decoder's audio input
    ///
    /// Ownership moves to the caller, normally the signal chain. The
    /// chain closing its handle signals end-of-input to the decoder
    /// without disturbing the child bookkeeping kept here. Returns
    /// `None` on a second call.
    pub fn take_audio_sink(&mut self) -> Option<ChildStdin> {
        self.audio_sink.take()
    }

    /// Log one liveness/throughput line
    pub fn log_stats(&mut self) {
        let alive = matches!(self.child.try_wait(), Ok(None));
        let pid = self
            .child
            .id()
            .map(|pid| pid.to_string())
            .unwrap_or_else(|| "?".to_string());
        info!(
            "decoder [{}]: {} pages decoded, pid={pid}, alive={alive}",
            self.name,
            self.stats.pages()
        );
    }

    /// Best-effort shutdown
    ///
    /// Closes the audio sink if the signal chain never claimed it,
    /// gives the decoder a bounded grace period to exit on its own,
    /// then force-kills. Failures are swallowed; this only runs while
    /// the whole process is going down.
    pub async fn stop(mut self) {
        drop(self.audio_sink.take());

        match time::timeout(STOP_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => debug!("decoder [{}] exited with {status}", self.name),
            Ok(Err(err)) => warn!("decoder [{}] wait failed: {err}", self.name),
            Err(_elapsed) => {
                warn!(
                    "decoder [{}] still running after {STOP_TIMEOUT:?}, killing",
                    self.name
                );
                if let Err(err) = self.child.kill().await {
                    warn!("decoder [{}] kill failed: {err}", self.name);
                }
            }
        }

        // child is gone, so both pipes are at end-of-file and the
        // readers finish on their own
        for reader in self.readers {
            let _ = reader.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::os::unix::fs::PermissionsExt;

    use tokio::io::AsyncWriteExt;

    // stand-in decoder: ignores its arguments, echoes stdin to stdout
    fn fake_decoder(dir: &std::path::Path) -> std::path::PathBuf {
        let script = dir.join("fakedec");
        std::fs::write(&script, "#!/bin/sh\nexec cat\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[tokio::test]
    async fn round_trip_through_a_subprocess() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_decoder(dir.path());

        let (tx, mut rx) = mpsc::channel(8);
        let mut decoder = DecoderProcess::start(
            script.to_str().unwrap(),
            "test",
            &["FLEX".to_string()],
            tx,
        )
        .unwrap();

        let mut sink = decoder.take_audio_sink().unwrap();
        assert!(decoder.take_audio_sink().is_none());

        sink.write_all(b"FLEX|2006-09-08 00:19:01|1600/2|09.064|1234567|ALN|Hello there\n")
            .await
            .unwrap();
        sink.write_all(b"not a page\n").await.unwrap();
        sink.flush().await.unwrap();

        let event = time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for a page")
            .expect("event channel closed early");
        assert_eq!(event.source, "test (FLEX)");
        assert_eq!(event.recipient, "1234567");
        assert_eq!(event.content, "Hello there");
        assert_eq!(decoder.stats.pages(), 1);

        drop(sink);
        decoder.stop().await;
    }

    #[tokio::test]
    async fn stop_without_taking_the_sink() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_decoder(dir.path());

        let (tx, _rx) = mpsc::channel(8);
        let decoder =
            DecoderProcess::start(script.to_str().unwrap(), "idle", &[], tx).unwrap();
        // closing our sink copy is enough for cat to exit gracefully
        decoder.stop().await;
    }

    #[tokio::test]
    async fn spawn_failure_is_an_error() {
        let (tx, _rx) = mpsc::channel(8);
        assert!(DecoderProcess::start("/nonexistent/decoder", "bad", &[], tx).is_err());
    }
}
