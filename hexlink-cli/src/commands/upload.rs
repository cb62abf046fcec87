//! Upload command implementation.

use anyhow::{Context, Result};
use console::style;
use hexlink::protocol::Token;
use hexlink::{
    Channel, ImageFile, LineSource, NativePort, Outcome, TransferConfig, TransferEvent,
    TransferResult, transfer,
};
use indicatif::{ProgressBar, ProgressStyle};
use log::warn;
use rust_i18n::t;

use crate::config::Config;
use crate::{Cli, CliError, use_fancy_output};

/// Upload command implementation.
pub(crate) fn cmd_upload(cli: &Cli, config: &Config) -> Result<()> {
    let quiet = cli.quiet || cli.json;

    let transfer_config = config.transfer_config(cli.timeout_ms, cli.line_ending.map(Into::into));
    transfer_config
        .validate()
        .map_err(|e| CliError::Config(t!("error.invalid_config", error = e).to_string()))?;
    let serial_config = config.serial_config(cli.port.as_deref(), cli.baud);

    if cli.image.is_dir() {
        return Err(CliError::Usage(
            t!("error.image_is_dir", path = cli.image.display()).to_string(),
        )
        .into());
    }

    if !quiet {
        eprintln!(
            "{} {}",
            style("📦").cyan(),
            t!("upload.loading_image", path = cli.image.display())
        );
    }
    let image = ImageFile::open(&cli.image)
        .with_context(|| t!("error.open_image", path = cli.image.display()).to_string())?;
    if image.is_empty() {
        warn!("Image {} is empty, nothing to send", cli.image.display());
    }

    if !quiet {
        eprintln!(
            "{} {}",
            style("🔌").cyan(),
            t!(
                "upload.using_port",
                port = serial_config.port_name,
                baud = serial_config.baud_rate
            )
        );
    }
    let port = NativePort::open(&serial_config).map_err(|e| {
        CliError::PortOpen(
            t!(
                "error.open_port",
                port = serial_config.port_name,
                error = e
            )
            .to_string(),
        )
    })?;

    // Create progress bar over image bytes
    let pb = if quiet || !use_fancy_output() {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(image.len());
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_message(t!("upload.sending").to_string());
        pb
    };

    let result = upload(port, image, &transfer_config, |event| {
        if let TransferEvent::LineSent { position, .. } = event {
            pb.set_position(*position);
        } else if let Some(message) = describe_event(event) {
            // Diagnostics are not optional, even in quiet mode
            if pb.is_hidden() {
                eprintln!("{message}");
            } else {
                pb.println(message);
            }
        }
    });

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary_json(&result)).unwrap_or_default()
        );
    }

    match &result.outcome {
        Outcome::Success => {
            pb.finish_with_message(t!("upload.complete").to_string());
            if !quiet {
                eprintln!(
                    "  {}",
                    t!(
                        "upload.summary",
                        sent = result.lines_sent,
                        ok = result.acks_ok,
                        unexpected = result.unexpected,
                        overflow = result.overflow_events
                    )
                );
                eprintln!("\n{} {}", style("🎉").green().bold(), t!("upload.completed"));
            }
            Ok(())
        },
        Outcome::Aborted(reason) => {
            pb.abandon();
            Err(CliError::Transfer(
                t!(
                    "upload.aborted",
                    sent = result.lines_sent,
                    reason = reason
                )
                .to_string(),
            )
            .into())
        },
    }
}

/// Run one transfer over an owned channel and close the channel on every
/// exit path.
pub(crate) fn upload<C, S, F>(
    mut channel: C,
    source: S,
    config: &TransferConfig,
    on_event: F,
) -> TransferResult
where
    C: Channel,
    S: LineSource,
    F: FnMut(&TransferEvent),
{
    // Stale device output would otherwise be read as the first reply
    if let Err(e) = channel.clear_buffers() {
        warn!("Could not clear buffers on {}: {e}", channel.name());
    }

    let result = transfer::run_with_progress(source, &mut channel, config, on_event);

    if let Err(e) = channel.close() {
        warn!("Could not close {}: {e}", channel.name());
    }
    result
}

/// User-facing diagnostic for every event that is not a plain success.
fn describe_event(event: &TransferEvent) -> Option<String> {
    let message = match event {
        TransferEvent::LineSent { .. } | TransferEvent::Acked { .. } => return None,
        TransferEvent::Overflow { line, length, cap } => format!(
            "{} {}",
            style("⚠").yellow(),
            t!("upload.overflow", line = line, length = length, cap = cap)
        ),
        TransferEvent::Unexpected { line, token } => format!(
            "{} {}",
            style("⚠").yellow(),
            t!("upload.unexpected", line = line, token = Token(token))
        ),
        TransferEvent::EmptyReply { line } => format!(
            "{} {}",
            style("⚠").yellow(),
            t!("upload.empty_reply", line = line)
        ),
        TransferEvent::TimedOut { line } => format!(
            "{} {}",
            style("✗").red(),
            t!("upload.timeout", line = line)
        ),
    };
    Some(message)
}

/// Machine-readable transfer summary for `--json`.
fn summary_json(result: &TransferResult) -> serde_json::Value {
    let status = if result.is_success() { "success" } else { "aborted" };
    let reason = result
        .abort_reason()
        .map(ToString::to_string);

    serde_json::json!({
        "status": status,
        "reason": reason,
        "lines_sent": result.lines_sent,
        "acks_ok": result.acks_ok,
        "unexpected": result.unexpected,
        "empty_replies": result.empty_replies,
        "overflow_events": result.overflow_events,
        "timeouts": result.timeouts,
        "bytes_sent": result.bytes_sent,
        "elapsed_ms": u64::try_from(result.elapsed.as_millis()).unwrap_or(u64::MAX),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexlink::{AbortReason, LineReader, Readiness};
    use std::collections::VecDeque;
    use std::io::{Cursor, Read, Write};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Mock device that answers each line from a queue of replies;
    /// `None` means silence.
    struct MockDevice {
        replies: VecDeque<Option<&'static [u8]>>,
        pending: Option<&'static [u8]>,
        stale: Vec<u8>,
        closed: Arc<AtomicBool>,
        clears: Arc<AtomicUsize>,
    }

    impl MockDevice {
        fn new(replies: &[Option<&'static str>]) -> (Self, Arc<AtomicBool>, Arc<AtomicUsize>) {
            let closed = Arc::new(AtomicBool::new(false));
            let clears = Arc::new(AtomicUsize::new(0));
            let device = Self {
                replies: replies
                    .iter()
                    .map(|reply| reply.map(str::as_bytes))
                    .collect(),
                pending: None,
                stale: Vec::new(),
                closed: Arc::clone(&closed),
                clears: Arc::clone(&clears),
            };
            (device, closed, clears)
        }
    }

    impl Read for MockDevice {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.stale.is_empty() {
                let n = buf.len().min(self.stale.len());
                buf[..n].copy_from_slice(&self.stale[..n]);
                self.stale.drain(..n);
                return Ok(n);
            }
            let reply = self.pending.take().unwrap_or_default();
            let n = buf.len().min(reply.len());
            buf[..n].copy_from_slice(&reply[..n]);
            Ok(n)
        }
    }

    impl Write for MockDevice {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.pending = self.replies.pop_front().flatten();
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Channel for MockDevice {
        fn name(&self) -> &str {
            "mock"
        }

        fn wait_readable(&mut self, _timeout: Duration) -> hexlink::Result<Readiness> {
            Ok(if self.pending.is_some() || !self.stale.is_empty() {
                Readiness::Ready
            } else {
                Readiness::TimedOut
            })
        }

        fn clear_buffers(&mut self) -> hexlink::Result<()> {
            self.stale.clear();
            self.clears.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn close(&mut self) -> hexlink::Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn image(text: &[u8]) -> LineReader<Cursor<Vec<u8>>> {
        LineReader::new(Cursor::new(text.to_vec()))
    }

    #[test]
    fn test_upload_closes_channel_on_success() {
        let (device, closed, clears) = MockDevice::new(&[Some("ok"), Some("ok"), Some("ok")]);
        let result = upload(device, image(b"L1\nL2\nL3\n"), &TransferConfig::default(), |_| {});

        assert!(result.is_success());
        assert_eq!(result.lines_sent, 3);
        assert_eq!(result.acks_ok, 3);
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(clears.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_upload_closes_channel_on_timeout() {
        let (device, closed, _) = MockDevice::new(&[Some("ok"), None]);
        let result = upload(device, image(b"L1\nL2\nL3\n"), &TransferConfig::default(), |_| {});

        assert!(matches!(
            result.outcome,
            Outcome::Aborted(AbortReason::Timeout { line: 2 })
        ));
        assert_eq!(result.lines_sent, 2);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_upload_closes_channel_on_unexpected_only_run() {
        let (device, closed, _) = MockDevice::new(&[Some("ok"), Some("err")]);
        let result = upload(device, image(b"L1\nL2\n"), &TransferConfig::default(), |_| {});

        assert!(result.is_success());
        assert_eq!(result.acks_ok, 1);
        assert_eq!(result.unexpected, 1);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_upload_closes_channel_on_overflow_only_run() {
        let mut text = vec![b'Z'; 512];
        text.push(b'\n');
        let (device, closed, _) = MockDevice::new(&[Some("ok")]);
        let result = upload(device, image(&text), &TransferConfig::default(), |_| {});

        assert!(result.is_success());
        assert_eq!(result.overflow_events, 1);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_upload_discards_stale_input() {
        let (mut device, _, _) = MockDevice::new(&[Some("er")]);
        // Left over from a previous session; must not count as the reply
        device.stale = b"ok".to_vec();
        let result = upload(device, image(b"L1\n"), &TransferConfig::default(), |_| {});

        assert_eq!(result.acks_ok, 0);
        assert_eq!(result.unexpected, 1);
    }

    #[test]
    fn test_describe_event() {
        rust_i18n::set_locale("en");
        assert!(describe_event(&TransferEvent::Acked { line: 1 }).is_none());
        assert!(
            describe_event(&TransferEvent::LineSent {
                line: 1,
                bytes: 3,
                position: 3
            })
            .is_none()
        );

        let message = describe_event(&TransferEvent::Unexpected {
            line: 4,
            token: b"er".to_vec(),
        })
        .unwrap();
        assert!(message.contains("er"));
        assert!(message.contains('4'));

        let message = describe_event(&TransferEvent::TimedOut { line: 9 }).unwrap();
        assert!(message.contains('9'));
    }

    #[test]
    fn test_summary_json_success() {
        let (device, _, _) = MockDevice::new(&[Some("ok"), Some("no")]);
        let result = upload(device, image(b"L1\nL2\n"), &TransferConfig::default(), |_| {});
        let json = summary_json(&result);

        assert_eq!(json["status"], "success");
        assert!(json["reason"].is_null());
        assert_eq!(json["lines_sent"], 2);
        assert_eq!(json["acks_ok"], 1);
        assert_eq!(json["unexpected"], 1);
        assert_eq!(json["bytes_sent"], 6);
    }

    #[test]
    fn test_summary_json_aborted() {
        let (device, _, _) = MockDevice::new(&[None]);
        let result = upload(device, image(b"L1\nL2\n"), &TransferConfig::default(), |_| {});
        let json = summary_json(&result);

        assert_eq!(json["status"], "aborted");
        assert_eq!(json["timeouts"], 1);
        assert!(
            json["reason"]
                .as_str()
                .unwrap()
                .contains("line 1")
        );
    }
}
