//! Line transfer engine.
//!
//! Sends an image one line at a time and waits for the device to answer
//! each line before the next one goes out.
//!
//! ## Protocol Overview
//!
//! ```text
//! host                              device
//!  |  ":10010000214601360121...\n"   |
//!  | ------------------------------> |
//!  |                            "ok" |
//!  | <------------------------------ |
//!  |  next line                      |
//!  | ------------------------------> |
//!  |           (silence > timeout)   |
//!  |  abort                          |
//! ```
//!
//! Only a timeout, a channel failure or an unreadable image stop the
//! transfer. Unexpected tokens, empty reads and over-long lines are
//! reported and the transfer moves on. Nothing is ever resent.
//!
//! ## Example
//!
//! ```rust,no_run
//! use hexlink::{ImageFile, NativePort, SerialConfig, TransferConfig, transfer};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let image = ImageFile::open("firmware.hex")?;
//!     let mut port = NativePort::open(&SerialConfig::default())?;
//!
//!     let result = transfer::run(image, &mut port, &TransferConfig::default());
//!     println!("{} line(s) sent, {} acknowledged", result.lines_sent, result.acks_ok);
//!     Ok(())
//! }
//! ```

use crate::error::{Error, Result};
use crate::image::{Line, LineSource};
use crate::port::{Channel, Readiness};
use crate::protocol::reply::{ACK_TOKEN, ACK_WINDOW, Reply, Token};
use log::{debug, error, info, trace, warn};
use std::fmt;
use std::time::{Duration, Instant};

/// Largest payload sent for a single line.
pub const DEFAULT_LINE_BUFFER_CAP: usize = 255;

/// How long the device gets to answer a line.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(1);

/// Upper bound for [`TransferConfig::per_line_buffer_cap`].
pub const MAX_LINE_BUFFER_CAP: usize = 64 * 1024;

/// Upper bound for [`TransferConfig::ack_window`].
pub const MAX_ACK_WINDOW: usize = 64;

/// Longest pause between two bytes of one reply.
///
/// A serial port may hand a reply over in pieces; once the first byte is
/// in, the rest must follow within this gap (or the ack timeout, if shorter).
pub const REPLY_GAP: Duration = Duration::from_millis(50);

/// Terminator appended to every payload on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum LineEnding {
    /// `\n`.
    #[default]
    Lf,
    /// `\r\n`.
    CrLf,
    /// Payload only.
    None,
}

impl LineEnding {
    /// Bytes written after each payload.
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::Lf => b"\n",
            Self::CrLf => b"\r\n",
            Self::None => b"",
        }
    }
}

/// Transfer engine configuration.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Payload bytes kept per line; longer lines are truncated.
    pub per_line_buffer_cap: usize,
    /// Bounded wait for the reply to each line.
    pub ack_timeout: Duration,
    /// Reply bytes read per line.
    pub ack_window: usize,
    /// Reply that marks a line as accepted.
    pub ack_token: Vec<u8>,
    /// Terminator sent after each payload.
    pub line_ending: LineEnding,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            per_line_buffer_cap: DEFAULT_LINE_BUFFER_CAP,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            ack_window: ACK_WINDOW,
            ack_token: ACK_TOKEN
                .as_bytes()
                .to_vec(),
            line_ending: LineEnding::Lf,
        }
    }
}

impl TransferConfig {
    /// Set the acknowledgment timeout.
    #[must_use]
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Set the per-line payload cap.
    #[must_use]
    pub fn with_line_buffer_cap(mut self, cap: usize) -> Self {
        self.per_line_buffer_cap = cap;
        self
    }

    /// Set how many reply bytes are read per line.
    #[must_use]
    pub fn with_ack_window(mut self, window: usize) -> Self {
        self.ack_window = window;
        self
    }

    /// Set the acknowledgment token.
    #[must_use]
    pub fn with_ack_token(mut self, token: impl Into<Vec<u8>>) -> Self {
        self.ack_token = token.into();
        self
    }

    /// Set the line terminator.
    #[must_use]
    pub fn with_line_ending(mut self, line_ending: LineEnding) -> Self {
        self.line_ending = line_ending;
        self
    }

    /// Check that the settings can describe a working transfer.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_LINE_BUFFER_CAP).contains(&self.per_line_buffer_cap) {
            return Err(Error::Config(format!(
                "line buffer cap must be between 1 and {MAX_LINE_BUFFER_CAP} bytes, got {}",
                self.per_line_buffer_cap
            )));
        }
        if !(1..=MAX_ACK_WINDOW).contains(&self.ack_window) {
            return Err(Error::Config(format!(
                "ack window must be between 1 and {MAX_ACK_WINDOW} bytes, got {}",
                self.ack_window
            )));
        }
        if self
            .ack_token
            .is_empty()
        {
            return Err(Error::Config("ack token must not be empty".into()));
        }
        if self
            .ack_token
            .len()
            > self.ack_window
        {
            return Err(Error::Config(format!(
                "ack token '{}' is longer than the {}-byte ack window",
                Token(&self.ack_token),
                self.ack_window
            )));
        }
        Ok(())
    }
}

/// Per-line progress reported while a transfer runs.
///
/// Line numbers start at 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    /// A line was longer than the cap and got truncated.
    Overflow {
        /// Line number.
        line: usize,
        /// Payload length before truncation.
        length: usize,
        /// Bytes kept.
        cap: usize,
    },
    /// A line was written to the channel.
    LineSent {
        /// Line number.
        line: usize,
        /// Bytes written, terminator included.
        bytes: usize,
        /// Image bytes consumed so far.
        position: u64,
    },
    /// The device accepted the line.
    Acked {
        /// Line number.
        line: usize,
    },
    /// The device answered with something other than the ack token.
    Unexpected {
        /// Line number.
        line: usize,
        /// Raw reply bytes.
        token: Vec<u8>,
    },
    /// The channel reported data but the read returned nothing.
    EmptyReply {
        /// Line number.
        line: usize,
    },
    /// No reply arrived in time.
    TimedOut {
        /// Line number.
        line: usize,
    },
}

/// Why a transfer stopped before the image was exhausted.
#[derive(Debug)]
pub enum AbortReason {
    /// No reply to the given line within the ack timeout.
    Timeout {
        /// Line number.
        line: usize,
    },
    /// Writing, waiting or reading failed.
    Channel(Error),
    /// The image could not be read.
    SourceRead(Error),
    /// The transfer settings were rejected before anything was sent.
    InvalidConfig(Error),
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { line } => write!(f, "timeout waiting for response to line {line}"),
            Self::Channel(e) | Self::SourceRead(e) | Self::InvalidConfig(e) => write!(f, "{e}"),
        }
    }
}

/// How a transfer ended.
#[derive(Debug)]
pub enum Outcome {
    /// Every line of the image was sent.
    Success,
    /// The transfer stopped early.
    Aborted(AbortReason),
}

/// Final counts of a transfer.
#[derive(Debug)]
pub struct TransferResult {
    /// How the transfer ended.
    pub outcome: Outcome,
    /// Lines written to the channel.
    pub lines_sent: usize,
    /// Lines the device acknowledged.
    pub acks_ok: usize,
    /// Replies other than the ack token.
    pub unexpected: usize,
    /// Reads that returned nothing despite readiness.
    pub empty_replies: usize,
    /// Lines truncated to the cap.
    pub overflow_events: usize,
    /// Lines that got no reply in time.
    pub timeouts: usize,
    /// Bytes written, terminators included.
    pub bytes_sent: u64,
    /// Wall time of the transfer.
    pub elapsed: Duration,
}

impl TransferResult {
    /// Whether the whole image was sent.
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success)
    }

    /// The abort reason, if the transfer stopped early.
    pub fn abort_reason(&self) -> Option<&AbortReason> {
        match &self.outcome {
            Outcome::Success => None,
            Outcome::Aborted(reason) => Some(reason),
        }
    }
}

/// Engine state while a transfer runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Sending(usize),
    AwaitingAck(usize),
    Completed,
    Aborted,
}

impl State {
    fn can_enter(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle | Self::AwaitingAck(_), Self::Sending(_) | Self::Completed)
                | (Self::Sending(_), Self::AwaitingAck(_))
                | (
                    Self::Idle | Self::Sending(_) | Self::AwaitingAck(_),
                    Self::Aborted
                )
        )
    }
}

/// Transient per-run bookkeeping.
struct Session {
    state: State,
    line: usize,
    lines_sent: usize,
    acks_ok: usize,
    unexpected: usize,
    empty_replies: usize,
    overflow_events: usize,
    timeouts: usize,
    bytes_sent: u64,
    started: Instant,
}

impl Session {
    fn new() -> Self {
        Self {
            state: State::Idle,
            line: 0,
            lines_sent: 0,
            acks_ok: 0,
            unexpected: 0,
            empty_replies: 0,
            overflow_events: 0,
            timeouts: 0,
            bytes_sent: 0,
            started: Instant::now(),
        }
    }

    fn enter(&mut self, next: State) {
        debug_assert!(
            self.state
                .can_enter(next),
            "illegal transition {:?} -> {next:?}",
            self.state
        );
        trace!("{:?} -> {next:?}", self.state);
        self.state = next;
    }

    fn finish(mut self, outcome: Outcome) -> TransferResult {
        match &outcome {
            Outcome::Success => self.enter(State::Completed),
            Outcome::Aborted(_) => self.enter(State::Aborted),
        }

        TransferResult {
            outcome,
            lines_sent: self.lines_sent,
            acks_ok: self.acks_ok,
            unexpected: self.unexpected,
            empty_replies: self.empty_replies,
            overflow_events: self.overflow_events,
            timeouts: self.timeouts,
            bytes_sent: self.bytes_sent,
            elapsed: self
                .started
                .elapsed(),
        }
    }
}

/// Send every line of `source` over `channel`, one acknowledged line at a time.
///
/// The source is consumed and dropped before this returns, whatever the
/// outcome. The channel stays with the caller.
pub fn run<S, C>(source: S, channel: &mut C, config: &TransferConfig) -> TransferResult
where
    S: LineSource,
    C: Channel + ?Sized,
{
    run_with_progress(source, channel, config, |_| {})
}

/// Like [`run`], reporting every [`TransferEvent`] to `on_event` as it happens.
pub fn run_with_progress<S, C, F>(
    mut source: S,
    channel: &mut C,
    config: &TransferConfig,
    mut on_event: F,
) -> TransferResult
where
    S: LineSource,
    C: Channel + ?Sized,
    F: FnMut(&TransferEvent),
{
    let mut session = Session::new();

    if let Err(e) = config.validate() {
        error!("Refusing to start transfer: {e}");
        return session.finish(Outcome::Aborted(AbortReason::InvalidConfig(e)));
    }

    debug!(
        "Starting transfer on {} (cap {} bytes, timeout {:?}, window {} bytes)",
        channel.name(),
        config.per_line_buffer_cap,
        config.ack_timeout,
        config.ack_window
    );

    let terminator = config
        .line_ending
        .as_bytes();
    let mut wire = Vec::with_capacity(config.per_line_buffer_cap + terminator.len());
    let mut reply = vec![0u8; config.ack_window];

    let outcome = loop {
        let Line { payload, length } = match source.next_line(config.per_line_buffer_cap) {
            Ok(Some(line)) => line,
            Ok(None) => break Outcome::Success,
            Err(e) => {
                error!("Error reading image after line {}: {e}", session.line);
                break Outcome::Aborted(AbortReason::SourceRead(e));
            },
        };

        session.line += 1;
        let line = session.line;
        session.enter(State::Sending(line));

        if payload.len() < length {
            warn!(
                "Line {line} is {length} bytes, longer than expected; truncating to {}",
                payload.len()
            );
            session.overflow_events += 1;
            on_event(&TransferEvent::Overflow {
                line,
                length,
                cap: payload.len(),
            });
        }

        wire.clear();
        wire.extend_from_slice(&payload);
        wire.extend_from_slice(terminator);

        trace!("TX line {line}: {}", Token(&wire));
        if let Err(e) = channel.write_all_bytes(&wire) {
            error!("Error writing line {line}: {e}");
            break Outcome::Aborted(AbortReason::Channel(e));
        }
        session.lines_sent += 1;
        session.bytes_sent += wire.len() as u64;
        on_event(&TransferEvent::LineSent {
            line,
            bytes: wire.len(),
            position: source.position(),
        });

        session.enter(State::AwaitingAck(line));
        match channel.wait_readable(config.ack_timeout) {
            Ok(Readiness::Ready) => {},
            Ok(Readiness::TimedOut) => {
                error!("Timeout waiting for response to line {line}");
                session.timeouts += 1;
                on_event(&TransferEvent::TimedOut { line });
                break Outcome::Aborted(AbortReason::Timeout { line });
            },
            Err(e) => {
                error!("Error waiting for response to line {line}: {e}");
                break Outcome::Aborted(AbortReason::Channel(e));
            },
        }

        let n = match collect_reply(channel, &mut reply, config) {
            Ok(n) => n,
            Err(e) => {
                error!("Error reading response to line {line}: {e}");
                break Outcome::Aborted(AbortReason::Channel(e));
            },
        };

        match Reply::classify(&reply[..n], &config.ack_token) {
            Reply::Ack => {
                trace!("RX line {line}: ok");
                session.acks_ok += 1;
                on_event(&TransferEvent::Acked { line });
            },
            Reply::Unexpected(token) => {
                warn!("Unexpected response '{}' to line {line}", Token(&token));
                session.unexpected += 1;
                on_event(&TransferEvent::Unexpected { line, token });
            },
            Reply::Empty => {
                warn!("Device signalled a reply to line {line} but nothing could be read");
                session.empty_replies += 1;
                on_event(&TransferEvent::EmptyReply { line });
            },
        }
    };

    // Release the image before reporting
    drop(source);

    let result = session.finish(outcome);
    match &result.outcome {
        Outcome::Success => info!(
            "Transfer done: {} line(s) sent, {} acknowledged in {:.2?}",
            result.lines_sent, result.acks_ok, result.elapsed
        ),
        Outcome::Aborted(reason) => error!(
            "Transfer aborted after {} line(s): {reason}",
            result.lines_sent
        ),
    }
    result
}

/// Read one reply into `buf`, which the channel may deliver in pieces.
///
/// Stops when `buf` is full, when the bytes so far equal the ack token, or
/// when no further byte arrives within the reply gap. Returns the number of
/// bytes read; zero means the channel signalled data but delivered none.
fn collect_reply<C>(channel: &mut C, buf: &mut [u8], config: &TransferConfig) -> Result<usize>
where
    C: Channel + ?Sized,
{
    let mut filled = channel.read_reply(buf)?;
    if filled == 0 {
        return Ok(0);
    }

    let gap = config
        .ack_timeout
        .min(REPLY_GAP);
    while filled < buf.len() && buf[..filled] != config.ack_token[..] {
        if channel.wait_readable(gap)? == Readiness::TimedOut {
            trace!("Reply stopped after {filled} byte(s)");
            break;
        }
        let n = channel.read_reply(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
