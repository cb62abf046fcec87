//! Device reply classification.
//!
//! After every line the target answers with a short ASCII token. Anything
//! other than the acknowledgment token is reported but does not stop the
//! transfer; silence is handled by the engine, not here.

use std::fmt;

/// Token the target sends for a line it accepted.
pub const ACK_TOKEN: &str = "ok";

/// Maximum number of reply bytes inspected per line.
pub const ACK_WINDOW: usize = 2;

/// Classified device reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The acknowledgment token.
    Ack,
    /// Any other non-empty token, kept verbatim.
    Unexpected(Vec<u8>),
    /// The channel reported data but the read returned nothing.
    Empty,
}

impl Reply {
    /// Classify the bytes read after one line.
    pub fn classify(bytes: &[u8], ack_token: &[u8]) -> Self {
        if bytes.is_empty() {
            Self::Empty
        } else if bytes == ack_token {
            Self::Ack
        } else {
            Self::Unexpected(bytes.to_vec())
        }
    }
}

/// Printable form of a raw reply token.
///
/// Non-printable bytes are escaped so a garbled reply cannot mangle the
/// terminal.
pub struct Token<'a>(pub &'a [u8]);

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.escape_ascii())
    }
}
