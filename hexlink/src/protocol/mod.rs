//! Line/ack protocol pieces.

pub mod reply;

// Re-export common types
pub use reply::{ACK_TOKEN, ACK_WINDOW, Reply, Token};
