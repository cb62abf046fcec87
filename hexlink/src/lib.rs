//! # hexlink
//!
//! A library for uploading text-encoded firmware images (Intel HEX and
//! similar line-oriented formats) to a microcontroller over a serial link.
//!
//! The target loader accepts one line at a time and answers each line with
//! a short status token. This crate provides:
//!
//! - Line extraction from image files, forwarded verbatim
//! - Reply classification (`ok`, unexpected token, empty read)
//! - The transfer engine: send a line, wait for the reply, decide
//! - A serial channel abstraction and its native `serialport` backend
//!
//! ## Features
//!
//! - `native` (default): Native serial port support
//! - `serde`: Serialization support for configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use hexlink::{ImageFile, Outcome, SerialConfig, TransferConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let image = ImageFile::open("firmware.hex")?;
//!
//!     #[cfg(feature = "native")]
//!     {
//!         use hexlink::{Channel, NativePort};
//!
//!         let mut port = NativePort::open(&SerialConfig::new("/dev/ttyUSB0", 9600))?;
//!         port.clear_buffers()?;
//!
//!         let result = hexlink::transfer::run_with_progress(
//!             image,
//!             &mut port,
//!             &TransferConfig::default(),
//!             |event| println!("{event:?}"),
//!         );
//!         port.close()?;
//!
//!         if let Outcome::Aborted(reason) = result.outcome {
//!             eprintln!("Upload failed: {reason}");
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod image;
pub mod port;
pub mod protocol;
pub mod transfer;

// Re-exports for convenience
#[cfg(feature = "native")]
pub use port::NativePort;
pub use {
    error::{Error, Result},
    image::{ImageFile, Line, LineReader, LineSource},
    port::{Channel, DataBits, FlowControl, Parity, Readiness, SerialConfig, StopBits},
    protocol::reply::{ACK_TOKEN, ACK_WINDOW, Reply},
    transfer::{
        AbortReason, LineEnding, Outcome, TransferConfig, TransferEvent, TransferResult,
    },
};
