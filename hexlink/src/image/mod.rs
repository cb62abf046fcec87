//! Image sources.
//!
//! An image is forwarded line by line without looking inside the records,
//! so the only thing this module knows about the format is where lines end.

pub mod lines;

pub use lines::{ImageFile, Line, LineReader, LineSource};
