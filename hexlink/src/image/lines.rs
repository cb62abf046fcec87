//! Line extraction from text-encoded images.
//!
//! A line is every byte up to, but excluding, the next `\n`. A `\r` directly
//! before the `\n` is stripped as well so CRLF images produce the same
//! payloads as LF ones. The final fragment of a file is returned even when
//! it has no terminator.
//!
//! Callers pass a payload cap with every read. At most `cap + 1` bytes of a
//! line are held in memory; the rest is skipped in place and only counted.

use crate::error::{Error, Result};
use log::debug;
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::Path;

/// One image line, possibly cut short.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// Payload bytes kept, never more than the cap given to `next_line`.
    pub payload: Vec<u8>,
    /// Payload length in the image, terminator excluded.
    pub length: usize,
}

impl Line {
    /// Whether bytes past the cap were dropped.
    pub fn is_truncated(&self) -> bool {
        self.payload.len() < self.length
    }
}

/// Forward-only, finite sequence of image lines.
pub trait LineSource {
    /// Return the next line without its terminator, keeping at most `cap`
    /// payload bytes, or `None` once the source is exhausted.
    fn next_line(&mut self, cap: usize) -> Result<Option<Line>>;

    /// Bytes consumed from the underlying source so far, terminators included.
    fn position(&self) -> u64;
}

/// [`LineSource`] over any buffered reader.
pub struct LineReader<R: BufRead> {
    reader: R,
    consumed: u64,
    exhausted: bool,
}

impl<R: BufRead> LineReader<R> {
    /// Wrap a buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            consumed: 0,
            exhausted: false,
        }
    }
}

impl<R: BufRead> LineSource for LineReader<R> {
    fn next_line(&mut self, cap: usize) -> Result<Option<Line>> {
        if self.exhausted {
            return Ok(None);
        }

        // One spare byte so a `\r` sitting right at the cap can still be stripped
        let keep = cap.saturating_add(1);
        let mut payload = Vec::with_capacity(keep.min(256));
        let mut raw_len = 0usize;
        let mut last = None;
        let mut seen_any = false;
        let mut terminated = false;

        while !terminated {
            let available = match self.reader.fill_buf() {
                Ok(buf) => buf,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::SourceRead(e)),
            };
            if available.is_empty() {
                self.exhausted = true;
                break;
            }
            seen_any = true;

            let (segment, used) = match available.iter().position(|&b| b == b'\n') {
                Some(end) => {
                    terminated = true;
                    (&available[..end], end + 1)
                },
                None => (available, available.len()),
            };

            let room = keep.saturating_sub(payload.len());
            payload.extend_from_slice(&segment[..segment.len().min(room)]);
            if let Some(&byte) = segment.last() {
                last = Some(byte);
            }
            raw_len += segment.len();

            self.reader.consume(used);
            self.consumed += used as u64;
        }

        if !seen_any {
            return Ok(None);
        }

        let length = if terminated && last == Some(b'\r') {
            raw_len - 1
        } else {
            raw_len
        };
        payload.truncate(length.min(cap));
        Ok(Some(Line { payload, length }))
    }

    fn position(&self) -> u64 {
        self.consumed
    }
}

/// Image file opened from disk.
///
/// The file handle lives exactly as long as this value.
pub struct ImageFile {
    lines: LineReader<BufReader<File>>,
    len: u64,
}

impl ImageFile {
    /// Open an image for a single forward pass.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Opening image: {}", path.display());

        let file = File::open(path)?;
        let len = file
            .metadata()?
            .len();

        Ok(Self {
            lines: LineReader::new(BufReader::new(file)),
            len,
        })
    }

    /// Size of the file in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the file is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl LineSource for ImageFile {
    fn next_line(&mut self, cap: usize) -> Result<Option<Line>> {
        self.lines
            .next_line(cap)
    }

    fn position(&self) -> u64 {
        self.lines
            .position()
    }
}
