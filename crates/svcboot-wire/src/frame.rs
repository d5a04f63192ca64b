//! Newline-delimited JSON framing for control-socket streams.
//!
//! Each frame is one JSON document followed by `\n`. Readers enforce
//! [`MAX_FRAME_BYTES`] so a misbehaving peer cannot make the daemon buffer
//! unbounded input.

use std::io::{self, BufRead, BufReader, Read, Write};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Largest frame accepted by [`FrameReader`].
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Errors raised while reading or writing frames.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The underlying stream failed.
    #[error("control stream failed: {0}")]
    Io(#[from] io::Error),
    /// A frame exceeded [`MAX_FRAME_BYTES`].
    #[error("frame exceeds maximum size of {limit} bytes")]
    TooLarge {
        /// Configured size limit.
        limit: usize,
    },
    /// A frame was not valid JSON for the expected message.
    #[error("failed to decode frame: {0}")]
    Decode(#[source] serde_json::Error),
    /// A message could not be serialised.
    #[error("failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Writes `message` as a single frame and flushes the writer.
pub fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), FrameError>
where
    W: Write + ?Sized,
    T: Serialize,
{
    let mut payload = serde_json::to_vec(message).map_err(FrameError::Encode)?;
    payload.push(b'\n');
    writer.write_all(&payload)?;
    writer.flush()?;
    Ok(())
}

/// Reads frames from a byte stream.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: BufReader<R>,
    buffer: Vec<u8>,
    limit: usize,
}

impl<R: Read> FrameReader<R> {
    /// Wraps `reader` using the default frame size limit.
    pub fn new(reader: R) -> Self {
        Self::with_limit(reader, MAX_FRAME_BYTES)
    }

    /// Wraps `reader` with a custom frame size limit.
    pub fn with_limit(reader: R, limit: usize) -> Self {
        Self {
            inner: BufReader::new(reader),
            buffer: Vec::new(),
            limit,
        }
    }

    /// Reads and decodes the next frame.
    ///
    /// Returns `Ok(None)` once the peer has closed the stream. Blank lines are
    /// skipped.
    pub fn next_frame<T: DeserializeOwned>(&mut self) -> Result<Option<T>, FrameError> {
        loop {
            let Some(line) = self.read_line()? else {
                return Ok(None);
            };
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return serde_json::from_slice(&line)
                .map(Some)
                .map_err(FrameError::Decode);
        }
    }

    fn read_line(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        self.buffer.clear();
        loop {
            let available = match self.inner.fill_buf() {
                Ok(available) => available,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => return Err(FrameError::Io(error)),
            };
            if available.is_empty() {
                return Ok(if self.buffer.is_empty() {
                    None
                } else {
                    Some(std::mem::take(&mut self.buffer))
                });
            }
            if let Some(position) = available.iter().position(|byte| *byte == b'\n') {
                let (line, _) = available.split_at(position);
                self.buffer.extend_from_slice(line);
                self.inner.consume(position + 1);
                enforce_limit(self.buffer.len(), self.limit)?;
                return Ok(Some(std::mem::take(&mut self.buffer)));
            }
            let consumed = available.len();
            self.buffer.extend_from_slice(available);
            self.inner.consume(consumed);
            enforce_limit(self.buffer.len(), self.limit)?;
        }
    }
}

fn enforce_limit(size: usize, limit: usize) -> Result<(), FrameError> {
    if size > limit {
        return Err(FrameError::TooLarge { limit });
    }
    Ok(())
}
