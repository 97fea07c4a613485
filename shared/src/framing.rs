//! Newline-delimited frames for the tokio transports

use std::{io, mem};

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::MAX_FRAME_BYTES;

#[derive(Debug, PartialEq, Eq)]
pub enum Frame {
    Line(Vec<u8>),
    /// More than the cap arrived without a newline. The stream should be
    /// closed; the bytes read so far are discarded.
    Oversized,
    Closed,
}

/// Reads newline-delimited frames, never holding more than `max_len` bytes of
/// an unterminated frame. A partial frame is kept across a cancelled
/// `next_frame`, so it can be raced inside `tokio::select!`.
pub struct FrameReader<R> {
    reader: R,
    partial: Vec<u8>,
    max_len: usize,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_max_len(reader, MAX_FRAME_BYTES)
    }

    pub fn with_max_len(reader: R, max_len: usize) -> Self {
        Self {
            reader,
            partial: Vec::new(),
            max_len,
        }
    }

    pub async fn next_frame(&mut self) -> io::Result<Frame> {
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                if self.partial.is_empty() {
                    return Ok(Frame::Closed);
                }
                return Ok(Frame::Line(mem::take(&mut self.partial)));
            }

            let newline = available.iter().position(|byte| *byte == b'\n');
            let chunk = &available[..newline.unwrap_or(available.len())];
            let consumed = chunk.len() + usize::from(newline.is_some());
            let fits = self.partial.len() + chunk.len() <= self.max_len;
            if fits {
                self.partial.extend_from_slice(chunk);
            }
            self.reader.consume(consumed);

            if !fits {
                self.partial.clear();
                return Ok(Frame::Oversized);
            }
            if newline.is_some() {
                let mut frame = mem::take(&mut self.partial);
                if frame.last() == Some(&b'\r') {
                    frame.pop();
                }
                return Ok(Frame::Line(frame));
            }
        }
    }
}
