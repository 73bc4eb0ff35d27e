//! Packet framing: one heartbeat per line.
//!
//! Bytes from the stream are buffered until a `\n` arrives. Blank lines are
//! skipped. A line longer than the frame limit is thrown away up to its
//! terminating newline and reported once as [`Frame::Oversized`]. Whatever
//! is left when the stream ends counts as a final, unterminated packet.

use bytes::{Bytes, BytesMut};

const READ_RESERVE: usize = 4 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// One packet, without its line terminator.
    Packet(Bytes),
    /// A line that exceeded the limit; `len` bytes were discarded.
    Oversized { len: usize },
}

#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    max_len: usize,
    /// Bytes dropped so far from an oversized line still waiting for its `\n`.
    discarding: Option<usize>,
}

impl FrameDecoder {
    pub fn new(max_len: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(READ_RESERVE),
            max_len,
            discarding: None,
        }
    }

    /// Buffer to read into, with spare capacity reserved.
    pub fn read_buffer(&mut self) -> &mut BytesMut {
        self.buf.reserve(READ_RESERVE);
        &mut self.buf
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Next complete frame from buffered data, if any.
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            let Some(pos) = self.buf.iter().position(|b| *b == b'\n') else {
                if self.buf.len() > self.max_len {
                    let dropped = self.buf.len();
                    self.buf.clear();
                    self.discarding = Some(self.discarding.unwrap_or(0) + dropped);
                }
                return None;
            };

            let mut line = self.buf.split_to(pos + 1);
            line.truncate(pos);

            if let Some(dropped) = self.discarding.take() {
                return Some(Frame::Oversized {
                    len: dropped + line.len(),
                });
            }
            if let Some(frame) = self.classify(line) {
                return Some(frame);
            }
        }
    }

    /// Flush at end of stream.
    pub fn finish(&mut self) -> Option<Frame> {
        let rest = self.buf.split();
        if let Some(dropped) = self.discarding.take() {
            return Some(Frame::Oversized {
                len: dropped + rest.len(),
            });
        }
        self.classify(rest)
    }

    fn classify(&self, line: BytesMut) -> Option<Frame> {
        if line.iter().all(u8::is_ascii_whitespace) {
            None
        } else if line.len() > self.max_len {
            Some(Frame::Oversized { len: line.len() })
        } else {
            Some(Frame::Packet(line.freeze()))
        }
    }
}
