//! Frame encoding/decoding utilities.
//!
//! Gateway frames are self-delimited XML envelopes with no length prefix:
//!
//! ```text
//! [garbage | <?xml ...?>] <methodResponse> ... </methodResponse>
//! [garbage | <?xml ...?>] <methodCall> ... </methodCall>
//! ```
//!
//! The codec scans for an envelope start tag, discards anything before it and
//! waits for the matching end tag. A start tag seen before the end tag of the
//! current frame means the current frame was truncated on the wire; it is
//! reported as malformed and scanning resumes at the new frame.

use bytes::{Buf, BytesMut};
use tracing::trace;

use crate::commands::MethodCall;
use crate::constants::*;
use crate::error::{EncodingError, ProtocolError};
use crate::responses::Frame;

const START_CALL: &[u8] = b"<methodCall";
const START_RESPONSE: &[u8] = b"<methodResponse";
const END_CALL: &[u8] = b"</methodCall>";
const END_RESPONSE: &[u8] = b"</methodResponse>";

/// A codec that turns a byte stream into complete frames.
#[derive(Debug)]
pub struct FrameCodec {
    /// Buffer for accumulating incoming data.
    buffer: BytesMut,
    /// Largest frame accepted before it is discarded.
    max_frame_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Where the next envelope starts, if anywhere.
enum StartScan {
    /// A complete start tag at this offset.
    Found(usize, &'static [u8]),
    /// A possible start tag cut off at this offset; wait for more bytes.
    Partial(usize),
    /// Nothing that could start a frame.
    None,
}

impl FrameCodec {
    /// Create a new frame codec.
    pub fn new() -> Self {
        Self::with_max_frame_size(MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        FrameCodec {
            buffer: BytesMut::with_capacity(max_frame_size.min(MAX_FRAME_SIZE)),
            max_frame_size,
        }
    }

    /// Encode a call for transmission.
    pub fn encode(call: &MethodCall) -> Result<Vec<u8>, EncodingError> {
        call.encode()
    }

    /// Add received data to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Append `data` and iterate over the frames it completes.
    ///
    /// The iterator is lazy; frames left unread stay buffered and are
    /// returned by the next call.
    pub fn feed(&mut self, data: &[u8]) -> Frames<'_> {
        self.push(data);
        Frames { codec: self }
    }

    /// Try to extract the next complete frame.
    ///
    /// Returns `None` when more data is needed. A malformed frame is
    /// returned as an error after it has been removed from the buffer.
    pub fn decode_next(&mut self) -> Option<Result<Frame, ProtocolError>> {
        let (start, end_tag) = match scan_start(&self.buffer, 0) {
            StartScan::Found(pos, tag) => (pos, end_tag_for(tag)),
            StartScan::Partial(pos) => {
                self.discard(pos);
                return None;
            }
            StartScan::None => {
                let len = self.buffer.len();
                self.discard(len);
                return None;
            }
        };
        self.discard(start);

        let end = find(&self.buffer, end_tag, 1).map(|pos| pos + end_tag.len());
        let next_start = match scan_start(&self.buffer, 1) {
            StartScan::Found(pos, _) => Some(pos),
            _ => None,
        };

        match (end, next_start) {
            (Some(end), next) if next.map_or(true, |n| end <= n) => {
                let raw = self.buffer.split_to(end);
                Some(Frame::decode(&raw))
            }
            (_, Some(next)) => {
                let raw = self.buffer.split_to(next).to_vec();
                Some(Err(ProtocolError::Malformed {
                    reason: "frame interrupted by a new frame".to_string(),
                    raw,
                }))
            }
            _ if self.buffer.len() > self.max_frame_size => {
                let actual = self.buffer.len();
                let raw = self.buffer[..actual.min(256)].to_vec();
                // Drop the oversized frame up to a possible start tag in its tail.
                let keep_from = match scan_start(&self.buffer, actual.saturating_sub(START_RESPONSE.len()).max(1)) {
                    StartScan::Partial(pos) => pos,
                    _ => actual,
                };
                self.buffer.advance(keep_from);
                Some(Err(ProtocolError::FrameTooLong {
                    max: self.max_frame_size,
                    actual: keep_from,
                    raw,
                }))
            }
            _ => None,
        }
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    fn discard(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        let dropped = &self.buffer[..count];
        if dropped.iter().any(|b| !b.is_ascii_whitespace()) {
            trace!("FrameCodec: skipping {} bytes before frame", count);
        }
        self.buffer.advance(count);
    }
}

/// Lazy iterator over frames completed by [`FrameCodec::feed`].
pub struct Frames<'a> {
    codec: &'a mut FrameCodec,
}

impl Iterator for Frames<'_> {
    type Item = Result<Frame, ProtocolError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.codec.decode_next()
    }
}

fn end_tag_for(start: &[u8]) -> &'static [u8] {
    if start == START_CALL {
        END_CALL
    } else {
        END_RESPONSE
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| pos + from)
}

/// Locate the next envelope start tag at or after `from`.
fn scan_start(buf: &[u8], from: usize) -> StartScan {
    let mut pos = from;
    while pos < buf.len() {
        let Some(lt) = buf[pos..].iter().position(|&b| b == b'<').map(|p| p + pos) else {
            return StartScan::None;
        };
        for tag in [START_CALL, START_RESPONSE] {
            let rest = &buf[lt..];
            if rest.len() <= tag.len() {
                if tag.starts_with(rest) {
                    return StartScan::Partial(lt);
                }
                continue;
            }
            if rest.starts_with(tag) {
                let delimiter = rest[tag.len()];
                if delimiter == b'>' || delimiter == b'/' || delimiter.is_ascii_whitespace() {
                    return StartScan::Found(lt, tag);
                }
            }
        }
        pos = lt + 1;
    }
    StartScan::None
}
