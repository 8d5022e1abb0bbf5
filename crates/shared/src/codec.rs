use bytes::BytesMut;
use thiserror::Error;

use crate::protocol::message::Message;

/// Upper bound for a single frame; a connection that exceeds this
/// without producing a delimiter cannot be resynchronized.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum DecodeError {
    /// The frame was consumed; the connection may keep going.
    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
    /// Terminal: the peer is not speaking newline-delimited JSON.
    #[error("frame exceeds {MAX_FRAME_BYTES} bytes without a delimiter")]
    FrameTooLarge,
}

impl DecodeError {
    /// Whether the connection can survive this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, DecodeError::MalformedPayload(_))
    }
}

/// Serialize one message as a single newline-terminated JSON object.
/// Compact JSON never contains a raw newline, so the delimiter is
/// unambiguous.
pub fn encode_line(msg: &Message) -> Result<Vec<u8>, serde_json::Error> {
    let mut out = serde_json::to_vec(msg)?;
    out.push(b'\n');
    Ok(out)
}

/// Consume at most one complete frame from `buf`. Returns `Ok(None)`
/// until a full delimited frame has been buffered.
pub fn decode_from_buf(buf: &mut BytesMut) -> Result<Option<Message>, DecodeError> {
    let Some(pos) = buf.iter().position(|&b| b == b'\n') else {
        if buf.len() > MAX_FRAME_BYTES {
            return Err(DecodeError::FrameTooLarge);
        }
        return Ok(None);
    };
    let frame = buf.split_to(pos + 1);
    let mut line = &frame[..pos];
    if line.last() == Some(&b'\r') {
        line = &line[..pos - 1];
    }
    let msg = serde_json::from_slice(line)?;
    Ok(Some(msg))
}
