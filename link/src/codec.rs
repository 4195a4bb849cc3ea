//! Frame codec: WebSocket frames to [`Payload`] envelopes and back.
//!
//! Text frames carry plain JSON. Binary frames carry zlib compressed JSON
//! and are the only frames ever inflated; an inflate failure is a hard
//! decode error for that frame.

use crate::compression::inflate_zlib;
use crate::error::{LeapError, Result};
use crate::models::Payload;
use crate::transport::Frame;

/// Decode one received frame into a payload envelope.
pub fn decode_frame(frame: &Frame) -> Result<Payload> {
    match frame {
        Frame::Text(text) => Ok(serde_json::from_str(text)?),
        Frame::Binary(data) => {
            let inflated =
                inflate_zlib(data).map_err(|e| LeapError::DecompressionError(e.to_string()))?;
            Ok(serde_json::from_slice(&inflated)?)
        },
    }
}

/// Encode a payload for sending. The client always writes text frames.
pub fn encode_payload(payload: &Payload) -> Result<Frame> {
    Ok(Frame::Text(serde_json::to_string(payload)?))
}
