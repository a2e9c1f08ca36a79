//! Newline-delimited JSON framing.
//!
//! One message per line of UTF-8 text. A trailing `\r` is tolerated and
//! whitespace-only lines are skipped. When the stream ends with a
//! non-empty line that was never terminated, that line is still emitted as
//! the last frame: a peer closing abruptly should not lose its final
//! message.

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::TransportError;
use crate::internal::mcp::protocol::JsonRpcMessage;

/// Frames longer than this are shortened when echoed in diagnostics
const PREVIEW_LEN: usize = 120;

#[derive(Debug, Default, Clone)]
pub struct LineCodec {
    // Bytes of the buffer already scanned for a delimiter
    next_index: usize,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

fn strip_carriage_return(line: &mut BytesMut) {
    if line.last() == Some(&b'\r') {
        line.truncate(line.len() - 1);
    }
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}

impl Decoder for LineCodec {
    type Item = Bytes;
    type Error = TransportError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, TransportError> {
        loop {
            let newline = buf[self.next_index..].iter().position(|b| *b == b'\n');
            let Some(offset) = newline else {
                self.next_index = buf.len();
                return Ok(None);
            };

            let end = self.next_index + offset;
            self.next_index = 0;

            let mut line = buf.split_to(end + 1);
            line.truncate(end);
            strip_carriage_return(&mut line);

            if !is_blank(&line) {
                return Ok(Some(line.freeze()));
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, TransportError> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }

        self.next_index = 0;
        let mut rest = buf.split();
        strip_carriage_return(&mut rest);
        if is_blank(&rest) {
            Ok(None)
        } else {
            Ok(Some(rest.freeze()))
        }
    }
}

impl Encoder<JsonRpcMessage> for LineCodec {
    type Error = TransportError;

    fn encode(&mut self, item: JsonRpcMessage, dst: &mut BytesMut) -> Result<(), TransportError> {
        // serde_json never emits raw newlines, so one message is one line
        let encoded = serde_json::to_vec(&item)?;
        dst.reserve(encoded.len() + 1);
        dst.extend_from_slice(&encoded);
        dst.put_u8(b'\n');
        Ok(())
    }
}

/// A frame that could not be turned into a message.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame is not valid UTF-8: {source} ({preview})")]
    Utf8 {
        #[source]
        source: std::str::Utf8Error,
        preview: String,
    },
    #[error("frame is not a JSON-RPC message: {source} ({preview})")]
    Json {
        #[source]
        source: serde_json::Error,
        preview: String,
    },
}

fn preview(frame: &[u8]) -> String {
    let text = String::from_utf8_lossy(frame);
    if text.chars().count() > PREVIEW_LEN {
        let shortened: String = text.chars().take(PREVIEW_LEN).collect();
        format!("{}...", shortened)
    } else {
        text.into_owned()
    }
}

/// Decode one complete frame into a message.
pub fn decode_message(frame: &[u8]) -> Result<JsonRpcMessage, FrameError> {
    let text = std::str::from_utf8(frame).map_err(|source| FrameError::Utf8 {
        source,
        preview: preview(frame),
    })?;
    serde_json::from_str(text).map_err(|source| FrameError::Json {
        source,
        preview: preview(frame),
    })
}
