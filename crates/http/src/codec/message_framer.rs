use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;
use tracing::warn;

use crate::codec::header::{MAX_HEADER_BYTES, declared_body_len, find_head_end, terminator_len};
use crate::protocol::ParseError;

/// Frames the inbound byte stream of a connection into messages.
///
/// A frame is the head plus as much of its `Content-Length` body as is buffered. Bytes
/// past the body stay in the buffer as the start of the next message. A head whose
/// length can't be read takes the whole buffer with it. Without a terminator the buffer
/// is handed over as is after [`MAX_HEADER_BYTES`] or at end of stream; the request
/// decoder then reports it as invalid.
#[derive(Debug, Default)]
pub struct MessageFramer {
    /// How far the buffer has already been searched for the terminator.
    searched: usize,
}

impl MessageFramer {
    pub fn new() -> Self {
        Self::default()
    }

    fn take(&mut self, src: &mut BytesMut, len: usize) -> Bytes {
        self.searched = 0;
        src.split_to(len).freeze()
    }
}

impl Decoder for MessageFramer {
    type Item = Bytes;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // the terminator may straddle the previous search boundary
        let start = self.searched.saturating_sub(3);
        if let Some(offset) = find_head_end(&src[start..]) {
            let body_start = start + offset + terminator_len();
            let len = match declared_body_len(&src[..body_start]) {
                Some(body_len) => body_start.saturating_add(body_len).min(src.len()),
                None => src.len(),
            };
            return Ok(Some(self.take(src, len)));
        }

        if src.len() > MAX_HEADER_BYTES {
            warn!(size = src.len(), max_size = MAX_HEADER_BYTES, "request head exceeds the limit");
            let len = src.len();
            return Ok(Some(self.take(src, len)));
        }

        self.searched = src.len();
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => {
                let len = src.len();
                Ok(Some(self.take(src, len)))
            }
        }
    }
}
