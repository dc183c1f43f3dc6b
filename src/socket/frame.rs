//! Length-prefixed framing for the noise socket.
//!
//! Every frame is a 3-byte big-endian length followed by the payload. The
//! very first frame a client sends is additionally preceded by the
//! connection header.

use crate::socket::SocketError;

/// Connection header: 'W', 'A', magic value, dictionary version.
pub const WA_HEADER: [u8; 4] = [b'W', b'A', 6, 3];

/// Largest payload a 3-byte length prefix can describe.
pub const MAX_FRAME_SIZE: usize = (1 << 24) - 1;

const LENGTH_SIZE: usize = 3;

/// Encode a payload as a frame, optionally prefixed with `header`.
pub fn encode_frame(payload: &[u8], header: Option<&[u8]>) -> Result<Vec<u8>, SocketError> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(SocketError::InvalidFrame(format!(
            "payload of {} bytes exceeds frame limit",
            payload.len()
        )));
    }

    let header = header.unwrap_or_default();
    let mut frame = Vec::with_capacity(header.len() + LENGTH_SIZE + payload.len());
    frame.extend_from_slice(header);
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes()[1..]);
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Reassembles frames from arbitrarily split websocket messages.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Take the next complete frame payload, if one is buffered.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        if self.buffer.len() < LENGTH_SIZE {
            return None;
        }
        let len = (usize::from(self.buffer[0]) << 16)
            | (usize::from(self.buffer[1]) << 8)
            | usize::from(self.buffer[2]);
        if self.buffer.len() < LENGTH_SIZE + len {
            return None;
        }

        let payload = self.buffer[LENGTH_SIZE..LENGTH_SIZE + len].to_vec();
        self.buffer.drain(..LENGTH_SIZE + len);
        Some(payload)
    }

    /// Bytes received but not yet returned as a frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_frame_carries_header() {
        let frame = encode_frame(b"hello", Some(&WA_HEADER)).unwrap();
        assert_eq!(&frame[..4], &WA_HEADER);
        assert_eq!(&frame[4..7], &[0, 0, 5]);
        assert_eq!(&frame[7..], b"hello");
    }

    #[test]
    fn test_decoder_handles_split_and_coalesced_input() {
        let mut wire = encode_frame(b"one", None).unwrap();
        wire.extend(encode_frame(b"", None).unwrap());
        wire.extend(encode_frame(&[9u8; 300], None).unwrap());

        let mut decoder = FrameDecoder::new();
        decoder.push(&wire[..2]);
        assert_eq!(decoder.next_frame(), None);

        decoder.push(&wire[2..10]);
        assert_eq!(decoder.next_frame(), Some(b"one".to_vec()));
        assert_eq!(decoder.next_frame(), Some(Vec::new()));
        assert_eq!(decoder.next_frame(), None);

        decoder.push(&wire[10..]);
        assert_eq!(decoder.next_frame(), Some(vec![9u8; 300]));
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let payload = vec![0u8; MAX_FRAME_SIZE + 1];
        assert!(encode_frame(&payload, None).is_err());
    }
}
