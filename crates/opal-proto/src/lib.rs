//! Opal IPC Protocol
//!
//! Shared wire types for communication between `opal-comp` (the X11
//! compositor) and `opal-shell` (the bridge linked into the embedded
//! browser host).
//!
//! One send carries one [`Packet`]: an ordered list of tagged
//! [`Segment`]s, serialized as JSON and framed with a 4-byte big-endian
//! length prefix so a stream transport delimits messages.

mod segment;

pub use segment::{Packet, Segment, WinType};

/// Socket path for IPC communication
pub fn socket_path() -> std::path::PathBuf {
    std::path::PathBuf::from("/tmp/opal.ipc")
}

/// Upper bound on a single frame body. Anything larger is a corrupt or
/// hostile peer and the connection is dropped.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Encode a frame body with its length prefix (4 bytes, big-endian).
pub fn encode_frame(body: &[u8]) -> Vec<u8> {
    let len = body.len() as u32;
    let mut buf = Vec::with_capacity(4 + body.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(body);
    buf
}

/// Reassembles frames from a non-blocking byte stream.
///
/// Bytes arrive in whatever chunks the socket hands out; callers feed
/// them in with [`FrameBuffer::extend`] and pull complete frame bodies
/// with [`FrameBuffer::next_frame`].
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes read from the transport.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete frame body, if one has fully arrived.
    ///
    /// Returns an error when the declared length exceeds
    /// [`MAX_FRAME_LEN`]; the stream is unrecoverable past that point.
    pub fn next_frame(&mut self) -> anyhow::Result<Option<Vec<u8>>> {
        if self.buf.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
        if len > MAX_FRAME_LEN {
            anyhow::bail!("frame too large: {} bytes", len);
        }
        if self.buf.len() < 4 + len {
            return Ok(None);
        }
        let body = self.buf[4..4 + len].to_vec();
        self.buf.drain(..4 + len);
        Ok(Some(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_reassembly_across_partial_reads() {
        let packet = Packet::from(vec![Segment::ReloadReply]);
        let encoded = packet.encode().unwrap();

        let mut frames = FrameBuffer::new();
        // Feed one byte at a time, as a non-blocking read might.
        for byte in &encoded {
            frames.extend(std::slice::from_ref(byte));
        }

        let body = frames.next_frame().unwrap().expect("complete frame");
        let decoded = Packet::decode(&body).unwrap();
        assert_eq!(decoded, packet);
        assert!(frames.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_two_frames_in_one_read() {
        let a = Packet::from(vec![Segment::RenderRequest]);
        let b = Packet::from(vec![Segment::BrowserStartRequest]);

        let mut bytes = a.encode().unwrap();
        bytes.extend_from_slice(&b.encode().unwrap());

        let mut frames = FrameBuffer::new();
        frames.extend(&bytes);

        let first = frames.next_frame().unwrap().unwrap();
        let second = frames.next_frame().unwrap().unwrap();
        assert_eq!(Packet::decode(&first).unwrap(), a);
        assert_eq!(Packet::decode(&second).unwrap(), b);
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut frames = FrameBuffer::new();
        frames.extend(&(MAX_FRAME_LEN as u32 + 1).to_be_bytes());
        assert!(frames.next_frame().is_err());
    }
}
