//! Rendezvous frame codec.
//!
//! One fixed-size frame carries a worker address plus the pair of tags the
//! sender will use on the connection that follows. The size is fixed so a
//! server can post a receive before it knows how long any address is.
//!
//! ```text
//! offset 0   recv_tag  u64 LE   tag the SENDER receives on
//! offset 8   send_tag  u64 LE   tag the SENDER sends on
//! offset 16  addr_len  u64 LE   meaningful payload bytes
//! offset 24  payload   address bytes, zero padded to FRAME_SIZE
//! ```
//!
//! Tag names are from the sender's point of view. The receiver must swap
//! them: what the client receives on, the server sends on. That swap is
//! `ServerTags::from(ClientTags)` and nothing else in the crate reads the
//! raw fields.

use thiserror::Error;

use crate::address::WorkerAddress;
use crate::tag::Tag;

/// Total frame size in bytes.
pub const FRAME_SIZE: usize = 10_000;

/// Three u64 header fields.
pub const HEADER_SIZE: usize = 24;

/// Largest address that fits in a frame.
pub const MAX_ADDRESS_LEN: usize = FRAME_SIZE - HEADER_SIZE;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("address of {len} bytes exceeds frame payload of {max} bytes", max = MAX_ADDRESS_LEN)]
    AddressTooLong { len: usize },
    #[error("frame is {len} bytes, expected {expected}", expected = FRAME_SIZE)]
    BadFrameSize { len: usize },
    #[error("frame declares {declared} address bytes, payload holds {max}", max = MAX_ADDRESS_LEN)]
    BadAddressLength { declared: u64 },
}

/// Tag pair as named by the client that built the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientTags {
    /// The client receives on this tag.
    pub recv: Tag,
    /// The client sends on this tag.
    pub send: Tag,
}

/// Tag pair as the server must use it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServerTags {
    /// The server receives on this tag (the client's `send`).
    pub recv: Tag,
    /// The server sends on this tag (the client's `recv`).
    pub send: Tag,
}

impl ClientTags {
    /// A fresh pair of random tags.
    pub fn random() -> Self {
        Self { recv: Tag::random(), send: Tag::random() }
    }
}

impl From<ClientTags> for ServerTags {
    #[inline]
    fn from(c: ClientTags) -> Self {
        ServerTags { recv: c.send, send: c.recv }
    }
}

/// A decoded frame, tags already swapped into server orientation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub address: WorkerAddress,
    pub tags: ServerTags,
}

/// Build a frame from the client's address and its own tags.
pub fn encode(address: &[u8], tags: ClientTags) -> Result<Vec<u8>, FrameError> {
    if address.len() > MAX_ADDRESS_LEN {
        return Err(FrameError::AddressTooLong { len: address.len() });
    }

    let mut frame = vec![0u8; FRAME_SIZE];
    frame[0..8].copy_from_slice(&tags.recv.0.to_le_bytes());
    frame[8..16].copy_from_slice(&tags.send.0.to_le_bytes());
    frame[16..24].copy_from_slice(&(address.len() as u64).to_le_bytes());
    frame[HEADER_SIZE..HEADER_SIZE + address.len()].copy_from_slice(address);
    Ok(frame)
}

/// Parse a frame received on the rendezvous tag.
pub fn decode(frame: &[u8]) -> Result<DecodedFrame, FrameError> {
    if frame.len() != FRAME_SIZE {
        return Err(FrameError::BadFrameSize { len: frame.len() });
    }

    let client = ClientTags {
        recv: Tag(read_u64(frame, 0)),
        send: Tag(read_u64(frame, 8)),
    };
    let declared = read_u64(frame, 16);
    if declared > MAX_ADDRESS_LEN as u64 {
        return Err(FrameError::BadAddressLength { declared });
    }
    let len = declared as usize;

    Ok(DecodedFrame {
        address: WorkerAddress::from_bytes(&frame[HEADER_SIZE..HEADER_SIZE + len]),
        tags: ServerTags::from(client),
    })
}

#[inline]
fn read_u64(frame: &[u8], offset: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&frame[offset..offset + 8]);
    u64::from_le_bytes(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(r: u64, s: u64) -> ClientTags {
        ClientTags { recv: Tag(r), send: Tag(s) }
    }

    #[test]
    fn test_roundtrip_swaps_tags() {
        let addr = b"some-worker-address".to_vec();
        let frame = encode(&addr, tags(11, 22)).unwrap();
        let decoded = decode(&frame).unwrap();

        assert_eq!(decoded.address.as_bytes(), &addr[..]);
        assert_eq!(decoded.tags.send, Tag(11));
        assert_eq!(decoded.tags.recv, Tag(22));
    }

    #[test]
    fn test_decode_never_returns_unswapped() {
        let frame = encode(b"x", tags(1, 2)).unwrap();
        let decoded = decode(&frame).unwrap();
        assert_ne!(decoded.tags, ServerTags { recv: Tag(1), send: Tag(2) });
    }

    #[test]
    fn test_frame_size_is_fixed() {
        for len in [0, 1, 100, 4096, MAX_ADDRESS_LEN] {
            let addr = vec![0xAB; len];
            let frame = encode(&addr, tags(0, 0)).unwrap();
            assert_eq!(frame.len(), FRAME_SIZE);
            assert_eq!(decode(&frame).unwrap().address.len(), len);
        }
    }

    #[test]
    fn test_wire_layout() {
        let frame = encode(&[9, 8, 7], tags(0x0102, 0x0304)).unwrap();
        assert_eq!(&frame[0..8], &0x0102u64.to_le_bytes());
        assert_eq!(&frame[8..16], &0x0304u64.to_le_bytes());
        assert_eq!(&frame[16..24], &3u64.to_le_bytes());
        assert_eq!(&frame[24..27], &[9, 8, 7]);
        assert!(frame[27..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_address_too_long() {
        let addr = vec![0; MAX_ADDRESS_LEN + 1];
        assert_eq!(
            encode(&addr, tags(0, 0)),
            Err(FrameError::AddressTooLong { len: MAX_ADDRESS_LEN + 1 })
        );
    }

    #[test]
    fn test_decode_rejects_bad_frames() {
        assert_eq!(decode(&[0u8; 10]), Err(FrameError::BadFrameSize { len: 10 }));

        let mut frame = encode(b"abc", tags(0, 0)).unwrap();
        frame[16..24].copy_from_slice(&(MAX_ADDRESS_LEN as u64 + 1).to_le_bytes());
        assert_eq!(
            decode(&frame),
            Err(FrameError::BadAddressLength { declared: MAX_ADDRESS_LEN as u64 + 1 })
        );
    }

    #[test]
    fn test_server_tags_conversion() {
        let c = tags(5, 6);
        let s: ServerTags = c.into();
        assert_eq!(s, ServerTags { recv: Tag(6), send: Tag(5) });
    }
}
