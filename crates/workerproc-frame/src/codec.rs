use crate::error::{FrameError, Result};

/// Frame length prefix: 4 bytes, big-endian unsigned.
pub const PREFIX_SIZE: usize = 4;

/// Maximum payload length of a single frame.
pub const MAX_FRAME_LEN: usize = u32::MAX as usize;

/// Handshake byte announced by the parent-role side.
pub const HANDSHAKE_PARENT: u8 = 0x00;

/// Handshake byte announced by the child-role side.
pub const HANDSHAKE_CHILD: u8 = 0x01;

/// Which side of the parent-child channel this codec speaks for.
///
/// Each side announces its own byte and validates that the peer announces
/// the complementary one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Parent,
    Child,
}

impl Role {
    /// The handshake byte this side sends.
    pub fn handshake_byte(self) -> u8 {
        match self {
            Role::Parent => HANDSHAKE_PARENT,
            Role::Child => HANDSHAKE_CHILD,
        }
    }

    /// The handshake byte this side expects from the peer.
    pub fn expected_peer_byte(self) -> u8 {
        match self {
            Role::Parent => HANDSHAKE_CHILD,
            Role::Child => HANDSHAKE_PARENT,
        }
    }
}

/// Encode the length prefix for a payload of `len` bytes.
pub fn encode_prefix(len: usize) -> Result<[u8; PREFIX_SIZE]> {
    if len > MAX_FRAME_LEN {
        return Err(FrameError::PayloadTooLarge {
            size: len,
            max: MAX_FRAME_LEN,
        });
    }
    Ok((len as u32).to_be_bytes())
}

/// Decode a complete length prefix.
pub fn decode_prefix(prefix: [u8; PREFIX_SIZE]) -> usize {
    u32::from_be_bytes(prefix) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_roundtrip() {
        for len in [0usize, 1, 255, 256, 65_536, MAX_FRAME_LEN] {
            let prefix = encode_prefix(len).unwrap();
            assert_eq!(decode_prefix(prefix), len);
        }
    }

    #[test]
    fn prefix_is_big_endian() {
        let prefix = encode_prefix(0x0102_0304).unwrap();
        assert_eq!(prefix, [0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn oversized_length_rejected() {
        let err = encode_prefix(MAX_FRAME_LEN + 1).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
    }

    #[test]
    fn roles_are_complementary() {
        assert_eq!(Role::Parent.handshake_byte(), HANDSHAKE_PARENT);
        assert_eq!(Role::Child.handshake_byte(), HANDSHAKE_CHILD);
        assert_eq!(
            Role::Parent.expected_peer_byte(),
            Role::Child.handshake_byte()
        );
        assert_eq!(
            Role::Child.expected_peer_byte(),
            Role::Parent.handshake_byte()
        );
    }
}
