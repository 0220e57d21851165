use bytes::{Bytes, BytesMut};

use crate::codec::{decode_prefix, Role, PREFIX_SIZE};
use crate::error::{FrameError, Result};

/// Something the decoder produced from an arrival chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeEvent {
    /// The peer's handshake byte validated. Emitted exactly once.
    Handshake,
    /// A complete message payload was assembled.
    Message(Bytes),
}

enum DecodeState {
    /// Waiting for the peer's single handshake byte.
    Handshake,
    /// Accumulating the 4-byte length prefix.
    Prefix { buf: [u8; PREFIX_SIZE], filled: usize },
    /// Accumulating payload chunks for a message of known length.
    Payload {
        target: usize,
        chunks: Vec<Bytes>,
        received: usize,
    },
}

impl DecodeState {
    fn fresh_prefix() -> Self {
        DecodeState::Prefix {
            buf: [0; PREFIX_SIZE],
            filled: 0,
        }
    }
}

/// Incremental frame parser for one direction of the channel.
///
/// Fed raw arrival chunks of arbitrary size; produces [`DecodeEvent`]s.
/// Handles messages split across chunks at any position, including
/// mid-prefix, and multiple back-to-back messages inside one chunk. Only
/// one message is ever mid-assembly (the protocol is strictly sequential).
///
/// A protocol violation latches the decoder: every later `feed` is a no-op.
pub struct FrameDecoder {
    role: Role,
    state: DecodeState,
    aborted: bool,
}

impl FrameDecoder {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            state: DecodeState::Handshake,
            aborted: false,
        }
    }

    /// Whether the handshake byte has been received and validated.
    pub fn handshake_complete(&self) -> bool {
        !matches!(self.state, DecodeState::Handshake)
    }

    /// Whether the decoder aborted on a protocol violation.
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Consume one arrival chunk, producing any events it completes.
    ///
    /// Payload bytes are retained as zero-copy slices of `chunk`; a message
    /// that arrives in a single chunk is sliced straight out of it, and
    /// only multi-chunk messages are concatenated on completion.
    pub fn feed(&mut self, chunk: Bytes) -> Result<Vec<DecodeEvent>> {
        if self.aborted || chunk.is_empty() {
            return Ok(Vec::new());
        }

        let mut events = Vec::new();
        let mut cur = 0usize;

        if let DecodeState::Handshake = self.state {
            let expected = self.role.expected_peer_byte();
            let got = chunk[0];
            if got != expected {
                self.aborted = true;
                return Err(FrameError::InvalidHandshake { expected, got });
            }
            self.state = DecodeState::fresh_prefix();
            events.push(DecodeEvent::Handshake);
            cur = 1;
        }

        while cur < chunk.len() {
            match &mut self.state {
                DecodeState::Prefix { buf, filled } => {
                    let take = (PREFIX_SIZE - *filled).min(chunk.len() - cur);
                    buf[*filled..*filled + take].copy_from_slice(&chunk[cur..cur + take]);
                    *filled += take;
                    cur += take;

                    if *filled == PREFIX_SIZE {
                        let target = decode_prefix(*buf);
                        if target == 0 {
                            // Empty message: complete the moment the prefix is.
                            events.push(DecodeEvent::Message(Bytes::new()));
                            self.state = DecodeState::fresh_prefix();
                        } else {
                            self.state = DecodeState::Payload {
                                target,
                                chunks: Vec::new(),
                                received: 0,
                            };
                        }
                    }
                }
                DecodeState::Payload {
                    target,
                    chunks,
                    received,
                } => {
                    let take = (*target - *received).min(chunk.len() - cur);
                    chunks.push(chunk.slice(cur..cur + take));
                    *received += take;
                    cur += take;

                    if received == target {
                        let message = assemble(std::mem::take(chunks));
                        events.push(DecodeEvent::Message(message));
                        self.state = DecodeState::fresh_prefix();
                    }
                }
                DecodeState::Handshake => unreachable!("handshake handled before the loop"),
            }
        }

        Ok(events)
    }
}

fn assemble(mut chunks: Vec<Bytes>) -> Bytes {
    if chunks.len() == 1 {
        return chunks.pop().expect("length checked");
    }
    let total: usize = chunks.iter().map(Bytes::len).sum();
    let mut buf = BytesMut::with_capacity(total);
    for chunk in chunks {
        buf.extend_from_slice(&chunk);
    }
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_prefix, HANDSHAKE_CHILD, HANDSHAKE_PARENT};

    /// Wire bytes for one direction: handshake byte + framed payloads.
    fn wire(handshake: u8, payloads: &[&[u8]]) -> Vec<u8> {
        let mut out = vec![handshake];
        for payload in payloads {
            out.extend_from_slice(&encode_prefix(payload.len()).unwrap());
            out.extend_from_slice(payload);
        }
        out
    }

    fn feed_all(decoder: &mut FrameDecoder, bytes: &[u8], split: usize) -> Vec<DecodeEvent> {
        let mut events = Vec::new();
        for chunk in bytes.chunks(split) {
            events.extend(
                decoder
                    .feed(Bytes::copy_from_slice(chunk))
                    .expect("feed should succeed"),
            );
        }
        events
    }

    #[test]
    fn parent_accepts_child_handshake() {
        let mut decoder = FrameDecoder::new(Role::Parent);
        let events = decoder.feed(Bytes::from_static(&[HANDSHAKE_CHILD])).unwrap();
        assert_eq!(events, vec![DecodeEvent::Handshake]);
        assert!(decoder.handshake_complete());
    }

    #[test]
    fn child_accepts_parent_handshake() {
        let mut decoder = FrameDecoder::new(Role::Child);
        let events = decoder
            .feed(Bytes::from_static(&[HANDSHAKE_PARENT]))
            .unwrap();
        assert_eq!(events, vec![DecodeEvent::Handshake]);
    }

    #[test]
    fn wrong_handshake_byte_aborts() {
        let mut decoder = FrameDecoder::new(Role::Parent);
        let err = decoder
            .feed(Bytes::from_static(&[HANDSHAKE_PARENT]))
            .unwrap_err();
        assert!(matches!(
            err,
            FrameError::InvalidHandshake {
                expected: HANDSHAKE_CHILD,
                got: HANDSHAKE_PARENT
            }
        ));
        assert!(decoder.is_aborted());

        // Aborted decoder ignores all further input, even valid frames.
        let later = decoder
            .feed(Bytes::copy_from_slice(&wire(HANDSHAKE_CHILD, &[b"x"])))
            .unwrap();
        assert!(later.is_empty());
    }

    #[test]
    fn garbage_handshake_byte_aborts() {
        let mut decoder = FrameDecoder::new(Role::Child);
        let err = decoder.feed(Bytes::from_static(&[0x7f])).unwrap_err();
        assert!(matches!(
            err,
            FrameError::InvalidHandshake { got: 0x7f, .. }
        ));
    }

    #[test]
    fn single_chunk_message() {
        let mut decoder = FrameDecoder::new(Role::Parent);
        let events = decoder
            .feed(Bytes::copy_from_slice(&wire(HANDSHAKE_CHILD, &[b"hello"])))
            .unwrap();
        assert_eq!(
            events,
            vec![
                DecodeEvent::Handshake,
                DecodeEvent::Message(Bytes::from_static(b"hello"))
            ]
        );
    }

    #[test]
    fn empty_message() {
        let mut decoder = FrameDecoder::new(Role::Parent);
        let events = decoder
            .feed(Bytes::copy_from_slice(&wire(HANDSHAKE_CHILD, &[b""])))
            .unwrap();
        assert_eq!(
            events,
            vec![DecodeEvent::Handshake, DecodeEvent::Message(Bytes::new())]
        );
    }

    #[test]
    fn back_to_back_messages_in_one_chunk() {
        let mut decoder = FrameDecoder::new(Role::Child);
        let events = decoder
            .feed(Bytes::copy_from_slice(&wire(
                HANDSHAKE_PARENT,
                &[b"one", b"two", b"three"],
            )))
            .unwrap();
        assert_eq!(
            events,
            vec![
                DecodeEvent::Handshake,
                DecodeEvent::Message(Bytes::from_static(b"one")),
                DecodeEvent::Message(Bytes::from_static(b"two")),
                DecodeEvent::Message(Bytes::from_static(b"three")),
            ]
        );
    }

    #[test]
    fn byte_at_a_time_delivery() {
        let bytes = wire(HANDSHAKE_CHILD, &[b"ping", b"", b"pong"]);
        let mut decoder = FrameDecoder::new(Role::Parent);
        let events = feed_all(&mut decoder, &bytes, 1);
        assert_eq!(
            events,
            vec![
                DecodeEvent::Handshake,
                DecodeEvent::Message(Bytes::from_static(b"ping")),
                DecodeEvent::Message(Bytes::new()),
                DecodeEvent::Message(Bytes::from_static(b"pong")),
            ]
        );
    }

    #[test]
    fn every_split_position_yields_same_messages() {
        let payloads: &[&[u8]] = &[b"alpha", b"bravo-bravo", b"c"];
        let bytes = wire(HANDSHAKE_PARENT, payloads);

        for split in 1..=bytes.len() {
            let mut decoder = FrameDecoder::new(Role::Child);
            let events = feed_all(&mut decoder, &bytes, split);

            let messages: Vec<&Bytes> = events
                .iter()
                .filter_map(|event| match event {
                    DecodeEvent::Message(payload) => Some(payload),
                    DecodeEvent::Handshake => None,
                })
                .collect();

            assert_eq!(messages.len(), payloads.len(), "split {split}");
            for (message, payload) in messages.iter().zip(payloads) {
                assert_eq!(message.as_ref(), *payload, "split {split}");
            }
        }
    }

    #[test]
    fn split_mid_prefix_resumes() {
        let bytes = wire(HANDSHAKE_CHILD, &[b"abcdef"]);
        let mut decoder = FrameDecoder::new(Role::Parent);

        // Handshake + 2 of the 4 prefix bytes.
        let events = decoder.feed(Bytes::copy_from_slice(&bytes[..3])).unwrap();
        assert_eq!(events, vec![DecodeEvent::Handshake]);

        let events = decoder.feed(Bytes::copy_from_slice(&bytes[3..])).unwrap();
        assert_eq!(
            events,
            vec![DecodeEvent::Message(Bytes::from_static(b"abcdef"))]
        );
    }

    #[test]
    fn large_message_across_many_chunks() {
        let payload: Vec<u8> = (0..256 * 1024).map(|i| (i % 251) as u8).collect();
        let bytes = wire(HANDSHAKE_PARENT, &[&payload]);

        let mut decoder = FrameDecoder::new(Role::Child);
        let events = feed_all(&mut decoder, &bytes, 8 * 1024);

        assert_eq!(events.len(), 2);
        match &events[1] {
            DecodeEvent::Message(message) => assert_eq!(message.as_ref(), payload.as_slice()),
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[test]
    fn handshake_only_fires_once() {
        let mut decoder = FrameDecoder::new(Role::Parent);
        let bytes = wire(HANDSHAKE_CHILD, &[b"a", b"b"]);
        let events = feed_all(&mut decoder, &bytes, 4);
        let handshakes = events
            .iter()
            .filter(|event| matches!(event, DecodeEvent::Handshake))
            .count();
        assert_eq!(handshakes, 1);
    }
}
