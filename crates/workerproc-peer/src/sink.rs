use std::sync::Mutex;

use bytes::Bytes;
use tracing::trace;

pub(crate) type MessageHandler = Box<dyn FnMut(Bytes) + Send>;

/// Delivery point for inbound messages.
///
/// Messages arriving before a handler is attached are buffered and flushed
/// to the handler on attachment, in order, so no message delivered by the
/// channel is lost to attachment timing.
pub(crate) struct MessageSink {
    inner: Mutex<SinkState>,
}

struct SinkState {
    handler: Option<MessageHandler>,
    pending: Vec<Bytes>,
}

impl MessageSink {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(SinkState {
                handler: None,
                pending: Vec::new(),
            }),
        }
    }

    /// Attach the handler, flushing any buffered messages to it first.
    pub(crate) fn attach(&self, mut handler: MessageHandler) {
        let mut state = self.inner.lock().expect("message sink poisoned");
        for payload in state.pending.drain(..) {
            handler(payload);
        }
        state.handler = Some(handler);
    }

    /// Deliver one message, buffering it if no handler is attached yet.
    pub(crate) fn deliver(&self, payload: Bytes) {
        let mut state = self.inner.lock().expect("message sink poisoned");
        match &mut state.handler {
            Some(handler) => handler(payload),
            None => {
                trace!(bytes = payload.len(), "buffering message; no handler yet");
                state.pending.push(payload);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn buffered_messages_flush_in_order_on_attach() {
        let sink = MessageSink::new();
        sink.deliver(Bytes::from_static(b"one"));
        sink.deliver(Bytes::from_static(b"two"));

        let (tx, rx) = mpsc::channel();
        sink.attach(Box::new(move |payload| tx.send(payload).unwrap()));
        sink.deliver(Bytes::from_static(b"three"));

        let got: Vec<Bytes> = rx.try_iter().collect();
        assert_eq!(
            got,
            vec![
                Bytes::from_static(b"one"),
                Bytes::from_static(b"two"),
                Bytes::from_static(b"three"),
            ]
        );
    }
}
