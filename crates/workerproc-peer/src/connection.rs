use std::sync::{mpsc, Arc};
use std::thread;

use bytes::Bytes;
use tracing::{debug, error, info};

use workerproc_channel::{adopt_worker_fd, ChannelStream};
use workerproc_frame::{CodecEvent, FrameCodec, FrameError, Role, SendTicket};

use crate::error::ConnectError;
use crate::sink::MessageSink;

/// The child side of the worker channel.
///
/// A worker process calls [`Connection::connect`] once at startup to adopt
/// the inherited channel descriptor and complete the handshake. After
/// connecting, a lost or corrupted channel is unrecoverable for the worker:
/// the failure is logged and the process exits with status 1.
pub struct Connection {
    codec: FrameCodec,
    control: ChannelStream,
    sink: Arc<MessageSink>,
}

impl Connection {
    /// Adopt the inherited channel descriptor and perform the handshake.
    ///
    /// Blocks until the parent's handshake byte arrives, then answers with
    /// this side's byte. Errors are phase-distinguished: a descriptor that
    /// is missing or not a socket, a channel that closed early, and a
    /// protocol violation each surface as their own variant.
    pub fn connect() -> Result<Self, ConnectError> {
        let stream = adopt_worker_fd()?;
        let control = stream.try_clone()?;

        let (events_tx, events_rx) = mpsc::channel();
        let codec = FrameCodec::over_channel(stream, Role::Child, events_tx)?;

        loop {
            match events_rx.recv() {
                Ok(CodecEvent::Handshake) => break,
                Ok(CodecEvent::Error(FrameError::ConnectionClosed)) => {
                    return Err(ConnectError::ClosedBeforeHandshake);
                }
                Ok(CodecEvent::Error(err)) => return Err(err.into()),
                // Frames cannot precede the peer's handshake byte.
                Ok(CodecEvent::Message(_)) => continue,
                Err(_) => return Err(ConnectError::ClosedBeforeHandshake),
            }
        }
        codec.announce()?;
        info!("worker channel connected");

        let sink = Arc::new(MessageSink::new());
        {
            let sink = Arc::clone(&sink);
            thread::Builder::new()
                .name("workerproc-deliver".into())
                .spawn(move || deliver_loop(events_rx, &sink))
                .expect("spawning the delivery thread should succeed");
        }

        Ok(Self {
            codec,
            control,
            sink,
        })
    }

    /// Queue a message to the parent.
    pub fn send(&self, payload: Bytes) -> Result<SendTicket, FrameError> {
        self.codec.send(payload)
    }

    /// Attach the inbound message handler. Messages that arrived before
    /// attachment are flushed to it in order.
    pub fn set_on_message(&self, handler: impl FnMut(Bytes) + Send + 'static) {
        self.sink.attach(Box::new(handler));
    }

    /// Orderly shutdown: wait for every queued send to drain, then shut
    /// down the write half so the parent observes EOF.
    ///
    /// The read half stays open; the connection can still receive until
    /// the parent closes its side.
    pub fn finish(&self) -> Result<(), ConnectError> {
        debug!("draining worker channel for shutdown");
        self.codec.drain()?.wait()?;
        self.control.shutdown_write()?;
        Ok(())
    }
}

fn deliver_loop(events: mpsc::Receiver<CodecEvent>, sink: &MessageSink) {
    for event in events {
        match event {
            CodecEvent::Message(payload) => sink.deliver(payload),
            CodecEvent::Handshake => {}
            CodecEvent::Error(err) => {
                // No useful continuation without the control channel.
                error!(error = %err, "worker channel failed");
                std::process::exit(1);
            }
        }
    }
}
