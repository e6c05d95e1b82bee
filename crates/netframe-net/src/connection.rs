use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use mio::net::TcpStream;
use mio::{Interest, Registry, Token};
use netframe_pool::Slice;
use netframe_wire::{PacketProcessor, PacketStream};
use tracing::{debug, warn};

use crate::assembly::AssemblyCursor;
use crate::error::SocketErrorKind;
use crate::identity::Identity;
use crate::ops::{ReadOpRecord, WriteOpRecord};

/// The application-facing capability set a connection type honors. A server
/// is generic over a factory that produces values implementing this trait,
/// replacing the deep-inheritance hierarchy the source used (see
/// SPEC_FULL.md §6 and §9).
pub trait ConnectionHandler: Send + 'static {
    /// Invoked once, right after the transport is established. `send` is
    /// the only capability the handler gets to talk back; it never sees
    /// the engine or registry.
    fn on_connected(&mut self, _send: SendHandle) {}

    /// Invoked once per complete inbound frame, in arrival order.
    fn on_message_received(&mut self, packet: PacketStream);

    /// Invoked once when the connection is torn down, for any reason.
    fn on_disconnected(&mut self) {}

    /// Invoked on an abnormal socket termination, before `on_disconnected`.
    fn on_error(&mut self, _kind: SocketErrorKind) {}
}

struct ConnShared {
    identity: Identity,
    outbound: Mutex<VecDeque<Bytes>>,
}

/// A thin, cheaply-cloneable submission handle. Captures only the write
/// backlog and a waker, never a back-pointer to the connection, the
/// registry, or the engine — breaking the cyclic ownership the source's
/// completion callbacks created.
#[derive(Clone)]
pub struct SendHandle {
    shared: Arc<ConnShared>,
    waker: Arc<mio::Waker>,
}

impl SendHandle {
    pub fn identity(&self) -> Identity {
        self.shared.identity
    }

    /// Non-blocking submission: enqueues the packet's bytes and wakes the
    /// engine's poll loop so it gets flushed promptly. Never blocks the
    /// caller even if the connection is backed up.
    pub fn send(&self, packet: &mut PacketStream) {
        let bytes = packet.buffer();
        self.shared.outbound.lock().unwrap().push_back(bytes);
        let _ = self.waker.wake();
    }
}

/// Outcome of feeding one poll event to a connection.
#[derive(Debug, PartialEq, Eq)]
pub enum ConnOutcome {
    Alive,
    Disconnected,
    Error(io::ErrorKind),
}

/// Engine-side connection state: socket, identity, assembly cursor, and the
/// pooled resources bound to this connection for its whole lifetime.
pub(crate) struct Connection<H: ConnectionHandler> {
    pub(crate) identity: Identity,
    pub(crate) token: Token,
    stream: TcpStream,
    slice: Slice,
    cursor: AssemblyCursor,
    shared: Arc<ConnShared>,
    writable_armed: bool,
    pub(crate) read_op: ReadOpRecord,
    write_op: Option<WriteOpRecord>,
    pub(crate) handler: H,
}

impl<H: ConnectionHandler> Connection<H> {
    pub(crate) fn new(
        identity: Identity,
        token: Token,
        stream: TcpStream,
        slice: Slice,
        read_op: ReadOpRecord,
        header_size: usize,
        handler: H,
    ) -> Self {
        Self {
            identity,
            token,
            stream,
            slice,
            cursor: AssemblyCursor::new(header_size),
            shared: Arc::new(ConnShared { identity, outbound: Mutex::new(VecDeque::new()) }),
            writable_armed: false,
            read_op,
            write_op: None,
            handler,
        }
    }

    pub(crate) fn needs_write_op(&self) -> bool {
        self.write_op.is_none() && self.has_backlog()
    }

    pub(crate) fn bind_write_op(&mut self, op: WriteOpRecord) {
        self.write_op = Some(op);
    }

    /// Reclaims the write op if the backlog has fully drained.
    pub(crate) fn release_write_op_if_drained(&mut self) -> Option<WriteOpRecord> {
        if self.has_backlog() {
            None
        } else {
            self.write_op.take()
        }
    }

    /// Unconditionally reclaims the write op, regardless of backlog state.
    /// Used during teardown, where an in-flight op must return to the pool
    /// even if the connection never got to drain it.
    pub(crate) fn take_write_op(&mut self) -> Option<WriteOpRecord> {
        self.write_op.take()
    }

    pub(crate) fn send_handle(&self, waker: Arc<mio::Waker>) -> SendHandle {
        SendHandle { shared: self.shared.clone(), waker }
    }

    pub(crate) fn register(&mut self, registry: &Registry) -> io::Result<()> {
        registry.register(&mut self.stream, self.token, Interest::READABLE)
    }

    pub(crate) fn deregister(&mut self, registry: &Registry) {
        let _ = registry.deregister(&mut self.stream);
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }

    /// Reads whatever is available, frames it, and dispatches every
    /// complete message to the handler in arrival order. Re-arms nothing
    /// explicitly: level-triggered readiness means the next `poll` wakes us
    /// again if more is buffered in the kernel.
    pub(crate) fn poll_readable(&mut self, processor: &dyn PacketProcessor) -> ConnOutcome {
        loop {
            let offset = self.cursor.next_receive_offset();
            if offset == self.slice.len() {
                // Compaction couldn't free room; the peer is violating the
                // framing contract (a declared length this large would
                // already have been rejected as FrameTooLarge). Defensive
                // backstop against a stuck full buffer.
                break;
            }

            let read_result = {
                let buf = self.slice.as_mut_slice();
                self.stream.read(&mut buf[offset..])
            };

            match read_result {
                Ok(0) => return ConnOutcome::Disconnected,
                Ok(n) => {
                    self.cursor.record_received(n);
                    let handler = &mut self.handler;
                    let outcome = self.cursor.extract_frames(
                        self.slice.as_mut_slice(),
                        processor,
                        |payload| {
                            let packet = processor.create_packet(Bytes::copy_from_slice(payload));
                            handler.on_message_received(packet);
                        },
                    );
                    if let Err(err) = outcome {
                        warn!(identity = %self.identity, %err, "framing error, disconnecting");
                        return ConnOutcome::Disconnected;
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    debug!(identity = %self.identity, %err, "read error");
                    return ConnOutcome::Error(err.kind());
                }
            }
        }
        ConnOutcome::Alive
    }

    /// Drains whatever is queued in the outbound backlog, writing directly
    /// to the socket until it would block or the backlog is empty.
    pub(crate) fn drain_backlog(&mut self, registry: &Registry) -> ConnOutcome {
        loop {
            let front = {
                let mut backlog = self.shared.outbound.lock().unwrap();
                match backlog.front().cloned() {
                    Some(bytes) => bytes,
                    None => break,
                }
            };
            match self.stream.write(&front) {
                Ok(0) => return ConnOutcome::Disconnected,
                Ok(n) if n == front.len() => {
                    self.shared.outbound.lock().unwrap().pop_front();
                }
                Ok(n) => {
                    let mut backlog = self.shared.outbound.lock().unwrap();
                    if let Some(head) = backlog.front_mut() {
                        *head = head.slice(n..);
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.arm_writable(registry);
                    return ConnOutcome::Alive;
                }
                Err(err) => {
                    debug!(identity = %self.identity, %err, "write error");
                    return ConnOutcome::Error(err.kind());
                }
            }
        }
        self.disarm_writable(registry);
        ConnOutcome::Alive
    }

    pub(crate) fn has_backlog(&self) -> bool {
        !self.shared.outbound.lock().unwrap().is_empty()
    }

    fn arm_writable(&mut self, registry: &Registry) {
        if !self.writable_armed {
            if registry
                .reregister(&mut self.stream, self.token, Interest::READABLE | Interest::WRITABLE)
                .is_ok()
            {
                self.writable_armed = true;
            }
        }
    }

    fn disarm_writable(&mut self, registry: &Registry) {
        if self.writable_armed {
            let _ = registry.reregister(&mut self.stream, self.token, Interest::READABLE);
            self.writable_armed = false;
        }
    }
}
