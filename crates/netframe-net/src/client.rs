use std::net::ToSocketAddrs;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use mio::net::TcpStream as MioTcpStream;
use mio::{Events, Poll, Token};
use netframe_pool::BufferArena;
use netframe_wire::PacketProcessor;
use tracing::debug;

use crate::connection::{Connection, ConnectionHandler, ConnOutcome, SendHandle};
use crate::identity::Identity;
use crate::ops::ReadOpRecord;
use crate::state::{EngineState, StateCell};
use crate::Error;

const CONN_TOKEN: Token = Token(0);
const WAKER: Token = Token(1);

struct ClientShared {
    state: StateCell,
    disconnect_requested: Mutex<bool>,
    waker: Mutex<Option<Arc<mio::Waker>>>,
}

impl ClientShared {
    fn wake(&self) {
        if let Some(waker) = self.waker.lock().unwrap().as_ref() {
            let _ = waker.wake();
        }
    }
}

/// One outbound connection, symmetric to [`crate::server::Server`] but with
/// no listener, no registry, and exactly one receive op. `connect` blocks
/// briefly to establish the socket, then hands the event loop to a
/// dedicated background thread so `send`/`disconnect` never block the
/// caller.
pub struct Client {
    shared: Arc<ClientShared>,
    identity: Identity,
    send_handle: SendHandle,
    worker: Option<JoinHandle<()>>,
}

impl Client {
    /// Establishes the outbound socket, allocates a single-slot buffer
    /// arena and read op, and spawns the background thread that drives
    /// `on_message_received`/`on_disconnected`/`on_socket_error` on
    /// `handler`.
    pub fn connect<H>(
        host: &str,
        port: u16,
        buffer_size: usize,
        processor: impl PacketProcessor + 'static,
        handler: H,
    ) -> Result<Self, Error>
    where
        H: ConnectionHandler,
    {
        let addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Error::Configuration(format!("unresolvable host {host:?}")))?;
        let std_stream = std::net::TcpStream::connect(addr)?;
        std_stream.set_nonblocking(true)?;
        let stream = MioTcpStream::from_std(std_stream);

        let identity = Identity::generate();
        let arena = BufferArena::new(buffer_size, 1);
        let slice = arena.checkout().expect("a freshly-built single-slot arena always has capacity");
        let read_op = ReadOpRecord { owner: identity };

        let poll = Poll::new()?;
        let waker = Arc::new(mio::Waker::new(poll.registry(), WAKER)?);

        let mut conn = Connection::new(
            identity,
            CONN_TOKEN,
            stream,
            slice,
            read_op,
            processor.header_size(),
            handler,
        );
        conn.register(poll.registry())?;
        let send_handle = conn.send_handle(waker.clone());
        conn.handler.on_connected(send_handle.clone());

        let shared = Arc::new(ClientShared {
            state: StateCell::new(EngineState::Running),
            disconnect_requested: Mutex::new(false),
            waker: Mutex::new(Some(waker)),
        });

        let worker_shared = shared.clone();
        let processor: Arc<dyn PacketProcessor> = Arc::new(processor);
        let worker = std::thread::spawn(move || {
            run(worker_shared, poll, conn, processor);
        });

        Ok(Self { shared, identity, send_handle, worker: Some(worker) })
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn send_handle(&self) -> &SendHandle {
        &self.send_handle
    }

    pub fn state(&self) -> EngineState {
        self.shared.state.get()
    }

    /// Tears the connection down and joins the background thread. Safe to
    /// call more than once.
    pub fn disconnect(&mut self) {
        if self.shared.state.get() == EngineState::Running {
            self.shared.state.set(EngineState::Stopping);
            *self.shared.disconnect_requested.lock().unwrap() = true;
            self.shared.wake();
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn run<H: ConnectionHandler>(
    shared: Arc<ClientShared>,
    mut poll: Poll,
    mut conn: Connection<H>,
    processor: Arc<dyn PacketProcessor>,
) {
    let mut events = Events::with_capacity(16);
    loop {
        if poll.poll(&mut events, None).is_err() {
            break;
        }

        let mut outcome = ConnOutcome::Alive;
        let mut woken = false;
        for event in events.iter() {
            match event.token() {
                CONN_TOKEN => {
                    if event.is_readable() {
                        outcome = conn.poll_readable(processor.as_ref());
                    }
                    if outcome == ConnOutcome::Alive && event.is_writable() {
                        outcome = conn.drain_backlog(poll.registry());
                    }
                }
                WAKER => woken = true,
                _ => {}
            }
        }

        // `send` only enqueues and wakes; attempt an immediate drain here
        // rather than waiting on a writable-readiness event that may never
        // come if the socket is already writable.
        if woken && outcome == ConnOutcome::Alive && conn.has_backlog() {
            outcome = conn.drain_backlog(poll.registry());
        }

        match outcome {
            ConnOutcome::Alive => {}
            ConnOutcome::Disconnected => break,
            ConnOutcome::Error(kind) => {
                conn.handler.on_error(crate::error::SocketErrorKind(kind));
                break;
            }
        }

        if *shared.disconnect_requested.lock().unwrap() {
            break;
        }
    }

    conn.deregister(poll.registry());
    conn.handler.on_disconnected();
    debug!(identity = %conn.identity, "client disconnected");
    shared.state.set(EngineState::Disposed);
}
