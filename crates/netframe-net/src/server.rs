use std::collections::{HashSet, VecDeque};
use std::io;
use std::marker::PhantomData;
use std::net::{Shutdown, SocketAddr};
use std::sync::{Arc, Mutex};

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use netframe_pool::{BufferArena, OpPool};
use netframe_utils::invariant_failure;
use netframe_wire::PacketProcessor;
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, warn};

use crate::config::Configuration;
use crate::connection::{Connection, ConnectionHandler, ConnOutcome};
use crate::error::SocketErrorKind;
use crate::identity::Identity;
use crate::ops::{ReadOpRecord, WriteOpRecord};
use crate::registry::Registry;
use crate::state::{EngineState, StateCell};
use crate::Error;

const LISTENER: Token = Token(0);
const WAKER: Token = Token(1);
const FIRST_CONNECTION_TOKEN: usize = 2;

/// Server-wide lifecycle callbacks, distinct from the per-connection
/// callbacks on [`ConnectionHandler`]: these observe the population of
/// clients as a whole rather than one connection's traffic.
pub trait ServerHandler: Send + 'static {
    /// Invoked once, after the listener is bound and before the first
    /// accept is posted.
    fn initialize(&mut self) {}

    fn on_client_connected(&mut self, _identity: Identity) {}

    fn on_client_disconnected(&mut self, _identity: Identity) {}

    /// Invoked on an error the server itself observes (e.g. a failed
    /// accept), as opposed to a per-connection socket error.
    fn on_error(&mut self, _kind: SocketErrorKind) {}
}

struct ServerShared {
    state: StateCell,
    commands: Mutex<VecDeque<Identity>>,
    live: Mutex<HashSet<Identity>>,
    waker: Mutex<Option<Arc<mio::Waker>>>,
}

impl ServerShared {
    fn wake(&self) {
        if let Some(waker) = self.waker.lock().unwrap().as_ref() {
            let _ = waker.wake();
        }
    }
}

/// A cheap, cloneable, thread-safe facade onto a running [`Server`]. The
/// only way to call `stop`/`disconnect_client`/`clients` from a thread other
/// than the one blocked inside [`Server::start`].
#[derive(Clone)]
pub struct ServerHandle {
    shared: Arc<ServerShared>,
}

impl ServerHandle {
    pub fn state(&self) -> EngineState {
        self.shared.state.get()
    }

    /// Transitions to Stopping and wakes the engine. A no-op if the server
    /// isn't currently Running — calling `stop` twice is always safe.
    pub fn stop(&self) {
        if self.shared.state.get() == EngineState::Running {
            self.shared.state.set(EngineState::Stopping);
            self.shared.wake();
        }
    }

    /// Removes a connection from the registry, disposes it, and fires
    /// `on_client_disconnected`. Fails synchronously with
    /// [`Error::ClientNotFound`] if the identity isn't currently live;
    /// otherwise the actual teardown happens on the engine thread, shortly
    /// after this call returns.
    pub fn disconnect_client(&self, identity: Identity) -> Result<(), Error> {
        if !self.shared.live.lock().unwrap().contains(&identity) {
            return Err(Error::ClientNotFound(identity));
        }
        self.shared.commands.lock().unwrap().push_back(identity);
        self.shared.wake();
        Ok(())
    }

    pub fn clients(&self) -> Vec<Identity> {
        self.shared.live.lock().unwrap().iter().copied().collect()
    }
}

/// The accept/receive/send engine. Generic over a connection factory `F`
/// producing values honoring [`ConnectionHandler`], and a [`ServerHandler`]
/// observing the client population as a whole.
pub struct Server<H, S, F> {
    shared: Arc<ServerShared>,
    config: Configuration,
    processor: Arc<dyn PacketProcessor>,
    factory: F,
    server_handler: S,
    _marker: PhantomData<fn() -> H>,
}

impl<H, S, F> Server<H, S, F>
where
    H: ConnectionHandler,
    S: ServerHandler,
    F: Fn() -> H,
{
    pub fn new(
        config: Configuration,
        processor: impl PacketProcessor + 'static,
        server_handler: S,
        factory: F,
    ) -> Self {
        Self {
            shared: Arc::new(ServerShared {
                state: StateCell::new(EngineState::Created),
                commands: Mutex::new(VecDeque::new()),
                live: Mutex::new(HashSet::new()),
                waker: Mutex::new(None),
            }),
            config,
            processor: Arc::new(processor),
            factory,
            server_handler,
            _marker: PhantomData,
        }
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle { shared: self.shared.clone() }
    }

    pub fn state(&self) -> EngineState {
        self.shared.state.get()
    }

    /// Validates configuration, allocates the arena and op pools, binds and
    /// listens, then blocks driving the event loop until `stop()` is
    /// called. Returns once every live connection has been torn down.
    pub fn start(&mut self) -> Result<(), Error> {
        if self.shared.state.get() != EngineState::Created {
            return Err(Error::AlreadyRunning);
        }
        let addr = self.config.validate()?;
        let cap = self.config.max_connections();

        let mut listener = bind_listener(addr, self.config.backlog)?;
        let mut poll = Poll::new()?;
        poll.registry().register(&mut listener, LISTENER, Interest::READABLE)?;
        let waker = Arc::new(mio::Waker::new(poll.registry(), WAKER)?);
        *self.shared.waker.lock().unwrap() = Some(waker.clone());

        let arena = BufferArena::new(self.config.buffer_size_bytes(), cap);
        let read_pool = OpPool::new(cap, || ReadOpRecord { owner: Identity::generate() });
        let write_pool = OpPool::new(cap, || WriteOpRecord { owner: Identity::generate() });
        let mut registry: Registry<H> = Registry::new();
        let mut next_token = FIRST_CONNECTION_TOKEN;
        let mut events = Events::with_capacity(128);

        self.server_handler.initialize();
        self.shared.state.set(EngineState::Running);

        loop {
            poll.poll(&mut events, None)?;

            for event in events.iter() {
                match event.token() {
                    LISTENER => self.accept_loop(
                        &mut listener,
                        &poll,
                        &mut registry,
                        &arena,
                        &read_pool,
                        &mut next_token,
                        &waker,
                    ),
                    WAKER => {}
                    token => {
                        if let Some(identity) = registry.identity_for_token(token) {
                            if event.is_readable() {
                                self.service_readable(
                                    &mut registry,
                                    &poll,
                                    identity,
                                    &read_pool,
                                    &write_pool,
                                );
                            }
                            if event.is_writable() {
                                self.service_writable(
                                    &mut registry,
                                    &poll,
                                    identity,
                                    &read_pool,
                                    &write_pool,
                                );
                            }
                        }
                    }
                }
            }

            self.service_backlogs(&mut registry, &poll, &read_pool, &write_pool);
            self.drain_commands(&mut registry, &poll, &read_pool, &write_pool);

            if self.shared.state.get() == EngineState::Stopping {
                break;
            }
        }

        let _ = poll.registry().deregister(&mut listener);
        for mut conn in registry.drain() {
            conn.deregister(poll.registry());
            let identity = conn.identity;
            conn.handler.on_disconnected();
            self.server_handler.on_client_disconnected(identity);
            read_pool.push(conn.read_op);
            if let Some(op) = conn.take_write_op() {
                write_pool.push(op);
            }
        }
        self.shared.live.lock().unwrap().clear();
        self.shared.state.set(EngineState::Disposed);
        Ok(())
    }

    fn accept_loop(
        &mut self,
        listener: &mut TcpListener,
        poll: &Poll,
        registry: &mut Registry<H>,
        arena: &BufferArena,
        read_pool: &OpPool<ReadOpRecord>,
        next_token: &mut usize,
        waker: &Arc<mio::Waker>,
    ) {
        loop {
            let (mut stream, peer) = match listener.accept() {
                Ok(accepted) => accepted,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(err) => {
                    warn!(%err, "accept failed");
                    self.server_handler.on_error(SocketErrorKind(err.kind()));
                    return;
                }
            };

            let identity = Identity::generate();
            if registry.contains(identity) {
                invariant_failure!("duplicate connection identity {identity}");
                reject(&mut stream);
                continue;
            }
            let slice = match arena.checkout() {
                Ok(slice) => slice,
                Err(_) => {
                    debug!(%peer, "connection rejected: buffer arena exhausted");
                    reject(&mut stream);
                    continue;
                }
            };
            let mut read_op = match read_pool.pop() {
                Ok(op) => op,
                Err(_) => {
                    debug!(%peer, "connection rejected: read op pool exhausted");
                    reject(&mut stream);
                    continue;
                }
            };
            read_op.owner = identity;

            let token = Token(*next_token);
            *next_token += 1;
            let mut conn = Connection::new(
                identity,
                token,
                stream,
                slice,
                read_op,
                self.processor.header_size(),
                (self.factory)(),
            );
            if let Err(err) = conn.register(poll.registry()) {
                warn!(%err, "failed to register accepted connection");
                read_pool.push(conn.read_op);
                continue;
            }

            let send_handle = conn.send_handle(waker.clone());
            conn.handler.on_connected(send_handle);
            registry.insert(conn).expect("duplicate identity already ruled out above");
            self.shared.live.lock().unwrap().insert(identity);
            self.server_handler.on_client_connected(identity);
            debug!(%identity, %peer, "client connected");
        }
    }

    fn service_readable(
        &mut self,
        registry: &mut Registry<H>,
        poll: &Poll,
        identity: Identity,
        read_pool: &OpPool<ReadOpRecord>,
        write_pool: &OpPool<WriteOpRecord>,
    ) {
        let outcome = match registry.get_mut(identity) {
            Some(conn) => conn.poll_readable(self.processor.as_ref()),
            None => return,
        };
        self.handle_outcome(registry, poll, identity, outcome, read_pool, write_pool);
    }

    fn service_writable(
        &mut self,
        registry: &mut Registry<H>,
        poll: &Poll,
        identity: Identity,
        read_pool: &OpPool<ReadOpRecord>,
        write_pool: &OpPool<WriteOpRecord>,
    ) {
        let outcome = match registry.get_mut(identity) {
            Some(conn) => conn.drain_backlog(poll.registry()),
            None => return,
        };
        if let Some(conn) = registry.get_mut(identity) {
            if let Some(op) = conn.release_write_op_if_drained() {
                write_pool.push(op);
            }
        }
        self.handle_outcome(registry, poll, identity, outcome, read_pool, write_pool);
    }

    /// Attempts an immediate drain for every connection with queued bytes
    /// but no bound write op yet. Most sends complete here, without waiting
    /// for a separate writable-readiness event.
    fn service_backlogs(
        &mut self,
        registry: &mut Registry<H>,
        poll: &Poll,
        read_pool: &OpPool<ReadOpRecord>,
        write_pool: &OpPool<WriteOpRecord>,
    ) {
        for identity in registry.identities() {
            let needs_op = match registry.get_mut(identity) {
                Some(conn) => conn.needs_write_op(),
                None => continue,
            };
            if !needs_op {
                continue;
            }
            let mut op = match write_pool.pop() {
                Ok(op) => op,
                Err(_) => {
                    debug!(%identity, "write op pool exhausted, deferring send");
                    continue;
                }
            };
            op.owner = identity;
            let Some(conn) = registry.get_mut(identity) else { continue };
            conn.bind_write_op(op);
            let outcome = conn.drain_backlog(poll.registry());
            if let Some(conn) = registry.get_mut(identity) {
                if let Some(op) = conn.release_write_op_if_drained() {
                    write_pool.push(op);
                }
            }
            self.handle_outcome(registry, poll, identity, outcome, read_pool, write_pool);
        }
    }

    fn handle_outcome(
        &mut self,
        registry: &mut Registry<H>,
        poll: &Poll,
        identity: Identity,
        outcome: ConnOutcome,
        read_pool: &OpPool<ReadOpRecord>,
        write_pool: &OpPool<WriteOpRecord>,
    ) {
        match outcome {
            ConnOutcome::Alive => {}
            ConnOutcome::Disconnected => {
                self.teardown(registry, poll, identity, None, read_pool, write_pool)
            }
            ConnOutcome::Error(kind) => {
                self.teardown(registry, poll, identity, Some(kind), read_pool, write_pool)
            }
        }
    }

    fn teardown(
        &mut self,
        registry: &mut Registry<H>,
        poll: &Poll,
        identity: Identity,
        error: Option<io::ErrorKind>,
        read_pool: &OpPool<ReadOpRecord>,
        write_pool: &OpPool<WriteOpRecord>,
    ) {
        let Some(mut conn) = registry.remove(identity) else { return };
        conn.deregister(poll.registry());
        if let Some(kind) = error {
            conn.handler.on_error(SocketErrorKind(kind));
        }
        conn.handler.on_disconnected();
        self.server_handler.on_client_disconnected(identity);
        read_pool.push(conn.read_op);
        if let Some(op) = conn.take_write_op() {
            write_pool.push(op);
        }
        self.shared.live.lock().unwrap().remove(&identity);
        debug!(%identity, ?error, "client disconnected");
    }

    fn drain_commands(
        &mut self,
        registry: &mut Registry<H>,
        poll: &Poll,
        read_pool: &OpPool<ReadOpRecord>,
        write_pool: &OpPool<WriteOpRecord>,
    ) {
        loop {
            let Some(identity) = self.shared.commands.lock().unwrap().pop_front() else { break };
            self.teardown(registry, poll, identity, None, read_pool, write_pool);
        }
    }
}

fn reject(stream: &mut TcpStream) {
    let _ = stream.shutdown(Shutdown::Both);
}

/// Builds the listening socket through `socket2` so `backlog` actually
/// reaches the OS's accept queue depth — `mio::net::TcpListener::bind`
/// has no parameter for it and always asks for the platform default.
fn bind_listener(addr: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
    let domain = Domain::for_address(addr);
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;
    socket.set_nonblocking(true)?;
    Ok(TcpListener::from_std(socket.into()))
}
