use std::collections::HashMap;

use mio::Token;

use crate::connection::{Connection, ConnectionHandler};
use crate::identity::Identity;
use crate::Error;

/// Owns every live connection. Lives entirely on the engine thread: the
/// event loop is the sole writer, so lookups and mutation never need to
/// synchronize with each other. Cross-thread visibility of "who's
/// connected" is a separate, much cheaper concern — see `live` in
/// `server.rs`.
pub(crate) struct Registry<H: ConnectionHandler> {
    conns: HashMap<Identity, Connection<H>>,
    tokens: HashMap<Token, Identity>,
}

impl<H: ConnectionHandler> Registry<H> {
    pub(crate) fn new() -> Self {
        Self { conns: HashMap::new(), tokens: HashMap::new() }
    }

    pub(crate) fn insert(&mut self, conn: Connection<H>) -> Result<(), Error> {
        if self.conns.contains_key(&conn.identity) {
            return Err(Error::DuplicateIdentity(conn.identity));
        }
        self.tokens.insert(conn.token, conn.identity);
        self.conns.insert(conn.identity, conn);
        Ok(())
    }

    pub(crate) fn remove(&mut self, identity: Identity) -> Option<Connection<H>> {
        let conn = self.conns.remove(&identity)?;
        self.tokens.remove(&conn.token);
        Some(conn)
    }

    pub(crate) fn get_mut(&mut self, identity: Identity) -> Option<&mut Connection<H>> {
        self.conns.get_mut(&identity)
    }

    pub(crate) fn identity_for_token(&self, token: Token) -> Option<Identity> {
        self.tokens.get(&token).copied()
    }

    pub(crate) fn contains(&self, identity: Identity) -> bool {
        self.conns.contains_key(&identity)
    }

    pub(crate) fn identities(&self) -> Vec<Identity> {
        self.conns.keys().copied().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.conns.len()
    }

    pub(crate) fn drain(&mut self) -> Vec<Connection<H>> {
        self.conns.drain().map(|(_, c)| c).collect()
    }
}
