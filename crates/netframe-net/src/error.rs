use std::io;

use netframe_wire::WireError;
use thiserror::Error;

use crate::Identity;

/// The socket error kinds surfaced to `on_error`/`on_socket_error`. Carries
/// the OS error kind rather than the raw `io::Error` so it stays `Copy` and
/// cheap to pass into a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketErrorKind(pub io::ErrorKind);

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("server already running")]
    AlreadyRunning,

    #[error("pool exhausted")]
    Exhausted,

    #[error("duplicate connection identity {0}")]
    DuplicateIdentity(Identity),

    #[error("no client with identity {0}")]
    ClientNotFound(Identity),

    #[error("socket error: {0}")]
    Socket(#[from] io::Error),

    #[error("inbound frame of {declared} bytes exceeds the {max}-byte limit")]
    FrameTooLarge { declared: usize, max: usize },

    #[error(transparent)]
    Wire(#[from] WireError),
}

impl From<netframe_pool::PoolError> for Error {
    fn from(_: netframe_pool::PoolError) -> Self {
        Error::Exhausted
    }
}
