//! Connection lifecycle, accept/receive/send engines, and configuration.
//!
//! Wires together the buffer arena and op pools from `netframe-pool` with
//! the framing and typed codec from `netframe-wire` into a mio-driven
//! server and client.

mod assembly;
mod client;
mod config;
mod connection;
mod error;
mod identity;
mod ops;
mod registry;
mod server;
mod state;

pub use client::Client;
pub use config::Configuration;
pub use connection::{ConnOutcome, ConnectionHandler, SendHandle};
pub use error::{Error, SocketErrorKind};
pub use identity::Identity;
pub use server::{Server, ServerHandle, ServerHandler};
pub use state::EngineState;

pub use netframe_wire::{LengthPrefixProcessor, PacketProcessor, PacketStream, WireError};
