use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

use crate::Error;

/// Validated bundle of server parameters. Immutable after `Server::start`.
/// `B * N` bytes (`buffer_size * maximum_number_of_connections`) are
/// allocated up front by the buffer arena once validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    /// `"0.0.0.0"` (the default) means any interface.
    pub host: String,
    pub port: u16,
    pub backlog: i32,
    /// Per-connection receive window in bytes, typically 1024-65536.
    pub buffer_size: i32,
    pub maximum_number_of_connections: i32,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            backlog: 100,
            buffer_size: 1024,
            maximum_number_of_connections: 0,
        }
    }
}

impl Configuration {
    pub fn new(port: u16, maximum_number_of_connections: i32) -> Self {
        Self { port, maximum_number_of_connections, ..Default::default() }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: i32) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub(crate) fn buffer_size_bytes(&self) -> usize {
        self.buffer_size as usize
    }

    pub(crate) fn max_connections(&self) -> usize {
        self.maximum_number_of_connections as usize
    }

    /// Validates every field and resolves `host`/`port` into a
    /// [`SocketAddr`]. Fails before any socket is opened.
    pub fn validate(&self) -> Result<SocketAddr, Error> {
        if self.port == 0 {
            return Err(Error::Configuration("port must be in 1..=65535".into()));
        }
        if self.buffer_size <= 0 {
            return Err(Error::Configuration("buffer_size must be positive".into()));
        }
        if self.maximum_number_of_connections <= 0 {
            return Err(Error::Configuration("maximum_number_of_connections must be positive".into()));
        }
        if self.backlog <= 0 {
            return Err(Error::Configuration("backlog must be positive".into()));
        }
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| Error::Configuration(format!("unresolvable host {:?}", self.host)))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_invalid_until_port_and_cap_set() {
        assert!(Configuration::default().validate().is_err());
        assert!(Configuration::new(7000, 16).validate().is_ok());
    }

    #[test]
    fn bad_host_fails_configuration() {
        let cfg = Configuration::new(7000, 4).with_host("not a real host");
        assert!(matches!(cfg.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn zero_buffer_size_fails_configuration() {
        let cfg = Configuration::new(7000, 4).with_buffer_size(0);
        assert!(matches!(cfg.validate(), Err(Error::Configuration(_))));
    }
}
