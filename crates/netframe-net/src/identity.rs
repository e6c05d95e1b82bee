use std::fmt;

/// A connection's stable 128-bit identity, generated at construction and
/// unchanged for the connection's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(u128);

impl Identity {
    pub fn generate() -> Self {
        Self(rand::random::<u128>())
    }

    pub fn as_u128(self) -> u128 {
        self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}
