mod assert;

pub use assert::*;
