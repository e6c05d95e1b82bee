use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("end of stream: need {needed} bytes, have {available}")]
    EndOfStream { needed: usize, available: usize },

    #[error("invalid operation for this packet stream's mode")]
    InvalidOperation,

    #[error("encoded length {0} exceeds u32::MAX")]
    StringTooLong(usize),
}
