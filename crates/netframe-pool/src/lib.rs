//! Pre-allocated resource pools: a single contiguous byte arena partitioned
//! per-connection, and bounded stacks of reusable I/O operation records.

mod arena;
mod error;
mod op_pool;

pub use arena::{BufferArena, Slice};
pub use error::PoolError;
pub use op_pool::OpPool;
