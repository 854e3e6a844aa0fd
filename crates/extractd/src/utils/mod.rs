//! Shared utilities.

pub mod pool;

pub use pool::{BufferPool, PoolError, PooledBuffer};
