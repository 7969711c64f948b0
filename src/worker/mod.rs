//! Worker system: bounded submission queue feeding a fixed number of
//! execution slots.

pub mod pool;

pub use pool::WorkerPool;
