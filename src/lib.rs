//! taskhub: asynchronous job execution service.

pub mod api;
pub mod config;
pub mod error;
pub mod jobs;
pub mod notify;
pub mod step;
pub mod storage;
pub mod worker;
