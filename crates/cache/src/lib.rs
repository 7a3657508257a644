#![warn(clippy::unwrap_used)]

pub mod backend;
pub mod client;
pub mod local;

pub use backend::{build_cache, Cache};
pub use client::RedisCache;
pub use local::LocalCache;
