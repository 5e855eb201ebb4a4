//! The shared crate of the Redis batch tools.
//!
//! This crate contains everything used by the `redis-export` and `redis-delete` programs:
//! reading the key list, connecting to the Redis database (directly or through a sentinel),
//! processing the batches of keys concurrently, and writing the output file.
//!
//! The binaries themselves only pick the [`Mode`] and call [`cli::main`].

#![warn(missing_docs)]

mod env;

pub mod cli;
pub mod connector;
pub mod derived;
pub mod error;
pub mod keys;
pub mod output;
pub mod progress;
pub mod run;
pub mod worker;

pub use env::*;

/// The Redis client crate, as re-exported by `deadpool-redis`.
pub use deadpool_redis::redis;

/// The type of a Redis connection owned by a worker.
pub type RedisConnection = redis::aio::MultiplexedConnection;

/// The kind of work done on every key of the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Fetches the value of every key and saves it in a CSV file.
    Export,
    /// Fetches, backs up, then deletes every key along with its derived key.
    Delete,
}

impl Mode {
    /// Returns the name of the program running this mode.
    pub fn program_name(self) -> &'static str {
        match self {
            Self::Export => "redis-export",
            Self::Delete => "redis-delete",
        }
    }
}
