//! A module containing the error types of the batch tools.
//!
//! The errors are split by their reach: a [`ConnectError`] or a [`BatchError`] stops a single
//! worker, while a [`RunError`] stops the whole run before any worker is spawned. Errors related
//! to a single key never leave the worker, they are logged and counted in its report.

use std::io;

use deadpool_redis::redis::RedisError;

/// Represents an error that happened when opening a connection to the primary Redis instance.
#[derive(thiserror::Error, Debug)]
#[rustfmt::skip]
pub enum ConnectError {
    /// The Redis instance couldn't be reached, or rejected the credentials.
    #[error("cannot connect to redis at {endpoint}: {source}")]
    Connection {
        /// The address of the instance.
        endpoint: String,
        /// The source error.
        source: RedisError,
    },
    /// The sentinel couldn't be queried.
    #[error("cannot query sentinel at {endpoint}: {source}")]
    Sentinel {
        /// The address of the sentinel.
        endpoint: String,
        /// The source error.
        source: RedisError,
    },
    /// The sentinel doesn't know the group, or no primary is currently elected for it.
    #[error("no primary known by the sentinel for group `{group}`")]
    Primary {
        /// The name of the group.
        group: String,
    },
}

/// Represents an error that stopped a worker before the end of its batch.
#[derive(thiserror::Error, Debug)]
pub enum BatchError {
    /// The worker couldn't open its connection.
    #[error(transparent)]
    Connect(#[from] ConnectError),
    /// The results of the batch couldn't be appended to the output file.
    #[error("cannot append to the output file: {0}")]
    Output(#[source] io::Error),
}

/// Represents an error that prevented a run from dispatching its workers.
#[derive(thiserror::Error, Debug)]
pub enum RunError {
    /// The file containing the keys couldn't be read.
    #[error("cannot read the keys file: {0}")]
    ReadKeys(#[source] io::Error),
    /// The output file couldn't be created.
    #[error("cannot create the output file: {0}")]
    CreateOutput(#[source] io::Error),
}
