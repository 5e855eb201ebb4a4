use std::{num::NonZeroUsize, num::ParseIntError, time::Duration};

use mkenv::prelude::*;

/// The default amount of keys processed by a single worker.
pub const DEFAULT_BATCH_SIZE: NonZeroUsize = NonZeroUsize::new(1000).expect("1000 is not zero");

/// The default period of the progress report.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(2);

/// The default maximum amount of batches processed at the same time.
pub const DEFAULT_MAX_WORKERS: usize = 64;

/// The error raised when parsing the period of the progress report.
#[derive(thiserror::Error, Debug)]
pub enum InvalidInterval {
    /// The value isn't a number of seconds.
    #[error(transparent)]
    Parse(#[from] ParseIntError),
    /// The value is zero.
    #[error("the period must be non-zero")]
    Zero,
}

/// Parses a non-zero amount of seconds.
pub fn parse_interval_secs(input: &str) -> Result<Duration, InvalidInterval> {
    match input.parse()? {
        0 => Err(InvalidInterval::Zero),
        secs => Ok(Duration::from_secs(secs)),
    }
}

mkenv::make_config! {
    /// The environment used to tune a run of the batch tools.
    pub struct BatchEnv {
        /// The amount of keys in a batch.
        pub batch_size: {
            var_name: "REDIS_BATCH_SIZE",
            layers: [
                parsed_from_str<NonZeroUsize>(),
                or_default_val(|| DEFAULT_BATCH_SIZE),
            ],
            description: "The amount of keys processed by a single worker (non-zero)",
            default_val_fmt: "1000",
        },

        /// The period of the progress report.
        pub progress_interval: {
            var_name: "REDIS_BATCH_PROGRESS_INTERVAL",
            layers: [
                parsed<Duration>(|input| {
                    parse_interval_secs(input).map_err(From::from)
                }),
                or_default_val(|| DEFAULT_PROGRESS_INTERVAL),
            ],
            description: "The period of the progress report, in seconds (non-zero)",
            default_val_fmt: "2",
        },

        /// The maximum amount of batches processed at the same time.
        pub max_workers: {
            var_name: "REDIS_BATCH_MAX_WORKERS",
            layers: [
                parsed_from_str<usize>(),
                or_default_val(|| DEFAULT_MAX_WORKERS),
            ],
            description: "The maximum amount of batches processed at the same time \
                (0 for no limit)",
            default_val_fmt: "64",
        },
    }
}

/// The options of a run, independent from where they come from.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// The amount of keys in a batch.
    pub batch_size: NonZeroUsize,
    /// The period of the progress report.
    pub progress_interval: Duration,
    /// The maximum amount of batches processed at the same time, `None` for no limit.
    pub max_workers: Option<NonZeroUsize>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            max_workers: NonZeroUsize::new(DEFAULT_MAX_WORKERS),
        }
    }
}

impl From<&BatchEnv> for RunOptions {
    fn from(env: &BatchEnv) -> Self {
        Self {
            batch_size: env.batch_size.get(),
            progress_interval: env.progress_interval.get(),
            max_workers: NonZeroUsize::new(env.max_workers.get()),
        }
    }
}
