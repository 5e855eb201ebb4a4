//! The command-line surface shared by both programs.

use std::{ffi::OsString, path::PathBuf, process};

use anyhow::Context as _;
use chrono::Local;
use clap::{CommandFactory as _, FromArgMatches as _, error::ErrorKind};
use mkenv::prelude::*;

use crate::{
    BatchEnv, Mode, RunOptions,
    connector::{ConnectionConfig, DEFAULT_HOST, DEFAULT_PORT, RedisConnector, SentinelConfig},
    output::output_path,
    run::run,
};

/// The positional arguments of the programs.
#[derive(clap::Parser, Debug)]
#[command(version, about = "Processes the Redis keys listed in a comma-separated file")]
pub struct Args {
    /// The path to the file containing the comma-separated keys.
    pub keys_file_path: PathBuf,

    /// The Redis host.
    #[arg(default_value = DEFAULT_HOST)]
    pub host: String,

    /// The Redis port.
    #[arg(default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// The index of the Redis logical database.
    #[arg(default_value_t = 0)]
    pub db: u32,

    /// The host of the sentinel.
    pub sentinel_host: Option<String>,

    /// The port of the sentinel.
    pub sentinel_port: Option<u16>,

    /// The name of the group monitored by the sentinel.
    pub primary_group: Option<String>,

    /// The Redis password.
    pub password: Option<String>,
}

impl Args {
    /// Returns the connection configuration described by the arguments.
    ///
    /// The sentinel is only used when its host, port and group are all provided.
    pub fn connection_config(&self) -> ConnectionConfig {
        let sentinel = match (&self.sentinel_host, self.sentinel_port, &self.primary_group) {
            (Some(host), Some(port), Some(group)) => Some(SentinelConfig {
                host: host.clone(),
                port,
                group: group.clone(),
            }),
            (None, None, None) => None,
            _ => {
                tracing::warn!(
                    "Incomplete sentinel arguments, connecting directly to {}",
                    self.host
                );
                None
            }
        };

        ConnectionConfig {
            host: self.host.clone(),
            port: self.port,
            db: self.db.into(),
            password: self.password.clone(),
            sentinel,
        }
    }
}

/// Parses the arguments of the program running the provided mode.
pub fn try_parse_from<I, T>(mode: Mode, args: I) -> Result<Args, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = Args::command()
        .name(mode.program_name())
        .try_get_matches_from(args)?;
    Args::from_arg_matches(&matches)
}

/// Parses the arguments of the current process.
///
/// If the keys file path is missing, the usage is printed on the standard output and the process
/// exits with the code 1.
pub fn parse_args(mode: Mode) -> Args {
    match try_parse_from(mode, std::env::args_os()) {
        Ok(args) => args,
        Err(e) if e.kind() == ErrorKind::MissingRequiredArgument => {
            let mut cmd = Args::command().name(mode.program_name());
            println!("{}", cmd.render_usage());
            process::exit(1);
        }
        Err(e) => e.exit(),
    }
}

fn load_dotenv() -> anyhow::Result<()> {
    match dotenvy::dotenv() {
        Err(err) if !err.not_found() => Err(err).context("cannot retrieve .env file"),
        _ => Ok(()),
    }
}

fn setup_tracing() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .compact()
        .try_init()
        .map_err(|e| anyhow::anyhow!("unable to init tracing_subscriber: {e}"))
}

/// The entry point of both programs.
pub async fn main(mode: Mode) -> anyhow::Result<()> {
    let args = parse_args(mode);

    load_dotenv()?;
    setup_tracing()?;
    let env = BatchEnv::define();
    env.try_init().map_err(|e| anyhow::anyhow!("{e}"))?;
    let options = RunOptions::from(&env);

    let config = args.connection_config();
    tracing::debug!("Connection configuration: {config:?}");

    let output_path = output_path(&args.keys_file_path, mode, Local::now());
    let summary = run(
        mode,
        RedisConnector::new(config),
        &args.keys_file_path,
        &output_path,
        &options,
    )
    .await
    .with_context(|| format!("when processing keys from {}", args.keys_file_path.display()))?;

    match mode {
        Mode::Export => println!("Data export completed to {}", output_path.display()),
        Mode::Delete => {
            println!(
                "Deletion completed for keys from {}",
                args.keys_file_path.display()
            );
            println!("Backup data exported to {}", output_path.display());
        }
    }
    println!("{summary}");

    anyhow::ensure!(
        summary.is_success(),
        "{} of {} batches failed",
        summary.failed,
        summary.batches
    );

    Ok(())
}
