//! Deletes the Redis keys listed in a comma-separated file, along with their derived keys.
//!
//! Every deleted key is saved with its value in a backup file before being deleted.

use batch_lib::Mode;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    batch_lib::cli::main(Mode::Delete).await
}
