//! Exports the values of the Redis keys listed in a comma-separated file to a CSV file.

use batch_lib::Mode;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    batch_lib::cli::main(Mode::Export).await
}
