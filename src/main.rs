//! Batch evaluation CLI entrypoint.

use anyhow::{Context, bail};
use mimalloc::MiMalloc;

use batcheval::config::Config;
use batcheval::factory::{build_batch_provider, build_trace_store};

const USAGE: &str = "usage:
  batcheval batch-status <batch_id>
  batcheval scores <dataset_name> <run_name>";

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        println!("{USAGE}");
        return Ok(());
    }

    let config = Config::from_env()?;

    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["batch-status", batch_id] => {
            let provider = build_batch_provider(&config)?;
            tracing::info!(batch_id = %batch_id, "Checking batch status");

            let snapshot = provider
                .get_batch_status(batch_id)
                .await
                .with_context(|| format!("failed to check batch {batch_id}"))?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        ["scores", dataset_name, run_name] => {
            let store = build_trace_store(&config)?;
            tracing::info!(dataset_name = %dataset_name, run_name = %run_name, "Fetching run scores");

            let scores = store.fetch_run_scores(dataset_name, run_name).await?;
            println!("{}", serde_json::to_string_pretty(&scores)?);
        }
        _ => bail!("unrecognized arguments: {:?}\n{USAGE}", args),
    }

    Ok(())
}
