use clap::Parser;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::filter_fn, prelude::*, EnvFilter};

use finality_node::{cli::Args, Config, Devnet};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Parse arguments
    let args = Args::parse();

    if args.write_default_config {
        Config::default().save_to_file(&args.config)?;
        println!("default config written to {}", args.config.display());
        return Ok(());
    }

    // 2. Load config, CLI overrides on top
    let mut config = if args.config.exists() {
        Config::load_from_file(&args.config)?
    } else {
        Config::default()
    };
    args.apply(&mut config);
    config.validate()?;

    // 3. Logging; the guard flushes the audit log on exit
    let _guard = init_tracing(&config);

    info!("--- starting {} devnet ---", config.node_name);
    info!("BPs: {}, blocks: {}, interval: {}ms", config.bp_count, config.rounds, config.block_interval_ms);

    // 4. Run until every BP finalized the configured blocks
    let devnet = Devnet::launch(&config).await?;
    let result = devnet.run().await;
    devnet.shutdown().await;

    let chain = match result {
        Ok(chain) => chain,
        Err(e) => {
            error!("devnet failed: {}", e);
            return Err(e.into());
        }
    };

    for block in &chain {
        info!(
            "#{} {} parent={} proposer={} txs={}",
            block.seq_no,
            block.hash(),
            block.parent_hash.short(),
            block.proposer,
            block.transactions.len()
        );
    }
    Ok(())
}

/// Stdout gets everything allowed by `RUST_LOG` (default `info`). When
/// `log_dir` is set the `consensus` audit events go to a file instead.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    let audit_to_file = config.log_dir.is_some();
    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_filter(filter_fn(move |metadata| {
            !audit_to_file || metadata.target() != "consensus"
        }));

    let (audit_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::never(dir, format!("consensus-{}.log", config.node_name));
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(filter_fn(|metadata| metadata.target() == "consensus"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(audit_layer)
        .with(stdout_layer)
        .init();
    guard
}
