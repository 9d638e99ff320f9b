mod app;
mod config;
mod export;
mod filter;
mod layers;
mod project;
mod sinks;
mod source;
mod tilejson;
mod utils;

use anyhow::{Context, Result};
use clap::Parser;

use app::{
    Cli, apply_source_overrides, detect_format, export_sources, init_sink,
    render_normalized_config, summarize_config,
};
use config::CompiledConfig;
use export::{CancelFlag, RunOptions};
use tilejson::TileJson;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    if cli.print_config {
        print!("{}", render_normalized_config(&cli.config)?);
        return Ok(());
    }

    let mut config = CompiledConfig::load(&cli.config)
        .with_context(|| format!("CLI: Invalid configuration {:?}", cli.config))?;
    apply_source_overrides(&mut config, &cli.sources)?;
    tracing::info!("Config: {}", summarize_config(&config));

    if cli.check {
        println!("{}: OK ({})", cli.config.display(), summarize_config(&config));
        return Ok(());
    }

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("CLI: Failed to initialize thread pool")?;
    }

    let output = cli
        .output
        .as_deref()
        .context("CLI: --output is required")?;
    let format = detect_format(cli.format, output)?;

    if let Some(path) = &cli.tilejson {
        TileJson::build(&config.export, &config.layers).write(path)?;
        tracing::info!("TileJSON: written to {:?}", path);
    }

    let cancel = CancelFlag::new();
    let handler_flag = cancel.clone();
    ctrlc::set_handler(move || {
        tracing::warn!("Interrupted; stopping after the current zoom level");
        handler_flag.cancel();
    })
    .context("CLI: Failed to set signal handler")?;

    let options = RunOptions {
        order: cli.order,
        batch_size: cli.batch_size,
        progress: cli.verbose,
        ..RunOptions::default()
    };

    let mut sink = init_sink(&format, output)?;
    let start = std::time::Instant::now();
    let stats = export_sources(&config, sink.as_mut(), &options, &cancel)?;

    // Finalize sink
    sink.finish().context("Pipeline: Failed to finalize sink")?;

    let elapsed = start.elapsed();
    if stats.cancelled {
        tracing::warn!(
            "Cancelled after zooms {:?}; output holds only completed zoom levels",
            stats.zooms_completed
        );
    }
    tracing::info!(
        "Done! Written {} records from {} features in {:.2}s ({} records/s)",
        stats.records_emitted,
        stats.features_scanned,
        elapsed.as_secs_f64(),
        (stats.records_emitted as f64 / elapsed.as_secs_f64().max(f64::EPSILON)) as u64
    );

    Ok(())
}
