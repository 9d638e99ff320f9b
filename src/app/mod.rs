use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};

use crate::config::{CompiledConfig, TilesetConfig};
use crate::export::{CancelFlag, ExportStats, OutputOrder, RunOptions, run};
use crate::sinks::{GeoJsonSink, GeoJsonlSink, RecordSink};
use crate::source::open_source;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Tileset configuration file (YAML)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Output file (.geojsonl, .geojson), or - for stdout
    #[arg(short, long, required_unless_present_any = ["check", "print_config"])]
    pub output: Option<PathBuf>,

    /// Output format (auto-detected if omitted)
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Override a source path, as name=path
    #[arg(long = "source", value_name = "NAME=PATH", value_parser = parse_source_override)]
    pub sources: Vec<(String, PathBuf)>,

    /// Also write a TileJSON document describing the export
    #[arg(long)]
    pub tilejson: Option<PathBuf>,

    /// Output ordering guarantee
    #[arg(long, value_enum, default_value_t = OutputOrder::Strict)]
    pub order: OutputOrder,

    /// Number of threads (default: all cores)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Features per worker batch
    #[arg(long, default_value_t = 4096)]
    pub batch_size: usize,

    /// Validate the configuration and exit
    #[arg(long)]
    pub check: bool,

    /// Print the normalized configuration as YAML and exit
    #[arg(long)]
    pub print_config: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum OutputFormat {
    #[value(name = "geojson")]
    GeoJson,
    #[value(name = "geojsonl", alias = "ndjson")]
    GeoJsonl,
}

pub fn output_format_label(format: &OutputFormat) -> &'static str {
    match format {
        OutputFormat::GeoJson => "geojson",
        OutputFormat::GeoJsonl => "geojsonl",
    }
}

fn parse_source_override(value: &str) -> Result<(String, PathBuf), String> {
    let (name, path) = value
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=PATH, got '{}'", value))?;
    let name = name.trim();
    if name.is_empty() || path.is_empty() {
        return Err(format!("expected NAME=PATH, got '{}'", value));
    }
    Ok((name.to_string(), PathBuf::from(path)))
}

/// Explicit `--format`, else the output extension. Stdout defaults to GeoJSONL.
pub fn detect_format(requested: Option<OutputFormat>, output: &Path) -> Result<OutputFormat> {
    if let Some(format) = requested {
        return Ok(format);
    }
    if output == Path::new("-") {
        return Ok(OutputFormat::GeoJsonl);
    }
    output
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| match ext.to_lowercase().as_str() {
            "geojson" => Some(OutputFormat::GeoJson),
            "geojsonl" | "geojsons" | "jsonl" | "ndjson" => Some(OutputFormat::GeoJsonl),
            _ => None,
        })
        .context("CLI: Could not detect output format from extension; use --format")
}

pub fn init_sink(format: &OutputFormat, output: &Path) -> Result<Box<dyn RecordSink>> {
    match format {
        OutputFormat::GeoJson => {
            if output == Path::new("-") {
                bail!("CLI: GeoJSON output to stdout is not supported; use geojsonl instead");
            }
            tracing::info!("Sink: {} -> {:?}", output_format_label(format), output);
            Ok(Box::new(GeoJsonSink::new(output)?))
        }
        OutputFormat::GeoJsonl => {
            if output == Path::new("-") {
                tracing::info!("Sink: {} -> stdout", output_format_label(format));
                Ok(Box::new(GeoJsonlSink::stdout()?))
            } else {
                tracing::info!("Sink: {} -> {:?}", output_format_label(format), output);
                Ok(Box::new(GeoJsonlSink::new(output)?))
            }
        }
    }
}

/// Point configured sources at the paths given with `--source`.
pub fn apply_source_overrides(
    config: &mut CompiledConfig,
    overrides: &[(String, PathBuf)],
) -> Result<()> {
    for (name, path) in overrides {
        let source = config
            .sources
            .iter_mut()
            .find(|source| &source.name == name)
            .with_context(|| format!("CLI: --source refers to unknown source '{}'", name))?;
        tracing::info!("Source '{}': path overridden to {:?}", name, path);
        source.path = path.clone();
    }
    Ok(())
}

/// Normalized YAML of a config file; fails on configs that do not validate.
pub fn render_normalized_config(path: &Path) -> Result<String> {
    CompiledConfig::load(path)
        .with_context(|| format!("CLI: Invalid configuration {:?}", path))?;
    let raw = TilesetConfig::load(path)?;
    serde_yaml::to_string(&raw.normalized()).context("CLI: Failed to render configuration")
}

pub fn summarize_config(config: &CompiledConfig) -> String {
    format!(
        "{} sources, {} layers, zooms {}..={}",
        config.sources.len(),
        config.layers.len(),
        config.export.minzoom,
        config.export.maxzoom
    )
}

/// Export every source that feeds at least one layer, in configured order.
pub fn export_sources(
    config: &CompiledConfig,
    sink: &mut dyn RecordSink,
    options: &RunOptions,
    cancel: &CancelFlag,
) -> Result<ExportStats> {
    let mut total = ExportStats::default();

    for source in &config.sources {
        let layers = config.layers_for_source(&source.name);
        if layers.is_empty() {
            tracing::warn!("Source '{}' feeds no layers; skipping", source.name);
            continue;
        }

        let input = open_source(source)?;
        let stats = run(input.as_ref(), &config.export, &layers, sink, options, cancel)
            .with_context(|| format!("Pipeline: Export of source '{}' failed", source.name))?;

        if input.skipped() > 0 {
            tracing::warn!(
                "Source '{}': skipped {} undecodable features",
                source.name,
                input.skipped()
            );
        }
        for (layer, count) in &stats.per_layer {
            tracing::info!("Layer '{}': {} records", layer, count);
        }

        total.merge(stats);
        if total.cancelled {
            break;
        }
    }

    Ok(total)
}
