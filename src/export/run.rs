use anyhow::{Result, anyhow};
use clap::ValueEnum;
use crossbeam_channel::{Receiver, Sender, bounded};
use geo_types::Rect;
use indexmap::IndexMap;
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{Emitted, emit_matches, zoom_has_layers};
use crate::config::ExportConfig;
use crate::layers::LayerDefinition;
use crate::project::Feature;
use crate::sinks::RecordSink;
use crate::source::FeatureSource;
use crate::utils::ProgressCounter;

/// Write ordering guarantee of a parallel run.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, ValueEnum)]
pub enum OutputOrder {
    /// Source order is kept within every (zoom, layer) stream.
    #[default]
    Strict,
    /// Batches are written as workers finish them.
    Unordered,
}

#[derive(Clone, Debug)]
pub struct RunOptions {
    pub order: OutputOrder,
    pub batch_size: usize,
    /// Batches in flight between workers and the sink writer.
    pub channel_capacity: usize,
    pub progress: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            order: OutputOrder::Strict,
            batch_size: 4096,
            channel_capacity: 64,
            progress: false,
        }
    }
}

/// Cooperative cancellation, honoured between zoom levels.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExportStats {
    /// Features read, summed over every zoom pass.
    pub features_scanned: u64,
    pub records_emitted: u64,
    pub per_layer: IndexMap<String, u64>,
    pub zooms_completed: Vec<u8>,
    pub cancelled: bool,
}

impl ExportStats {
    pub fn merge(&mut self, other: ExportStats) {
        self.features_scanned += other.features_scanned;
        self.records_emitted += other.records_emitted;
        for (layer, count) in other.per_layer {
            *self.per_layer.entry(layer).or_default() += count;
        }
        for zoom in other.zooms_completed {
            if !self.zooms_completed.contains(&zoom) {
                self.zooms_completed.push(zoom);
            }
        }
        self.cancelled |= other.cancelled;
    }
}

enum Message {
    Batch(Vec<Emitted>),
    ZoomDone(u8),
}

#[derive(Default)]
struct Produced {
    features_scanned: u64,
    zooms_completed: Vec<u8>,
    cancelled: bool,
}

struct WriterStats {
    records: u64,
    per_layer: IndexMap<String, u64>,
}

/// Fixed-size chunks of a feature stream; stops at the first error.
struct Batches<I> {
    inner: I,
    size: usize,
    done: bool,
}

impl<I> Iterator for Batches<I>
where
    I: Iterator<Item = Result<Feature>>,
{
    type Item = Result<Vec<Feature>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut batch = Vec::with_capacity(self.size);
        while batch.len() < self.size {
            match self.inner.next() {
                Some(Ok(feature)) => batch.push(feature),
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(err));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        if batch.is_empty() {
            None
        } else {
            Some(Ok(batch))
        }
    }
}

fn process_batch(
    batch: &[Feature],
    layers: &[Arc<LayerDefinition>],
    zoom: u8,
    bounds: &Rect<f64>,
) -> Vec<Emitted> {
    let mut out = Vec::new();
    for feature in batch {
        emit_matches(feature, layers, zoom, bounds, &mut out);
    }
    out
}

fn send_batch(tx: &Sender<Message>, batch: Vec<Emitted>) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }
    tx.send(Message::Batch(batch))
        .map_err(|err| anyhow!("Pipeline: Failed to send record batch: {}", err))
}

fn process_zoom(
    source: &dyn FeatureSource,
    layers: &[Arc<LayerDefinition>],
    zoom: u8,
    bounds: &Rect<f64>,
    options: &RunOptions,
    tx: &Sender<Message>,
) -> Result<u64> {
    let batches = Batches {
        inner: source.scan()?,
        size: options.batch_size.max(1),
        done: false,
    };
    let progress = ProgressCounter::new(
        format!("Zoom {}: features", zoom),
        100_000,
        options.progress,
    );

    match options.order {
        OutputOrder::Strict => {
            for batch in batches {
                let batch = batch?;
                let out: Vec<Emitted> = batch
                    .par_iter()
                    .map(|feature| {
                        let mut out = Vec::new();
                        emit_matches(feature, layers, zoom, bounds, &mut out);
                        out
                    })
                    .collect::<Vec<_>>()
                    .into_iter()
                    .flatten()
                    .collect();
                progress.inc(batch.len() as u64);
                send_batch(tx, out)?;
            }
        }
        OutputOrder::Unordered => {
            batches.par_bridge().try_for_each(|batch| -> Result<()> {
                let batch = batch?;
                let out = process_batch(&batch, layers, zoom, bounds);
                progress.inc(batch.len() as u64);
                send_batch(tx, out)
            })?;
        }
    }

    progress.finish();
    Ok(progress.count())
}

#[allow(clippy::too_many_arguments)]
fn produce(
    source: &dyn FeatureSource,
    export: &ExportConfig,
    layers: &[Arc<LayerDefinition>],
    options: &RunOptions,
    cancel: &CancelFlag,
    tx: &Sender<Message>,
    ack_rx: &Receiver<u8>,
    produced: &mut Produced,
) -> Result<()> {
    let bounds = export.bounds.to_rect();

    for zoom in export.zooms() {
        if cancel.is_cancelled() {
            tracing::warn!("Export cancelled before zoom {}", zoom);
            produced.cancelled = true;
            break;
        }
        if !zoom_has_layers(layers, zoom) {
            tracing::debug!("Zoom {}: no layer in range, skipping", zoom);
            continue;
        }

        tracing::info!("Zoom {}: processing ({:?} order)...", zoom, options.order);
        produced.features_scanned += process_zoom(source, layers, zoom, &bounds, options, tx)?;

        // Block until the writer has finished this zoom.
        tx.send(Message::ZoomDone(zoom))
            .map_err(|err| anyhow!("Pipeline: Failed to signal end of zoom: {}", err))?;
        ack_rx
            .recv()
            .map_err(|_| anyhow!("Pipeline: Sink writer stopped before finishing zoom {}", zoom))?;
        produced.zooms_completed.push(zoom);
    }

    Ok(())
}

fn write_records(
    sink: &mut dyn RecordSink,
    rx: Receiver<Message>,
    ack_tx: Sender<u8>,
    layer_names: Vec<String>,
) -> Result<WriterStats> {
    let mut stats = WriterStats {
        records: 0,
        per_layer: layer_names.into_iter().map(|name| (name, 0)).collect(),
    };

    for message in rx {
        match message {
            Message::Batch(batch) => {
                for emitted in batch {
                    match stats.per_layer.get_mut(&emitted.layer.name) {
                        Some(count) => *count += 1,
                        None => {
                            stats.per_layer.insert(emitted.layer.name.clone(), 1);
                        }
                    }
                    stats.records += 1;
                    sink.add_record(emitted)?;
                }
            }
            Message::ZoomDone(zoom) => {
                sink.finish_zoom(zoom)?;
                ack_tx
                    .send(zoom)
                    .map_err(|err| anyhow!("Pipeline: Failed to acknowledge zoom: {}", err))?;
            }
        }
    }

    Ok(stats)
}

/// Run the export in parallel, streaming every match into `sink`.
///
/// Each zoom level is processed in full, then the sink's `finish_zoom` runs
/// and `cancel` is checked. The sink itself is not finished here, so one
/// sink can collect several sources.
pub fn run(
    source: &dyn FeatureSource,
    export: &ExportConfig,
    layers: &[Arc<LayerDefinition>],
    sink: &mut dyn RecordSink,
    options: &RunOptions,
    cancel: &CancelFlag,
) -> Result<ExportStats> {
    let (tx, rx) = bounded::<Message>(options.channel_capacity.max(1));
    let (ack_tx, ack_rx) = bounded::<u8>(1);
    let layer_names: Vec<String> = layers.iter().map(|layer| layer.name.clone()).collect();

    std::thread::scope(|scope| {
        let writer = scope.spawn(move || write_records(sink, rx, ack_tx, layer_names));

        let mut produced = Produced::default();
        let produce_result = produce(
            source,
            export,
            layers,
            options,
            cancel,
            &tx,
            &ack_rx,
            &mut produced,
        );
        drop(tx);

        // Check writer thread first - it has the real error if the channel disconnected
        let writer_stats = match writer.join() {
            Ok(Ok(stats)) => stats,
            Ok(Err(writer_err)) => {
                return if produce_result.is_err() {
                    Err(writer_err
                        .context("Pipeline: Sink writer thread failed (caused channel disconnect)"))
                } else {
                    Err(writer_err)
                };
            }
            Err(panic_payload) => {
                let panic_msg = panic_payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic_payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                return Err(anyhow!(
                    "Pipeline: Sink writer thread panicked: {}",
                    panic_msg
                ));
            }
        };

        produce_result?;

        Ok(ExportStats {
            features_scanned: produced.features_scanned,
            records_emitted: writer_stats.records,
            per_layer: writer_stats.per_layer,
            zooms_completed: produced.zooms_completed,
            cancelled: produced.cancelled,
        })
    })
}
