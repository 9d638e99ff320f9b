use super::{RecordSink, to_geojson_feature};
use crate::export::Emitted;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// One GeoJSON Feature per line.
pub struct GeoJsonlSink {
    writer: BufWriter<Box<dyn Write + Send>>,
}

impl GeoJsonlSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::create(path).with_context(|| format!("Sink: Failed to create {:?}", path))?;
        Ok(Self {
            writer: BufWriter::new(Box::new(file)),
        })
    }

    pub fn stdout() -> Result<Self> {
        Ok(Self {
            writer: BufWriter::new(Box::new(std::io::stdout())),
        })
    }
}

impl RecordSink for GeoJsonlSink {
    fn add_record(&mut self, emitted: Emitted) -> Result<()> {
        let feature = to_geojson_feature(&emitted);
        serde_json::to_writer(&mut self.writer, &feature)?;
        writeln!(self.writer)?;
        Ok(())
    }

    fn finish_zoom(&mut self, zoom: u8) -> Result<()> {
        tracing::debug!("Zoom {}: flushing GeoJSONL output", zoom);
        self.writer.flush()?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
