//! Downstream sinks for composite samples.

use std::io::Write;

use thiserror::Error;

use metsync_core::Sample;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode sample: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("sample rejected: {0}")]
    Rejected(String),
}

/// Receives one sample at a time from the engine.
pub trait SampleSink {
    fn accept(&mut self, sample: Sample) -> Result<(), SinkError>;
}

impl<F> SampleSink for F
where
    F: FnMut(Sample) -> Result<(), SinkError>,
{
    fn accept(&mut self, sample: Sample) -> Result<(), SinkError> {
        self(sample)
    }
}

/// Collects samples in memory.
#[derive(Debug, Default)]
pub struct VecSink {
    samples: Vec<Sample>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn take(&mut self) -> Vec<Sample> {
        std::mem::take(&mut self.samples)
    }
}

impl SampleSink for VecSink {
    fn accept(&mut self, sample: Sample) -> Result<(), SinkError> {
        self.samples.push(sample);
        Ok(())
    }
}

/// Writes each sample as one JSON object per line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
    written: u64,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// Number of samples written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> SampleSink for JsonLinesSink<W> {
    fn accept(&mut self, sample: Sample) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, &sample)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.written += 1;
        Ok(())
    }
}
