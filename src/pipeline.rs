//! Record pipeline: frames in, calibrated records out.
//!
//! Two modes, chosen by `read_in_memory`:
//!
//! - **streaming**: one frame buffer is reused; each record is emitted as soon as it is built.
//!   Memory use does not depend on input size. `sort_by` is rejected for this mode when the
//!   schema is resolved.
//! - **buffered**: the whole input is read, every record is built, then the records are
//!   stable-sorted by `sort_by` (if set) and emitted. Memory use is the input size plus one
//!   [`Record`] per frame; enabling `sort_by` implies paying this cost.
//!
//! Calibration failures abort the run with the frame index, field and input byte offset.

use crate::calibration;
use crate::codec::FrameDecoder;
use crate::error::{Error, InputError, Result};
use crate::frame::{self, FrameReader};
use crate::plugin::CalibrationPlugin;
use crate::schema::Schema;
use crate::value::Value;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// One output row: values in schema field order, plus the source frame index when
/// `include_frame_index` is set. The index is the input position, also after sorting.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub frame_index: Option<usize>,
    pub values: Vec<Value>,
}

impl Record {
    /// Value of a field by qualified name (`subsystem.field`).
    pub fn get<'r>(&'r self, schema: &Schema, qualified_name: &str) -> Option<&'r Value> {
        schema
            .field_index(qualified_name)
            .and_then(|i| self.values.get(i))
    }
}

/// Consumer of records, e.g. a CSV writer.
pub trait RecordSink {
    /// Called once before the first record with the output column names.
    fn begin(&mut self, _columns: &[String]) -> Result<()> {
        Ok(())
    }

    fn write(&mut self, record: &Record) -> Result<()>;

    /// Called once after the last record.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

impl RecordSink for Vec<Record> {
    fn write(&mut self, record: &Record) -> Result<()> {
        self.push(record.clone());
        Ok(())
    }
}

/// Decodes and calibrates frames for one schema and plugin.
pub struct RecordPipeline<'a> {
    schema: &'a Schema,
    decoder: FrameDecoder<'a>,
    plugin: &'a dyn CalibrationPlugin,
}

impl<'a> RecordPipeline<'a> {
    pub fn new(schema: &'a Schema, plugin: &'a dyn CalibrationPlugin) -> Self {
        RecordPipeline {
            schema,
            decoder: FrameDecoder::new(schema),
            plugin,
        }
    }

    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    /// Decode and calibrate one frame.
    pub fn process_frame(&self, frame_index: usize, frame: &[u8]) -> Result<Record> {
        let raw = self.decoder.decode(frame)?;
        let frame_start = frame_index as u64 * self.schema.frame_size() as u64;
        let mut values = Vec::with_capacity(raw.len());
        for (field, value) in self.schema.fields().iter().zip(raw) {
            let v = calibration::apply_optional(value, field.calibration.as_ref(), self.plugin)
                .map_err(|source| Error::Calibration {
                    field: field.qualified_name.clone(),
                    frame_index,
                    offset: frame_start + field.abs_offset as u64,
                    source,
                })?;
            values.push(v);
        }
        Ok(Record {
            frame_index: self
                .schema
                .settings()
                .include_frame_index
                .then_some(frame_index),
            values,
        })
    }

    /// Lazily decode frames from a reader, one at a time. Stops after the first error.
    pub fn stream<R: Read>(&self, reader: FrameReader<R>) -> Records<'_, 'a, R> {
        Records {
            pipeline: self,
            reader,
            done: false,
        }
    }

    /// Decode every frame of an in-memory input, then stable-sort ascending by `sort_by`
    /// when the schema sets it.
    pub fn collect(&self, data: &[u8]) -> Result<Vec<Record>> {
        let frames = frame::split_frames(data, self.schema.frame_size())?;
        let mut records = Vec::with_capacity(frames.len());
        for (frame_index, frame) in frames.enumerate() {
            records.push(self.process_frame(frame_index, frame)?);
        }
        if let Some(idx) = self.schema.sort_field() {
            tracing::info!(
                sort_by = self.schema.fields()[idx].qualified_name.as_str(),
                records = records.len(),
                "sorting records"
            );
            records.sort_by(|a, b| a.values[idx].total_cmp(&b.values[idx]));
        }
        Ok(records)
    }

    /// Run the configured mode over `input` (of total length `len`) into `sink`.
    /// Returns the number of records written.
    pub fn run<R: Read, S: RecordSink + ?Sized>(
        &self,
        mut input: R,
        len: u64,
        sink: &mut S,
    ) -> Result<usize> {
        let frame_size = self.schema.frame_size();
        let frame_count = frame::check_alignment(len, frame_size)?;
        if frame_count == 0 {
            tracing::warn!("input holds no frames");
        }
        let in_memory = self.schema.settings().read_in_memory;
        tracing::debug!(frame_size, frame_count, in_memory, "decoding frames");

        let written = if in_memory {
            // Grows with what is actually read; `len` is only an upper bound.
            let mut data = Vec::new();
            input
                .by_ref()
                .take(len)
                .read_to_end(&mut data)
                .map_err(InputError::from)?;
            if (data.len() as u64) < len {
                return Err(InputError::Truncated {
                    frame_index: data.len() / frame_size,
                    read: data.len() % frame_size,
                    expected: frame_size,
                }
                .into());
            }
            let records = self.collect(&data)?;
            sink.begin(&self.schema.columns())?;
            for record in &records {
                sink.write(record)?;
            }
            records.len()
        } else {
            let reader = FrameReader::new(input, len, frame_size)?;
            sink.begin(&self.schema.columns())?;
            let mut count = 0;
            for record in self.stream(reader) {
                sink.write(&record?)?;
                count += 1;
            }
            count
        };
        sink.finish()?;
        tracing::info!(records = written, "decoding finished");
        Ok(written)
    }

    /// [`RecordPipeline::run`] over a file.
    pub fn run_path<S: RecordSink + ?Sized>(&self, path: impl AsRef<Path>, sink: &mut S) -> Result<usize> {
        let file = File::open(path).map_err(InputError::from)?;
        let len = file.metadata().map_err(InputError::from)?.len();
        self.run(BufReader::new(file), len, sink)
    }
}

/// Iterator over streamed records; see [`RecordPipeline::stream`].
pub struct Records<'p, 'a, R> {
    pipeline: &'p RecordPipeline<'a>,
    reader: FrameReader<R>,
    done: bool,
}

impl<R: Read> Iterator for Records<'_, '_, R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = match self.reader.next_frame() {
            Ok(Some((frame_index, frame))) => self.pipeline.process_frame(frame_index, frame),
            Ok(None) => {
                self.done = true;
                return None;
            }
            Err(e) => Err(e.into()),
        };
        if item.is_err() {
            self.done = true;
        }
        Some(item)
    }
}
