//! Delimited-text (CSV) record sink.
//!
//! One header row, then one row per record. Cells containing the delimiter, a double quote or
//! a line break are quoted with inner quotes doubled. Byte sequences are written as hex.

use crate::error::{Error, Result};
use crate::pipeline::{Record, RecordSink};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub struct DelimitedWriter<W: Write> {
    out: W,
    delimiter: char,
    rows: usize,
}

impl DelimitedWriter<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>, delimiter: char) -> Result<Self> {
        let file = File::create(path).map_err(Error::Output)?;
        Ok(DelimitedWriter::new(BufWriter::new(file), delimiter))
    }
}

impl<W: Write> DelimitedWriter<W> {
    pub fn new(out: W, delimiter: char) -> Self {
        DelimitedWriter {
            out,
            delimiter,
            rows: 0,
        }
    }

    /// Records written so far (header excluded).
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_row<I, S>(&mut self, cells: I) -> std::io::Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut line = String::new();
        for (i, cell) in cells.into_iter().enumerate() {
            if i > 0 {
                line.push(self.delimiter);
            }
            push_cell(&mut line, cell.as_ref(), self.delimiter);
        }
        line.push('\n');
        self.out.write_all(line.as_bytes())
    }
}

fn push_cell(line: &mut String, cell: &str, delimiter: char) {
    let needs_quotes = cell
        .chars()
        .any(|c| c == delimiter || c == '"' || c == '\n' || c == '\r');
    if needs_quotes {
        line.push('"');
        line.push_str(&cell.replace('"', "\"\""));
        line.push('"');
    } else {
        line.push_str(cell);
    }
}

impl<W: Write> RecordSink for DelimitedWriter<W> {
    fn begin(&mut self, columns: &[String]) -> Result<()> {
        self.write_row(columns).map_err(Error::Output)
    }

    fn write(&mut self, record: &Record) -> Result<()> {
        let index = record.frame_index.map(|i| i.to_string());
        let cells = index
            .into_iter()
            .chain(record.values.iter().map(|v| v.to_string()));
        self.write_row(cells).map_err(Error::Output)?;
        self.rows += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.out.flush().map_err(Error::Output)
    }
}
