//! Decode a binary frame dump into CSV using a frame schema.
//!
//! Usage:
//!   satframe --schema frames.schema --input dump.bin --output out.csv
//!   satframe --schema frames.xml --input dump.bin --output out.csv --plugin extra.plugin
//!   satframe --schema frames.schema --input dump.bin --output out.csv --csv-delimiter ";"

use anyhow::{bail, Context};
use clap::Parser;
use satframe::{DelimitedWriter, FunctionTable, RecordPipeline, Schema};
use std::path::PathBuf;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(name = "satframe", version, about = "Decode fixed-size binary frames into CSV using a frame schema")]
struct Args {
    /// Schema file (block format or XML) describing frame size, subsystems and fields.
    #[arg(long)]
    schema: PathBuf,

    /// Binary input; its size must be a multiple of the frame size.
    #[arg(long)]
    input: PathBuf,

    /// CSV output file.
    #[arg(long)]
    output: PathBuf,

    /// Plugin file with extra calibration functions (`name = expression;`).
    #[arg(long)]
    plugin: Option<PathBuf>,

    /// Column delimiter.
    #[arg(long, default_value_t = ',')]
    csv_delimiter: char,

    /// Debug logging.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .init();

    let schema = Schema::load(&args.schema)
        .with_context(|| format!("loading schema {}", args.schema.display()))?;
    tracing::debug!(
        fields = schema.fields().len(),
        subsystems = schema.subsystems().len(),
        frame_size = schema.frame_size(),
        "schema loaded"
    );

    if !args.input.exists() {
        bail!("input not found: {}", args.input.display());
    }
    // Fail on a misaligned input before the output file is created.
    let input_len = std::fs::metadata(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?
        .len();
    satframe::frame::check_alignment(input_len, schema.frame_size())?;

    let mut plugin = FunctionTable::with_builtins();
    if let Some(path) = &args.plugin {
        let n = plugin
            .load_file(path)
            .with_context(|| format!("loading plugin {}", path.display()))?;
        tracing::debug!(functions = n, plugin = %path.display(), "plugin loaded");
    }

    let mut sink = DelimitedWriter::create(&args.output, args.csv_delimiter)
        .with_context(|| format!("creating {}", args.output.display()))?;
    let pipeline = RecordPipeline::new(&schema, &plugin);
    let written = pipeline
        .run_path(&args.input, &mut sink)
        .with_context(|| format!("decoding {}", args.input.display()))?;

    tracing::info!("wrote {} rows to {}", written, args.output.display());
    Ok(())
}
