use crate::stats::Sample;
use eyre::{
    Result,
    WrapErr as _,
};
use std::{
    fs::File,
    io::{
        BufWriter,
        Write,
    },
};
use stream_harvester_config::{
    OutputDestination,
    OutputFormat,
    OutputTarget,
};

/// Receiver of the periodic statistics samples.
pub trait SampleSink: Send {
    fn publish(&mut self, sample: &Sample) -> Result<()>;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes samples as CSV rows or JSON lines to stdout or a file.
pub struct WriterSink {
    format: OutputFormat,
    writer: Box<dyn Write + Send>,
    header_written: bool,
}

impl std::fmt::Debug for WriterSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterSink")
            .field("format", &self.format)
            .field("header_written", &self.header_written)
            .finish_non_exhaustive()
    }
}

impl WriterSink {
    pub fn new(format: OutputFormat, writer: Box<dyn Write + Send>) -> Self {
        Self {
            format,
            writer,
            header_written: false,
        }
    }

    pub fn open(target: &OutputTarget) -> Result<Self> {
        let writer: Box<dyn Write + Send> = match &target.destination {
            OutputDestination::Stdout => Box::new(std::io::stdout()),
            OutputDestination::File(path) => {
                let file = File::create(path)
                    .wrap_err_with(|| format!("Failed to create output file {}", path.display()))?;
                Box::new(BufWriter::new(file))
            }
        };
        info!(%target, "writing statistics");
        Ok(Self::new(target.format, writer))
    }

    fn write_csv(&mut self, sample: &Sample) -> std::io::Result<()> {
        if !self.header_written {
            write!(self.writer, "time")?;
            for (name, _) in &sample.fields {
                write!(self.writer, ",{name}")?;
            }
            writeln!(self.writer)?;
            self.header_written = true;
        }
        write!(self.writer, "{}", sample.time.to_rfc3339())?;
        for (_, value) in &sample.fields {
            if value.is_nan() {
                write!(self.writer, ",NaN")?;
            } else {
                write!(self.writer, ",{value}")?;
            }
        }
        writeln!(self.writer)
    }

    fn write_json(&mut self, sample: &Sample) -> Result<()> {
        serde_json::to_writer(&mut self.writer, sample)?;
        writeln!(self.writer)?;
        Ok(())
    }
}

impl SampleSink for WriterSink {
    fn publish(&mut self, sample: &Sample) -> Result<()> {
        match self.format {
            OutputFormat::Csv => self.write_csv(sample)?,
            OutputFormat::Json => self.write_json(sample)?,
        }
        self.writer.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
