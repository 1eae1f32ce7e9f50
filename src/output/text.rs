use super::OutputHandler;
use crate::error::Result;
use crate::metrics::RankedEntry;
use async_trait::async_trait;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

/// Newline-delimited endpoints, e.g. a `Proxy.txt` of working `host:port`s.
pub struct TextOutput {
    writer: BufWriter<File>,
}

impl TextOutput {
    pub fn new(path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

#[async_trait]
impl OutputHandler for TextOutput {
    async fn write(&mut self, entry: &RankedEntry) -> Result<()> {
        writeln!(self.writer, "{}", entry.endpoint)?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
