use crate::config::OutputConfig;
use crate::error::Result;
use crate::metrics::RankedEntry;
use async_trait::async_trait;
use indicatif::MultiProgress;
use std::path::PathBuf;
use std::sync::Arc;

pub mod console;
pub mod csv;
pub mod json;
pub mod text;

/// Sink for ranked probe results, written fastest first.
#[async_trait]
pub trait OutputHandler: Send + Sync {
    async fn write(&mut self, entry: &RankedEntry) -> Result<()>;
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

pub fn create_handler(
    config: &OutputConfig,
    multi: Option<Arc<MultiProgress>>,
) -> Result<Box<dyn OutputHandler>> {
    let handler: Box<dyn OutputHandler> = match config {
        OutputConfig::Console => Box::new(self::console::ConsoleOutput::new(multi)),
        OutputConfig::Text { path } => Box::new(self::text::TextOutput::new(PathBuf::from(path))?),
        OutputConfig::Json { path } => Box::new(self::json::JsonOutput::new(PathBuf::from(path))?),
        OutputConfig::Csv { path } => Box::new(self::csv::CsvOutput::new(PathBuf::from(path))?),
    };
    Ok(handler)
}

/// Writes every entry in order and closes the handler.
pub async fn persist(handler: &mut dyn OutputHandler, ranked: &[RankedEntry]) -> Result<()> {
    for entry in ranked {
        handler.write(entry).await?;
    }
    handler.close().await
}
