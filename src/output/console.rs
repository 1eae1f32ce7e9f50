use super::OutputHandler;
use crate::error::{Error, Result};
use crate::metrics::RankedEntry;
use async_trait::async_trait;
use indicatif::MultiProgress;
use std::sync::Arc;

pub struct ConsoleOutput {
    multi: Option<Arc<MultiProgress>>,
}

impl ConsoleOutput {
    pub fn new(multi: Option<Arc<MultiProgress>>) -> Self {
        Self { multi }
    }
}

impl Default for ConsoleOutput {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl OutputHandler for ConsoleOutput {
    async fn write(&mut self, entry: &RankedEntry) -> Result<()> {
        let line = format!("{:<40} {:>10.1} ms", entry.endpoint, entry.latency_ms);

        if let Some(multi) = &self.multi {
            multi
                .println(line)
                .map_err(|e| Error::Internal(e.to_string()))?;
        } else {
            println!("{}", line);
        }
        Ok(())
    }
}
