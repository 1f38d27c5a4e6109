//! JSON-lines result writer.

use std::io::Write;

use crate::error::Result;
use crate::ipc::events::ClassificationResult;

/// Writes one complete JSON object per line and flushes after each, so a
/// reader never sees a partial record.
pub struct ResultEmitter<W: Write> {
    writer: W,
    emitted: u64,
}

impl<W: Write> ResultEmitter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, emitted: 0 }
    }

    pub fn emit(&mut self, result: &ClassificationResult) -> Result<()> {
        let mut line = serde_json::to_vec(result)?;
        line.push(b'\n');
        self.writer.write_all(&line)?;
        self.writer.flush()?;
        self.emitted += 1;
        Ok(())
    }

    /// Records written so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
