//! Per-query classification traces.

use std::io::Write;

use tracing::debug;

use crate::classifier::QueryOutcome;
use crate::error::Result;

/// Receives one [`QueryOutcome`] per classified query.
pub trait TraceSink {
    fn record(&mut self, outcome: &QueryOutcome) -> Result<()>;

    /// Called once after the last query.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Emits each outcome as a `debug` tracing event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl TraceSink for LogSink {
    fn record(&mut self, outcome: &QueryOutcome) -> Result<()> {
        debug!(
            index = outcome.index,
            guessed = ?outcome.guessed,
            predicted = ?outcome.predicted,
            true_class = outcome.true_class,
            credit = outcome.credit,
            "classified"
        );
        Ok(())
    }
}

/// Writes one text line per outcome:
/// `guessed: 3 3 | predicted: 3 | true: 3`.
#[derive(Debug)]
pub struct WriterSink<W: Write> {
    out: W,
}

impl<W: Write> WriterSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

fn join(classes: &[usize]) -> String {
    classes
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

impl<W: Write> TraceSink for WriterSink<W> {
    fn record(&mut self, outcome: &QueryOutcome) -> Result<()> {
        writeln!(
            self.out,
            "guessed: {} | predicted: {} | true: {}",
            join(&outcome.guessed),
            join(&outcome.predicted),
            outcome.true_class
        )?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Collects outcomes in memory.
impl TraceSink for Vec<QueryOutcome> {
    fn record(&mut self, outcome: &QueryOutcome) -> Result<()> {
        self.push(outcome.clone());
        Ok(())
    }
}
